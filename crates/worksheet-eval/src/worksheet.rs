//! Worksheet instances (§4.F): the public `get`/`set`/`append`/`del`
//! contract, constraint rollback, dependency-driven recomputation, and
//! the parent back-pointer bookkeeping that makes §4.G's clone/diff
//! possible.
//!
//! `Registry` owns every `Instance` in a flat id-keyed arena behind a
//! single `RefCell`; `Worksheet` is a cheap `{registry, id}` handle
//! cloned freely by callers and by the interpreter when it crosses a
//! worksheet-reference field.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;
use uuid::Uuid;

use worksheet_common::{
    Number, SliceValue, Type, Value, WorksheetError, ID_FIELD_INDEX, VERSION_FIELD_INDEX,
};

use crate::definitions::{Definition, DependentRef, Field};
use crate::interpreter;

/// `name -> index -> worksheet ids holding a reference at that field`
/// (§3's parents table).
type ParentTable = FxHashMap<Rc<str>, FxHashMap<i64, BTreeSet<String>>>;

struct Instance {
    def: Rc<Definition>,
    data: FxHashMap<i64, Value>,
    orig: FxHashMap<i64, Value>,
    parents: ParentTable,
}

pub struct Registry {
    definitions: FxHashMap<Rc<str>, Rc<Definition>>,
    instances: RefCell<FxHashMap<String, Instance>>,
}

impl Registry {
    pub fn new(definitions: FxHashMap<Rc<str>, Rc<Definition>>) -> Rc<Registry> {
        Rc::new(Registry {
            definitions,
            instances: RefCell::new(FxHashMap::default()),
        })
    }

    pub fn definition(&self, name: &str) -> Option<Rc<Definition>> {
        self.definitions.get(name).cloned()
    }

    /// Construct a new worksheet of the named definition with a fresh
    /// id and `version = 1`, both written directly into `data` (§3's
    /// lifecycle, not a `Set`, since reserved fields predate any
    /// mutator call).
    pub fn create(self: &Rc<Self>, def_name: &str) -> Result<Worksheet, WorksheetError> {
        let def = self.definitions.get(def_name).cloned().ok_or_else(|| {
            WorksheetError::definition(format!("unknown worksheet reference {def_name}"))
        })?;
        let id = Uuid::new_v4().to_string();
        let mut data = FxHashMap::default();
        data.insert(ID_FIELD_INDEX, Value::Text(id.clone()));
        data.insert(VERSION_FIELD_INDEX, Value::Number(Number::new(1, 0)));
        let instance = Instance {
            def,
            data,
            orig: FxHashMap::default(),
            parents: FxHashMap::default(),
        };
        self.instances.borrow_mut().insert(id.clone(), instance);
        Ok(Worksheet {
            registry: self.clone(),
            id,
        })
    }

    /// Look up a handle to an already-constructed worksheet by id.
    pub fn open(self: &Rc<Self>, id: impl Into<String>) -> Option<Worksheet> {
        let id = id.into();
        if self.instances.borrow().contains_key(&id) {
            Some(Worksheet {
                registry: self.clone(),
                id,
            })
        } else {
            None
        }
    }

    /// Register a freshly built instance directly (used by
    /// `graph_ops::clone`, which bypasses `create`'s definition lookup
    /// since it already holds the definition).
    pub(crate) fn insert_instance(
        self: &Rc<Self>,
        def: Rc<Definition>,
        id: String,
        data: FxHashMap<i64, Value>,
    ) -> Worksheet {
        let instance = Instance {
            def,
            data,
            orig: FxHashMap::default(),
            parents: FxHashMap::default(),
        };
        self.instances.borrow_mut().insert(id.clone(), instance);
        Worksheet {
            registry: self.clone(),
            id,
        }
    }
}

fn next_slice_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Unquoted value rendering for "cannot assign X to Y" messages — text
/// values appear bare (`the_devil`, not `"the_devil"`), unlike
/// `Value`'s `Display`, which quotes them for constraint-violation
/// messages.
pub(crate) fn raw_repr(v: &Value) -> String {
    match v {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(feature = "tracing")]
fn tracing_constraint_rollback(worksheet_id: &str, field_name: &str) {
    tracing::debug!(worksheet_id, field_name, "constraint violation, rolling back field");
}

#[cfg(not(feature = "tracing"))]
fn tracing_constraint_rollback(_worksheet_id: &str, _field_name: &str) {}

#[cfg(feature = "tracing")]
fn tracing_recompute(worksheet_id: &str, field_name: &str) {
    tracing::trace!(worksheet_id, field_name, "recomputing dependent field");
}

#[cfg(not(feature = "tracing"))]
fn tracing_recompute(_worksheet_id: &str, _field_name: &str) {}

#[cfg(feature = "tracing")]
fn tracing_propagate_span(worksheet_id: &str, dependent_count: usize) -> tracing::span::EnteredSpan {
    tracing::debug_span!("propagate", worksheet_id, dependent_count).entered()
}

#[cfg(not(feature = "tracing"))]
fn tracing_propagate_span(_worksheet_id: &str, _dependent_count: usize) {}

#[derive(Clone)]
pub struct Worksheet {
    registry: Rc<Registry>,
    id: String,
}

impl Worksheet {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> Number {
        match self.raw_get_by_index(VERSION_FIELD_INDEX) {
            Value::Number(n) => n,
            _ => Number::new(1, 0),
        }
    }

    pub fn name(&self) -> Rc<str> {
        self.def().name.clone()
    }

    pub(crate) fn registry(&self) -> &Rc<Registry> {
        &self.registry
    }

    pub(crate) fn def(&self) -> Rc<Definition> {
        let instances = self.registry.instances.borrow();
        instances
            .get(&self.id)
            .expect("worksheet instance exists for its own handle")
            .def
            .clone()
    }

    pub(crate) fn raw_field(&self, name: &str) -> Result<Value, WorksheetError> {
        let def = self.def();
        let field = def
            .field_by_name(name)
            .ok_or_else(|| WorksheetError::unknown_field(name))?;
        Ok(self.raw_get_by_index(field.index))
    }

    fn raw_get_by_index(&self, index: i64) -> Value {
        let instances = self.registry.instances.borrow();
        instances
            .get(&self.id)
            .expect("worksheet instance exists for its own handle")
            .data
            .get(&index)
            .cloned()
            .unwrap_or(Value::Undefined)
    }

    pub(crate) fn store_raw(&self, index: i64, value: Value) {
        let mut instances = self.registry.instances.borrow_mut();
        let inst = instances
            .get_mut(&self.id)
            .expect("worksheet instance exists for its own handle");
        if value.is_undefined() {
            inst.data.remove(&index);
        } else {
            inst.data.insert(index, value);
        }
    }

    fn bump_version(&self) {
        let next = self.version().plus(Number::new(1, 0));
        self.store_raw(VERSION_FIELD_INDEX, Value::Number(next));
    }

    pub fn is_set(&self, name: &str) -> Result<bool, WorksheetError> {
        let def = self.def();
        let field = def
            .field_by_name(name)
            .ok_or_else(|| WorksheetError::unknown_field(name))?;
        let instances = self.registry.instances.borrow();
        Ok(instances
            .get(&self.id)
            .expect("worksheet instance exists for its own handle")
            .data
            .contains_key(&field.index))
    }

    pub fn get(&self, name: &str) -> Result<Value, WorksheetError> {
        let def = self.def();
        let field = def
            .field_by_name(name)
            .ok_or_else(|| WorksheetError::unknown_field(name))?;
        if matches!(field.ty, Type::Slice(_)) {
            return Err(WorksheetError::shape(format!("Get on slice field {name}")).with_field(name));
        }
        Ok(self.raw_get_by_index(field.index))
    }

    pub fn get_slice(&self, name: &str) -> Result<Vec<Value>, WorksheetError> {
        let def = self.def();
        let field = def
            .field_by_name(name)
            .ok_or_else(|| WorksheetError::unknown_field(name))?;
        if !matches!(field.ty, Type::Slice(_)) {
            return Err(WorksheetError::shape(format!("GetSlice on non-slice field {name}")).with_field(name));
        }
        match self.raw_get_by_index(field.index) {
            Value::Slice(s) => Ok(s.elements().iter().map(|(_, v)| v.clone()).collect()),
            _ => Ok(Vec::new()),
        }
    }

    pub fn set(&self, name: &str, value: Value) -> Result<(), WorksheetError> {
        let def = self.def();
        let field = def
            .field_by_name(name)
            .ok_or_else(|| WorksheetError::unknown_field(name))?;
        if field.computed_by.is_some() {
            return Err(WorksheetError::shape(format!("cannot set computed field {name}")).with_field(name));
        }
        if matches!(field.ty, Type::Slice(_)) {
            return Err(WorksheetError::shape(format!("Set on slice field {name}")).with_field(name));
        }
        if self.set_checked(field, value)? {
            self.bump_version();
        }
        Ok(())
    }

    pub fn unset(&self, name: &str) -> Result<(), WorksheetError> {
        self.set(name, Value::Undefined)
    }

    pub fn append(&self, name: &str, value: Value) -> Result<(), WorksheetError> {
        let def = self.def();
        let field = def
            .field_by_name(name)
            .ok_or_else(|| WorksheetError::unknown_field(name))?;
        let Type::Slice(elem_ty) = &field.ty else {
            return Err(WorksheetError::shape(format!("Append on non-slice field {name}")).with_field(name));
        };
        if !value.is_assignable_to(elem_ty) {
            return Err(WorksheetError::type_error(format!(
                "cannot append {} to []{}",
                raw_repr(&value),
                elem_ty
            ))
            .with_field(name));
        }

        let mut slice = match self.raw_get_by_index(field.index) {
            Value::Slice(s) => s,
            _ => SliceValue::new(next_slice_id(), (**elem_ty).clone()),
        };
        if let Value::Worksheet(ref wsref) = value {
            self.add_parent_pointer(wsref, field.index);
        }
        slice.append(value);
        self.store_raw(field.index, Value::Slice(slice));
        self.bump_version();
        self.propagate(&field.dependents)
    }

    pub fn del(&self, name: &str, index: usize) -> Result<(), WorksheetError> {
        let def = self.def();
        let field = def
            .field_by_name(name)
            .ok_or_else(|| WorksheetError::unknown_field(name))?;
        if !matches!(field.ty, Type::Slice(_)) {
            return Err(WorksheetError::shape(format!("Del on non-slice field {name}")).with_field(name));
        }
        let mut slice = match self.raw_get_by_index(field.index) {
            Value::Slice(s) => s,
            _ => {
                return Err(WorksheetError::index(format!(
                    "slice index {index} out of range (len 0)"
                )))
            }
        };
        let (_, removed) = slice.remove(index)?;
        if let Value::Worksheet(ref wsref) = removed {
            // The same child can appear more than once in a slice field; the
            // parent pointer only stops corresponding to a real reference
            // once every occurrence at this field is gone.
            let still_referenced = slice
                .elements()
                .iter()
                .any(|(_, v)| matches!(v, Value::Worksheet(other) if other.id == wsref.id));
            if !still_referenced {
                self.remove_parent_pointer(wsref, field.index);
            }
        }
        self.store_raw(field.index, Value::Slice(slice));
        self.bump_version();
        self.propagate(&field.dependents)
    }

    fn set_checked(&self, field: &Field, value: Value) -> Result<bool, WorksheetError> {
        let old = self.raw_get_by_index(field.index);
        if old.value_eq(&value) {
            return Ok(false);
        }
        if !value.is_assignable_to(&field.ty) {
            return Err(WorksheetError::type_error(format!(
                "cannot assign {} to {}",
                raw_repr(&value),
                field.ty
            ))
            .with_field(&field.name));
        }

        self.store_raw(field.index, value.clone());

        if field.constrained_by.is_some() {
            match self.evaluate_constraint(field) {
                Ok(true) => {}
                Ok(false) => {
                    tracing_constraint_rollback(&self.id, &field.name);
                    self.store_raw(field.index, old);
                    return Err(WorksheetError::constraint_violation(&value.to_string(), &field.name));
                }
                Err(e) => {
                    tracing_constraint_rollback(&self.id, &field.name);
                    self.store_raw(field.index, old);
                    return Err(e);
                }
            }
        }

        self.bookkeep_reference_change(field.index, &old, &value);
        self.propagate(&field.dependents)?;
        Ok(true)
    }

    fn evaluate_constraint(&self, field: &Field) -> Result<bool, WorksheetError> {
        if let (true, Some(plugin)) = (
            matches!(field.constrained_by, Some(worksheet_parse::Expr::External)),
            &field.plugin,
        ) {
            let args = self.resolve_plugin_args(plugin.args())?;
            return Ok(matches!(plugin.compute(args), Value::Bool(true)));
        }
        match &field.constrained_by {
            Some(expr) => Ok(matches!(interpreter::compute(expr, self)?, Value::Bool(true))),
            None => Ok(true),
        }
    }

    fn evaluate_computed(&self, field: &Field) -> Result<Value, WorksheetError> {
        if let (true, Some(plugin)) = (
            matches!(field.computed_by, Some(worksheet_parse::Expr::External)),
            &field.plugin,
        ) {
            let args = self.resolve_plugin_args(plugin.args())?;
            return Ok(plugin.compute(args));
        }
        match &field.computed_by {
            Some(expr) => interpreter::compute(expr, self),
            None => Ok(self.raw_get_by_index(field.index)),
        }
    }

    fn resolve_plugin_args(&self, selectors: Vec<String>) -> Result<Vec<Value>, WorksheetError> {
        selectors
            .iter()
            .map(|s| {
                let path: Vec<String> = s.split('.').map(str::to_string).collect();
                interpreter::resolve_selector(self, &path)
            })
            .collect()
    }

    fn recompute_field(&self, field_index: i64) -> Result<(), WorksheetError> {
        let def = self.def();
        let field = def
            .field_by_index(field_index)
            .expect("dependency graph only references known fields");
        let new_value = self.evaluate_computed(field)?;
        let old = self.raw_get_by_index(field_index);
        if old.value_eq(&new_value) {
            return Ok(());
        }
        tracing_recompute(&self.id, &field.name);
        self.store_raw(field_index, new_value.clone());
        self.bookkeep_reference_change(field_index, &old, &new_value);
        self.propagate(&field.dependents)
    }

    fn propagate(&self, dependents: &[DependentRef]) -> Result<(), WorksheetError> {
        if dependents.is_empty() {
            return Ok(());
        }
        let my_def_name = self.def().name.clone();
        let _span = tracing_propagate_span(&self.id, dependents.len());
        for dep in dependents {
            if dep.def_name == my_def_name {
                self.recompute_field(dep.field_index)?;
            } else {
                for parent_id in self.parent_ids_for_def(&dep.def_name) {
                    let parent = Worksheet {
                        registry: self.registry.clone(),
                        id: parent_id,
                    };
                    parent.recompute_field(dep.field_index)?;
                }
            }
        }
        Ok(())
    }

    fn parent_ids_for_def(&self, def_name: &Rc<str>) -> Vec<String> {
        let instances = self.registry.instances.borrow();
        let inst = instances
            .get(&self.id)
            .expect("worksheet instance exists for its own handle");
        match inst.parents.get(def_name) {
            Some(by_field) => by_field.values().flat_map(|set| set.iter().cloned()).collect(),
            None => Vec::new(),
        }
    }

    fn bookkeep_reference_change(&self, field_index: i64, old: &Value, new: &Value) {
        if let Value::Worksheet(wsref) = old {
            self.remove_parent_pointer(wsref, field_index);
        }
        if let Value::Worksheet(wsref) = new {
            self.add_parent_pointer(wsref, field_index);
        }
    }

    pub(crate) fn add_parent_pointer(&self, child_ref: &worksheet_common::WorksheetRef, field_index: i64) {
        let my_def_name = self.def().name.clone();
        let mut instances = self.registry.instances.borrow_mut();
        if let Some(child) = instances.get_mut(&child_ref.id) {
            child
                .parents
                .entry(my_def_name)
                .or_default()
                .entry(field_index)
                .or_default()
                .insert(self.id.clone());
        }
    }

    fn remove_parent_pointer(&self, child_ref: &worksheet_common::WorksheetRef, field_index: i64) {
        let my_def_name = self.def().name.clone();
        let mut instances = self.registry.instances.borrow_mut();
        if let Some(child) = instances.get_mut(&child_ref.id) {
            if let Some(by_field) = child.parents.get_mut(&my_def_name) {
                if let Some(set) = by_field.get_mut(&field_index) {
                    set.remove(&self.id);
                    if set.is_empty() {
                        by_field.remove(&field_index);
                    }
                }
                if by_field.is_empty() {
                    child.parents.remove(&my_def_name);
                }
            }
        }
    }

    /// Parent worksheet ids and field indices holding a reference to
    /// `self`, grouped by the parent definition name (§3's parents
    /// table, exposed read-only for `graph_ops`).
    pub(crate) fn parents_snapshot(&self) -> ParentTable {
        let instances = self.registry.instances.borrow();
        instances
            .get(&self.id)
            .expect("worksheet instance exists for its own handle")
            .parents
            .clone()
    }

    pub(crate) fn data_snapshot(&self) -> FxHashMap<i64, Value> {
        let instances = self.registry.instances.borrow();
        instances
            .get(&self.id)
            .expect("worksheet instance exists for its own handle")
            .data
            .clone()
    }

    pub(crate) fn orig_snapshot(&self) -> FxHashMap<i64, Value> {
        let instances = self.registry.instances.borrow();
        instances
            .get(&self.id)
            .expect("worksheet instance exists for its own handle")
            .orig
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::build;
    use crate::plugin::Options;

    fn simple_registry() -> Rc<Registry> {
        let src = r#"
            type simple worksheet {
              1:name text constrained_by { return name == "Alex" || name == "Wilson" }
              2:age  number[0]
            }
        "#;
        let defs = build(src, Options::new()).unwrap();
        Registry::new(defs)
    }

    #[test]
    fn constraint_violation_rolls_back() {
        let registry = simple_registry();
        let ws = registry.create("simple").unwrap();
        let err = ws.set("name", Value::Text("Alice".into())).unwrap_err();
        assert_eq!(
            err.message,
            "\"Alice\" not a valid value for constrained field name"
        );
        assert!(!ws.is_set("name").unwrap());

        ws.set("name", Value::Text("Alex".into())).unwrap();
        assert_eq!(ws.get("name").unwrap(), Value::Text("Alex".into()));
    }

    #[test]
    fn set_is_noop_for_equal_value() {
        let registry = simple_registry();
        let ws = registry.create("simple").unwrap();
        ws.set("age", Value::Number(Number::new(5, 0))).unwrap();
        let v1 = ws.version();
        ws.set("age", Value::Number(Number::new(5, 0))).unwrap();
        assert_eq!(ws.version(), v1);
    }

    #[test]
    fn cross_worksheet_recompute_on_child_change() {
        let src = r#"
            type parent worksheet {
              1:kid child
              2:total number[0] computed_by { return kid.amount }
            }
            type child worksheet {
              1:amount number[0]
            }
        "#;
        let defs = build(src, Options::new()).unwrap();
        let registry = Registry::new(defs);
        let parent = registry.create("parent").unwrap();
        let child = registry.create("child").unwrap();
        parent
            .set("kid", Value::Worksheet(worksheet_common::WorksheetRef {
                id: child.id().to_string(),
                def_name: child.name(),
            }))
            .unwrap();
        child.set("amount", Value::Number(Number::new(7, 0))).unwrap();
        assert_eq!(parent.get("total").unwrap(), Value::Number(Number::new(7, 0)));
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn constraint_rollback_and_propagation_emit_trace_events() {
        use tracing_subscriber::layer::SubscriberExt;

        struct CountingLayer(std::sync::Arc<std::sync::atomic::AtomicUsize>);
        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CountingLayer {
            fn on_event(&self, _event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
                self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }

        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(CountingLayer(count.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let src = r#"
            type t worksheet {
              1:a number[0]
              2:b number[0] computed_by { return a }
              3:c text constrained_by { return c == "ok" }
            }
        "#;
        let defs = build(src, Options::new()).unwrap();
        let registry = Registry::new(defs);
        let ws = registry.create("t").unwrap();

        ws.set("a", Value::Number(Number::new(1, 0))).unwrap();
        let _ = ws.set("c", Value::Text("not ok".into()));

        assert!(count.load(std::sync::atomic::Ordering::Relaxed) > 0);
    }
}
