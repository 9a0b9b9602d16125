//! The definitions builder (§4.E): parse, attach plugins, resolve
//! worksheet-type references, validate, and build the per-field
//! dependency graph.
//!
//! Grounded on `engine/graph.rs`'s `add_dependent_edges` (dirty
//! propagation by walking a dependents list built once at graph
//! construction), generalized here from per-cell vertices to per-field
//! dependents, potentially crossing worksheet definitions through a
//! reference field (§4.F's "otherwise recompute on each parent
//! worksheet" case).

use std::collections::HashSet;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use worksheet_common::{
    EnumDef, Type, WorksheetError, ID_FIELD_INDEX, ID_FIELD_NAME, VERSION_FIELD_INDEX,
    VERSION_FIELD_NAME,
};
use worksheet_parse::{parse_source, Expr, ParsedDef, TypeRef};

use crate::plugin::{ComputedBy, Options};

/// An edge in the per-field dependency graph (§3, §4.E step 5):
/// `field_index` on `def_name` must be recomputed whenever the field
/// owning this `DependentRef` changes. `def_name` may differ from the
/// definition the edge is stored on — a parent's computed field that
/// reads `child.total` registers itself as a dependent of `total` on
/// the *child* definition, which is how §4.F's cross-worksheet
/// propagation finds it.
#[derive(Debug, Clone)]
pub struct DependentRef {
    pub def_name: Rc<str>,
    pub field_index: i64,
}

#[derive(Debug)]
pub struct Field {
    pub index: i64,
    pub name: String,
    pub ty: Type,
    pub computed_by: Option<Expr>,
    pub constrained_by: Option<Expr>,
    pub plugin: Option<Rc<dyn ComputedBy>>,
    pub dependents: Vec<DependentRef>,
}

#[derive(Debug)]
pub struct Definition {
    pub name: Rc<str>,
    fields: Vec<Field>,
    by_name: FxHashMap<String, usize>,
    by_index: FxHashMap<i64, usize>,
}

impl Definition {
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn field_by_index(&self, index: i64) -> Option<&Field> {
        self.by_index.get(&index).map(|&i| &self.fields[i])
    }
}

struct FieldDraft {
    index: i64,
    name: String,
    ty_ref: TypeRef,
    ty: Option<Type>,
    computed_by: Option<Expr>,
    constrained_by: Option<Expr>,
    plugin: Option<Rc<dyn ComputedBy>>,
    dependents: Vec<DependentRef>,
}

struct WorksheetDraft {
    fields: Vec<FieldDraft>,
}

/// Run all five phases of §4.E and produce the resolved definition
/// table, keyed by name.
pub fn build(source: &str, mut options: Options) -> Result<FxHashMap<Rc<str>, Rc<Definition>>, WorksheetError> {
    let parsed = parse_source(source).map_err(WorksheetError::from)?;

    let mut enum_defs: FxHashMap<String, Rc<EnumDef>> = FxHashMap::default();
    let mut drafts: FxHashMap<String, WorksheetDraft> = FxHashMap::default();
    let mut order: Vec<String> = Vec::new();

    for def in parsed {
        match def {
            ParsedDef::Enum(e) => {
                if enum_defs.contains_key(&e.name) || drafts.contains_key(&e.name) {
                    return Err(WorksheetError::definition(format!(
                        "multiple definitions named {}",
                        e.name
                    )));
                }
                enum_defs.insert(
                    e.name.clone(),
                    Rc::new(EnumDef {
                        name: e.name,
                        members: e.members,
                    }),
                );
            }
            ParsedDef::Worksheet(w) => {
                if enum_defs.contains_key(&w.name) || drafts.contains_key(&w.name) {
                    return Err(WorksheetError::definition(format!(
                        "multiple definitions named {}",
                        w.name
                    )));
                }
                order.push(w.name.clone());
                let fields = w
                    .fields
                    .into_iter()
                    .map(|f| FieldDraft {
                        index: f.index,
                        name: f.name,
                        ty_ref: f.ty,
                        ty: None,
                        computed_by: f.computed_by,
                        constrained_by: f.constrained_by,
                        plugin: None,
                        dependents: Vec::new(),
                    })
                    .collect();
                drafts.insert(w.name, WorksheetDraft { fields });
            }
        }
    }

    add_reserved_fields(&mut drafts)?;
    resolve_types(&order, &enum_defs, &mut drafts)?;
    attach_plugins(&order, &mut drafts, &mut options)?;
    build_dependency_graph(&order, &mut drafts)?;

    let result = finalize(drafts)?;
    tracing_dependency_graph_built(result.len());
    Ok(result)
}

#[cfg(feature = "tracing")]
fn tracing_dependency_graph_built(definition_count: usize) {
    tracing::debug!(definition_count, "dependency graph built");
}

#[cfg(not(feature = "tracing"))]
fn tracing_dependency_graph_built(_definition_count: usize) {}

fn add_reserved_fields(drafts: &mut FxHashMap<String, WorksheetDraft>) -> Result<(), WorksheetError> {
    for draft in drafts.values_mut() {
        let mut seen_names = HashSet::new();
        let mut seen_indices = HashSet::new();
        for f in &draft.fields {
            if f.name == ID_FIELD_NAME || f.name == VERSION_FIELD_NAME {
                return Err(WorksheetError::definition(format!(
                    "field name {} is reserved",
                    f.name
                )));
            }
            if f.index == ID_FIELD_INDEX || f.index == VERSION_FIELD_INDEX {
                return Err(WorksheetError::definition(format!(
                    "field index {} is reserved",
                    f.index
                )));
            }
            if !seen_names.insert(f.name.clone()) {
                return Err(WorksheetError::definition(format!(
                    "duplicate field name {}",
                    f.name
                )));
            }
            if !seen_indices.insert(f.index) {
                return Err(WorksheetError::definition(format!(
                    "duplicate field index {}",
                    f.index
                )));
            }
        }
        draft.fields.push(FieldDraft {
            index: ID_FIELD_INDEX,
            name: ID_FIELD_NAME.to_string(),
            ty_ref: TypeRef::Text,
            ty: Some(Type::Text),
            computed_by: None,
            constrained_by: None,
            plugin: None,
            dependents: Vec::new(),
        });
        draft.fields.push(FieldDraft {
            index: VERSION_FIELD_INDEX,
            name: VERSION_FIELD_NAME.to_string(),
            ty_ref: TypeRef::Number(0),
            ty: Some(Type::Number(0)),
            computed_by: None,
            constrained_by: None,
            plugin: None,
            dependents: Vec::new(),
        });
    }
    Ok(())
}

fn resolve_type(
    ty_ref: &TypeRef,
    enums: &FxHashMap<String, Rc<EnumDef>>,
    worksheet_names: &HashSet<String>,
) -> Result<Type, WorksheetError> {
    match ty_ref {
        TypeRef::Text => Ok(Type::Text),
        TypeRef::Bool => Ok(Type::Bool),
        TypeRef::Undefined => Ok(Type::Undefined),
        TypeRef::Number(s) => Ok(Type::Number(*s)),
        TypeRef::Slice(inner) => Ok(Type::Slice(Box::new(resolve_type(
            inner,
            enums,
            worksheet_names,
        )?))),
        TypeRef::Named(name) => {
            if let Some(e) = enums.get(name) {
                Ok(Type::Enum(e.clone()))
            } else if worksheet_names.contains(name) {
                Ok(Type::Worksheet(Rc::from(name.as_str())))
            } else {
                Err(WorksheetError::definition(format!(
                    "unknown worksheet reference {name}"
                )))
            }
        }
    }
}

fn resolve_types(
    order: &[String],
    enum_defs: &FxHashMap<String, Rc<EnumDef>>,
    drafts: &mut FxHashMap<String, WorksheetDraft>,
) -> Result<(), WorksheetError> {
    let worksheet_names: HashSet<String> = order.iter().cloned().collect();
    for name in order {
        let draft = drafts.get_mut(name).expect("draft exists for order entry");
        for f in draft.fields.iter_mut() {
            f.ty = Some(resolve_type(&f.ty_ref, enum_defs, &worksheet_names)?);
        }
    }
    Ok(())
}

fn attach_plugins(
    order: &[String],
    drafts: &mut FxHashMap<String, WorksheetDraft>,
    options: &mut Options,
) -> Result<(), WorksheetError> {
    for name in order {
        let draft = drafts.get_mut(name).expect("draft exists for order entry");
        for f in draft.fields.iter_mut() {
            let external = matches!(&f.computed_by, Some(Expr::External))
                || matches!(&f.constrained_by, Some(Expr::External));
            if external {
                f.plugin = Some(options.take(name, &f.name).ok_or_else(|| {
                    WorksheetError::definition(format!("missing plugin for external field {}", f.name))
                        .with_field(&f.name)
                        .with_worksheet(name.as_str())
                })?);
            }
        }
        let leftover: Vec<String> = options.remaining_for(name).cloned().collect();
        if let Some(extra) = leftover.first() {
            tracing_unused_plugin(name, extra);
        }
    }
    Ok(())
}

#[cfg(feature = "tracing")]
fn tracing_unused_plugin(def_name: &str, field_name: &str) {
    tracing::warn!(def_name, field_name, "plugin registered for non-external field");
}

#[cfg(not(feature = "tracing"))]
fn tracing_unused_plugin(_def_name: &str, _field_name: &str) {}

fn field_selectors(f: &FieldDraft, which_external: bool, expr: &Option<Expr>) -> Vec<Vec<String>> {
    if which_external {
        if let Some(plugin) = &f.plugin {
            return plugin
                .args()
                .into_iter()
                .map(|s| s.split('.').map(str::to_string).collect())
                .collect();
        }
    }
    match expr {
        Some(Expr::Return(inner)) => inner.selectors(),
        _ => Vec::new(),
    }
}

fn build_dependency_graph(
    order: &[String],
    drafts: &mut FxHashMap<String, WorksheetDraft>,
) -> Result<(), WorksheetError> {
    let mut accumulated: FxHashMap<(String, i64), Vec<DependentRef>> = FxHashMap::default();

    for owner_name in order {
        let draft = drafts.get(owner_name).unwrap();
        for f in &draft.fields {
            let is_external = matches!(&f.computed_by, Some(Expr::External));
            let computed_selectors = field_selectors(f, is_external, &f.computed_by);
            if f.computed_by.is_some() && computed_selectors.is_empty() {
                return Err(WorksheetError::definition(format!(
                    "field {} has no dependencies",
                    f.name
                ))
                .with_field(&f.name)
                .with_worksheet(owner_name.as_str()));
            }
            for path in &computed_selectors {
                walk_selector_path(
                    owner_name,
                    f.index,
                    path,
                    drafts,
                    Some(&mut accumulated),
                )?;
            }

            let is_external_constrained = matches!(&f.constrained_by, Some(Expr::External));
            let constrained_selectors =
                field_selectors(f, is_external_constrained, &f.constrained_by);
            for path in &constrained_selectors {
                walk_selector_path(owner_name, f.index, path, drafts, None)?;
            }
        }
    }

    for ((def_name, field_index), mut deps) in accumulated {
        if let Some(draft) = drafts.get_mut(&def_name) {
            if let Some(field) = draft.fields.iter_mut().find(|f| f.index == field_index) {
                field.dependents.append(&mut deps);
            }
        }
    }
    Ok(())
}

/// Walk a selector path starting at `owner_name`'s definition,
/// validating each segment resolves to a known field and, when `acc` is
/// present, registering `(owner_name, owner_field_index)` as a
/// dependent of every field visited along the way (§4.E step 5).
/// A path that continues past a non-worksheet field stops silently —
/// such shapes are rejected at evaluation time by the interpreter
/// ("more complex selectors are not supported yet", §4.C) rather than
/// at build time.
fn walk_selector_path(
    owner_name: &str,
    owner_field_index: i64,
    path: &[String],
    drafts: &FxHashMap<String, WorksheetDraft>,
    mut acc: Option<&mut FxHashMap<(String, i64), Vec<DependentRef>>>,
) -> Result<(), WorksheetError> {
    let mut current_def = owner_name.to_string();
    for (i, segment) in path.iter().enumerate() {
        let draft = drafts.get(&current_def).ok_or_else(|| {
            WorksheetError::definition(format!("unknown worksheet reference {current_def}"))
        })?;
        let field = draft
            .fields
            .iter()
            .find(|f| &f.name == segment)
            .ok_or_else(|| WorksheetError::definition(format!("unknown argument name {segment}")))?;

        if let Some(acc) = acc.as_deref_mut() {
            acc.entry((current_def.clone(), field.index))
                .or_default()
                .push(DependentRef {
                    def_name: Rc::from(owner_name),
                    field_index: owner_field_index,
                });
        }

        if i + 1 < path.len() {
            match field.ty.as_ref().expect("type resolved") {
                Type::Worksheet(n) => current_def = n.to_string(),
                Type::Slice(inner) => match inner.as_ref() {
                    Type::Worksheet(n) => current_def = n.to_string(),
                    _ => break,
                },
                _ => break,
            }
        }
    }
    Ok(())
}

fn finalize(
    drafts: FxHashMap<String, WorksheetDraft>,
) -> Result<FxHashMap<Rc<str>, Rc<Definition>>, WorksheetError> {
    let mut out = FxHashMap::default();
    for (name, draft) in drafts {
        let mut fields = Vec::with_capacity(draft.fields.len());
        let mut by_name = FxHashMap::default();
        let mut by_index = FxHashMap::default();
        for (i, f) in draft.fields.into_iter().enumerate() {
            by_name.insert(f.name.clone(), i);
            by_index.insert(f.index, i);
            fields.push(Field {
                index: f.index,
                name: f.name,
                ty: f.ty.expect("type resolved"),
                computed_by: f.computed_by,
                constrained_by: f.constrained_by,
                plugin: f.plugin,
                dependents: f.dependents,
            });
        }
        let rc_name: Rc<str> = Rc::from(name.as_str());
        out.insert(
            rc_name.clone(),
            Rc::new(Definition {
                name: rc_name,
                fields,
                by_name,
                by_index,
            }),
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_fields_are_added() {
        let src = r#"
            type simple worksheet {
              1:name text
            }
        "#;
        let defs = build(src, Options::new()).unwrap();
        let def = defs.get("simple").unwrap();
        assert!(def.field_by_name("id").is_some());
        assert!(def.field_by_name("version").is_some());
    }

    #[test]
    fn computed_field_without_dependency_errors() {
        let src = r#"
            type t worksheet {
              1:x number[0] computed_by { return 1 }
            }
        "#;
        let err = build(src, Options::new()).unwrap_err();
        assert!(err.message.contains("no dependencies"));
    }

    #[test]
    fn cross_worksheet_dependent_registers_on_child_definition() {
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
        let child = defs.get("child").unwrap();
        let amount_field = child.field_by_name("amount").unwrap();
        assert_eq!(amount_field.dependents.len(), 1);
        assert_eq!(&*amount_field.dependents[0].def_name, "parent");
    }
}
