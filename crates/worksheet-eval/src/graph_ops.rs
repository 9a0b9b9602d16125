//! Graph operations (§4.G): structural diff against the last-committed
//! snapshot, slice diff, and deep clone that preserves reference
//! sharing and rebuilds parent back-pointers.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use worksheet_common::{Number, SliceValue, Value, WorksheetRef, ID_FIELD_INDEX, VERSION_FIELD_INDEX};

use crate::worksheet::{Registry, Worksheet};

fn next_slice_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub before: Value,
    pub after: Value,
}

/// `orig`/`data` union, skipping entries where the relaxed `diffCompare`
/// equality holds (§4.G). `orig` starts empty at construction (§3's
/// lifecycle — nothing populates it short of a `Store::load`, which is
/// out of scope), so on a freshly created, unmodified worksheet this
/// returns exactly `id` and `version` with `before = undefined`.
pub fn diff(ws: &Worksheet) -> FxHashMap<i64, Change> {
    let data = ws.data_snapshot();
    let orig = ws.orig_snapshot();
    let mut keys: HashSet<i64> = data.keys().copied().collect();
    keys.extend(orig.keys().copied());

    let mut out = FxHashMap::default();
    for key in keys {
        let before = orig.get(&key).cloned().unwrap_or(Value::Undefined);
        let after = data.get(&key).cloned().unwrap_or(Value::Undefined);
        if diff_compare(&before, &after) {
            continue;
        }
        out.insert(key, Change { before, after });
    }
    out
}

/// `diffCompare` (§4.G): value equality, normalising `Number` scale
/// like the `==` operator. The version-tagged-stub relaxation
/// (`wsRefAtVersion`) described alongside it exists to detect changes
/// to a child worksheet made through another handle while `orig` holds
/// a stub of it; nothing in this runtime populates such a stub (that is
/// the out-of-scope `Store`'s job), so this reduces to plain
/// `Value::value_eq`.
fn diff_compare(before: &Value, after: &Value) -> bool {
    before.value_eq(after)
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SliceDiff {
    pub deleted: Vec<Value>,
    pub added: Vec<Value>,
}

/// Two-pointer merge over ascending ranks (§4.G): equal ranks compare
/// values (a mismatch is a delete+add pair); a lower rank on one side
/// that the other lacks is a pure delete or pure add; leftovers flush
/// at the end.
pub fn diff_slices(before: &SliceValue, after: &SliceValue) -> SliceDiff {
    let b = before.elements();
    let a = after.elements();
    let mut out = SliceDiff::default();
    let (mut i, mut j) = (0, 0);
    while i < b.len() && j < a.len() {
        let (b_rank, b_val) = &b[i];
        let (a_rank, a_val) = &a[j];
        if b_rank == a_rank {
            if !b_val.value_eq(a_val) {
                out.deleted.push(b_val.clone());
                out.added.push(a_val.clone());
            }
            i += 1;
            j += 1;
        } else if b_rank < a_rank {
            out.deleted.push(b_val.clone());
            i += 1;
        } else {
            out.added.push(a_val.clone());
            j += 1;
        }
    }
    while i < b.len() {
        out.deleted.push(b[i].1.clone());
        i += 1;
    }
    while j < a.len() {
        out.added.push(a[j].1.clone());
        j += 1;
    }
    out
}

/// Deep clone of the graph reachable from `root`, preserving sharing
/// (§4.G): two references to the same original worksheet produce the
/// same clone instance, tracked via an `originalId -> newId` map kept
/// for the whole walk.
pub fn clone_graph(registry: &Rc<Registry>, root: &Worksheet) -> Worksheet {
    let mut id_map: HashMap<String, String> = HashMap::new();
    clone_worksheet(registry, root, &mut id_map)
}

fn clone_worksheet(registry: &Rc<Registry>, ws: &Worksheet, id_map: &mut HashMap<String, String>) -> Worksheet {
    if let Some(new_id) = id_map.get(ws.id()) {
        return registry
            .open(new_id.clone())
            .expect("clone target registered in id_map was inserted into the registry");
    }

    let def = ws.def();
    let new_id = uuid::Uuid::new_v4().to_string();
    id_map.insert(ws.id().to_string(), new_id.clone());

    let mut seed = FxHashMap::default();
    seed.insert(ID_FIELD_INDEX, Value::Text(new_id.clone()));
    seed.insert(VERSION_FIELD_INDEX, Value::Number(Number::new(1, 0)));
    let new_ws = registry.insert_instance(def, new_id, seed);

    for (index, value) in ws.data_snapshot() {
        if index == ID_FIELD_INDEX || index == VERSION_FIELD_INDEX {
            continue;
        }
        let cloned_value = clone_value(registry, &value, id_map);
        new_ws.store_raw(index, cloned_value.clone());
        if let Value::Worksheet(ref child_ref) = cloned_value {
            new_ws.add_parent_pointer(child_ref, index);
        }
    }
    new_ws
}

fn clone_value(registry: &Rc<Registry>, value: &Value, id_map: &mut HashMap<String, String>) -> Value {
    match value {
        Value::Worksheet(wsref) => {
            let child = registry
                .open(wsref.id.clone())
                .expect("worksheet reference points at a live instance");
            let cloned_child = clone_worksheet(registry, &child, id_map);
            Value::Worksheet(WorksheetRef {
                id: cloned_child.id().to_string(),
                def_name: cloned_child.name(),
            })
        }
        Value::Slice(s) => {
            let mut out = SliceValue::new(next_slice_id(), s.elem_type.clone());
            for (_, v) in s.elements() {
                out.append(clone_value(registry, v, id_map));
            }
            Value::Slice(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::build;
    use crate::plugin::Options;

    #[test]
    fn diff_on_fresh_worksheet_shows_only_reserved_fields() {
        let defs = build("type t worksheet { 1:name text }", Options::new()).unwrap();
        let registry = Registry::new(defs);
        let ws = registry.create("t").unwrap();
        let changes = diff(&ws);
        assert_eq!(changes.len(), 2);
        assert!(changes
            .get(&ID_FIELD_INDEX)
            .map(|c| c.before == Value::Undefined)
            .unwrap_or(false));
        assert!(changes
            .get(&VERSION_FIELD_INDEX)
            .map(|c| c.before == Value::Undefined)
            .unwrap_or(false));
    }

    #[test]
    fn clone_preserves_sharing_and_gets_fresh_identity() {
        let src = r#"
            type parent worksheet {
              1:kid child
            }
            type child worksheet {
              1:amount number[0]
            }
        "#;
        let defs = build(src, Options::new()).unwrap();
        let registry = Registry::new(defs);
        let parent = registry.create("parent").unwrap();
        let child = registry.create("child").unwrap();
        child.set("amount", Value::Number(Number::new(3, 0))).unwrap();
        parent
            .set(
                "kid",
                Value::Worksheet(WorksheetRef {
                    id: child.id().to_string(),
                    def_name: child.name(),
                }),
            )
            .unwrap();

        let cloned = clone_graph(&registry, &parent);
        assert_ne!(cloned.id(), parent.id());
        assert_eq!(cloned.version(), Number::new(1, 0));

        let Value::Worksheet(cloned_kid_ref) = cloned.get("kid").unwrap() else {
            panic!("expected worksheet reference");
        };
        assert_ne!(cloned_kid_ref.id, child.id());
        let cloned_kid = registry.open(cloned_kid_ref.id).unwrap();
        assert_eq!(cloned_kid.get("amount").unwrap(), Value::Number(Number::new(3, 0)));
    }
}
