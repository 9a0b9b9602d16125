//! Breadth-first JSON serialization of a worksheet graph (§6), gated
//! behind the `json` feature (on by default) so a caller that only
//! needs the in-memory model can drop the `serde_json` dependency.

use std::collections::{HashSet, VecDeque};

use serde_json::{Map, Value as JsonValue};

use worksheet_common::{Value, WorksheetRef};

use crate::worksheet::Worksheet;

/// Serialize the graph reachable from `root`: a top-level object
/// mapping each worksheet's id to an object of its field names to
/// JSON-encoded values. `Number` is emitted as a quoted string to
/// preserve scale and sign exactly; worksheet references are their
/// id string, with the referenced worksheet itself appearing as a
/// sibling top-level entry. Cycles are broken by the id-keyed
/// visited set.
pub fn to_json(root: &Worksheet) -> JsonValue {
    let registry = root.registry().clone();
    let mut out = Map::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert(root.id().to_string());
    queue.push_back(root.clone());

    while let Some(ws) = queue.pop_front() {
        let def = ws.def();
        let data = ws.data_snapshot();
        let mut fields = Map::new();
        for field in def.fields() {
            let value = data.get(&field.index).cloned().unwrap_or(Value::Undefined);
            let (json_value, referenced) = value_to_json(&value);
            fields.insert(field.name.clone(), json_value);
            for wsref in referenced {
                if visited.insert(wsref.id.clone()) {
                    if let Some(child) = registry.open(wsref.id) {
                        queue.push_back(child);
                    }
                }
            }
        }
        out.insert(ws.id().to_string(), JsonValue::Object(fields));
    }

    JsonValue::Object(out)
}

fn value_to_json(value: &Value) -> (JsonValue, Vec<WorksheetRef>) {
    match value {
        Value::Undefined => (JsonValue::Null, Vec::new()),
        Value::Text(s) => (JsonValue::String(s.clone()), Vec::new()),
        Value::Bool(b) => (JsonValue::Bool(*b), Vec::new()),
        Value::Number(n) => (JsonValue::String(n.to_string()), Vec::new()),
        Value::Slice(s) => {
            let mut array = Vec::with_capacity(s.len());
            let mut refs = Vec::new();
            for (_, elem) in s.elements() {
                let (json_elem, elem_refs) = value_to_json(elem);
                array.push(json_elem);
                refs.extend(elem_refs);
            }
            (JsonValue::Array(array), refs)
        }
        Value::Worksheet(wsref) => (JsonValue::String(wsref.id.clone()), vec![wsref.clone()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::build;
    use crate::plugin::Options;
    use crate::worksheet::Registry;
    use worksheet_common::Number;

    #[test]
    fn serializes_scalars_and_references() {
        let src = r#"
            type parent worksheet {
              1:kid child
            }
            type child worksheet {
              1:amount number[2]
            }
        "#;
        let defs = build(src, Options::new()).unwrap();
        let registry = Registry::new(defs);
        let parent = registry.create("parent").unwrap();
        let child = registry.create("child").unwrap();
        child.set("amount", Value::Number(Number::new(150, 2))).unwrap();
        parent
            .set(
                "kid",
                Value::Worksheet(WorksheetRef {
                    id: child.id().to_string(),
                    def_name: child.name(),
                }),
            )
            .unwrap();

        let json = to_json(&parent);
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        let parent_json = obj.get(parent.id()).unwrap().as_object().unwrap();
        assert_eq!(parent_json.get("kid").unwrap().as_str().unwrap(), child.id());
        let child_json = obj.get(child.id()).unwrap().as_object().unwrap();
        assert_eq!(child_json.get("amount").unwrap().as_str().unwrap(), "1.50");
    }
}
