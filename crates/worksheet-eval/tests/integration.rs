use std::rc::Rc;

use worksheet_common::{Number, Type, Value, WorksheetRef};
use worksheet_eval::{diff, diff_slices, graph_ops::clone_graph, plugin::Options, worksheet::Registry};

fn build(src: &str) -> Rc<Registry> {
    let defs = worksheet_eval::definitions::build(src, Options::new()).expect("definitions build");
    Registry::new(defs)
}

#[test]
fn set_get_round_trip_and_version_bump() {
    let registry = build("type invoice worksheet { 1:amount number[2] }");
    let ws = registry.create("invoice").expect("create");
    assert_eq!(ws.version(), Number::new(1, 0));

    ws.set("amount", Value::Number(Number::new(1999, 2))).expect("set");
    assert_eq!(ws.get("amount").unwrap(), Value::Number(Number::new(1999, 2)));
    assert_eq!(ws.version(), Number::new(2, 0));

    // setting the same value again is a no-op, no version bump
    ws.set("amount", Value::Number(Number::new(1999, 2))).expect("set again");
    assert_eq!(ws.version(), Number::new(2, 0));
}

#[test]
fn computed_field_recomputes_on_dependency_change() {
    let src = r#"
        type invoice worksheet {
          1:subtotal number[2]
          2:tax number[2]
          3:total number[2] computed_by { return subtotal + tax }
        }
    "#;
    let registry = build(src);
    let ws = registry.create("invoice").expect("create");
    ws.set("subtotal", Value::Number(Number::new(1000, 2))).unwrap();
    ws.set("tax", Value::Number(Number::new(80, 2))).unwrap();
    assert_eq!(ws.get("total").unwrap(), Value::Number(Number::new(1080, 2)));

    ws.set("subtotal", Value::Number(Number::new(2000, 2))).unwrap();
    assert_eq!(ws.get("total").unwrap(), Value::Number(Number::new(2080, 2)));
}

#[test]
fn constrained_field_rolls_back_on_violation() {
    let src = r#"
        type account worksheet {
          1:balance number[2] constrained_by { return balance >= 0 }
        }
    "#;
    let registry = build(src);
    let ws = registry.create("account").expect("create");
    ws.set("balance", Value::Number(Number::new(500, 2))).unwrap();

    let err = ws
        .set("balance", Value::Number(Number::new(-100, 2)))
        .expect_err("negative balance should violate the constraint");
    assert!(err.to_string().contains("not a valid value"));
    // the old value survives the rejected set
    assert_eq!(ws.get("balance").unwrap(), Value::Number(Number::new(500, 2)));
}

#[test]
fn cross_worksheet_computed_field_tracks_child() {
    let src = r#"
        type parent worksheet {
          1:kid child
          2:doubled number[0] computed_by { return kid.amount * 2 }
        }
        type child worksheet {
          1:amount number[0]
        }
    "#;
    let registry = build(src);
    let parent = registry.create("parent").unwrap();
    let child = registry.create("child").unwrap();
    parent
        .set(
            "kid",
            Value::Worksheet(WorksheetRef {
                id: child.id().to_string(),
                def_name: child.name(),
            }),
        )
        .unwrap();
    child.set("amount", Value::Number(Number::new(7, 0))).unwrap();
    assert_eq!(parent.get("doubled").unwrap(), Value::Number(Number::new(14, 0)));

    child.set("amount", Value::Number(Number::new(10, 0))).unwrap();
    assert_eq!(parent.get("doubled").unwrap(), Value::Number(Number::new(20, 0)));
}

#[test]
fn append_and_del_on_slice_fields() {
    let src = "type list worksheet { 1:tags []text }";
    let registry = build(src);
    let ws = registry.create("list").unwrap();
    ws.append("tags", Value::Text("a".into())).unwrap();
    ws.append("tags", Value::Text("b".into())).unwrap();
    let slice = ws.get_slice("tags").unwrap();
    assert_eq!(slice, vec![Value::Text("a".into()), Value::Text("b".into())]);

    ws.del("tags", 0).unwrap();
    assert_eq!(ws.get_slice("tags").unwrap(), vec![Value::Text("b".into())]);
}

#[test]
fn diff_reports_changed_fields_after_mutation() {
    let registry = build("type t worksheet { 1:name text }");
    let ws = registry.create("t").unwrap();
    ws.set("name", Value::Text("Ada".into())).unwrap();
    let changes = diff(&ws);
    let def = registry.definition("t").unwrap();
    let field_index = def.field_by_name("name").unwrap().index;
    let change = changes.get(&field_index).expect("name field changed");
    assert_eq!(change.before, Value::Undefined);
    assert_eq!(change.after, Value::Text("Ada".into()));
}

#[test]
fn diff_slices_reports_deletes_and_adds_by_rank() {
    use worksheet_common::SliceValue;
    let mut before = SliceValue::new(1, Type::Text);
    before.append(Value::Text("a".into()));
    before.append(Value::Text("b".into()));

    let mut after = SliceValue::new(2, Type::Text);
    after.append(Value::Text("a".into()));
    after.append(Value::Text("c".into()));

    let d = diff_slices(&before, &after);
    assert_eq!(d.deleted, vec![Value::Text("b".into())]);
    assert_eq!(d.added, vec![Value::Text("c".into())]);
}

#[test]
fn clone_graph_preserves_sharing_with_fresh_ids() {
    let src = r#"
        type parent worksheet {
          1:left child
          2:right child
        }
        type child worksheet {
          1:amount number[0]
        }
    "#;
    let registry = build(src);
    let parent = registry.create("parent").unwrap();
    let child = registry.create("child").unwrap();
    child.set("amount", Value::Number(Number::new(42, 0))).unwrap();
    let child_ref = Value::Worksheet(WorksheetRef {
        id: child.id().to_string(),
        def_name: child.name(),
    });
    parent.set("left", child_ref.clone()).unwrap();
    parent.set("right", child_ref).unwrap();

    let cloned = clone_graph(&registry, &parent);
    let Value::Worksheet(left) = cloned.get("left").unwrap() else {
        panic!("expected worksheet reference");
    };
    let Value::Worksheet(right) = cloned.get("right").unwrap() else {
        panic!("expected worksheet reference");
    };
    assert_eq!(left.id, right.id, "sharing must survive the clone");
    assert_ne!(left.id, child.id(), "clone must get a fresh identity");
}
