use proptest::prelude::*;

use worksheet_common::Number;
use worksheet_common::Value;
use worksheet_eval::plugin::Options;
use worksheet_eval::worksheet::Registry;

fn small_number() -> impl Strategy<Value = Number> {
    (-1_000_000i64..=1_000_000i64, 0u8..=4u8).prop_map(|(value, scale)| Number::new(value, scale))
}

fn registry_with_one_number_field() -> std::rc::Rc<Registry> {
    let defs = worksheet_eval::definitions::build(
        "type t worksheet { 1:amount number[2] }",
        Options::new(),
    )
    .expect("definitions build");
    Registry::new(defs)
}

proptest! {
    #![proptest_config(ProptestConfig {
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    /// §3: `Get` returns exactly whatever `Set` wrote, scale and sign intact.
    #[test]
    fn set_then_get_round_trips_any_number(n in small_number()) {
        let registry = registry_with_one_number_field();
        let ws = registry.create("t").unwrap();
        ws.set("amount", Value::Number(n)).unwrap();
        prop_assert_eq!(ws.get("amount").unwrap(), Value::Number(n));
    }

    /// §4.A: `plus` is commutative regardless of scale mismatch.
    #[test]
    fn plus_is_commutative(a in small_number(), b in small_number()) {
        prop_assert_eq!(a.plus(b), b.plus(a));
    }

    /// §4.A: subtracting back out what was added recovers the original value,
    /// once both sides are compared at normalized scale.
    #[test]
    fn plus_then_minus_recovers_original(a in small_number(), b in small_number()) {
        let sum = a.plus(b);
        let back = sum.minus(b);
        prop_assert!(back.eq_numeric(a));
    }

    /// §4.G: cloning a fresh worksheet never changes field values, only identity.
    #[test]
    fn clone_of_unmodified_worksheet_preserves_values(n in small_number()) {
        let registry = registry_with_one_number_field();
        let ws = registry.create("t").unwrap();
        ws.set("amount", Value::Number(n)).unwrap();

        let cloned = worksheet_eval::clone_graph(&registry, &ws);
        prop_assert_ne!(cloned.id(), ws.id());
        prop_assert_eq!(cloned.get("amount").unwrap(), Value::Number(n));
    }
}
