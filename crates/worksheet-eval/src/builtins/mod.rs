pub mod aggregate;
pub mod collection;
pub mod logical;

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::function::BuiltinFunction;

/// Build the fixed built-in function table (§4.D). Called once, behind
/// the `Lazy` in [`crate::function_registry`]. `if` is intentionally
/// absent — see `logical::coerce_condition`.
pub fn build_registry() -> FxHashMap<&'static str, Arc<dyn BuiltinFunction>> {
    let entries: Vec<Arc<dyn BuiltinFunction>> = vec![
        Arc::new(aggregate::SumFn),
        Arc::new(aggregate::SumIfTrueFn),
        Arc::new(aggregate::MinFn),
        Arc::new(aggregate::MaxFn),
        Arc::new(aggregate::AvgFn),
        Arc::new(collection::LenFn),
        Arc::new(collection::FirstOfFn),
        Arc::new(collection::SliceFn),
    ];
    entries.into_iter().map(|f| (f.name(), f)).collect()
}
