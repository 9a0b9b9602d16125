//! Read-only lookup table of built-in functions (§9: "no global mutable
//! state beyond the built-in function table, which is immutable after
//! program start").
//!
//! No runtime registration or aliasing: this table is fixed at compile
//! time and built once behind a `once_cell::sync::Lazy` — there is
//! nothing to register after startup.

use std::sync::Arc;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::builtins;
use crate::function::BuiltinFunction;

static REGISTRY: Lazy<FxHashMap<&'static str, Arc<dyn BuiltinFunction>>> =
    Lazy::new(builtins::build_registry);

/// Look up a built-in by name. `if` is not in this table — the
/// interpreter special-cases it for short-circuit evaluation (§4.D).
pub fn get(name: &str) -> Option<Arc<dyn BuiltinFunction>> {
    REGISTRY.get(name).cloned()
}
