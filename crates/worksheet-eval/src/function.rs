//! The built-in function trait (§4.D).
//!
//! Every built-in here runs over already-materialized `Value`s, never a
//! columnar range, so there is no capability-flag dispatch and no
//! fold/map/window fast paths to select between — one `call`, one
//! result.

use worksheet_common::{Value, WorksheetError};
use worksheet_parse::Rounding;

/// A built-in function attached to `computed_by`/`constrained_by` calls.
pub trait BuiltinFunction: Send + Sync {
    fn name(&self) -> &'static str;

    /// Minimum argument count.
    fn min_args(&self) -> usize;

    /// Whether more than `min_args` arguments are accepted.
    fn variadic(&self) -> bool {
        false
    }

    /// Whether a `round <mode> <scale>` suffix is mandatory at the call
    /// site (only `avg` per §4.D; `/` has the same requirement but is a
    /// binary operator, not a call).
    fn requires_rounding(&self) -> bool {
        false
    }

    fn call(&self, args: Vec<Value>, rounding: Option<Rounding>) -> Result<Value, WorksheetError>;
}

/// Arity check shared by every built-in (§4.D's error message shape).
pub fn check_arity(name: &str, min: usize, variadic: bool, got: usize) -> Result<(), WorksheetError> {
    if got < min || (!variadic && got != min) {
        let message = if variadic {
            format!("{name}: at least {min} argument(s) expected but {got} found")
        } else {
            format!("{name}: {min} argument(s) expected but {got} found")
        };
        return Err(WorksheetError::evaluation(message));
    }
    Ok(())
}

/// Flatten slice arguments into their elements, leaving scalars as-is
/// (§4.D: `sum`, `min`, `max`, `first_of` all "flatten slice arguments").
pub fn flatten(args: Vec<Value>) -> Vec<Value> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Slice(s) => {
                for (_, v) in s.elements().iter().cloned() {
                    out.push(v);
                }
            }
            other => out.push(other),
        }
    }
    out
}
