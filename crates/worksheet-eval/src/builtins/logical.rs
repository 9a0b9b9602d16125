//! `if`'s condition handling (§4.D).
//!
//! `if` is not registered in [`crate::function_registry`]: its contract
//! — "non-taken branch is not evaluated" — means the interpreter must
//! decide which argument expression to evaluate *before* evaluating it,
//! so the short-circuit lives in `interpreter::Interpreter::eval_call`
//! rather than behind the generic [`crate::function::BuiltinFunction`]
//! call path. This module only holds the condition-coercion rule the
//! interpreter calls into, keeping branch-selection logic separate from
//! argument evaluation.

use worksheet_common::{Value, WorksheetError};

/// `None` means the condition was `undefined` and the whole `if` yields
/// `undefined` (§4.D); `Some(b)` selects the `then`/`else` branch.
pub fn coerce_condition(v: &Value) -> Result<Option<bool>, WorksheetError> {
    match v {
        Value::Undefined => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(WorksheetError::evaluation(format!(
            "if: non-boolean condition {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_condition_propagates() {
        assert_eq!(coerce_condition(&Value::Undefined).unwrap(), None);
    }

    #[test]
    fn non_bool_condition_errors() {
        assert!(coerce_condition(&Value::Text("x".into())).is_err());
    }
}
