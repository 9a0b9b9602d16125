//! `len`, `first_of`, `slice` (§4.D).

use worksheet_common::{SliceValue, Value, WorksheetError};
use worksheet_parse::Rounding;

use crate::function::{check_arity, flatten, BuiltinFunction};

pub struct LenFn;

impl BuiltinFunction for LenFn {
    fn name(&self) -> &'static str {
        "len"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn call(&self, args: Vec<Value>, _rounding: Option<Rounding>) -> Result<Value, WorksheetError> {
        check_arity("len", 1, false, args.len())?;
        match &args[0] {
            Value::Undefined => Ok(Value::Undefined),
            Value::Text(s) => Ok(Value::Number(worksheet_common::Number::new(
                s.chars().count() as i64,
                0,
            ))),
            Value::Slice(s) => Ok(Value::Number(worksheet_common::Number::new(
                s.len() as i64,
                0,
            ))),
            _ => Err(WorksheetError::evaluation("len: non-numerical argument")),
        }
    }
}

pub struct FirstOfFn;

impl BuiltinFunction for FirstOfFn {
    fn name(&self) -> &'static str {
        "first_of"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn variadic(&self) -> bool {
        true
    }
    fn call(&self, args: Vec<Value>, _rounding: Option<Rounding>) -> Result<Value, WorksheetError> {
        check_arity("first_of", 1, true, args.len())?;
        let flat = flatten(args);
        Ok(flat
            .into_iter()
            .find(|v| !v.is_undefined())
            .unwrap_or(Value::Undefined))
    }
}

pub struct SliceFn;

impl BuiltinFunction for SliceFn {
    fn name(&self) -> &'static str {
        "slice"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn variadic(&self) -> bool {
        true
    }
    /// Builds a new slice with one element per argument — unlike `sum`/
    /// `min`/`max`/`first_of`, `slice` does not flatten: its purpose is
    /// to assemble scalars (or nested slices) into a single sequence.
    fn call(&self, args: Vec<Value>, _rounding: Option<Rounding>) -> Result<Value, WorksheetError> {
        check_arity("slice", 1, true, args.len())?;
        let elem_type = args
            .iter()
            .find(|v| !v.is_undefined())
            .map(Value::type_of)
            .unwrap_or(worksheet_common::Type::Undefined);

        let mut out = SliceValue::new(next_slice_id(), elem_type.clone());
        for v in args {
            if !v.is_assignable_to(&elem_type) {
                return Err(WorksheetError::type_error(format!(
                    "cannot assign {v} to {elem_type}"
                )));
            }
            out.append(v);
        }
        Ok(Value::Slice(out))
    }
}

fn next_slice_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use worksheet_common::Number;

    #[test]
    fn len_on_text_counts_chars() {
        let result = LenFn.call(vec![Value::Text("hello".into())], None).unwrap();
        assert_eq!(result, Value::Number(Number::new(5, 0)));
    }

    #[test]
    fn first_of_skips_undefined() {
        let result = FirstOfFn
            .call(vec![Value::Undefined, Value::Text("yes".into())], None)
            .unwrap();
        assert_eq!(result, Value::Text("yes".into()));
    }

    #[test]
    fn slice_builds_ordered_elements() {
        let result = SliceFn
            .call(
                vec![
                    Value::Number(Number::new(1, 0)),
                    Value::Number(Number::new(2, 0)),
                ],
                None,
            )
            .unwrap();
        let Value::Slice(s) = result else { panic!() };
        assert_eq!(s.len(), 2);
    }
}
