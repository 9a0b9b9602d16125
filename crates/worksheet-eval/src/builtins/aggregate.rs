//! Numeric aggregation built-ins (§4.D): `sum`, `sumiftrue`, `min`,
//! `max`, `avg` — one zero-sized struct per function, arity-checked,
//! folding over already-coerced scalars. Every argument here is a
//! single materialized `Value`, so there's no columnar fast path to
//! select between.

use worksheet_common::{Number, RoundMode, Value, WorksheetError};
use worksheet_parse::Rounding;

use crate::function::{check_arity, flatten, BuiltinFunction};

/// Extract a `Number`, failing with a "non-numerical argument" message;
/// `Undefined` is reported separately by callers since several
/// built-ins propagate it rather than erroring.
fn expect_number(v: &Value, fn_name: &str) -> Result<Number, WorksheetError> {
    match v {
        Value::Number(n) => Ok(*n),
        _ => Err(WorksheetError::evaluation(format!(
            "{fn_name}: non-numerical argument"
        ))),
    }
}

/// `true` if any element is `Value::Undefined` — used by the aggregate
/// functions, which all propagate `undefined` rather than skipping it.
fn any_undefined(values: &[Value]) -> bool {
    values.iter().any(Value::is_undefined)
}

pub struct SumFn;

impl BuiltinFunction for SumFn {
    fn name(&self) -> &'static str {
        "sum"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn variadic(&self) -> bool {
        true
    }
    fn call(&self, args: Vec<Value>, _rounding: Option<Rounding>) -> Result<Value, WorksheetError> {
        check_arity("sum", 1, true, args.len())?;
        let flat = flatten(args);
        if any_undefined(&flat) {
            return Ok(Value::Undefined);
        }
        let mut acc: Option<Number> = None;
        for v in &flat {
            let n = expect_number(v, "sum")?;
            acc = Some(match acc {
                Some(a) => a.plus(n),
                None => n,
            });
        }
        Ok(Value::Number(acc.unwrap_or_else(|| Number::new(0, 0))))
    }
}

pub struct SumIfTrueFn;

impl BuiltinFunction for SumIfTrueFn {
    fn name(&self) -> &'static str {
        "sumiftrue"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn call(&self, args: Vec<Value>, _rounding: Option<Rounding>) -> Result<Value, WorksheetError> {
        check_arity("sumiftrue", 2, false, args.len())?;
        let mut iter = args.into_iter();
        let nums = iter.next().unwrap();
        let bools = iter.next().unwrap();

        let (Value::Slice(nums), Value::Slice(bools)) = (&nums, &bools) else {
            return Err(WorksheetError::evaluation(
                "sumiftrue: expected slice arguments for nums and bools",
            ));
        };
        if nums.len() != bools.len() {
            return Err(WorksheetError::evaluation(
                "sumiftrue: nums and bools must be the same length",
            ));
        }

        let mut acc = Number::new(0, 0);
        for ((_, n), (_, b)) in nums.elements().iter().zip(bools.elements().iter()) {
            if n.is_undefined() || b.is_undefined() {
                return Ok(Value::Undefined);
            }
            if matches!(b, Value::Bool(true)) {
                acc = acc.plus(expect_number(n, "sumiftrue")?);
            }
        }
        Ok(Value::Number(acc))
    }
}

pub struct MinFn;

impl BuiltinFunction for MinFn {
    fn name(&self) -> &'static str {
        "min"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn variadic(&self) -> bool {
        true
    }
    fn call(&self, args: Vec<Value>, _rounding: Option<Rounding>) -> Result<Value, WorksheetError> {
        reduce_extremum(args, "min", |a, b| if a < b { a } else { b })
    }
}

pub struct MaxFn;

impl BuiltinFunction for MaxFn {
    fn name(&self) -> &'static str {
        "max"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn variadic(&self) -> bool {
        true
    }
    fn call(&self, args: Vec<Value>, _rounding: Option<Rounding>) -> Result<Value, WorksheetError> {
        reduce_extremum(args, "max", |a, b| if a > b { a } else { b })
    }
}

fn reduce_extremum(
    args: Vec<Value>,
    fn_name: &str,
    pick: impl Fn(Number, Number) -> Number,
) -> Result<Value, WorksheetError> {
    check_arity(fn_name, 1, true, args.len())?;
    let flat = flatten(args);
    if any_undefined(&flat) {
        return Ok(Value::Undefined);
    }
    let mut acc: Option<Number> = None;
    for v in &flat {
        let n = expect_number(v, fn_name)?;
        acc = Some(match acc {
            Some(a) => pick(a, n),
            None => n,
        });
    }
    Ok(Value::Number(acc.unwrap_or_else(|| Number::new(0, 0))))
}

pub struct AvgFn;

impl BuiltinFunction for AvgFn {
    fn name(&self) -> &'static str {
        "avg"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn variadic(&self) -> bool {
        true
    }
    fn requires_rounding(&self) -> bool {
        true
    }
    fn call(&self, args: Vec<Value>, rounding: Option<Rounding>) -> Result<Value, WorksheetError> {
        check_arity("avg", 1, true, args.len())?;
        let Some(rounding) = rounding else {
            return Err(WorksheetError::evaluation(
                "avg: a round clause is required",
            ));
        };
        let flat = flatten(args);
        if any_undefined(&flat) {
            return Ok(Value::Undefined);
        }
        let mut acc = Number::new(0, 0);
        let mut count: i64 = 0;
        for v in &flat {
            acc = acc.plus(expect_number(v, "avg")?);
            count += 1;
        }
        let divisor = Number::new(count, 0);
        let result = acc.div(divisor, rounding.mode, rounding.scale)?;
        Ok(Value::Number(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_flattens_slices_and_propagates_undefined() {
        let slice_type = worksheet_common::Type::Number(0);
        let mut s = worksheet_common::SliceValue::new(1, slice_type);
        s.append(Value::Number(Number::new(1, 0)));
        s.append(Value::Undefined);
        let result = SumFn.call(vec![Value::Slice(s)], None).unwrap();
        assert_eq!(result, Value::Undefined);
    }

    #[test]
    fn avg_requires_rounding() {
        let err = AvgFn
            .call(vec![Value::Number(Number::new(4, 0))], None)
            .unwrap_err();
        assert!(err.message.contains("round"));
    }
}
