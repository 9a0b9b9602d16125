//! The expression evaluator (§4.C): `compute` walks an `Expr` against a
//! worksheet, threading undefined-propagation and the `&&`/`||`
//! three-valued (Kleene) logic through every node.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use worksheet_common::{Number, SliceValue, Type, Value, WorksheetError};
use worksheet_parse::{BinOp, Expr, UnOp};

use crate::builtins::logical::coerce_condition;
use crate::function_registry;
use crate::worksheet::{Registry, Worksheet};

fn next_slice_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Evaluate `expr` against `ws`. `Expr::External` is never passed here:
/// `Worksheet::evaluate_computed`/`evaluate_constraint` intercept a
/// field whose clause is `{ external }` before reaching the generic
/// interpreter, since the grammar only allows `external` as an entire
/// clause body, never nested inside another expression.
pub fn compute(expr: &Expr, ws: &Worksheet) -> Result<Value, WorksheetError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Selector(path) => resolve_selector(ws, path),
        Expr::UnaryOp(UnOp::Not, inner) => match compute(inner, ws)? {
            Value::Undefined => Ok(Value::Undefined),
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(WorksheetError::evaluation(format!(
                "!: non-boolean operand {other}"
            ))),
        },
        Expr::BinaryOp(op, l, r, rounding) => eval_binop(*op, l, r, *rounding, ws),
        Expr::Call(name, args, rounding) => eval_call(name, args, *rounding, ws),
        Expr::Return(inner) => compute(inner, ws),
        Expr::External => unreachable!("External clauses are intercepted before generic compute"),
    }
}

/// Dotted-path selector resolution (§4.C): walk the first segment via
/// `Worksheet::raw_field` (not the public `get`, which rejects slice
/// fields — selector evaluation must read them directly to fan out),
/// then recurse through worksheet references and slice-of-worksheet
/// fan-out.
pub fn resolve_selector(ws: &Worksheet, path: &[String]) -> Result<Value, WorksheetError> {
    if path.is_empty() {
        return Ok(Value::Undefined);
    }
    let first = ws.raw_field(&path[0])?;
    resolve_path_value(first, &path[1..], ws.registry())
}

fn resolve_path_value(
    value: Value,
    remaining: &[String],
    registry: &Rc<Registry>,
) -> Result<Value, WorksheetError> {
    if remaining.is_empty() {
        return Ok(value);
    }
    match value {
        Value::Undefined => Ok(Value::Undefined),
        Value::Worksheet(wsref) => {
            let child = registry
                .open(wsref.id.clone())
                .ok_or_else(|| WorksheetError::evaluation(format!("dangling worksheet reference {}", wsref.id)))?;
            let next = child.raw_field(&remaining[0])?;
            resolve_path_value(next, &remaining[1..], registry)
        }
        Value::Slice(slice) => {
            if !matches!(slice.elem_type, Type::Worksheet(_)) {
                return Err(WorksheetError::evaluation(
                    "more complex selectors are not supported yet",
                ));
            }
            let mut results = Vec::with_capacity(slice.len());
            let mut elem_ty = Type::Undefined;
            for (_, element) in slice.elements() {
                let resolved = resolve_path_value(element.clone(), remaining, registry)?;
                elem_ty = resolved.type_of();
                results.push(resolved);
            }
            let mut out = SliceValue::new(next_slice_id(), elem_ty);
            for v in results {
                out.append(v);
            }
            Ok(Value::Slice(out))
        }
        _ => Err(WorksheetError::evaluation(
            "more complex selectors are not supported yet",
        )),
    }
}

fn eval_binop(
    op: BinOp,
    l: &Expr,
    r: &Expr,
    rounding: Option<worksheet_parse::Rounding>,
    ws: &Worksheet,
) -> Result<Value, WorksheetError> {
    match op {
        BinOp::And => eval_and(l, r, ws),
        BinOp::Or => eval_or(l, r, ws),
        _ => {
            let lv = compute(l, ws)?;
            let rv = compute(r, ws)?;
            if lv.is_undefined() || rv.is_undefined() {
                return Ok(Value::Undefined);
            }
            match op {
                BinOp::Add => numeric_binop(lv, rv, rounding, Number::plus),
                BinOp::Sub => numeric_binop(lv, rv, rounding, Number::minus),
                BinOp::Mul => numeric_binop(lv, rv, rounding, Number::mult),
                BinOp::Div => numeric_div(lv, rv, rounding),
                BinOp::Eq => Ok(Value::Bool(lv.value_eq(&rv))),
                BinOp::Ne => Ok(Value::Bool(!lv.value_eq(&rv))),
                BinOp::Gt | BinOp::Ge | BinOp::Lt | BinOp::Le => numeric_compare(op, lv, rv),
                BinOp::And | BinOp::Or => unreachable!("handled above"),
            }
        }
    }
}

/// Three-valued (Kleene) `&&`: `false` on either side dominates
/// regardless of the other side's truth value, matching §4.C's
/// "`&& false` yields false regardless; otherwise undefined
/// propagates". The right operand is skipped once the left is already
/// `false` — a genuine short-circuit, though harmless here since
/// selector reads have no side effects.
fn eval_and(l: &Expr, r: &Expr, ws: &Worksheet) -> Result<Value, WorksheetError> {
    let lv = compute(l, ws)?;
    if let Value::Bool(false) = lv {
        return Ok(Value::Bool(false));
    }
    let rv = compute(r, ws)?;
    if let Value::Bool(false) = rv {
        return Ok(Value::Bool(false));
    }
    match (lv, rv) {
        (Value::Bool(true), Value::Bool(true)) => Ok(Value::Bool(true)),
        (Value::Undefined, _) | (_, Value::Undefined) => Ok(Value::Undefined),
        _ => Err(WorksheetError::evaluation("&&: non-boolean operand")),
    }
}

fn eval_or(l: &Expr, r: &Expr, ws: &Worksheet) -> Result<Value, WorksheetError> {
    let lv = compute(l, ws)?;
    if let Value::Bool(true) = lv {
        return Ok(Value::Bool(true));
    }
    let rv = compute(r, ws)?;
    if let Value::Bool(true) = rv {
        return Ok(Value::Bool(true));
    }
    match (lv, rv) {
        (Value::Bool(false), Value::Bool(false)) => Ok(Value::Bool(false)),
        (Value::Undefined, _) | (_, Value::Undefined) => Ok(Value::Undefined),
        _ => Err(WorksheetError::evaluation("||: non-boolean operand")),
    }
}

fn expect_number(v: Value) -> Result<Number, WorksheetError> {
    match v {
        Value::Number(n) => Ok(n),
        other => Err(WorksheetError::evaluation(format!(
            "non-numerical operand {other}"
        ))),
    }
}

fn numeric_binop(
    lv: Value,
    rv: Value,
    rounding: Option<worksheet_parse::Rounding>,
    op: fn(Number, Number) -> Number,
) -> Result<Value, WorksheetError> {
    let a = expect_number(lv)?;
    let b = expect_number(rv)?;
    let mut result = op(a, b);
    if let Some(r) = rounding {
        result = result.round(r.mode, r.scale)?;
    }
    Ok(Value::Number(result))
}

fn numeric_div(
    lv: Value,
    rv: Value,
    rounding: Option<worksheet_parse::Rounding>,
) -> Result<Value, WorksheetError> {
    let a = expect_number(lv)?;
    let b = expect_number(rv)?;
    let r = rounding.ok_or_else(|| WorksheetError::evaluation("division without rounding mode"))?;
    Ok(Value::Number(a.div(b, r.mode, r.scale)?))
}

fn numeric_compare(op: BinOp, lv: Value, rv: Value) -> Result<Value, WorksheetError> {
    let a = expect_number(lv)?;
    let b = expect_number(rv)?;
    let ord = a.partial_cmp(&b).expect("Number totally ordered after scale normalization");
    let result = match op {
        BinOp::Gt => ord == std::cmp::Ordering::Greater,
        BinOp::Ge => ord != std::cmp::Ordering::Less,
        BinOp::Lt => ord == std::cmp::Ordering::Less,
        BinOp::Le => ord != std::cmp::Ordering::Greater,
        _ => unreachable!("numeric_compare only called for comparison operators"),
    };
    Ok(Value::Bool(result))
}

fn eval_call(
    name: &str,
    args: &[Expr],
    rounding: Option<worksheet_parse::Rounding>,
    ws: &Worksheet,
) -> Result<Value, WorksheetError> {
    if name == "if" {
        return eval_if(args, ws);
    }
    let values = args
        .iter()
        .map(|a| compute(a, ws))
        .collect::<Result<Vec<_>, _>>()?;
    let f = function_registry::get(name)
        .ok_or_else(|| WorksheetError::evaluation(format!("unknown function {name}")))?;
    f.call(values, rounding)
}

/// `if(cond, then[, else])`: the non-taken branch is never evaluated
/// (§4.D), so this bypasses the eager-argument-evaluation call path
/// every other built-in uses.
fn eval_if(args: &[Expr], ws: &Worksheet) -> Result<Value, WorksheetError> {
    if args.len() < 2 || args.len() > 3 {
        return Err(WorksheetError::evaluation(format!(
            "if: 2 or 3 argument(s) expected but {} found",
            args.len()
        )));
    }
    let cond = compute(&args[0], ws)?;
    match coerce_condition(&cond)? {
        None => Ok(Value::Undefined),
        Some(true) => compute(&args[1], ws),
        Some(false) => {
            if args.len() == 3 {
                compute(&args[2], ws)
            } else {
                Ok(Value::Undefined)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::build;
    use crate::plugin::Options;
    use crate::worksheet::Registry;

    fn registry(src: &str) -> Rc<Registry> {
        Registry::new(build(src, Options::new()).unwrap())
    }

    #[test]
    fn and_or_short_circuit_kleene_style() {
        let registry = registry(
            r#"
            type t worksheet {
              1:a bool
              2:b bool computed_by { return a && false }
              3:c bool computed_by { return a || true }
            }
        "#,
        );
        let ws = registry.create("t").unwrap();
        assert_eq!(ws.get("b").unwrap(), Value::Bool(false));
        assert_eq!(ws.get("c").unwrap(), Value::Bool(true));
    }

    #[test]
    fn division_without_rounding_errors() {
        let registry = registry(
            r#"
            type t worksheet {
              1:a number[0]
              2:b number[0]
              3:c number[0] computed_by { return a / b }
            }
        "#,
        );
        let ws = registry.create("t").unwrap();
        ws.set("a", Value::Number(Number::new(10, 0))).unwrap();
        let err = ws.set("b", Value::Number(Number::new(2, 0))).unwrap_err();
        assert!(err.message.contains("division without rounding mode"));
    }
}
