//! The typed value system (§3, §4.A): a closed sum type per variant,
//! with a single match point per operation (one enum, per-variant
//! `Display`/`Hash`/`PartialEq`) rather than dispatching across many
//! files.

use std::fmt::{self, Display};
use std::rc::Rc;

use crate::error::WorksheetError;

pub const MAX_SCALE: u8 = 32;

/// `10^exponent` as `i128`, rejecting exponents that would overflow
/// `i128` instead of panicking/wrapping — reachable from legal `[0, 32]`
/// scales once `Div`/`Round` combine two of them.
fn checked_pow10(exponent: u32) -> Result<i128, WorksheetError> {
    10i128
        .checked_pow(exponent)
        .ok_or_else(|| WorksheetError::evaluation(format!("number overflow: scale shift of {exponent} digits")))
}

/// How `Round`/`Div` resolve a remainder (§4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundMode {
    Up,
    Down,
    Half,
}

impl RoundMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(RoundMode::Up),
            "down" => Some(RoundMode::Down),
            "half" => Some(RoundMode::Half),
            _ => None,
        }
    }
}

impl Display for RoundMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoundMode::Up => "up",
            RoundMode::Down => "down",
            RoundMode::Half => "half",
        })
    }
}

/// A signed fixed-decimal number: `value * 10^-scale` (§3, §4.A).
#[derive(Debug, Clone, Copy, Eq)]
pub struct Number {
    value: i64,
    scale: u8,
}

impl Number {
    /// Construct directly; `scale` must be in `[0, 32]`.
    pub fn new(value: i64, scale: u8) -> Self {
        debug_assert!(scale <= MAX_SCALE, "scale {scale} exceeds MAX_SCALE");
        Self { value, scale }
    }

    pub fn try_new(value: i64, scale: u8) -> Result<Self, WorksheetError> {
        if scale > MAX_SCALE {
            return Err(WorksheetError::parse(format!(
                "number scale {scale} exceeds maximum of {MAX_SCALE}"
            )));
        }
        Ok(Self { value, scale })
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn zero(scale: u8) -> Self {
        Self { value: 0, scale }
    }

    fn normalize_pair(a: Number, b: Number) -> (i128, i128, u8) {
        let scale = a.scale.max(b.scale);
        let av = a.value as i128 * 10i128.pow((scale - a.scale) as u32);
        let bv = b.value as i128 * 10i128.pow((scale - b.scale) as u32);
        (av, bv, scale)
    }

    /// `left + right`, result scale = `max(left.scale, right.scale)`.
    pub fn plus(self, other: Number) -> Number {
        let (a, b, scale) = Self::normalize_pair(self, other);
        Number {
            value: (a + b) as i64,
            scale,
        }
    }

    /// `left - right`, result scale = `max(left.scale, right.scale)`.
    pub fn minus(self, other: Number) -> Number {
        let (a, b, scale) = Self::normalize_pair(self, other);
        Number {
            value: (a - b) as i64,
            scale,
        }
    }

    /// `left * right`, result scale = `left.scale + right.scale`.
    pub fn mult(self, other: Number) -> Number {
        let value = self.value as i128 * other.value as i128;
        Number {
            value: value as i64,
            scale: self.scale + other.scale,
        }
    }

    /// `left / right`, rounded to `target_scale` with `mode` (§4.A).
    ///
    /// Computes at a temporary scale one digit beyond what rounding
    /// needs, then rounds down to `target_scale` — the extra digit is
    /// what lets `Round`'s half/up/down rules see the true remainder.
    pub fn div(
        self,
        other: Number,
        mode: RoundMode,
        target_scale: u8,
    ) -> Result<Number, WorksheetError> {
        if other.value == 0 {
            return Err(WorksheetError::evaluation("division by zero"));
        }
        let temp_scale = self.scale.max(target_scale + other.scale) + 1;
        let exponent = (temp_scale - self.scale) as u32 + other.scale as u32;

        let sign = self.value.signum() as i128 * other.value.signum() as i128;
        let abs_left = (self.value as i128).unsigned_abs() as i128;
        let abs_right = (other.value as i128).unsigned_abs() as i128;

        let pow10 = checked_pow10(exponent)?;
        let scaled_left = abs_left
            .checked_mul(pow10)
            .ok_or_else(|| WorksheetError::evaluation("number overflow during division"))?;
        let quotient = scaled_left / abs_right; // truncating division on non-negative operands == floor
        let value = i64::try_from(sign * quotient)
            .map_err(|_| WorksheetError::evaluation("number overflow during division"))?;
        let at_temp_scale = Number {
            value,
            scale: temp_scale,
        };
        at_temp_scale.round(mode, target_scale)
    }

    /// Round to `target_scale` using `mode` (§4.A).
    ///
    /// Padding when `target_scale > scale` is exact (no rounding choice
    /// to make); shrinking uses the absolute-value remainder against
    /// `5 * 10^(delta-1)` for `half`, away-from-zero for `up`, truncation
    /// for `down`. Both branches carry the intermediate in `i128` (scales
    /// up to `MAX_SCALE` make `10^delta` overflow `i64` on legal input)
    /// and only narrow back to `i64` once the final magnitude is known.
    pub fn round(self, mode: RoundMode, target_scale: u8) -> Result<Number, WorksheetError> {
        if target_scale >= self.scale {
            let delta = target_scale - self.scale;
            let pow10 = checked_pow10(delta as u32)?;
            let scaled = (self.value as i128)
                .checked_mul(pow10)
                .ok_or_else(|| WorksheetError::evaluation("number overflow rounding up in scale"))?;
            let value = i64::try_from(scaled)
                .map_err(|_| WorksheetError::evaluation("number overflow rounding up in scale"))?;
            return Ok(Number {
                value,
                scale: target_scale,
            });
        }

        let delta = self.scale - target_scale;
        let factor = checked_pow10(delta as u32)?;
        let sign: i128 = if self.value < 0 { -1 } else { 1 };
        let abs = (self.value as i128).unsigned_abs() as i128;
        let quotient = abs / factor;
        let remainder = abs % factor;

        let round_up = match mode {
            RoundMode::Down => false,
            RoundMode::Up => remainder != 0,
            RoundMode::Half => {
                let threshold = 5 * checked_pow10((delta - 1) as u32)?;
                remainder >= threshold
            }
        };

        let magnitude = if round_up { quotient + 1 } else { quotient };
        let value = i64::try_from(sign * magnitude)
            .map_err(|_| WorksheetError::evaluation("number overflow rounding down in scale"))?;
        Ok(Number {
            value,
            scale: target_scale,
        })
    }

    fn cmp_normalized(self, other: Number) -> std::cmp::Ordering {
        let (a, b, _) = Self::normalize_pair(self, other);
        a.cmp(&b)
    }

    /// Numeric equality after scale normalization (used by the `==`
    /// operator's value-system `Equal`; see `Value::value_eq`).
    pub fn eq_numeric(self, other: Number) -> bool {
        self.cmp_normalized(other) == std::cmp::Ordering::Equal
    }
}

impl PartialEq for Number {
    /// Strict structural equality: both `value` and `scale` must match.
    /// The `==` DSL operator instead uses [`Number::eq_numeric`] via
    /// [`Value::value_eq`] — see the note in `error.rs`'s sibling
    /// module docs and DESIGN.md for why the two differ.
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.scale == other.scale
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp_normalized(*other))
    }
}

impl std::hash::Hash for Number {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
        self.scale.hash(state);
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.value);
        }
        let sign = if self.value < 0 { "-" } else { "" };
        let digits = self.value.unsigned_abs().to_string();
        let scale = self.scale as usize;
        let padded = if digits.len() <= scale {
            format!("{:0>width$}", digits, width = scale + 1)
        } else {
            digits
        };
        let split = padded.len() - scale;
        write!(f, "{sign}{}.{}", &padded[..split], &padded[split..])
    }
}

/// A named, finite set of text literals (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub members: Vec<String>,
}

impl EnumDef {
    pub fn contains(&self, text: &str) -> bool {
        self.members.iter().any(|m| m == text)
    }
}

/// The closed set of declarable types (§3).
///
/// `Worksheet`/`Enum` carry only the *name*/definition identity needed
/// for assignability checks, not the full `Definition` — that keeps this
/// crate free of the expression-AST dependency the real `Definition`
/// (built in `worksheet-eval`) needs. Definition-name uniqueness (§4.E)
/// makes name equality equivalent to reference equality.
#[derive(Debug, Clone)]
pub enum Type {
    Undefined,
    Text,
    Bool,
    Number(u8),
    Slice(Box<Type>),
    Worksheet(Rc<str>),
    Enum(Rc<EnumDef>),
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Undefined, Type::Undefined) => true,
            (Type::Text, Type::Text) => true,
            (Type::Bool, Type::Bool) => true,
            (Type::Number(a), Type::Number(b)) => a == b,
            (Type::Slice(a), Type::Slice(b)) => a == b,
            (Type::Worksheet(a), Type::Worksheet(b)) => a == b,
            (Type::Enum(a), Type::Enum(b)) => Rc::ptr_eq(a, b) || a.name == b.name,
            _ => false,
        }
    }
}
impl Eq for Type {}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Undefined => write!(f, "undefined"),
            Type::Text => write!(f, "text"),
            Type::Bool => write!(f, "bool"),
            Type::Number(scale) => write!(f, "number[{scale}]"),
            Type::Slice(t) => write!(f, "[]{t}"),
            Type::Worksheet(name) => write!(f, "{name}"),
            Type::Enum(def) => write!(f, "{}", def.name),
        }
    }
}

impl Type {
    /// Static assignability (§3). Does not cover the dynamic
    /// text→enum membership check — use [`Value::is_assignable_to`] for
    /// that, since it needs the concrete value.
    pub fn assignable_from(&self, other: &Type) -> bool {
        match (self, other) {
            (_, Type::Undefined) => true,
            (Type::Text, Type::Text) => true,
            (Type::Bool, Type::Bool) => true,
            (Type::Number(to), Type::Number(from)) => from <= to,
            (Type::Slice(to), Type::Slice(from)) => to.assignable_from(from),
            (Type::Worksheet(to), Type::Worksheet(from)) => to == from,
            (Type::Enum(to), Type::Enum(from)) => Rc::ptr_eq(to, from) || to.name == from.name,
            // Text -> Enum is a dynamic check; treat the static shape as
            // potentially assignable here and let `Value::is_assignable_to`
            // make the final call.
            (Type::Enum(_), Type::Text) => true,
            _ => false,
        }
    }
}

/// A live reference to another worksheet instance (§3).
///
/// Carries the referenced definition's name alongside the instance id so
/// that assignability can be checked without a registry lookup (§9:
/// "arena + stable ids ... resolved through the registry at traversal
/// time" — the registry resolves the *instance*; the *type* is carried
/// here statically).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorksheetRef {
    pub id: String,
    pub def_name: Rc<str>,
}

/// An ordered slice value (§3): elements carry monotonically increasing
/// ranks; deletes never renumber survivors.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceValue {
    pub id: u64,
    pub elem_type: Type,
    elements: Vec<(u64, Value)>,
    last_rank: u64,
}

impl SliceValue {
    pub fn new(id: u64, elem_type: Type) -> Self {
        Self {
            id,
            elem_type,
            elements: Vec::new(),
            last_rank: 0,
        }
    }

    pub fn elements(&self) -> &[(u64, Value)] {
        &self.elements
    }

    pub fn last_rank(&self) -> u64 {
        self.last_rank
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Append `value`, assigning it `last_rank + 1` (§3).
    pub fn append(&mut self, value: Value) -> u64 {
        self.last_rank += 1;
        self.elements.push((self.last_rank, value));
        self.last_rank
    }

    /// Remove the element at storage *position* `index` (not rank).
    /// `last_rank` is preserved — the rank space is append-only.
    pub fn remove(&mut self, index: usize) -> Result<(u64, Value), WorksheetError> {
        if index >= self.elements.len() {
            return Err(WorksheetError::index(format!(
                "slice index {index} out of range (len {})",
                self.elements.len()
            )));
        }
        Ok(self.elements.remove(index))
    }

    /// Rebuild with a fresh id and a compacted rank space — used by
    /// [`Clone`] (§4.G): `lastRank` becomes the survivor count, with no
    /// memory of prior deletions.
    pub fn cloned_fresh(&self, new_id: u64, elements: Vec<Value>) -> SliceValue {
        let mut out = SliceValue::new(new_id, self.elem_type.clone());
        for v in elements {
            out.append(v);
        }
        out
    }
}

/// The runtime value type (§3, §4.A): `undefined` is the bottom type,
/// assignable everywhere.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Text(String),
    Bool(bool),
    Number(Number),
    Slice(SliceValue),
    Worksheet(WorksheetRef),
}

impl Value {
    pub fn type_of(&self) -> Type {
        match self {
            Value::Undefined => Type::Undefined,
            Value::Text(_) => Type::Text,
            Value::Bool(_) => Type::Bool,
            Value::Number(n) => Type::Number(n.scale()),
            Value::Slice(s) => Type::Slice(Box::new(s.elem_type.clone())),
            Value::Worksheet(r) => Type::Worksheet(r.def_name.clone()),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Full assignability (§3), including the dynamic enum membership
    /// check: "a `text` value is assignable to enum `E` iff its string
    /// is a member of `E`".
    pub fn is_assignable_to(&self, ty: &Type) -> bool {
        match (self, ty) {
            (Value::Undefined, _) => true,
            (_, Type::Enum(def)) => match self {
                Value::Text(s) => def.contains(s),
                _ => false,
            },
            (Value::Text(_), Type::Text) => true,
            (Value::Bool(_), Type::Bool) => true,
            (Value::Number(n), Type::Number(target_scale)) => n.scale() <= *target_scale,
            (Value::Slice(s), Type::Slice(elem)) => s.elements.iter().all(|(_, v)| {
                // enum-typed elements re-check membership dynamically too
                v.is_assignable_to(elem)
            }),
            (Value::Worksheet(r), Type::Worksheet(name)) => r.def_name == *name,
            _ => false,
        }
    }

    /// The value-system `Equal` used by the `==`/`!=` DSL operators and
    /// by `Worksheet::set`'s no-op short-circuit (§4.C, §9 Ambiguity 2):
    /// numbers compare after scale normalization, everything else
    /// compares structurally.
    pub fn value_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.eq_numeric(*b),
            (a, b) => a == b,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Text(s) => write!(f, "\"{s}\""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Slice(s) => {
                write!(f, "[")?;
                for (i, (_, v)) in s.elements().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Worksheet(r) => write!(f, "{}", r.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_rounds_half_away_from_zero() {
        let left = Number::new(7, 0);
        let right = Number::new(222, 2);
        let result = left.div(right, RoundMode::Half, 4).unwrap();
        assert_eq!(result.to_string(), "3.1532");

        let neg_left = Number::new(-7, 0);
        let neg_result = neg_left.div(right, RoundMode::Half, 4).unwrap();
        assert_eq!(neg_result.to_string(), "-3.1532");
    }

    #[test]
    fn round_half_away_from_zero() {
        let n = Number::new(2305, 3);
        assert_eq!(n.round(RoundMode::Half, 2).unwrap().to_string(), "2.31");
        let neg = Number::new(-2305, 3);
        assert_eq!(neg.round(RoundMode::Half, 2).unwrap().to_string(), "-2.31");
    }

    #[test]
    fn round_is_idempotent_at_same_scale() {
        let n = Number::new(12345, 2);
        assert_eq!(n.round(RoundMode::Half, 2).unwrap(), n);
        assert_eq!(n.round(RoundMode::Up, 2).unwrap(), n);
        assert_eq!(n.round(RoundMode::Down, 2).unwrap(), n);
    }

    #[test]
    fn round_up_in_scale_rejects_overflow_instead_of_wrapping() {
        let n = Number::new(1, 0);
        let err = n.round(RoundMode::Down, MAX_SCALE).unwrap_err();
        assert!(err.to_string().contains("overflow"));
    }

    #[test]
    fn div_rejects_exponent_overflow_instead_of_panicking() {
        let left = Number::new(1, MAX_SCALE);
        let right = Number::new(1, MAX_SCALE);
        let err = left.div(right, RoundMode::Down, MAX_SCALE).unwrap_err();
        assert!(err.to_string().contains("overflow"));
    }

    #[test]
    fn display_pads_leading_zero() {
        let n = Number::new(5, 2);
        assert_eq!(n.to_string(), "0.05");
        let neg = Number::new(-5, 2);
        assert_eq!(neg.to_string(), "-0.05");
        let whole = Number::new(7, 0);
        assert_eq!(whole.to_string(), "7");
    }

    #[test]
    fn assignability_rules() {
        assert!(Type::Text.assignable_from(&Type::Undefined));
        assert!(Type::Number(4).assignable_from(&Type::Number(2)));
        assert!(!Type::Number(2).assignable_from(&Type::Number(4)));
        let slice_a = Type::Slice(Box::new(Type::Number(0)));
        let slice_b = Type::Slice(Box::new(Type::Number(2)));
        assert!(slice_b.assignable_from(&slice_a));
        assert!(!slice_a.assignable_from(&slice_b));
    }

    #[test]
    fn enum_membership_is_dynamic() {
        let def = Rc::new(EnumDef {
            name: "team_member".into(),
            members: vec!["pratik".into(), "jane".into()],
        });
        let ty = Type::Enum(def);
        assert!(Value::Text("pratik".into()).is_assignable_to(&ty));
        assert!(!Value::Text("the_devil".into()).is_assignable_to(&ty));
    }

    #[test]
    fn value_eq_normalizes_number_scale_but_struct_eq_does_not() {
        let a = Value::Number(Number::new(5, 0));
        let b = Value::Number(Number::new(500, 2));
        assert!(a.value_eq(&b));
        assert_ne!(a, b);
    }
}
