//! Error taxonomy for the worksheet runtime (§7).
//!
//! One struct (`WorksheetError`) glues a canonical `ErrorKind` to an
//! optional human message and optional location, built with
//! `thiserror` instead of a hand-rolled `Display` impl.

use std::fmt;

/// The closed set of error kinds named in §7.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Lexical/syntax/type-unknown/invalid-scale errors from the DSL parser.
    Parse,
    /// Unknown reference, missing plugin, no-dependency compute, duplicate names.
    Definition,
    /// "cannot assign X to Y" / "cannot append X to []Y".
    Type,
    /// "unknown field <name>".
    UnknownField,
    /// Set-on-slice / Get-on-slice / Del-on-non-slice, discriminated by operation.
    Shape,
    /// Constraint evaluated to non-`true`; rollback has already completed.
    ConstraintViolation,
    /// Unknown function, wrong arity, non-numeric argument, missing rounding mode.
    Evaluation,
    /// Slice index out of range on `Del`.
    Index,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Parse => "ParseError",
            ErrorKind::Definition => "DefinitionError",
            ErrorKind::Type => "TypeError",
            ErrorKind::UnknownField => "UnknownFieldError",
            ErrorKind::Shape => "ShapeError",
            ErrorKind::ConstraintViolation => "ConstraintViolation",
            ErrorKind::Evaluation => "EvaluationError",
            ErrorKind::Index => "IndexError",
        })
    }
}

/// Lightweight source-position context, attached when available.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    pub byte_offset: Option<usize>,
    pub field_name: Option<String>,
    pub worksheet_def: Option<String>,
}

/// The single error type every fallible worksheet-runtime operation returns.
///
/// Never used for conditions that should panic (§7: panics are reserved
/// for provable implementation invariants, never user-visible failures).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}{}", context.as_ref().map(|c| format!(" ({c})")).unwrap_or_default())]
pub struct WorksheetError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: Option<ErrorContext>,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ws) = &self.worksheet_def {
            parts.push(format!("worksheet {ws}"));
        }
        if let Some(field) = &self.field_name {
            parts.push(format!("field {field}"));
        }
        if let Some(off) = self.byte_offset {
            parts.push(format!("offset {off}"));
        }
        write!(f, "{}", parts.join(", "))
    }
}

impl WorksheetError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>) -> Self {
        self.context
            .get_or_insert_with(ErrorContext::default)
            .field_name = Some(name.into());
        self
    }

    pub fn with_worksheet(mut self, def_name: impl Into<String>) -> Self {
        self.context
            .get_or_insert_with(ErrorContext::default)
            .worksheet_def = Some(def_name.into());
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.context.get_or_insert_with(ErrorContext::default).byte_offset = Some(offset);
        self
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn definition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Definition, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn unknown_field(name: &str) -> Self {
        Self::new(ErrorKind::UnknownField, format!("unknown field {name}"))
    }

    pub fn shape(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Shape, message)
    }

    pub fn constraint_violation(value: &str, field: &str) -> Self {
        Self::new(
            ErrorKind::ConstraintViolation,
            format!("{value} not a valid value for constrained field {field}"),
        )
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Evaluation, message)
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Index, message)
    }

    pub fn is_constraint_violation(&self) -> bool {
        self.kind == ErrorKind::ConstraintViolation
    }
}
