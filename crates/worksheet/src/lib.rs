//! Meta crate that re-exports the worksheet DSL's building blocks with
//! sensible defaults: the value/type model, the parser, and the
//! instance runtime, plus a `Runtime` entry point that parses
//! definitions and hands back a ready-to-use registry in one call.

pub mod doc_examples;

pub use worksheet_common::{
    EnumDef, ErrorKind, Number, RoundMode, SliceValue, Type, Value, WorksheetError, WorksheetRef,
    ID_FIELD_INDEX, ID_FIELD_NAME, VERSION_FIELD_INDEX, VERSION_FIELD_NAME,
};
pub use worksheet_eval::{
    clone_graph, diff, diff_slices, Change, ComputedBy, Definition, DependentRef, Field, Options,
    Registry, SliceDiff, Store, Worksheet,
};

#[cfg(feature = "json")]
pub use worksheet_eval::json;

use std::rc::Rc;

/// Parses a set of `type ... worksheet { ... }` / `type ... enum { ... }`
/// definitions and builds the [`Registry`] instances are created from.
///
/// This is the same thing [`worksheet_eval::parse`] does; it lives here
/// too so that depending on just this crate is enough to get started.
pub struct Runtime;

impl Runtime {
    /// Build definitions from `source`, attaching any external
    /// `ComputedBy` plugins supplied via `options`.
    pub fn parse(source: &str, options: Options) -> Result<Rc<Registry>, WorksheetError> {
        worksheet_eval::parse(source, options)
    }
}

/// Common imports for downstream crates: `use worksheet::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Change, ComputedBy, Definition, DependentRef, Field, Number, Options, Registry,
        RoundMode, SliceDiff, SliceValue, Store, Type, Value, Worksheet, WorksheetError,
        WorksheetRef,
    };
}
