//! Worksheet instance runtime: definitions builder, expression
//! evaluator, built-in function library, worksheet instance model, and
//! graph operations. See `worksheet-parse` for the DSL front end and
//! `worksheet-common` for the value/type model both sit on top of.

pub mod builtins;
pub mod definitions;
pub mod function;
pub mod function_registry;
pub mod graph_ops;
pub mod interpreter;
#[cfg(feature = "json")]
pub mod json;
pub mod plugin;
pub mod store;
pub mod worksheet;

pub use definitions::{build as build_definitions, Definition, DependentRef, Field};
pub use graph_ops::{clone_graph, diff, diff_slices, Change, SliceDiff};
pub use plugin::{ComputedBy, Options};
pub use store::Store;
pub use worksheet::{Registry, Worksheet};

use std::rc::Rc;

use worksheet_common::WorksheetError;

/// Parse `source` and build a ready-to-use registry in one call — the
/// common entry point for everything short of attaching external
/// `ComputedBy` plugins via [`Options`] directly.
pub fn parse(source: &str, options: Options) -> Result<Rc<Registry>, WorksheetError> {
    let definitions = definitions::build(source, options)?;
    Ok(Registry::new(definitions))
}
