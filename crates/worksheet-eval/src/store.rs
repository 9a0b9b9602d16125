//! The `Store` collaborator (§1: "persistence to a relational store...
//! mentioned only at its interface"). Explicitly out of scope: this
//! trait names the shape a caller's persistence layer would implement,
//! with no in-tree implementation and no wiring into `Worksheet`'s
//! mutators.

use worksheet_common::WorksheetError;

use crate::worksheet::Worksheet;

pub trait Store {
    fn load(&self, def_name: &str, id: &str) -> Result<Worksheet, WorksheetError>;
    fn save(&self, ws: &Worksheet) -> Result<(), WorksheetError>;
}
