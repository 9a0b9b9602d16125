//! External `ComputedBy` plugins and the `Options` configuration surface
//! (§4.E step 2, §6 "ComputedBy plugin interface").

use std::collections::HashMap;
use std::rc::Rc;

use worksheet_common::Value;

/// An externally supplied computation attached to a field declared
/// `computed_by { external }` or `constrained_by { external }`.
pub trait ComputedBy {
    /// Dotted selector strings naming this plugin's inputs, in the
    /// order `compute` expects them.
    fn args(&self) -> Vec<String>;
    fn compute(&self, values: Vec<Value>) -> Value;
}

/// `Options.Plugins: {defName -> {fieldName -> ComputedBy}}` (§4.E step
/// 2) — the one piece of builder configuration this runtime accepts.
#[derive(Default)]
pub struct Options {
    plugins: HashMap<String, HashMap<String, Rc<dyn ComputedBy>>>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugin(
        mut self,
        def_name: impl Into<String>,
        field_name: impl Into<String>,
        plugin: Rc<dyn ComputedBy>,
    ) -> Self {
        self.plugins
            .entry(def_name.into())
            .or_default()
            .insert(field_name.into(), plugin);
        self
    }

    pub(crate) fn take(&mut self, def_name: &str, field_name: &str) -> Option<Rc<dyn ComputedBy>> {
        self.plugins.get_mut(def_name)?.remove(field_name)
    }

    pub(crate) fn remaining_for(&self, def_name: &str) -> impl Iterator<Item = &String> {
        self.plugins
            .get(def_name)
            .into_iter()
            .flat_map(|m| m.keys())
    }
}
