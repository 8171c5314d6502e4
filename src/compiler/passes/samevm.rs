//! Same-VM transition elision.
//!
//! A `vm_exit` followed by a `vm_enter` is redundant when every path between them stays
//! inside one VM instance. Deciding that requires a rule for which units share an
//! instance across unit boundaries, and no such rule is defined yet. Until one is, this
//! pass holds its place in the pipeline and leaves the function untouched.

use std::collections::HashSet;

use tracing::debug;

use crate::{
    compiler::pass::UnitPass,
    translator::{TranslatedFunction, UnitId},
    Result,
};

/// Placeholder for removing VM transitions within one VM instance; never changes anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SameVmElisionPass;

impl SameVmElisionPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        SameVmElisionPass
    }
}

impl UnitPass for SameVmElisionPass {
    fn name(&self) -> &'static str {
        "same-vm-elision"
    }

    fn run(&self, function: &mut TranslatedFunction, _external: &HashSet<UnitId>) -> Result<usize> {
        // TODO: define how units are partitioned into VM instances, then drop exit/enter
        // pairs whose both sides land in the same instance.
        debug!(units = function.units.len(), "same-vm elision has no partitioning rule, skipping");
        Ok(0)
    }

    fn description(&self) -> &'static str {
        "Removes VM exit/enter pairs inside a single VM instance (not yet active)"
    }
}
