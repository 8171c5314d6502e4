//! Optimizer driver: runs the unit passes in their fixed order, then flattens.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::{
    compiler::{
        config::OptimizerConfig,
        flatten::{flatten, BlockTracker, FlatBlockGroup},
        pass::UnitPass,
        passes::{HeadElisionPass, SameVmElisionPass, TrailingBodyElisionPass},
    },
    translator::{TranslatedFunction, UnitId},
    Result,
};

/// Per-pass change counts of one optimizer run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    /// `(pass name, changes)` in execution order
    pub passes: Vec<(&'static str, usize)>,
}

impl OptimizeStats {
    /// Returns the total number of changes across all passes.
    #[must_use]
    pub fn total(&self) -> usize {
        self.passes.iter().map(|(_, changes)| changes).sum()
    }

    /// Returns the changes made by the pass named `name`, if it ran.
    #[must_use]
    pub fn changes(&self, name: &str) -> Option<usize> {
        self.passes
            .iter()
            .find(|(pass, _)| *pass == name)
            .map(|(_, changes)| *changes)
    }
}

/// Runs optimizer passes over a translated function.
///
/// The pipeline is fixed:
///
/// 1. **Head elision**
/// 2. **Trailing-body elision**
/// 3. **Same-VM elision**
/// 4. **Flatten**
///
/// Each pass runs exactly once. Later passes rely on what earlier ones established, so
/// passes are never reordered; disabling one in [`OptimizerConfig`] only removes it.
pub struct Optimizer {
    passes: Vec<Box<dyn UnitPass>>,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl Optimizer {
    /// Creates an optimizer with the passes `config` enables.
    #[must_use]
    pub fn new(config: OptimizerConfig) -> Self {
        let mut passes: Vec<Box<dyn UnitPass>> = Vec::new();
        if config.elide_heads {
            passes.push(Box::new(HeadElisionPass::new()));
        }
        if config.elide_trailing_bodies {
            passes.push(Box::new(TrailingBodyElisionPass::new()));
        }
        if config.elide_same_vm {
            passes.push(Box::new(SameVmElisionPass::new()));
        }
        Optimizer { passes }
    }

    /// Returns the names of the configured passes in execution order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Runs every configured pass once.
    ///
    /// # Arguments
    ///
    /// * `function` - The translated function; modified in place.
    /// * `external` - Units referenced from outside the function.
    ///
    /// # Errors
    ///
    /// Returns the first error a pass reports; passes after it do not run.
    pub fn optimize(
        &self,
        function: &mut TranslatedFunction,
        external: &HashSet<UnitId>,
    ) -> Result<OptimizeStats> {
        let mut stats = OptimizeStats::default();
        for pass in &self.passes {
            let changes = pass.run(function, external)?;
            debug!(pass = pass.name(), changes, "optimizer pass finished");
            stats.passes.push((pass.name(), changes));
        }
        Ok(stats)
    }

    /// Optimizes `function` and flattens it into block groups.
    ///
    /// Units in `external` keep their heads. Units tracked by `tracker` get their
    /// representative recorded: the head if it survived, the first body block otherwise.
    ///
    /// # Arguments
    ///
    /// * `function` - The translated function; modified in place.
    /// * `external` - Units referenced from outside the function.
    /// * `vm_ids` - VM instance per unit; units without an entry use instance 0.
    /// * `tracker` - Units whose representative block must be reported.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by a pass or by flattening.
    pub fn run(
        &self,
        function: &mut TranslatedFunction,
        external: &HashSet<UnitId>,
        vm_ids: &BTreeMap<UnitId, u32>,
        tracker: &mut BlockTracker,
    ) -> Result<Vec<FlatBlockGroup>> {
        let stats = self.optimize(function, external)?;
        let groups = flatten(function, vm_ids, tracker)?;

        info!(
            units = function.units().len(),
            changes = stats.total(),
            groups = groups.len(),
            blocks = function.arena().len(),
            "optimized function"
        );
        Ok(groups)
    }
}
