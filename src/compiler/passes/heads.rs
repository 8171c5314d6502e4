//! Head elision.
//!
//! A head whose first body block is native does nothing observable: it enters the VM
//! and leaves it again right away. Branches that land on such a head can land on the
//! first body block directly.
//!
//! Before:
//! ```text
//! unit_0.tail: jmp unit_1.head
//! unit_1.head: vm_enter ; vm_exit body_0
//! unit_1.body_0 (native): ...
//! ```
//!
//! After:
//! ```text
//! unit_0.tail: jmp unit_1.body_0
//! unit_1.body_0 (native): ...
//! ```
//!
//! Units referenced from outside the function keep their heads, since the external
//! reference was taken before optimization.

use std::collections::HashSet;

use tracing::trace;

use crate::{
    compiler::pass::UnitPass,
    ir::{BlockId, BranchTarget},
    translator::{TranslatedFunction, UnitId},
    Result,
};

/// Removes heads that immediately leave the VM.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadElisionPass;

impl HeadElisionPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        HeadElisionPass
    }
}

impl UnitPass for HeadElisionPass {
    fn name(&self) -> &'static str {
        "head-elision"
    }

    fn run(&self, function: &mut TranslatedFunction, external: &HashSet<UnitId>) -> Result<usize> {
        let tails: Vec<BlockId> = function.units.iter().filter_map(|unit| unit.tail).collect();
        let mut elided = 0;

        for unit in &mut function.units {
            if external.contains(&unit.id()) {
                continue;
            }
            let Some(head) = unit.head else {
                continue;
            };
            let Some(first) = unit.first_body() else {
                return Err(invariant_error!("{} has a head but no body", unit.id()));
            };
            if function.arena.block(first)?.is_virtual() {
                continue;
            }

            let mut rewritten = 0;
            for tail in &tails {
                rewritten += function
                    .arena
                    .block_mut(*tail)?
                    .rewrite_exit(head, BranchTarget::Block(first));
            }

            unit.head = None;
            function.arena.remove(head)?;
            elided += 1;
            trace!(unit = %unit.id(), %head, %first, rewritten, "elided head");
        }

        Ok(elided)
    }

    fn description(&self) -> &'static str {
        "Removes heads whose first body block is native and redirects inbound branches"
    }
}
