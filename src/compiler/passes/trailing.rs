//! Trailing-body elision.
//!
//! When a block ends in a lifted jump preceded by native code, splitting leaves a last
//! body block that enters the VM only to leave it again (the jump itself moved to the
//! tail). The block before it can branch to the tail directly.
//!
//! ```text
//! body_0 (native):  ... ; jmp body_1        body_0 (native): ... ; jmp tail
//! body_1 (virtual): vm_enter ; vm_exit tail   =>
//! tail:             jmp unit_n.head          tail:            jmp unit_n.head
//! ```

use std::collections::HashSet;

use tracing::trace;

use crate::{
    compiler::pass::UnitPass,
    ir::BranchTarget,
    translator::{TranslatedFunction, UnitId},
    Result,
};

/// Removes empty virtual blocks at the end of unit bodies.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrailingBodyElisionPass;

impl TrailingBodyElisionPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        TrailingBodyElisionPass
    }
}

impl UnitPass for TrailingBodyElisionPass {
    fn name(&self) -> &'static str {
        "trailing-body-elision"
    }

    fn run(&self, function: &mut TranslatedFunction, _external: &HashSet<UnitId>) -> Result<usize> {
        let mut elided = 0;

        for unit in &mut function.units {
            let (Some(tail), Some(last)) = (unit.tail, unit.last_body()) else {
                continue;
            };
            let block = function.arena.block(last)?;
            if !block.is_virtual() || !block.is_enter_exit_only() {
                continue;
            }
            if unit.body.len() < 2 {
                return Err(invariant_error!(
                    "{}: trailing block {} is the only body block",
                    unit.id(),
                    last
                ));
            }

            let previous = unit.body[unit.body.len() - 2];
            let rewritten = function
                .arena
                .block_mut(previous)?
                .rewrite_exit(last, BranchTarget::Block(tail));
            if rewritten == 0 {
                return Err(invariant_error!(
                    "{}: {} does not exit into trailing block {}",
                    unit.id(),
                    previous,
                    last
                ));
            }

            unit.body.pop();
            function.arena.remove(last)?;
            elided += 1;
            trace!(unit = %unit.id(), block = %last, "elided trailing body block");
        }

        Ok(elided)
    }

    fn description(&self) -> &'static str {
        "Removes trailing virtual blocks that only enter and leave the VM"
    }
}
