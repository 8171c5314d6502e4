//! Lifter for `jmp` and the conditional jumps.

use crate::{
    analysis::{CpuFlags, DecodedInstruction},
    ir::{Command, CommandKind, ExitCondition, HandlerId},
    translator::{handlers::operand::LiftBuilder, InstructionLifter, LiftContext},
    Result,
};

/// Lifts a block-terminating jump into a single virtual branch.
///
/// Targets come from the branch info of the enclosing basic block, not from the
/// instruction's displacement, so they already point at unit heads. Jumps without a
/// flag condition fail and stay native.
pub struct JmpLifter<'a> {
    builder: LiftBuilder<'a>,
}

impl<'a> JmpLifter<'a> {
    /// Creates the lifter for one instruction.
    #[must_use]
    pub fn new(
        ctx: &'a LiftContext<'a>,
        instruction: &'a DecodedInstruction,
        _rva: u64,
        handler: HandlerId,
    ) -> Self {
        JmpLifter {
            builder: LiftBuilder::new(ctx, instruction, handler),
        }
    }
}

/// Registry factory for [`JmpLifter`].
pub(crate) fn lifter<'a>(
    ctx: &'a LiftContext<'a>,
    instruction: &'a DecodedInstruction,
    rva: u64,
    handler: HandlerId,
) -> Box<dyn InstructionLifter + 'a> {
    Box::new(JmpLifter::new(ctx, instruction, rva, handler))
}

impl InstructionLifter for JmpLifter<'_> {
    fn translate_to_il(&mut self, rva: u64, _flags: CpuFlags) -> Result<bool> {
        let info = self.builder.context().branch_info(rva)?;
        if info.condition == ExitCondition::None {
            return Ok(false);
        }

        self.builder.emit(CommandKind::Branch(info.to_branch(true)));
        Ok(true)
    }

    fn take_block(&mut self) -> Vec<Command> {
        self.builder.take()
    }
}
