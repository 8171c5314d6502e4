//! Lifter for `mov`.

use crate::{
    analysis::{CpuFlags, DecodedInstruction},
    ir::{Command, HandlerId, IrSize},
    translator::{handlers::operand::LiftBuilder, InstructionLifter, LiftContext},
    Result,
};

/// Lifts `mov` as a load of the source followed by a store to the destination.
///
/// `mov` neither reads nor writes flags and needs no handler body, so the selected
/// handler is only recorded, never called.
pub struct MovLifter<'a> {
    builder: LiftBuilder<'a>,
}

impl<'a> MovLifter<'a> {
    /// Creates the lifter for one instruction.
    #[must_use]
    pub fn new(
        ctx: &'a LiftContext<'a>,
        instruction: &'a DecodedInstruction,
        _rva: u64,
        handler: HandlerId,
    ) -> Self {
        MovLifter {
            builder: LiftBuilder::new(ctx, instruction, handler),
        }
    }

    fn lift(&mut self) -> bool {
        let b = &mut self.builder;
        let (Some(dst), Some(src)) = (b.operand(0), b.operand(1)) else {
            return false;
        };
        let Some(size) = IrSize::from_bytes(dst.size()) else {
            return false;
        };

        b.load_operand(src, size) && b.store_operand(dst)
    }
}

/// Registry factory for [`MovLifter`].
pub(crate) fn lifter<'a>(
    ctx: &'a LiftContext<'a>,
    instruction: &'a DecodedInstruction,
    rva: u64,
    handler: HandlerId,
) -> Box<dyn InstructionLifter + 'a> {
    Box::new(MovLifter::new(ctx, instruction, rva, handler))
}

impl InstructionLifter for MovLifter<'_> {
    fn translate_to_il(&mut self, _rva: u64, _flags: CpuFlags) -> Result<bool> {
        if self.lift() {
            return Ok(true);
        }
        self.builder.discard();
        Ok(false)
    }

    fn take_block(&mut self) -> Vec<Command> {
        self.builder.take()
    }
}
