//! Lifters for `push` and `pop`.
//!
//! The handlers own the native stack pointer adjustment; the lifted code only moves the
//! value between the VM stack and the operand.

use crate::{
    analysis::{CpuFlags, DecodedInstruction},
    ir::{Command, HandlerId, IrSize},
    translator::{handlers::operand::LiftBuilder, InstructionLifter, LiftContext},
    Result,
};

/// Lifts `push`: the operand is loaded, widened to the push width, and handed to the
/// handler.
pub struct PushLifter<'a> {
    builder: LiftBuilder<'a>,
}

impl<'a> PushLifter<'a> {
    /// Creates the lifter for one instruction.
    #[must_use]
    pub fn new(
        ctx: &'a LiftContext<'a>,
        instruction: &'a DecodedInstruction,
        _rva: u64,
        handler: HandlerId,
    ) -> Self {
        PushLifter {
            builder: LiftBuilder::new(ctx, instruction, handler),
        }
    }

    fn lift(&mut self) -> bool {
        let b = &mut self.builder;
        let Some(value) = b.operand(0) else {
            return false;
        };
        // 16-bit registers push two bytes, everything else eight
        let width = if value.is_register() && value.size() == 2 {
            IrSize::Bit16
        } else {
            IrSize::Bit64
        };

        if !b.load_operand(value, width) {
            return false;
        }
        b.call_handler(b.instruction.mnemonic);
        true
    }
}

/// Lifts `pop`: the handler produces the value, which is stored into the operand.
pub struct PopLifter<'a> {
    builder: LiftBuilder<'a>,
}

impl<'a> PopLifter<'a> {
    /// Creates the lifter for one instruction.
    #[must_use]
    pub fn new(
        ctx: &'a LiftContext<'a>,
        instruction: &'a DecodedInstruction,
        _rva: u64,
        handler: HandlerId,
    ) -> Self {
        PopLifter {
            builder: LiftBuilder::new(ctx, instruction, handler),
        }
    }

    fn lift(&mut self) -> bool {
        let b = &mut self.builder;
        let Some(target) = b.operand(0) else {
            return false;
        };
        b.call_handler(b.instruction.mnemonic);
        b.store_operand(target)
    }
}

/// Registry factory for [`PushLifter`].
pub(crate) fn push<'a>(
    ctx: &'a LiftContext<'a>,
    instruction: &'a DecodedInstruction,
    rva: u64,
    handler: HandlerId,
) -> Box<dyn InstructionLifter + 'a> {
    Box::new(PushLifter::new(ctx, instruction, rva, handler))
}

/// Registry factory for [`PopLifter`].
pub(crate) fn pop<'a>(
    ctx: &'a LiftContext<'a>,
    instruction: &'a DecodedInstruction,
    rva: u64,
    handler: HandlerId,
) -> Box<dyn InstructionLifter + 'a> {
    Box::new(PopLifter::new(ctx, instruction, rva, handler))
}

impl InstructionLifter for PushLifter<'_> {
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

impl InstructionLifter for PopLifter<'_> {
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
