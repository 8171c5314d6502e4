//! Lifter for `shl` and `shr`.

use crate::{
    analysis::{CpuFlags, DecodedInstruction, X86Operand, X86Register},
    ir::{Command, CommandKind, HandlerId, IrSize},
    translator::{handlers::operand::LiftBuilder, InstructionLifter, LiftContext},
    Result,
};

/// Lifts logical shifts by an immediate or by `cl`.
///
/// The count is pushed as a byte and resized to the destination width before the
/// handler runs. A register count other than `cl` cannot be encoded and fails.
pub struct ShiftLifter<'a> {
    builder: LiftBuilder<'a>,
}

impl<'a> ShiftLifter<'a> {
    /// Creates the lifter for one instruction.
    #[must_use]
    pub fn new(
        ctx: &'a LiftContext<'a>,
        instruction: &'a DecodedInstruction,
        _rva: u64,
        handler: HandlerId,
    ) -> Self {
        ShiftLifter {
            builder: LiftBuilder::new(ctx, instruction, handler),
        }
    }

    fn lift(&mut self, flags: CpuFlags) -> bool {
        let b = &mut self.builder;
        let (Some(dst), Some(count)) = (b.operand(0), b.operand(1)) else {
            return false;
        };
        let Some(size) = IrSize::from_bytes(dst.size()) else {
            return false;
        };

        b.load_flags(flags);
        if !b.load_operand(dst, size) {
            return false;
        }
        match count {
            X86Operand::Immediate { value, .. } => b.push_immediate(*value, IrSize::Bit8),
            X86Operand::Register(X86Register::Cl) => {
                b.emit(CommandKind::ContextLoad(X86Register::Cl));
            }
            _ => return false,
        }
        if size != IrSize::Bit8 {
            b.emit(CommandKind::Resize {
                from: IrSize::Bit8,
                to: size,
            });
        }
        b.call_handler(b.instruction.mnemonic);
        b.store_flags(flags);
        b.store_operand(dst)
    }
}

/// Registry factory for [`ShiftLifter`].
pub(crate) fn lifter<'a>(
    ctx: &'a LiftContext<'a>,
    instruction: &'a DecodedInstruction,
    rva: u64,
    handler: HandlerId,
) -> Box<dyn InstructionLifter + 'a> {
    Box::new(ShiftLifter::new(ctx, instruction, rva, handler))
}

impl InstructionLifter for ShiftLifter<'_> {
    fn translate_to_il(&mut self, _rva: u64, flags: CpuFlags) -> Result<bool> {
        if self.lift(flags) {
            return Ok(true);
        }
        self.builder.discard();
        Ok(false)
    }

    fn take_block(&mut self) -> Vec<Command> {
        self.builder.take()
    }
}
