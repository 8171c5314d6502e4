//! Lifters for `add`, `sub`, `inc` and `dec`.

use crate::{
    analysis::{CpuFlags, DecodedInstruction},
    ir::{Command, HandlerId, IrSize},
    translator::{handlers::operand::LiftBuilder, InstructionLifter, LiftContext},
    Result,
};

/// Lifts read-modify-write arithmetic with one or two operands.
///
/// The emitted sequence is:
///
/// ```text
/// flags_load            ; only if a flag is relevant
/// <load destination>
/// <load source>         ; binary forms only
/// handler_call
/// flags_store mask      ; only if a flag is relevant
/// <store destination>
/// ```
pub struct ArithLifter<'a> {
    builder: LiftBuilder<'a>,
}

impl<'a> ArithLifter<'a> {
    /// Creates the lifter for one instruction.
    #[must_use]
    pub fn new(
        ctx: &'a LiftContext<'a>,
        instruction: &'a DecodedInstruction,
        _rva: u64,
        handler: HandlerId,
    ) -> Self {
        ArithLifter {
            builder: LiftBuilder::new(ctx, instruction, handler),
        }
    }

    fn lift(&mut self, flags: CpuFlags) -> bool {
        let b = &mut self.builder;
        let Some(dst) = b.operand(0) else {
            return false;
        };
        let Some(size) = IrSize::from_bytes(dst.size()) else {
            return false;
        };

        b.load_flags(flags);
        if !b.load_operand(dst, size) {
            return false;
        }
        if let Some(src) = b.operand(1) {
            if !b.load_operand(src, size) {
                return false;
            }
        }
        b.call_handler(b.instruction.mnemonic);
        b.store_flags(flags);
        b.store_operand(dst)
    }
}

/// Registry factory for [`ArithLifter`].
pub(crate) fn lifter<'a>(
    ctx: &'a LiftContext<'a>,
    instruction: &'a DecodedInstruction,
    rva: u64,
    handler: HandlerId,
) -> Box<dyn InstructionLifter + 'a> {
    Box::new(ArithLifter::new(ctx, instruction, rva, handler))
}

impl InstructionLifter for ArithLifter<'_> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{Mnemonic, X86Memory, X86Operand, X86Register},
        ir::{CommandKind, IdAllocator, PushValue},
        test::{arith, TestFunction},
    };

    fn lift(inst: &DecodedInstruction, flags: CpuFlags) -> Option<Vec<CommandKind>> {
        let function = TestFunction::empty();
        let resolver = function.resolver();
        let ids = IdAllocator::new();
        let ctx = LiftContext::new(&ids, &resolver);
        let mut lifter = ArithLifter::new(&ctx, inst, inst.rva, HandlerId(7));
        if !lifter.translate_to_il(inst.rva, flags).unwrap() {
            assert!(lifter.take_block().is_empty());
            return None;
        }
        Some(lifter.take_block().into_iter().map(|c| c.kind().clone()).collect())
    }

    #[test]
    fn test_add_register_immediate() {
        let add = arith(0, Mnemonic::Add, X86Register::Eax, 1);
        let commands = lift(&add, CpuFlags::ZF | CpuFlags::CF).unwrap();

        assert_eq!(
            commands,
            vec![
                CommandKind::FlagsLoad,
                CommandKind::ContextLoad(X86Register::Eax),
                CommandKind::Push {
                    value: PushValue::Immediate(1),
                    size: IrSize::Bit8
                },
                CommandKind::SignExtend {
                    from: IrSize::Bit8,
                    to: IrSize::Bit32
                },
                CommandKind::HandlerCall {
                    mnemonic: Mnemonic::Add,
                    handler: HandlerId(7)
                },
                CommandKind::FlagsStore(CpuFlags::ZF | CpuFlags::CF),
                CommandKind::ContextStore(X86Register::Eax),
            ]
        );
    }

    #[test]
    fn test_no_flags_no_flag_commands() {
        let sub = arith(0, Mnemonic::Sub, X86Register::Ecx, 2);
        let commands = lift(&sub, CpuFlags::empty()).unwrap();
        assert!(!commands
            .iter()
            .any(|k| matches!(k, CommandKind::FlagsLoad | CommandKind::FlagsStore(_))));
    }

    #[test]
    fn test_inc_memory() {
        let inc = DecodedInstruction::new(
            0,
            4,
            Mnemonic::Inc,
            vec![X86Operand::Memory(X86Memory::base_disp(X86Register::Rsp, 8, 4))],
        );
        let commands = lift(&inc, CpuFlags::empty()).unwrap();
        assert_eq!(commands.first(), Some(&CommandKind::ContextLoad(X86Register::Rsp)));
        assert!(commands.contains(&CommandKind::MemRead(IrSize::Bit32)));
        assert_eq!(commands.last(), Some(&CommandKind::MemWrite(IrSize::Bit32)));
    }

    #[test]
    fn test_rip_relative_fails() {
        let add = DecodedInstruction::new(
            0,
            7,
            Mnemonic::Add,
            vec![
                X86Operand::Register(X86Register::Rax),
                X86Operand::Memory(X86Memory::base_disp(X86Register::Rip, 0x10, 8)),
            ],
        );
        assert!(lift(&add, CpuFlags::STATUS).is_none());
    }
}
