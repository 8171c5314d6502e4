//! Shared operand lowering for the built-in lifters.

use crate::{
    analysis::{CpuFlags, DecodedInstruction, Mnemonic, X86Memory, X86Operand, X86Register},
    ir::{Command, CommandKind, HandlerId, IrSize, LogicOp, PushValue},
    translator::LiftContext,
};

/// Accumulates the commands of one lifted instruction.
///
/// Operand helpers return `false` when an operand cannot be expressed inside the VM; the
/// owning lifter then reports failure and the instruction stays native.
pub(crate) struct LiftBuilder<'a> {
    ctx: &'a LiftContext<'a>,
    pub(crate) instruction: &'a DecodedInstruction,
    pub(crate) handler: HandlerId,
    commands: Vec<Command>,
}

impl<'a> LiftBuilder<'a> {
    pub(crate) fn new(
        ctx: &'a LiftContext<'a>,
        instruction: &'a DecodedInstruction,
        handler: HandlerId,
    ) -> Self {
        LiftBuilder {
            ctx,
            instruction,
            handler,
            commands: Vec::new(),
        }
    }

    pub(crate) fn context(&self) -> &'a LiftContext<'a> {
        self.ctx
    }

    pub(crate) fn emit(&mut self, kind: CommandKind) {
        self.commands.push(self.ctx.command(kind));
    }

    /// The operand at `index`.
    pub(crate) fn operand(&self, index: usize) -> Option<&'a X86Operand> {
        self.instruction.operands.get(index)
    }

    /// Pushes an immediate masked to `size`.
    pub(crate) fn push_immediate(&mut self, value: i64, size: IrSize) {
        let bits = u32::from(size.bytes()) * 8;
        let masked = if bits >= 64 {
            value as u64
        } else {
            (value as u64) & ((1u64 << bits) - 1)
        };
        self.emit(CommandKind::Push {
            value: PushValue::Immediate(masked),
            size,
        });
    }

    /// Pushes the value of `operand`, widened to `size` for narrower immediates.
    pub(crate) fn load_operand(&mut self, operand: &X86Operand, size: IrSize) -> bool {
        match operand {
            X86Operand::Register(reg) => {
                if reg.is_instruction_pointer() {
                    return false;
                }
                self.emit(CommandKind::ContextLoad(*reg));
                true
            }
            X86Operand::Immediate {
                value,
                size: imm_size,
            } => {
                let Some(encoded) = IrSize::from_bytes(*imm_size) else {
                    return false;
                };
                self.push_immediate(*value, encoded);
                if encoded < size {
                    self.emit(CommandKind::SignExtend {
                        from: encoded,
                        to: size,
                    });
                }
                true
            }
            X86Operand::Memory(mem) => {
                let Some(read_size) = IrSize::from_bytes(mem.size) else {
                    return false;
                };
                if !self.push_address(mem) {
                    return false;
                }
                self.emit(CommandKind::MemRead(read_size));
                true
            }
            X86Operand::Relative { .. } => false,
        }
    }

    /// Pops the top of the stack into `operand`.
    pub(crate) fn store_operand(&mut self, operand: &X86Operand) -> bool {
        match operand {
            X86Operand::Register(reg) => {
                if reg.is_instruction_pointer() {
                    return false;
                }
                self.emit(CommandKind::ContextStore(*reg));
                true
            }
            X86Operand::Memory(mem) => {
                let Some(write_size) = IrSize::from_bytes(mem.size) else {
                    return false;
                };
                if !self.push_address(mem) {
                    return false;
                }
                self.emit(CommandKind::MemWrite(write_size));
                true
            }
            X86Operand::Immediate { .. } | X86Operand::Relative { .. } => false,
        }
    }

    /// Pushes the effective address of `mem`.
    ///
    /// Segment-relative and RIP-relative addresses depend on state the VM does not model
    /// and are rejected. So are 32-bit address registers: the VM computes addresses in
    /// 64 bits and would not wrap them at 4 GiB.
    pub(crate) fn push_address(&mut self, mem: &X86Memory) -> bool {
        if mem.segment.is_some() || mem.is_rip_relative() {
            return false;
        }
        let narrow = |reg: Option<X86Register>| reg.is_some_and(|r| r.size() != 8);
        if narrow(mem.base) || narrow(mem.index) {
            return false;
        }

        let mut pushed = false;
        if let Some(base) = mem.base {
            self.emit(CommandKind::ContextLoad(base));
            pushed = true;
        }
        if let Some(index) = mem.index {
            if index.is_instruction_pointer() {
                return false;
            }
            self.emit(CommandKind::ContextLoad(index));
            if mem.scale > 1 {
                self.push_immediate(i64::from(mem.scale), IrSize::Bit64);
                self.emit(CommandKind::Logic(LogicOp::Mul, IrSize::Bit64));
            }
            if pushed {
                self.emit(CommandKind::Logic(LogicOp::Add, IrSize::Bit64));
            }
            pushed = true;
        }
        if mem.displacement != 0 || !pushed {
            self.push_immediate(mem.displacement, IrSize::Bit64);
            if pushed {
                self.emit(CommandKind::Logic(LogicOp::Add, IrSize::Bit64));
            }
        }
        true
    }

    /// Calls the selected handler for `mnemonic`.
    pub(crate) fn call_handler(&mut self, mnemonic: Mnemonic) {
        let handler = self.handler;
        self.emit(CommandKind::HandlerCall { mnemonic, handler });
    }

    /// Pushes the saved flags so the handler can merge into them.
    ///
    /// Emits nothing if no flag is relevant.
    pub(crate) fn load_flags(&mut self, flags: CpuFlags) {
        if !flags.is_empty() {
            self.emit(CommandKind::FlagsLoad);
        }
    }

    /// Stores the relevant bits of the flags the handler produced.
    ///
    /// Emits nothing if no flag is relevant.
    pub(crate) fn store_flags(&mut self, flags: CpuFlags) {
        if !flags.is_empty() {
            self.emit(CommandKind::FlagsStore(flags));
        }
    }

    /// Hands out the commands collected so far.
    pub(crate) fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Drops the commands collected so far.
    pub(crate) fn discard(&mut self) {
        self.commands.clear();
    }
}
