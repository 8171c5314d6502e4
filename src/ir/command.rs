//! IR commands.
//!
//! A [`Command`] is one operation of the IR: a stack-machine step of a virtual block, a
//! relocated native instruction, or a control transfer. Commands carry a unique
//! [`CommandId`] and are immutable once built, except for the targets of branches and
//! VM exits, which the optimizer rewrites in place.

use std::fmt;

use strum::{Display, IntoStaticStr};

use crate::{
    analysis::{CpuFlags, Mnemonic, X86Register},
    codec::EncodeRequest,
    ir::{BlockId, Branch, BranchTarget},
};

/// Unique identifier of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd_{}", self.0)
    }
}

/// Identifier of a virtualized handler, as assigned by a handler generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u32);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{:04x}", self.0)
    }
}

/// Width of a value on the VM stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum IrSize {
    /// 8 bits
    #[strum(serialize = "b8")]
    Bit8,
    /// 16 bits
    #[strum(serialize = "b16")]
    Bit16,
    /// 32 bits
    #[strum(serialize = "b32")]
    Bit32,
    /// 64 bits
    #[strum(serialize = "b64")]
    Bit64,
}

impl IrSize {
    /// Converts an operand size in bytes.
    #[must_use]
    pub const fn from_bytes(bytes: u8) -> Option<Self> {
        match bytes {
            1 => Some(IrSize::Bit8),
            2 => Some(IrSize::Bit16),
            4 => Some(IrSize::Bit32),
            8 => Some(IrSize::Bit64),
            _ => None,
        }
    }

    /// Returns the width in bytes.
    #[must_use]
    pub const fn bytes(&self) -> u8 {
        match self {
            IrSize::Bit8 => 1,
            IrSize::Bit16 => 2,
            IrSize::Bit32 => 4,
            IrSize::Bit64 => 8,
        }
    }
}

/// Registers of the virtual machine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum VmRegister {
    /// Virtual instruction pointer
    Vip,
    /// Virtual stack pointer
    Vsp,
    /// Base of the saved native register context
    Vregs,
    /// Scratch register
    Vtemp,
    /// Second scratch register
    Vtemp2,
    /// Handler call target
    Vcs,
    /// Handler return address
    Vcsret,
    /// Image base
    Vbase,
}

/// A value pushed onto the VM stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushValue {
    /// Constant
    Immediate(u64),
    /// Current value of a VM register
    Register(VmRegister),
}

impl fmt::Display for PushValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushValue::Immediate(value) => write!(f, "0x{value:x}"),
            PushValue::Register(reg) => write!(f, "{reg}"),
        }
    }
}

/// Binary operation applied to the two topmost stack values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogicOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise xor
    Xor,
    /// Shift left
    Shl,
    /// Logical shift right
    Shr,
}

/// A storage location a command reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Store {
    /// A VM register
    Vm(VmRegister),
    /// A native register saved in the VM context, always the full 64-bit register
    Native(X86Register),
    /// The saved flags register
    Flags,
}

/// The operation of a command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum CommandKind {
    /// Push a value onto the VM stack
    Push {
        /// Pushed value
        value: PushValue,
        /// Width of the pushed value
        size: IrSize,
    },
    /// Pop the top of the VM stack, optionally into a VM register
    Pop {
        /// Destination register, or `None` to discard
        target: Option<VmRegister>,
        /// Width of the popped value
        size: IrSize,
    },
    /// Pop an address and push the value stored there
    MemRead(IrSize),
    /// Pop an address, pop a value, store the value at the address
    MemWrite(IrSize),
    /// Push a native register from the VM context
    ContextLoad(X86Register),
    /// Pop into a native register of the VM context
    ContextStore(X86Register),
    /// Push the saved flags register
    FlagsLoad,
    /// Pop a flags value and merge the masked bits into the saved flags register
    FlagsStore(CpuFlags),
    /// Compare the two topmost values
    Compare(IrSize),
    /// Combine the two topmost values
    Logic(LogicOp, IrSize),
    /// Run a virtualized instruction handler
    HandlerCall {
        /// Mnemonic the handler implements
        mnemonic: Mnemonic,
        /// Selected handler variant
        handler: HandlerId,
    },
    /// Sign-extend the top of the stack
    SignExtend {
        /// Current width
        from: IrSize,
        /// Resulting width
        to: IrSize,
    },
    /// Truncate or zero-extend the top of the stack
    Resize {
        /// Current width
        from: IrSize,
        /// Resulting width
        to: IrSize,
    },
    /// Transition from native into virtual execution
    VmEnter,
    /// Transition from virtual back to native execution at `target`
    VmExit(BranchTarget),
    /// Control transfer
    Branch(Branch),
    /// A relocated native instruction
    Native(EncodeRequest),
}

impl CommandKind {
    /// Returns the snake-case name of this command kind.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Returns true if this command may end a block (branch or VM exit).
    #[must_use]
    pub fn is_exit(&self) -> bool {
        matches!(self, CommandKind::Branch(_) | CommandKind::VmExit(_))
    }
}

/// One IR command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    id: CommandId,
    kind: CommandKind,
}

impl Command {
    /// Creates a command with an already allocated id.
    #[must_use]
    pub fn new(id: CommandId, kind: CommandKind) -> Self {
        Command { id, kind }
    }

    /// Returns the command's unique id.
    #[must_use]
    pub const fn id(&self) -> CommandId {
        self.id
    }

    /// Returns the operation of this command.
    #[must_use]
    pub const fn kind(&self) -> &CommandKind {
        &self.kind
    }

    /// Returns the branch if this command is one.
    #[must_use]
    pub fn as_branch(&self) -> Option<&Branch> {
        match &self.kind {
            CommandKind::Branch(branch) => Some(branch),
            _ => None,
        }
    }

    /// Returns the branch mutably if this command is one.
    pub fn as_branch_mut(&mut self) -> Option<&mut Branch> {
        match &mut self.kind {
            CommandKind::Branch(branch) => Some(branch),
            _ => None,
        }
    }

    /// Storage locations whose value this command reads.
    #[must_use]
    pub fn use_stores(&self) -> Vec<Store> {
        match &self.kind {
            CommandKind::Push {
                value: PushValue::Register(reg),
                ..
            } => vec![Store::Vm(*reg)],
            CommandKind::ContextLoad(reg) => vec![Store::Native(reg.full())],
            CommandKind::FlagsLoad => vec![Store::Flags],
            CommandKind::FlagsStore(_) => vec![Store::Flags],
            _ => Vec::new(),
        }
    }

    /// Every control-transfer target of this command.
    #[must_use]
    pub fn targets(&self) -> Vec<BranchTarget> {
        match &self.kind {
            CommandKind::Branch(branch) => branch.targets().copied().collect(),
            CommandKind::VmExit(target) => vec![*target],
            _ => Vec::new(),
        }
    }

    /// Rewrites every target referring to block `old` so it refers to `new`.
    ///
    /// This is the only mutation a command supports. Returns the number of rewritten
    /// targets.
    pub fn rewrite_target(&mut self, old: BlockId, new: BranchTarget) -> usize {
        match &mut self.kind {
            CommandKind::Branch(branch) => branch.rewrite_branch(old, new),
            CommandKind::VmExit(target) => usize::from(target.rewrite(old, new)),
            _ => 0,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CommandKind::Push { value, size } => write!(f, "push.{size} {value}"),
            CommandKind::Pop { target, size } => match target {
                Some(reg) => write!(f, "pop.{size} {reg}"),
                None => write!(f, "pop.{size}"),
            },
            CommandKind::MemRead(size) => write!(f, "mem_read.{size}"),
            CommandKind::MemWrite(size) => write!(f, "mem_write.{size}"),
            CommandKind::ContextLoad(reg) => write!(f, "context_load {reg}"),
            CommandKind::ContextStore(reg) => write!(f, "context_store {reg}"),
            CommandKind::FlagsLoad => write!(f, "flags_load"),
            CommandKind::FlagsStore(mask) => write!(f, "flags_store {mask}"),
            CommandKind::Compare(size) => write!(f, "compare.{size}"),
            CommandKind::Logic(op, size) => write!(f, "{op}.{size}"),
            CommandKind::HandlerCall { mnemonic, handler } => {
                write!(f, "handler_call {mnemonic} {handler}")
            }
            CommandKind::SignExtend { from, to } => write!(f, "sx {from}->{to}"),
            CommandKind::Resize { from, to } => write!(f, "resize {from}->{to}"),
            CommandKind::VmEnter => write!(f, "vm_enter"),
            CommandKind::VmExit(target) => write!(f, "vm_exit {target}"),
            CommandKind::Branch(branch) => write!(f, "{branch}"),
            CommandKind::Native(request) => write!(f, "x86 {request}"),
        }
    }
}
