//! Interfaces between the translator and per-instruction lifters.
//!
//! A [`HandlerRegistry`] answers two questions for a mnemonic: which handler variant
//! (if any) implements a given operand shape, and how to build a lifter that turns one
//! instruction into virtual commands using that handler.

use crate::{
    analysis::{CpuFlags, DecodedInstruction, HandlerOperand, Mnemonic},
    ir::{Command, CommandKind, HandlerId, IdAllocator},
    translator::{BranchInfo, BranchResolver},
    Result,
};

/// Selects handler variants for one mnemonic.
pub trait HandlerGenerator: Send + Sync {
    /// The mnemonic this generator covers.
    fn mnemonic(&self) -> Mnemonic;

    /// Returns the handler implementing `operands`, or `None` if no variant matches.
    fn get_handler_id(&self, operands: &[HandlerOperand]) -> Option<HandlerId>;
}

/// Converts one instruction into virtual commands.
///
/// A lifter is created per instruction and used once.
pub trait InstructionLifter {
    /// Lifts the instruction at `rva`, materializing only `flags`.
    ///
    /// Returns `Ok(false)` when the instruction cannot be virtualized after all (an
    /// operand the VM cannot address, a jump without condition); the caller then keeps
    /// the instruction native.
    ///
    /// # Errors
    ///
    /// Returns an error only for invariant violations, never for unsupported input.
    fn translate_to_il(&mut self, rva: u64, flags: CpuFlags) -> Result<bool>;

    /// Takes the lifted commands, leaving the lifter empty.
    fn take_block(&mut self) -> Vec<Command>;
}

/// Everything a lifter may consult while lifting.
pub struct LiftContext<'a> {
    ids: &'a IdAllocator,
    resolver: &'a BranchResolver<'a>,
}

impl<'a> LiftContext<'a> {
    /// Creates a context over the shared id allocator and branch resolver.
    #[must_use]
    pub fn new(ids: &'a IdAllocator, resolver: &'a BranchResolver<'a>) -> Self {
        LiftContext { ids, resolver }
    }

    /// Builds a command with a fresh id.
    #[must_use]
    pub fn command(&self, kind: CommandKind) -> Command {
        self.ids.command(kind)
    }

    /// Returns the id allocator.
    #[must_use]
    pub fn ids(&self) -> &'a IdAllocator {
        self.ids
    }

    /// Resolves the exit of the basic block containing `rva`.
    ///
    /// # Errors
    ///
    /// Propagates the invariant violations of [`BranchResolver::branch_info`].
    pub fn branch_info(&self, rva: u64) -> Result<BranchInfo> {
        self.resolver.branch_info(rva)
    }
}

/// Registry of handler generators and lifter factories, keyed by mnemonic.
///
/// Conditional jumps are looked up under [`Mnemonic::Jmp`]; the condition is carried by
/// the emitted branch, not by the handler choice.
pub trait HandlerRegistry: Send + Sync {
    /// Returns the generator for `mnemonic`, if the registry covers it.
    fn handler_for(&self, mnemonic: Mnemonic) -> Option<&dyn HandlerGenerator>;

    /// Builds a lifter for `instruction` located at `rva`.
    ///
    /// Returns `None` if the registry has no lifter for `mnemonic`.
    fn lifter_for<'a>(
        &self,
        mnemonic: Mnemonic,
        context: &'a LiftContext<'a>,
        instruction: &'a DecodedInstruction,
        rva: u64,
    ) -> Option<Box<dyn InstructionLifter + 'a>>;
}
