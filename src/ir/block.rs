//! IR blocks.

use std::fmt;

use strum::Display;

use crate::{
    ir::{Branch, BranchTarget, Command, CommandKind},
    Error, Result,
};

/// Stable handle of a block in a [`crate::ir::BlockArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl BlockId {
    /// Create a new `BlockId`
    #[must_use]
    pub const fn new(index: usize) -> Self {
        BlockId(index)
    }

    /// Returns the arena index
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block_{}", self.0)
    }
}

/// Execution state of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum BlockState {
    /// Original machine instructions, executed directly
    Native,
    /// Virtualized commands, executed through handler dispatch
    Virtual,
}

impl BlockState {
    /// Returns true if a command of this kind may be placed in a block of this state.
    ///
    /// Native blocks hold relocated instructions, branches and VM transitions. Virtual
    /// blocks hold everything except relocated instructions.
    #[must_use]
    pub fn allows(&self, kind: &CommandKind) -> bool {
        match self {
            BlockState::Native => matches!(
                kind,
                CommandKind::Native(_)
                    | CommandKind::Branch(_)
                    | CommandKind::VmEnter
                    | CommandKind::VmExit(_)
            ),
            BlockState::Virtual => !matches!(kind, CommandKind::Native(_)),
        }
    }
}

/// An ordered sequence of commands, tagged with its execution state.
///
/// The tag fixes which commands the block accepts; [`IrBlock::push`] rejects the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrBlock {
    id: BlockId,
    state: BlockState,
    rva: Option<u64>,
    commands: Vec<Command>,
}

impl IrBlock {
    /// Creates an empty block.
    #[must_use]
    pub fn new(id: BlockId, state: BlockState) -> Self {
        IrBlock {
            id,
            state,
            rva: None,
            commands: Vec::new(),
        }
    }

    /// Creates an empty block that stands in for code at `rva`.
    #[must_use]
    pub fn with_rva(id: BlockId, state: BlockState, rva: u64) -> Self {
        IrBlock {
            id,
            state,
            rva: Some(rva),
            commands: Vec::new(),
        }
    }

    /// Returns the block's handle.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Returns the block's execution state.
    #[must_use]
    pub const fn state(&self) -> BlockState {
        self.state
    }

    /// Returns true for virtual blocks.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.state == BlockState::Virtual
    }

    /// Returns the rva of the native code this block replaces, if it has one.
    #[must_use]
    pub const fn rva(&self) -> Option<u64> {
        self.rva
    }

    /// Returns the commands in order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Returns the number of commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if the block holds no commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Appends a command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalCommand`] if the block's state does not allow the command.
    pub fn push(&mut self, command: Command) -> Result<()> {
        if !self.state.allows(command.kind()) {
            return Err(Error::IllegalCommand {
                command: command.kind().name(),
                state: self.state,
            });
        }
        self.commands.push(command);
        Ok(())
    }

    /// Appends a sequence of commands, stopping at the first rejected one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalCommand`] if the block's state does not allow a command.
    pub fn extend(&mut self, commands: impl IntoIterator<Item = Command>) -> Result<()> {
        for command in commands {
            self.push(command)?;
        }
        Ok(())
    }

    /// Removes and returns the last command.
    pub fn pop(&mut self) -> Option<Command> {
        self.commands.pop()
    }

    /// Returns the last command, the block's exit.
    #[must_use]
    pub fn exit(&self) -> Option<&Command> {
        self.commands.last()
    }

    /// Returns the exit as a branch, if the last command is one.
    #[must_use]
    pub fn exit_as_branch(&self) -> Option<&Branch> {
        self.commands.last().and_then(Command::as_branch)
    }

    /// Rewrites the targets of the block's exit command from `old` to `new`.
    ///
    /// Returns the number of rewritten targets. Commands before the exit are not touched.
    pub fn rewrite_exit(&mut self, old: BlockId, new: BranchTarget) -> usize {
        self.commands
            .last_mut()
            .map_or(0, |command| command.rewrite_target(old, new))
    }

    /// Rewrites the targets of every command in the block from `old` to `new`.
    pub fn rewrite_all(&mut self, old: BlockId, new: BranchTarget) -> usize {
        self.commands
            .iter_mut()
            .map(|command| command.rewrite_target(old, new))
            .sum()
    }

    /// Every control-transfer target referenced by the block's commands.
    #[must_use]
    pub fn targets(&self) -> Vec<BranchTarget> {
        self.commands.iter().flat_map(Command::targets).collect()
    }

    /// Returns true if the block is exactly a VM entry followed by a VM exit.
    #[must_use]
    pub fn is_enter_exit_only(&self) -> bool {
        matches!(
            self.commands.as_slice(),
            [enter, exit]
                if matches!(enter.kind(), CommandKind::VmEnter)
                    && matches!(exit.kind(), CommandKind::VmExit(_))
        )
    }
}

impl fmt::Display for IrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}):", self.id, self.state)?;
        for command in &self.commands {
            writeln!(f, "  {command}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{Mnemonic, X86Register},
        codec::EncodeRequest,
        ir::CommandId,
    };

    fn cmd(id: u64, kind: CommandKind) -> Command {
        Command::new(CommandId(id), kind)
    }

    #[test]
    fn test_native_rejects_virtual_commands() {
        let mut block = IrBlock::new(BlockId::new(0), BlockState::Native);
        let result = block.push(cmd(0, CommandKind::ContextLoad(X86Register::Rax)));
        assert!(matches!(
            result,
            Err(Error::IllegalCommand {
                command: "context_load",
                state: BlockState::Native
            })
        ));
        assert!(block.is_empty());

        block
            .push(cmd(1, CommandKind::Native(EncodeRequest::new(Mnemonic::Cpuid))))
            .unwrap();
        block
            .push(cmd(2, CommandKind::Branch(Branch::jump(BlockId::new(1), false))))
            .unwrap();
        assert_eq!(block.len(), 2);
        assert!(block.exit_as_branch().is_some());
    }

    #[test]
    fn test_virtual_rejects_native_commands() {
        let mut block = IrBlock::new(BlockId::new(0), BlockState::Virtual);
        assert!(block
            .push(cmd(0, CommandKind::Native(EncodeRequest::new(Mnemonic::Nop))))
            .is_err());
        assert!(block.push(cmd(1, CommandKind::VmEnter)).is_ok());
        assert!(block.push(cmd(2, CommandKind::FlagsLoad)).is_ok());
    }

    #[test]
    fn test_enter_exit_only() {
        let mut block = IrBlock::new(BlockId::new(0), BlockState::Virtual);
        block.push(cmd(0, CommandKind::VmEnter)).unwrap();
        assert!(!block.is_enter_exit_only());
        block
            .push(cmd(1, CommandKind::VmExit(BlockId::new(5).into())))
            .unwrap();
        assert!(block.is_enter_exit_only());
        block.push(cmd(2, CommandKind::FlagsLoad)).unwrap();
        assert!(!block.is_enter_exit_only());
    }

    #[test]
    fn test_rewrite_exit_only_touches_last() {
        let old = BlockId::new(4);
        let new = BlockId::new(9);
        let mut block = IrBlock::new(BlockId::new(0), BlockState::Virtual);
        block.push(cmd(0, CommandKind::VmExit(old.into()))).unwrap();
        block
            .push(cmd(1, CommandKind::Branch(Branch::jump(old, true))))
            .unwrap();

        assert_eq!(block.rewrite_exit(old, new.into()), 1);
        assert_eq!(
            block.targets(),
            vec![BranchTarget::Block(old), BranchTarget::Block(new)]
        );
        assert_eq!(block.rewrite_all(old, new.into()), 1);
    }
}
