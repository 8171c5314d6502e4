//! Block storage and id allocation.
//!
//! Blocks reference each other only through [`BlockId`] handles. Removing a block leaves
//! an empty slot, so handles of other blocks stay valid and a branch to a removed block
//! can be detected instead of silently resolving to a different block.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::{
    ir::{BlockId, BlockState, BranchTarget, Command, CommandId, CommandKind, IrBlock},
    Error, Result,
};

/// Thread-safe source of block and command ids.
///
/// Units lifted in parallel draw from the same allocator, so every id is unique across
/// the whole function no matter which thread created it.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_block: AtomicUsize,
    next_command: AtomicU64,
}

impl IdAllocator {
    /// Creates an allocator starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh block id.
    pub fn block_id(&self) -> BlockId {
        BlockId(self.next_block.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocates a fresh command id.
    pub fn command_id(&self) -> CommandId {
        CommandId(self.next_command.fetch_add(1, Ordering::Relaxed))
    }

    /// Builds a command with a fresh id.
    pub fn command(&self, kind: CommandKind) -> Command {
        Command::new(self.command_id(), kind)
    }

    /// Returns the number of block ids handed out so far.
    #[must_use]
    pub fn blocks_allocated(&self) -> usize {
        self.next_block.load(Ordering::Relaxed)
    }
}

/// Owner of every IR block of a translated function.
#[derive(Debug, Clone, Default)]
pub struct BlockArena {
    blocks: Vec<Option<IrBlock>>,
}

impl BlockArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates and stores an empty block.
    pub fn create(&mut self, ids: &IdAllocator, state: BlockState) -> BlockId {
        let id = ids.block_id();
        self.insert(IrBlock::new(id, state));
        id
    }

    /// Stores a block under its own id, replacing whatever was there.
    pub fn insert(&mut self, block: IrBlock) {
        let index = block.id().index();
        if index >= self.blocks.len() {
            self.blocks.resize_with(index + 1, || None);
        }
        self.blocks[index] = Some(block);
    }

    /// Removes a block and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBlock`] if no live block has this id.
    pub fn remove(&mut self, id: BlockId) -> Result<IrBlock> {
        self.blocks
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or(Error::UnknownBlock(id))
    }

    /// Returns a block by id.
    #[must_use]
    pub fn get(&self, id: BlockId) -> Option<&IrBlock> {
        self.blocks.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns a block by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBlock`] if no live block has this id.
    pub fn block(&self, id: BlockId) -> Result<&IrBlock> {
        self.get(id).ok_or(Error::UnknownBlock(id))
    }

    /// Returns a block mutably by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBlock`] if no live block has this id.
    pub fn block_mut(&mut self, id: BlockId) -> Result<&mut IrBlock> {
        self.blocks
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(Error::UnknownBlock(id))
    }

    /// Returns true if `id` refers to a live block.
    #[must_use]
    pub fn contains(&self, id: BlockId) -> bool {
        self.get(id).is_some()
    }

    /// Iterates over all live blocks in id order.
    pub fn iter(&self) -> impl Iterator<Item = &IrBlock> {
        self.blocks.iter().flatten()
    }

    /// Returns the number of live blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns true if the arena holds no live blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(Option::is_none)
    }

    /// Returns true if `target` is an address or a live block.
    #[must_use]
    pub fn resolves(&self, target: &BranchTarget) -> bool {
        match target {
            BranchTarget::Block(id) => self.contains(*id),
            BranchTarget::Address(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_remove() {
        let ids = IdAllocator::new();
        let mut arena = BlockArena::new();

        let a = arena.create(&ids, BlockState::Virtual);
        let b = arena.create(&ids, BlockState::Native);
        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);
        assert_eq!(ids.blocks_allocated(), 2);
        assert_eq!(arena.block(b).unwrap().state(), BlockState::Native);

        let removed = arena.remove(a).unwrap();
        assert_eq!(removed.id(), a);
        assert!(!arena.contains(a));
        assert!(arena.contains(b));
        assert!(matches!(arena.remove(a), Err(Error::UnknownBlock(id)) if id == a));
        assert!(!arena.resolves(&BranchTarget::Block(a)));
        assert!(arena.resolves(&BranchTarget::Address(0x1234)));
    }

    #[test]
    fn test_insert_out_of_order() {
        let mut arena = BlockArena::new();
        arena.insert(IrBlock::new(BlockId::new(5), BlockState::Native));
        arena.insert(IrBlock::new(BlockId::new(2), BlockState::Virtual));

        let ids: Vec<_> = arena.iter().map(IrBlock::id).collect();
        assert_eq!(ids, vec![BlockId::new(2), BlockId::new(5)]);
        assert!(arena.get(BlockId::new(3)).is_none());
    }

    #[test]
    fn test_allocator_is_shared_across_threads() {
        let ids = IdAllocator::new();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        ids.command_id();
                    }
                });
            }
        });
        assert_eq!(ids.command_id(), CommandId(400));
    }
}
