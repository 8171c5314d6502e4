//! The result of translating one function.

use crate::{
    ir::{dot::DotWriter, BlockArena, BlockId, BranchTarget, IdAllocator, IrBlock},
    translator::{TranslationUnit, UnitId},
    Error, Result,
};

/// Every translation unit of a function together with the blocks they reference.
///
/// Units are indexed by the position of their source basic block, so [`UnitId`] doubles
/// as the basic block index.
#[derive(Debug)]
pub struct TranslatedFunction {
    pub(crate) arena: BlockArena,
    pub(crate) units: Vec<TranslationUnit>,
    pub(crate) ids: IdAllocator,
}

impl TranslatedFunction {
    pub(crate) fn new(arena: BlockArena, units: Vec<TranslationUnit>, ids: IdAllocator) -> Self {
        TranslatedFunction { arena, units, ids }
    }

    /// Returns the block arena.
    #[must_use]
    pub fn arena(&self) -> &BlockArena {
        &self.arena
    }

    /// Returns all units in basic block order.
    #[must_use]
    pub fn units(&self) -> &[TranslationUnit] {
        &self.units
    }

    /// Returns the id allocator the function's blocks and commands were numbered with.
    #[must_use]
    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    /// Returns a unit by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownUnit`] if the function has no such unit.
    pub fn unit(&self, id: UnitId) -> Result<&TranslationUnit> {
        self.units.get(id.index()).ok_or(Error::UnknownUnit(id))
    }

    /// Returns a block by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBlock`] if no live block has this id.
    pub fn block(&self, id: BlockId) -> Result<&IrBlock> {
        self.arena.block(id)
    }

    /// Returns the index of the basic block `unit` was translated from.
    #[must_use]
    pub fn map_basic_block(&self, unit: UnitId) -> Option<usize> {
        self.units.get(unit.index()).map(|u| u.id().index())
    }

    /// Returns the unit translated from the basic block at `block_index`.
    #[must_use]
    pub fn map_unit(&self, block_index: usize) -> Option<&TranslationUnit> {
        self.units.get(block_index)
    }

    /// Returns the unit whose source basic block starts at `rva`.
    #[must_use]
    pub fn unit_at(&self, rva: u64) -> Option<&TranslationUnit> {
        self.units.iter().find(|unit| unit.rva() == rva)
    }

    /// Lists every branch target that names a block no longer in the arena.
    ///
    /// Each entry is the referencing block and the unresolved target. An empty result
    /// means every rewrite reached all of its referrers.
    #[must_use]
    pub fn dangling_references(&self) -> Vec<(BlockId, BranchTarget)> {
        let arena = &self.arena;
        arena
            .iter()
            .flat_map(|block| {
                block
                    .targets()
                    .into_iter()
                    .filter(move |target| !arena.resolves(target))
                    .map(move |target| (block.id(), target))
            })
            .collect()
    }

    /// Verifies the body alternation of every unit.
    ///
    /// # Errors
    ///
    /// Returns the first violation found, see [`TranslationUnit::check_alternation`].
    pub fn check_alternation(&self) -> Result<()> {
        self.units
            .iter()
            .try_for_each(|unit| unit.check_alternation(&self.arena))
    }

    /// Renders all units as a Graphviz digraph, one cluster per unit.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut dot = DotWriter::new("function");
        for unit in &self.units {
            dot.begin_cluster(&format!("{} @ 0x{:x}", unit.id(), unit.rva()));
            let roles = unit
                .head
                .iter()
                .map(|id| (*id, "head"))
                .chain(unit.body.iter().map(|id| (*id, "body")))
                .chain(unit.tail.iter().map(|id| (*id, "tail")));
            for (id, role) in roles {
                if let Some(block) = self.arena.get(id) {
                    dot.block(block, role);
                }
            }
            dot.end_cluster();
        }
        for block in self.arena.iter() {
            dot.edges(block);
        }
        dot.finish()
    }
}
