//! Translation units.

use std::fmt;

use strum::Display;

use crate::{
    ir::{BlockArena, BlockId},
    Result,
};

/// Handle of a translation unit; equal to the index of its source basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub usize);

impl UnitId {
    /// Create a new `UnitId`
    #[must_use]
    pub const fn new(index: usize) -> Self {
        UnitId(index)
    }

    /// Returns the index of the unit and of its basic block
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit_{}", self.0)
    }
}

/// Lifecycle of a translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum UnitState {
    /// Head and tail are allocated but empty
    Uninitialized,
    /// The body is being built
    Lifting,
    /// The exit is attached (or dropped for returning units); only references change now
    Sealed,
}

/// The translation of one basic block: entry, body and exit blocks.
///
/// `head` and `tail` are allocated for every unit before any lifting starts, so branches
/// into a unit can be resolved while its body does not exist yet.
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    id: UnitId,
    rva: u64,
    state: UnitState,
    /// Virtual entry block; `None` once elided
    pub head: Option<BlockId>,
    /// Lifted blocks with alternating states
    pub body: Vec<BlockId>,
    /// Native exit block holding the unit's outgoing branch; `None` for returning units
    pub tail: Option<BlockId>,
}

impl TranslationUnit {
    /// Creates a unit with preallocated head and tail.
    #[must_use]
    pub fn new(id: UnitId, rva: u64, head: BlockId, tail: BlockId) -> Self {
        TranslationUnit {
            id,
            rva,
            state: UnitState::Uninitialized,
            head: Some(head),
            body: Vec::new(),
            tail: Some(tail),
        }
    }

    /// Returns the unit's handle.
    #[must_use]
    pub const fn id(&self) -> UnitId {
        self.id
    }

    /// Returns the rva of the source basic block.
    #[must_use]
    pub const fn rva(&self) -> u64 {
        self.rva
    }

    /// Returns the unit's lifecycle state.
    #[must_use]
    pub const fn state(&self) -> UnitState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: UnitState) {
        self.state = state;
    }

    /// Returns the first body block.
    #[must_use]
    pub fn first_body(&self) -> Option<BlockId> {
        self.body.first().copied()
    }

    /// Returns the last body block.
    #[must_use]
    pub fn last_body(&self) -> Option<BlockId> {
        self.body.last().copied()
    }

    /// Returns head, body and tail in order, skipping absent blocks.
    #[must_use]
    pub fn blocks(&self) -> Vec<BlockId> {
        self.head
            .iter()
            .chain(self.body.iter())
            .chain(self.tail.iter())
            .copied()
            .collect()
    }

    /// Returns the block inbound references should land on: the head if present,
    /// otherwise the first body block.
    #[must_use]
    pub fn representative(&self) -> Option<BlockId> {
        self.head.or_else(|| self.first_body())
    }

    /// Verifies that adjacent body blocks never share a state.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Invariant`] naming the first offending pair, or
    /// [`crate::Error::UnknownBlock`] if a body block is missing from `arena`.
    pub fn check_alternation(&self, arena: &BlockArena) -> Result<()> {
        for pair in self.body.windows(2) {
            let first = arena.block(pair[0])?;
            let second = arena.block(pair[1])?;
            if first.state() == second.state() {
                return Err(invariant_error!(
                    "{}: adjacent body blocks {} and {} are both {}",
                    self.id,
                    pair[0],
                    pair[1],
                    first.state()
                ));
            }
        }
        Ok(())
    }
}
