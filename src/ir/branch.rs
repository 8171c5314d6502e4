//! Branch commands and their resolvable targets.

use std::fmt;

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::ir::BlockId;

/// Normalized test of a control transfer.
///
/// Each pair of complementary conditional jumps (`jz`/`jnz`) shares one condition and is
/// told apart by the branch's inversion flag.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum ExitCondition {
    /// No condition could be derived; the jump cannot be virtualized
    None,
    /// Unconditional transfer
    Jmp,
    /// Overflow
    Jo,
    /// Sign
    Js,
    /// Equal / zero
    Je,
    /// Below (unsigned)
    Jb,
    /// Below or equal (unsigned)
    Jbe,
    /// Less (signed)
    Jl,
    /// Less or equal (signed)
    Jle,
    /// Parity
    Jp,
    /// CX is zero
    Jcxz,
    /// ECX is zero
    Jecxz,
    /// RCX is zero
    Jrcxz,
}

impl ExitCondition {
    /// Returns true if this condition selects between two targets.
    #[must_use]
    pub const fn is_conditional(&self) -> bool {
        !matches!(self, ExitCondition::None | ExitCondition::Jmp)
    }
}

/// Where a branch transfers control to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchTarget {
    /// A block in the arena
    Block(BlockId),
    /// An absolute rva outside the translated function
    Address(u64),
}

impl BranchTarget {
    /// Returns the block handle, if this target is a block.
    #[must_use]
    pub const fn as_block(&self) -> Option<BlockId> {
        match self {
            BranchTarget::Block(id) => Some(*id),
            BranchTarget::Address(_) => None,
        }
    }

    /// Replaces this target with `new` if it currently refers to block `old`.
    ///
    /// Returns true if the target was rewritten.
    pub fn rewrite(&mut self, old: BlockId, new: BranchTarget) -> bool {
        if *self == BranchTarget::Block(old) {
            *self = new;
            return true;
        }
        false
    }
}

impl From<BlockId> for BranchTarget {
    fn from(id: BlockId) -> Self {
        BranchTarget::Block(id)
    }
}

impl fmt::Display for BranchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchTarget::Block(id) => write!(f, "{id}"),
            BranchTarget::Address(rva) => write!(f, "0x{rva:x}"),
        }
    }
}

/// A control transfer with one or two targets.
///
/// When `condition` is conditional, control goes to `conditional` if the condition
/// (negated when `inverted`) holds, and to `fallthrough` otherwise. Unconditional branches
/// only use `fallthrough`.
///
/// `virtual_branch` tells emission whether the transfer happens inside the VM
/// (dispatching to another virtual block) or as a native jump.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Branch {
    /// Normalized condition
    pub condition: ExitCondition,
    /// Whether the condition is tested negated
    pub inverted: bool,
    /// Whether the transfer stays inside the VM
    pub virtual_branch: bool,
    /// Target when the condition does not hold, or the only target
    pub fallthrough: BranchTarget,
    /// Target when the condition holds
    pub conditional: Option<BranchTarget>,
}

impl Branch {
    /// Creates an unconditional branch to `target`.
    #[must_use]
    pub fn jump(target: impl Into<BranchTarget>, virtual_branch: bool) -> Self {
        Branch {
            condition: ExitCondition::Jmp,
            inverted: false,
            virtual_branch,
            fallthrough: target.into(),
            conditional: None,
        }
    }

    /// Iterates over every target of this branch.
    pub fn targets(&self) -> impl Iterator<Item = &BranchTarget> {
        self.conditional.iter().chain(std::iter::once(&self.fallthrough))
    }

    /// Rewrites every target referring to `old` so that it refers to `new`.
    ///
    /// Returns the number of rewritten targets.
    pub fn rewrite_branch(&mut self, old: BlockId, new: BranchTarget) -> usize {
        let mut count = usize::from(self.fallthrough.rewrite(old, new));
        if let Some(conditional) = &mut self.conditional {
            count += usize::from(conditional.rewrite(old, new));
        }
        count
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.virtual_branch { "vbranch" } else { "branch" };
        match self.conditional {
            Some(conditional) => {
                let negation = if self.inverted { "!" } else { "" };
                write!(
                    f,
                    "{kind} {negation}{} {conditional} else {}",
                    self.condition, self.fallthrough
                )
            }
            None => write!(f, "{kind} {}", self.fallthrough),
        }
    }
}
