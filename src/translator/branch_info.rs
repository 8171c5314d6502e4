//! Resolution of a basic block's exit into IR branch targets.

use crate::{
    analysis::Mnemonic,
    disassembler::{BlockEndReason, Disassembler},
    ir::{BlockId, Branch, BranchTarget, ExitCondition},
    Result,
};

/// The resolved exit of a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchInfo {
    /// Normalized exit condition
    pub condition: ExitCondition,
    /// Whether the condition is tested negated
    pub inverted: bool,
    /// Target taken when the condition holds (conditional jumps only)
    pub conditional: Option<BranchTarget>,
    /// Target taken otherwise, or the only target
    pub fallthrough: BranchTarget,
}

impl BranchInfo {
    /// Builds the branch command payload for this exit.
    #[must_use]
    pub fn to_branch(&self, virtual_branch: bool) -> Branch {
        Branch {
            condition: self.condition,
            inverted: self.inverted,
            virtual_branch,
            fallthrough: self.fallthrough,
            conditional: self.conditional,
        }
    }
}

/// Maps a jump mnemonic to its normalized condition and inversion flag.
///
/// Complementary forms share a condition: `jz` is `(je, false)` and `jnz` is
/// `(je, true)`. Mask-register jumps have no condition and map to
/// [`ExitCondition::None`].
///
/// # Errors
///
/// Returns [`crate::Error::Invariant`] for mnemonics that are not jumps.
pub fn exit_condition(mnemonic: Mnemonic) -> Result<(ExitCondition, bool)> {
    Ok(match mnemonic {
        Mnemonic::Jo => (ExitCondition::Jo, false),
        Mnemonic::Jno => (ExitCondition::Jo, true),
        Mnemonic::Js => (ExitCondition::Js, false),
        Mnemonic::Jns => (ExitCondition::Js, true),
        Mnemonic::Jz => (ExitCondition::Je, false),
        Mnemonic::Jnz => (ExitCondition::Je, true),
        Mnemonic::Jb => (ExitCondition::Jb, false),
        Mnemonic::Jnb => (ExitCondition::Jb, true),
        Mnemonic::Jbe => (ExitCondition::Jbe, false),
        Mnemonic::Jnbe => (ExitCondition::Jbe, true),
        Mnemonic::Jl => (ExitCondition::Jl, false),
        Mnemonic::Jnl => (ExitCondition::Jl, true),
        Mnemonic::Jle => (ExitCondition::Jle, false),
        Mnemonic::Jnle => (ExitCondition::Jle, true),
        Mnemonic::Jp => (ExitCondition::Jp, false),
        Mnemonic::Jnp => (ExitCondition::Jp, true),
        Mnemonic::Jcxz => (ExitCondition::Jcxz, false),
        Mnemonic::Jecxz => (ExitCondition::Jecxz, false),
        Mnemonic::Jrcxz => (ExitCondition::Jrcxz, false),
        Mnemonic::Jmp => (ExitCondition::Jmp, false),
        Mnemonic::Jknzd | Mnemonic::Jkzd => (ExitCondition::None, false),
        other => {
            return Err(invariant_error!(
                "invalid conditional jump reached: {}",
                other
            ))
        }
    })
}

/// Resolves successor rvas to unit heads.
///
/// Holds the head of every unit, indexed by basic block id, as allocated before lifting.
pub struct BranchResolver<'a> {
    disassembler: &'a dyn Disassembler,
    heads: &'a [BlockId],
}

impl<'a> BranchResolver<'a> {
    /// Creates a resolver over `disassembler` with the preallocated unit `heads`.
    #[must_use]
    pub fn new(disassembler: &'a dyn Disassembler, heads: &'a [BlockId]) -> Self {
        BranchResolver {
            disassembler,
            heads,
        }
    }

    /// Returns the disassembler the resolver reads from.
    #[must_use]
    pub fn disassembler(&self) -> &'a dyn Disassembler {
        self.disassembler
    }

    /// Resolves `rva` to the head of the unit starting there, or to a raw address when
    /// no block of the function starts at `rva`.
    #[must_use]
    pub fn resolve(&self, rva: u64) -> BranchTarget {
        self.disassembler
            .get_block(rva, false)
            .and_then(|block| self.heads.get(block.id))
            .map_or(BranchTarget::Address(rva), |head| BranchTarget::Block(*head))
    }

    /// Builds the branch info of the basic block containing `inst_rva`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Invariant`] if no block contains `inst_rva`, if the block
    /// returns, if the number of successors does not match the end reason, or if the
    /// terminating mnemonic is not a jump.
    pub fn branch_info(&self, inst_rva: u64) -> Result<BranchInfo> {
        let Some(block) = self.disassembler.get_block(inst_rva, true) else {
            return Err(invariant_error!("no basic block contains 0x{:x}", inst_rva));
        };
        let branches = &block.branches;

        match block.end_reason {
            BlockEndReason::Fallthrough | BlockEndReason::UnconditionalJump => {
                if branches.len() != 1 {
                    return Err(invariant_error!(
                        "{} must have exactly one branch, found {}",
                        block,
                        branches.len()
                    ));
                }

                Ok(BranchInfo {
                    condition: ExitCondition::Jmp,
                    inverted: false,
                    conditional: None,
                    fallthrough: self.resolve(branches[0].target_rva),
                })
            }
            BlockEndReason::ConditionalJump => {
                if branches.len() != 2 {
                    return Err(invariant_error!(
                        "{} must have exactly two branches, found {}",
                        block,
                        branches.len()
                    ));
                }
                let Some(terminator) = block.terminator() else {
                    return Err(invariant_error!("{} has no terminating instruction", block));
                };
                let (condition, inverted) = exit_condition(terminator.mnemonic)?;

                Ok(BranchInfo {
                    condition,
                    inverted,
                    conditional: Some(self.resolve(branches[0].target_rva)),
                    fallthrough: self.resolve(branches[1].target_rva),
                })
            }
            BlockEndReason::Return => Err(invariant_error!(
                "{} returns and has no branch info",
                block
            )),
        }
    }
}
