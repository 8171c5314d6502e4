use std::fmt;

use strum::Display;

use crate::analysis::DecodedInstruction;

/// How control leaves a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum BlockEndReason {
    /// The block runs into the instruction following it (the next instruction is a leader)
    Fallthrough,
    /// The block ends with an unconditional direct jump
    UnconditionalJump,
    /// The block ends with a conditional jump
    ConditionalJump,
    /// The block leaves the function (return, halt, or an untracked indirect jump)
    Return,
}

impl BlockEndReason {
    /// The number of successor branches a block with this end reason must carry.
    #[must_use]
    pub const fn expected_branches(&self) -> usize {
        match self {
            BlockEndReason::Fallthrough | BlockEndReason::UnconditionalJump => 1,
            BlockEndReason::ConditionalJump => 2,
            BlockEndReason::Return => 0,
        }
    }
}

/// A resolved successor of a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockBranch {
    /// Absolute rva control transfers to
    pub target_rva: u64,
}

impl BlockBranch {
    /// Create a new branch descriptor
    #[must_use]
    pub const fn new(target_rva: u64) -> Self {
        BlockBranch { target_rva }
    }
}

/// A basic block of native instructions, as partitioned by the disassembler.
///
/// For conditional jumps, `branches[0]` is the taken target and `branches[1]` the
/// fallthrough target.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Position of this block in the disassembler's block list
    pub id: usize,
    /// The rva of the first instruction
    pub rva: u64,
    /// Instructions of this block, in address order
    pub instructions: Vec<DecodedInstruction>,
    /// How control leaves this block
    pub end_reason: BlockEndReason,
    /// Successor descriptors (zero, one or two)
    pub branches: Vec<BlockBranch>,
}

impl BasicBlock {
    /// Create a new basic block
    ///
    /// ## Arguments
    /// * `id` - The id of this block
    /// * `rva` - The rva of the first instruction
    /// * `end_reason` - How control leaves this block
    #[must_use]
    pub fn new(id: usize, rva: u64, end_reason: BlockEndReason) -> Self {
        BasicBlock {
            id,
            rva,
            instructions: Vec::new(),
            end_reason,
            branches: Vec::new(),
        }
    }

    /// Total encoded size of all instructions in bytes
    #[must_use]
    pub fn size(&self) -> u64 {
        self.instructions.iter().map(|i| i.length as u64).sum()
    }

    /// The rva directly after the last instruction
    #[must_use]
    pub fn end_rva(&self) -> u64 {
        self.rva.wrapping_add(self.size())
    }

    /// Returns true if `rva` lies within this block
    #[must_use]
    pub fn contains(&self, rva: u64) -> bool {
        rva >= self.rva && rva < self.end_rva()
    }

    /// The rva of the instruction at `index`, if it exists
    #[must_use]
    pub fn index_rva(&self, index: usize) -> Option<u64> {
        self.instructions.get(index).map(|i| i.rva)
    }

    /// The last instruction of this block
    #[must_use]
    pub fn terminator(&self) -> Option<&DecodedInstruction> {
        self.instructions.last()
    }

    /// Returns the number of instructions
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {} @ 0x{:x} ({} instructions, {})",
            self.id,
            self.rva,
            self.instructions.len(),
            self.end_reason
        )
    }
}
