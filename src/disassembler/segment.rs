//! Basic block partitioning over a contiguous code segment.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    analysis::{DecodedInstruction, Mnemonic},
    disassembler::{BasicBlock, BlockBranch, BlockEndReason, Disassembler},
    Result,
};

/// A [`Disassembler`] over one function's decoded instructions.
///
/// Blocks are kept sorted by rva. An rva index backs both exact and containing-block
/// lookups.
///
/// # Examples
///
/// ```rust
/// use vmir::analysis::{DecodedInstruction, Mnemonic, X86Operand, X86Register};
/// use vmir::disassembler::{BlockEndReason, Disassembler, SegmentDisassembler};
///
/// let instructions = vec![
///     DecodedInstruction::new(0x10, 3, Mnemonic::Add, vec![
///         X86Operand::Register(X86Register::Eax),
///         X86Operand::imm(1, 1),
///     ]),
///     DecodedInstruction::new(0x13, 1, Mnemonic::Ret, vec![]),
/// ];
///
/// let disassembler = SegmentDisassembler::from_instructions(instructions)?;
/// assert_eq!(disassembler.blocks().len(), 1);
/// assert_eq!(disassembler.blocks()[0].end_reason, BlockEndReason::Return);
/// assert!(disassembler.get_block(0x13, true).is_some());
/// assert!(disassembler.get_block(0x13, false).is_none());
/// # Ok::<(), vmir::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SegmentDisassembler {
    blocks: Vec<BasicBlock>,
    by_rva: BTreeMap<u64, usize>,
}

impl SegmentDisassembler {
    /// Partitions a linear instruction stream into basic blocks.
    ///
    /// Leaders are the first instruction, every in-range direct branch target, and every
    /// instruction following a terminator. Targets that do not land on an instruction
    /// boundary inside the stream are treated as external.
    ///
    /// # Arguments
    ///
    /// * `instructions` - The function's instructions, in any order
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if two instructions overlap.
    pub fn from_instructions(mut instructions: Vec<DecodedInstruction>) -> Result<Self> {
        instructions.sort_by_key(|i| i.rva);
        for pair in instructions.windows(2) {
            if pair[0].end_rva() > pair[1].rva {
                return Err(malformed_error!(
                    "Instruction at 0x{:x} overlaps instruction at 0x{:x}",
                    pair[0].rva,
                    pair[1].rva
                ));
            }
        }

        let starts: BTreeSet<u64> = instructions.iter().map(|i| i.rva).collect();
        let mut leaders = BTreeSet::new();
        if let Some(first) = instructions.first() {
            leaders.insert(first.rva);
        }
        for (index, inst) in instructions.iter().enumerate() {
            if inst.mnemonic.is_jmp_or_jcc() {
                if let Some(target) = inst.branch_target() {
                    if starts.contains(&target) {
                        leaders.insert(target);
                    }
                }
            }
            if inst.mnemonic.is_terminator() {
                if let Some(next) = instructions.get(index + 1) {
                    leaders.insert(next.rva);
                }
            }
        }

        let mut blocks: Vec<BasicBlock> = Vec::new();
        for (index, inst) in instructions.iter().enumerate() {
            let contiguous = index > 0 && instructions[index - 1].end_rva() == inst.rva;
            if leaders.contains(&inst.rva) || !contiguous {
                blocks.push(BasicBlock::new(
                    blocks.len(),
                    inst.rva,
                    BlockEndReason::Fallthrough,
                ));
            }
            if let Some(block) = blocks.last_mut() {
                block.instructions.push(inst.clone());
            }
        }

        for block in &mut blocks {
            let end_rva = block.end_rva();
            let Some(last) = block.instructions.last() else {
                continue;
            };

            let (reason, branches) = match last.mnemonic {
                Mnemonic::Jmp => match last.branch_target() {
                    Some(target) => (
                        BlockEndReason::UnconditionalJump,
                        vec![BlockBranch::new(target)],
                    ),
                    None => (BlockEndReason::Return, Vec::new()),
                },
                m if m.is_conditional_jump() => match last.branch_target() {
                    Some(target) => (
                        BlockEndReason::ConditionalJump,
                        vec![BlockBranch::new(target), BlockBranch::new(end_rva)],
                    ),
                    None => (BlockEndReason::Return, Vec::new()),
                },
                Mnemonic::Ret | Mnemonic::Hlt => (BlockEndReason::Return, Vec::new()),
                _ => (
                    BlockEndReason::Fallthrough,
                    vec![BlockBranch::new(end_rva)],
                ),
            };
            block.end_reason = reason;
            block.branches = branches;
        }

        Self::from_blocks(blocks)
    }

    /// Wraps prepared blocks, as produced by an external disassembler.
    ///
    /// Blocks are sorted by rva and renumbered in that order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a block is empty or two blocks overlap.
    pub fn from_blocks(mut blocks: Vec<BasicBlock>) -> Result<Self> {
        blocks.sort_by_key(|b| b.rva);

        let mut by_rva = BTreeMap::new();
        for (index, block) in blocks.iter_mut().enumerate() {
            if block.instructions.is_empty() {
                return Err(malformed_error!("Block at 0x{:x} is empty", block.rva));
            }
            block.id = index;
            by_rva.insert(block.rva, index);
        }

        for pair in blocks.windows(2) {
            if pair[0].end_rva() > pair[1].rva {
                return Err(malformed_error!(
                    "Block at 0x{:x} overlaps block at 0x{:x}",
                    pair[0].rva,
                    pair[1].rva
                ));
            }
        }

        Ok(SegmentDisassembler { blocks, by_rva })
    }

    /// Returns the entry rva of the function, if there are any blocks.
    #[must_use]
    pub fn entry_rva(&self) -> Option<u64> {
        self.blocks.first().map(|b| b.rva)
    }
}

impl Disassembler for SegmentDisassembler {
    fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    fn get_block(&self, rva: u64, inclusive: bool) -> Option<&BasicBlock> {
        if !inclusive {
            return self.by_rva.get(&rva).map(|&index| &self.blocks[index]);
        }

        let (_, &index) = self.by_rva.range(..=rva).next_back()?;
        let block = &self.blocks[index];
        block.contains(rva).then_some(block)
    }
}
