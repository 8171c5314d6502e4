//! Processor flag liveness analysis.
//!
//! A flag is *live* at a program point if some path from that point reads the flag before
//! an instruction overwrites it. The lifter uses this to avoid materializing flags that
//! nobody observes.
//!
//! # Algorithm
//!
//! This is a backward data flow analysis over the disassembler's blocks:
//!
//! - `READ[i]` = flags instruction `i` observes
//! - `DEF[i]` = flags instruction `i` always overwrites
//! - `OUT[B]` = ∪{IN[S] | S is a successor of B}
//! - `IN[i]` = READ[i] ∪ (OUT[i] - DEF[i])
//!
//! Blocks are visited in reverse address order until no block's entry set changes.
//! Edges that leave the function (returns, external targets) are conservatively treated
//! as reading every flag.

use std::collections::HashMap;

use crate::{
    analysis::x86::{defined_flags, instruction_flags, read_flags, CpuFlags, DecodedInstruction},
    disassembler::{BasicBlock, BlockEndReason, Disassembler},
};

/// Live flags around one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagLiveness {
    /// Flags live before the instruction executes
    pub live_in: CpuFlags,
    /// Flags live after the instruction executes
    pub live_out: CpuFlags,
}

/// Flag liveness provider consumed by the lifter.
///
/// Implementations are read-only after construction, so one analyzer can serve parallel
/// lifting.
pub trait LivenessAnalyzer: Send + Sync {
    /// Per-instruction liveness for `block`, indexed like `block.instructions`.
    fn analyze_block(&self, block: &BasicBlock) -> Vec<FlagLiveness>;

    /// Flags `instruction` can affect.
    fn compute_inst_flags(&self, instruction: &DecodedInstruction) -> CpuFlags {
        instruction_flags(instruction)
    }
}

/// Whole-function flag liveness computed from a [`Disassembler`].
///
/// # Example
///
/// ```rust,ignore
/// use vmir::analysis::{FlagLivenessAnalyzer, LivenessAnalyzer};
///
/// let liveness = FlagLivenessAnalyzer::new(&disassembler);
/// for (index, live) in liveness.analyze_block(&block).iter().enumerate() {
///     println!("{index}: in={} out={}", live.live_in, live.live_out);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct FlagLivenessAnalyzer {
    /// Live-in set of each block, keyed by block rva.
    block_in: HashMap<u64, CpuFlags>,
    /// Fixpoint iterations the solver needed.
    iterations: usize,
}

impl FlagLivenessAnalyzer {
    /// Runs the analysis over every block the disassembler reports.
    #[must_use]
    pub fn new(disassembler: &dyn Disassembler) -> Self {
        let blocks = disassembler.blocks();
        let mut analyzer = FlagLivenessAnalyzer {
            block_in: blocks.iter().map(|b| (b.rva, CpuFlags::empty())).collect(),
            iterations: 0,
        };

        let mut changed = true;
        while changed {
            changed = false;
            analyzer.iterations += 1;

            for block in blocks.iter().rev() {
                let live_in = analyzer
                    .walk_block(block)
                    .first()
                    .map_or_else(|| analyzer.block_out(block), |l| l.live_in);

                if analyzer.block_in.insert(block.rva, live_in) != Some(live_in) {
                    changed = true;
                }
            }
        }

        analyzer
    }

    /// Returns the number of fixpoint iterations the solver performed.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Returns the flags live on entry to the block starting at `rva`.
    #[must_use]
    pub fn block_live_in(&self, rva: u64) -> Option<CpuFlags> {
        self.block_in.get(&rva).copied()
    }

    fn block_out(&self, block: &BasicBlock) -> CpuFlags {
        if block.end_reason == BlockEndReason::Return {
            return CpuFlags::all();
        }

        block
            .branches
            .iter()
            .map(|branch| {
                self.block_in
                    .get(&branch.target_rva)
                    .copied()
                    .unwrap_or(CpuFlags::all())
            })
            .fold(CpuFlags::empty(), |acc, live| acc | live)
    }

    fn walk_block(&self, block: &BasicBlock) -> Vec<FlagLiveness> {
        let mut result = vec![FlagLiveness::default(); block.instructions.len()];
        let mut live = self.block_out(block);

        for (index, inst) in block.instructions.iter().enumerate().rev() {
            let live_out = live;
            live = read_flags(inst.mnemonic) | (live_out - defined_flags(inst.mnemonic));
            result[index] = FlagLiveness {
                live_in: live,
                live_out,
            };
        }

        result
    }
}

impl LivenessAnalyzer for FlagLivenessAnalyzer {
    fn analyze_block(&self, block: &BasicBlock) -> Vec<FlagLiveness> {
        self.walk_block(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{Mnemonic, X86Register},
        disassembler::SegmentDisassembler,
        test::{arith, jcc, jmp, ret},
    };

    #[test]
    fn test_dead_flags_before_redefinition() {
        // add eax, 1 ; sub eax, 1 ; ret
        let disasm = SegmentDisassembler::from_instructions(vec![
            arith(0x0, Mnemonic::Add, X86Register::Eax, 1),
            arith(0x3, Mnemonic::Sub, X86Register::Eax, 1),
            ret(0x6),
        ])
        .unwrap();
        let liveness = FlagLivenessAnalyzer::new(&disasm);
        let result = liveness.analyze_block(&disasm.blocks()[0]);

        // sub overwrites every status flag add produced
        assert_eq!(result[0].live_out, CpuFlags::DF);
        // return leaves the function, so everything is live after sub
        assert_eq!(result[1].live_out, CpuFlags::all());
    }

    #[test]
    fn test_condition_keeps_flag_live() {
        // add eax, 1 ; jz 0x6 ; ret ; ret
        let disasm = SegmentDisassembler::from_instructions(vec![
            arith(0x0, Mnemonic::Add, X86Register::Eax, 1),
            jcc(0x3, Mnemonic::Jz, 0x6),
            ret(0x5),
            ret(0x6),
        ])
        .unwrap();
        let liveness = FlagLivenessAnalyzer::new(&disasm);
        let result = liveness.analyze_block(&disasm.blocks()[0]);

        assert!(result[0].live_out.contains(CpuFlags::ZF));
        assert_eq!(result[1].live_in, CpuFlags::all());
    }

    #[test]
    fn test_loop_fixpoint() {
        // 0x0: add eax, 1 ; 0x3: dec ecx ; 0x6: jnz 0x0 ; 0x8: sub eax, 1 ; 0xb: jmp 0xd ; 0xd: ret
        let disasm = SegmentDisassembler::from_instructions(vec![
            arith(0x0, Mnemonic::Add, X86Register::Eax, 1),
            arith(0x3, Mnemonic::Dec, X86Register::Ecx, 0),
            jcc(0x6, Mnemonic::Jnz, 0x0),
            arith(0x8, Mnemonic::Sub, X86Register::Eax, 1),
            jmp(0xb, 0xd),
            ret(0xd),
        ])
        .unwrap();
        let liveness = FlagLivenessAnalyzer::new(&disasm);
        assert!(liveness.iterations() >= 2);

        let loop_body = liveness.analyze_block(&disasm.blocks()[0]);
        assert!(loop_body[1].live_out.contains(CpuFlags::ZF));
        // CF survives dec, but both the back edge (add) and the exit (sub) redefine it
        assert_eq!(loop_body[0].live_out, CpuFlags::DF);
        assert_eq!(liveness.block_live_in(0x8), Some(CpuFlags::DF));
    }

    #[test]
    fn test_compute_inst_flags() {
        let disasm = SegmentDisassembler::default();
        let liveness = FlagLivenessAnalyzer::new(&disasm);
        let inc = arith(0, Mnemonic::Inc, X86Register::Eax, 0);
        assert_eq!(
            liveness.compute_inst_flags(&inc),
            CpuFlags::STATUS - CpuFlags::CF
        );
    }
}
