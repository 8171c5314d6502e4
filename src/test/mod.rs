//! Shared fixtures for unit tests: instruction builders and a ready-made function.

use crate::{
    analysis::{DecodedInstruction, FlagLivenessAnalyzer, Mnemonic, X86Operand, X86Register},
    disassembler::{Disassembler, SegmentDisassembler},
    ir::BlockId,
    translator::{
        BranchResolver, IrTranslator, StandardRegistry, TranslatedFunction, TranslatorConfig,
    },
};

// Operand helper for a register
pub fn op_reg(register: X86Register) -> X86Operand {
    X86Operand::Register(register)
}

// Operand helper for an 8-bit immediate
pub fn op_imm(value: i64) -> X86Operand {
    X86Operand::imm(value, 1)
}

fn relative(rva: u64, length: usize, target: u64) -> X86Operand {
    X86Operand::Relative {
        displacement: target.wrapping_sub(rva + length as u64) as i64,
        size: 1,
    }
}

// Instruction without operands
pub fn inst(rva: u64, length: usize, mnemonic: Mnemonic) -> DecodedInstruction {
    DecodedInstruction::new(rva, length, mnemonic, vec![])
}

// Three-byte arithmetic instruction; `inc`, `dec`, `neg` and `not` take only `reg`
pub fn arith(rva: u64, mnemonic: Mnemonic, reg: X86Register, imm: i64) -> DecodedInstruction {
    let operands = match mnemonic {
        Mnemonic::Inc | Mnemonic::Dec | Mnemonic::Neg | Mnemonic::Not => vec![op_reg(reg)],
        _ => vec![op_reg(reg), op_imm(imm)],
    };
    DecodedInstruction::new(rva, 3, mnemonic, operands)
}

// Two-byte conditional jump to `target`
pub fn jcc(rva: u64, mnemonic: Mnemonic, target: u64) -> DecodedInstruction {
    DecodedInstruction::new(rva, 2, mnemonic, vec![relative(rva, 2, target)])
}

// Two-byte unconditional jump to `target`
pub fn jmp(rva: u64, target: u64) -> DecodedInstruction {
    DecodedInstruction::new(rva, 2, Mnemonic::Jmp, vec![relative(rva, 2, target)])
}

// Five-byte call to `target`
pub fn call(rva: u64, target: u64) -> DecodedInstruction {
    DecodedInstruction::new(
        rva,
        5,
        Mnemonic::Call,
        vec![X86Operand::Relative {
            displacement: target.wrapping_sub(rva + 5) as i64,
            size: 4,
        }],
    )
}

pub fn ret(rva: u64) -> DecodedInstruction {
    inst(rva, 1, Mnemonic::Ret)
}

pub fn nop(rva: u64) -> DecodedInstruction {
    inst(rva, 1, Mnemonic::Nop)
}

/// A disassembled function with fake unit heads, for building a [`BranchResolver`]
/// without running the translator.
///
/// The head of block `i` is `BlockId(1000 + i)`.
pub struct TestFunction {
    pub disassembler: SegmentDisassembler,
    pub heads: Vec<BlockId>,
}

impl TestFunction {
    pub fn new(instructions: Vec<DecodedInstruction>) -> Self {
        let disassembler = SegmentDisassembler::from_instructions(instructions).unwrap();
        let heads = (0..disassembler.blocks().len())
            .map(|i| BlockId::new(1000 + i))
            .collect();
        TestFunction {
            disassembler,
            heads,
        }
    }

    // A function without blocks; enough for lifters that never look up branches
    pub fn empty() -> Self {
        Self::new(vec![])
    }

    pub fn resolver(&self) -> BranchResolver<'_> {
        BranchResolver::new(&self.disassembler, &self.heads)
    }

    pub fn head(&self, block: usize) -> BlockId {
        self.heads[block]
    }
}

// Translates `instructions` with the standard registry, liveness and default settings
pub fn translate(instructions: Vec<DecodedInstruction>) -> TranslatedFunction {
    let disassembler = SegmentDisassembler::from_instructions(instructions).unwrap();
    let liveness = FlagLivenessAnalyzer::new(&disassembler);
    let registry = StandardRegistry::new();
    IrTranslator::new(&disassembler, &registry, TranslatorConfig::default())
        .with_liveness(&liveness)
        .translate()
        .unwrap()
}
