//! Benchmarks for translation and optimization.
//!
//! Runs over a synthetic function of repeated blocks, each mixing lifted arithmetic,
//! native calls and a conditional jump:
//! - Translation with and without flag liveness
//! - Sequential and parallel lifting
//! - Optimization and flattening of a translated function

extern crate vmir;

use std::{
    collections::{BTreeMap, HashSet},
    hint::black_box,
};

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use vmir::prelude::*;

/// Builds `blocks` blocks of `add ; sub ; call ; shl ; jnz next`, ending in `ret`.
fn synthetic_function(blocks: u64) -> Vec<DecodedInstruction> {
    let mut instructions = Vec::new();
    let mut rva = 0x1000u64;
    for _ in 0..blocks {
        instructions.push(DecodedInstruction::new(
            rva,
            3,
            Mnemonic::Add,
            vec![X86Operand::Register(X86Register::Eax), X86Operand::imm(1, 1)],
        ));
        instructions.push(DecodedInstruction::new(
            rva + 3,
            3,
            Mnemonic::Sub,
            vec![X86Operand::Register(X86Register::Ecx), X86Operand::imm(2, 1)],
        ));
        instructions.push(DecodedInstruction::new(
            rva + 6,
            5,
            Mnemonic::Call,
            vec![X86Operand::Relative {
                displacement: 0x4000,
                size: 4,
            }],
        ));
        instructions.push(DecodedInstruction::new(
            rva + 11,
            3,
            Mnemonic::Shl,
            vec![X86Operand::Register(X86Register::Edx), X86Operand::imm(3, 1)],
        ));
        instructions.push(DecodedInstruction::new(
            rva + 14,
            2,
            Mnemonic::Jnz,
            vec![X86Operand::Relative {
                displacement: 0,
                size: 1,
            }],
        ));
        rva += 16;
    }
    instructions.push(DecodedInstruction::new(rva, 1, Mnemonic::Ret, vec![]));
    instructions
}

fn bench_translate(c: &mut Criterion) {
    let disassembler = SegmentDisassembler::from_instructions(synthetic_function(256)).unwrap();
    let liveness = FlagLivenessAnalyzer::new(&disassembler);
    let registry = StandardRegistry::new();

    c.bench_function("translate_256_blocks", |b| {
        b.iter(|| {
            let function = IrTranslator::new(&disassembler, &registry, TranslatorConfig::default())
                .with_liveness(&liveness)
                .translate()
                .unwrap();
            black_box(function)
        });
    });

    c.bench_function("translate_256_blocks_no_liveness", |b| {
        b.iter(|| {
            let function =
                IrTranslator::new(&disassembler, &registry, TranslatorConfig::conservative())
                    .translate()
                    .unwrap();
            black_box(function)
        });
    });

    c.bench_function("translate_256_blocks_parallel", |b| {
        b.iter(|| {
            let function = IrTranslator::new(&disassembler, &registry, TranslatorConfig::fast())
                .with_liveness(&liveness)
                .translate()
                .unwrap();
            black_box(function)
        });
    });
}

fn bench_liveness(c: &mut Criterion) {
    let disassembler = SegmentDisassembler::from_instructions(synthetic_function(256)).unwrap();

    c.bench_function("liveness_256_blocks", |b| {
        b.iter(|| black_box(FlagLivenessAnalyzer::new(black_box(&disassembler))));
    });
}

fn bench_optimize(c: &mut Criterion) {
    let disassembler = SegmentDisassembler::from_instructions(synthetic_function(256)).unwrap();
    let liveness = FlagLivenessAnalyzer::new(&disassembler);
    let registry = StandardRegistry::new();
    let translator = IrTranslator::new(&disassembler, &registry, TranslatorConfig::default())
        .with_liveness(&liveness);
    let optimizer = Optimizer::default();

    c.bench_function("optimize_flatten_256_blocks", |b| {
        b.iter_batched(
            || translator.translate().unwrap(),
            |mut function| {
                let external = HashSet::from([UnitId::new(0)]);
                let mut tracker = BlockTracker::with_units([UnitId::new(0)]);
                let groups = optimizer
                    .run(&mut function, &external, &BTreeMap::new(), &mut tracker)
                    .unwrap();
                black_box(groups)
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_translate, bench_liveness, bench_optimize);
criterion_main!(benches);
