//! Translation of disassembled functions into hybrid native/virtual IR.
//!
//! [`IrTranslator`] turns every basic block of a function into a [`TranslationUnit`]:
//!
//! - **head**: virtual entry block, `vm_enter` followed by a link into the body
//! - **body**: lifted blocks whose states alternate between virtual and native
//! - **tail**: native exit block holding the unit's outgoing branch (absent for returns)
//!
//! # Architecture
//!
//! Translation runs in two passes:
//!
//! 1. Every unit's head and tail are allocated up front, so a branch to any block of the
//!    function resolves to that block's head before the head has any content.
//! 2. Each basic block is lifted instruction by instruction. A [`HandlerRegistry`] decides
//!    which instructions have a virtual handler for their exact operand shape; everything
//!    else becomes a relocated native passthrough command.
//!
//! Pass 2 has no cross-unit side effects, so it may run on the rayon pool
//! ([`TranslatorConfig::parallel_lifting`]). Lifting results are merged into the
//! [`BlockArena`] after every unit is done.
//!
//! # Usage
//!
//! ```rust
//! use vmir::analysis::{DecodedInstruction, FlagLivenessAnalyzer, Mnemonic, X86Operand, X86Register};
//! use vmir::disassembler::SegmentDisassembler;
//! use vmir::translator::{IrTranslator, StandardRegistry, TranslatorConfig};
//!
//! let add = DecodedInstruction::new(
//!     0x1000,
//!     3,
//!     Mnemonic::Add,
//!     vec![X86Operand::Register(X86Register::Eax), X86Operand::imm(1, 1)],
//! );
//! let ret = DecodedInstruction::new(0x1003, 1, Mnemonic::Ret, vec![]);
//! let disassembler = SegmentDisassembler::from_instructions(vec![add, ret])?;
//! let liveness = FlagLivenessAnalyzer::new(&disassembler);
//! let registry = StandardRegistry::new();
//!
//! let translator = IrTranslator::new(&disassembler, &registry, TranslatorConfig::default())
//!     .with_liveness(&liveness);
//! let function = translator.translate()?;
//! assert_eq!(function.units().len(), 1);
//! assert!(function.units()[0].tail.is_none());
//! # Ok::<(), vmir::Error>(())
//! ```

mod branch_info;
mod config;
mod function;
mod handlers;
mod lifter;
mod passthrough;
mod split;
mod unit;

use rayon::prelude::*;
use tracing::debug;

pub use branch_info::{exit_condition, BranchInfo, BranchResolver};
pub use config::TranslatorConfig;
pub use function::TranslatedFunction;
pub use handlers::{
    ArithLifter, JmpLifter, LifterFactory, MovLifter, PopLifter, PushLifter, ShiftLifter,
    SignatureTable, StandardRegistry,
};
pub use lifter::{HandlerGenerator, HandlerRegistry, InstructionLifter, LiftContext};
pub use passthrough::encode_passthrough;
pub use unit::{TranslationUnit, UnitId, UnitState};

use crate::{
    analysis::LivenessAnalyzer,
    disassembler::Disassembler,
    ir::{BlockArena, BlockId, BlockState, IdAllocator, IrBlock},
    translator::split::{BlockSplitter, SplitBlock},
    Result,
};

/// Translates one function into translation units.
pub struct IrTranslator<'a> {
    disassembler: &'a dyn Disassembler,
    registry: &'a dyn HandlerRegistry,
    liveness: Option<&'a dyn LivenessAnalyzer>,
    config: TranslatorConfig,
}

impl<'a> IrTranslator<'a> {
    /// Creates a translator without flag liveness.
    ///
    /// # Arguments
    ///
    /// * `disassembler` - Source of the function's basic blocks
    /// * `registry` - Handler lookup and lifter construction
    /// * `config` - Translation settings
    #[must_use]
    pub fn new(
        disassembler: &'a dyn Disassembler,
        registry: &'a dyn HandlerRegistry,
        config: TranslatorConfig,
    ) -> Self {
        IrTranslator {
            disassembler,
            registry,
            liveness: None,
            config,
        }
    }

    /// Attaches a flag liveness provider.
    #[must_use]
    pub fn with_liveness(mut self, liveness: &'a dyn LivenessAnalyzer) -> Self {
        self.liveness = Some(liveness);
        self
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Translates every basic block of the function.
    ///
    /// # Errors
    ///
    /// Returns the first invariant violation encountered; no partial result is produced.
    pub fn translate(&self) -> Result<TranslatedFunction> {
        let blocks = self.disassembler.blocks();
        let ids = IdAllocator::new();
        let mut arena = BlockArena::new();
        let mut units = Vec::with_capacity(blocks.len());

        for (index, block) in blocks.iter().enumerate() {
            if block.id != index {
                return Err(invariant_error!(
                    "{} is numbered {} but listed at position {}",
                    block,
                    block.id,
                    index
                ));
            }

            let head = ids.block_id();
            arena.insert(IrBlock::with_rva(head, BlockState::Virtual, block.rva));
            let tail = arena.create(&ids, BlockState::Native);
            units.push(TranslationUnit::new(UnitId::new(index), block.rva, head, tail));
        }

        let heads: Vec<BlockId> = units
            .iter()
            .map(|unit| unit.head.ok_or_else(|| invariant_error!("{} has no head", unit.id())))
            .collect::<Result<_>>()?;
        let resolver = BranchResolver::new(self.disassembler, &heads);
        let splitter = BlockSplitter {
            registry: self.registry,
            liveness: self.liveness,
            config: &self.config,
            ids: &ids,
            resolver: &resolver,
        };

        for unit in &mut units {
            unit.set_state(UnitState::Lifting);
        }

        let lift = |unit: &TranslationUnit| -> Result<SplitBlock> {
            let tail = unit
                .tail
                .ok_or_else(|| invariant_error!("{} has no tail", unit.id()))?;
            splitter.split(&blocks[unit.id().index()], unit.id(), tail)
        };
        let lifted: Vec<SplitBlock> = if self.config.parallel_lifting {
            units.par_iter().map(lift).collect::<Result<_>>()?
        } else {
            units.iter().map(lift).collect::<Result<_>>()?
        };

        for (unit, split) in units.iter_mut().zip(lifted) {
            Self::attach(&mut arena, unit, split)?;
            debug!(
                unit = %unit.id(),
                rva = unit.rva(),
                body = unit.body.len(),
                returns = unit.tail.is_none(),
                "translated unit"
            );
        }

        Ok(TranslatedFunction::new(arena, units, ids))
    }

    /// Stores the lifted blocks of one unit and seals it.
    fn attach(arena: &mut BlockArena, unit: &mut TranslationUnit, split: SplitBlock) -> Result<()> {
        let head = unit
            .head
            .ok_or_else(|| invariant_error!("{} has no head", unit.id()))?;
        arena.block_mut(head)?.extend(split.head)?;

        for block in split.body {
            unit.body.push(block.id());
            arena.insert(block);
        }

        match (unit.tail, split.tail) {
            (Some(tail), Some(exit)) => arena.block_mut(tail)?.push(exit)?,
            (Some(tail), None) => {
                arena.remove(tail)?;
                unit.tail = None;
            }
            (None, _) => return Err(invariant_error!("{} lost its tail before sealing", unit.id())),
        }

        unit.set_state(UnitState::Sealed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{CpuFlags, FlagLivenessAnalyzer, Mnemonic, X86Register},
        disassembler::SegmentDisassembler,
        ir::{BranchTarget, CommandKind, ExitCondition},
        test::{arith, call, inst, jcc, jmp, nop, ret},
        Error,
    };

    fn translate(disasm: &SegmentDisassembler, config: TranslatorConfig) -> TranslatedFunction {
        let registry = StandardRegistry::new();
        let liveness = FlagLivenessAnalyzer::new(disasm);
        IrTranslator::new(disasm, &registry, config)
            .with_liveness(&liveness)
            .translate()
            .unwrap()
    }

    fn kinds(function: &TranslatedFunction, id: BlockId) -> Vec<CommandKind> {
        function
            .block(id)
            .unwrap()
            .commands()
            .iter()
            .map(|c| c.kind().clone())
            .collect()
    }

    #[test]
    fn test_add_then_jump() {
        // 0x0 add eax, 1 ; 0x3 jmp 0x5 ; 0x5 ret
        let disasm = SegmentDisassembler::from_instructions(vec![
            arith(0x0, Mnemonic::Add, X86Register::Eax, 1),
            jmp(0x3, 0x5),
            ret(0x5),
        ])
        .unwrap();
        let function = translate(&disasm, TranslatorConfig::default());
        let unit = &function.units()[0];
        let successor = function.units()[1].head.unwrap();

        assert_eq!(unit.state(), UnitState::Sealed);
        assert_eq!(unit.body.len(), 1);
        let body = function.block(unit.body[0]).unwrap();
        assert!(body.is_virtual());

        let head = kinds(&function, unit.head.unwrap());
        assert_eq!(head[0], CommandKind::VmEnter);
        let CommandKind::Branch(entry) = &head[1] else {
            panic!("head must branch into the body");
        };
        assert!(entry.virtual_branch);
        assert_eq!(entry.fallthrough, BranchTarget::Block(unit.body[0]));

        let tail_id = unit.tail.unwrap();
        assert_eq!(
            body.exit().unwrap().kind(),
            &CommandKind::VmExit(BranchTarget::Block(tail_id))
        );
        let tail = function.block(tail_id).unwrap().exit_as_branch().unwrap().clone();
        assert!(!tail.virtual_branch);
        assert_eq!(tail.condition, ExitCondition::Jmp);
        assert_eq!(tail.fallthrough, BranchTarget::Block(successor));
    }

    #[test]
    fn test_unsupported_only() {
        // 0x0 cpuid ; 0x2 ret
        let disasm = SegmentDisassembler::from_instructions(vec![
            inst(0x0, 2, Mnemonic::Cpuid),
            ret(0x2),
        ])
        .unwrap();
        let function = translate(&disasm, TranslatorConfig::default());
        let unit = &function.units()[0];

        assert_eq!(unit.body.len(), 1);
        assert!(unit.tail.is_none());
        let body = kinds(&function, unit.body[0]);
        assert_eq!(body.len(), 2);
        assert!(matches!(&body[0], CommandKind::Native(r) if r.mnemonic == Mnemonic::Cpuid));
        assert!(matches!(&body[1], CommandKind::Native(r) if r.mnemonic == Mnemonic::Ret));

        // head is vm_enter + vm_exit into the native body, which makes it elidable
        assert_eq!(
            kinds(&function, unit.head.unwrap()),
            vec![
                CommandKind::VmEnter,
                CommandKind::VmExit(BranchTarget::Block(unit.body[0]))
            ]
        );
    }

    #[test]
    fn test_alternation_and_transitions() {
        // add ; call (native) ; add ; ret
        let disasm = SegmentDisassembler::from_instructions(vec![
            arith(0x0, Mnemonic::Add, X86Register::Eax, 1),
            call(0x3, 0x100),
            arith(0x8, Mnemonic::Sub, X86Register::Ecx, 2),
            ret(0xb),
        ])
        .unwrap();
        let function = translate(&disasm, TranslatorConfig::default());
        let unit = &function.units()[0];

        assert_eq!(unit.body.len(), 4);
        unit.check_alternation(function.arena()).unwrap();
        let states: Vec<_> = unit
            .body
            .iter()
            .map(|id| function.block(*id).unwrap().state())
            .collect();
        assert_eq!(
            states,
            vec![
                BlockState::Virtual,
                BlockState::Native,
                BlockState::Virtual,
                BlockState::Native
            ]
        );

        // virtual -> native is a vm_exit, native -> virtual a plain branch into vm_enter
        let first = function.block(unit.body[0]).unwrap();
        assert_eq!(
            first.exit().unwrap().kind(),
            &CommandKind::VmExit(BranchTarget::Block(unit.body[1]))
        );
        let second = function.block(unit.body[1]).unwrap();
        let link = second.exit_as_branch().unwrap();
        assert!(!link.virtual_branch);
        assert_eq!(link.fallthrough, BranchTarget::Block(unit.body[2]));
        let third = function.block(unit.body[2]).unwrap();
        assert_eq!(third.commands()[0].kind(), &CommandKind::VmEnter);

        // returning unit: no tail, and its last block does not branch anywhere
        assert!(unit.tail.is_none());
        let last = function.block(unit.body[3]).unwrap();
        assert!(last.targets().is_empty());
        assert!(function.dangling_references().is_empty());
    }

    #[test]
    fn test_conditional_exit() {
        // 0x0 add eax, 1 ; 0x3 jnz 0x6 ; 0x5 ret ; 0x6 ret
        let disasm = SegmentDisassembler::from_instructions(vec![
            arith(0x0, Mnemonic::Add, X86Register::Eax, 1),
            jcc(0x3, Mnemonic::Jnz, 0x6),
            ret(0x5),
            ret(0x6),
        ])
        .unwrap();
        let function = translate(&disasm, TranslatorConfig::default());
        let units = function.units();

        let exit = function
            .block(units[0].tail.unwrap())
            .unwrap()
            .exit_as_branch()
            .unwrap()
            .clone();
        assert_eq!(exit.condition, ExitCondition::Je);
        assert!(exit.inverted);
        assert!(!exit.virtual_branch);
        assert_eq!(exit.conditional, Some(BranchTarget::Block(units[2].head.unwrap())));
        assert_eq!(exit.fallthrough, BranchTarget::Block(units[1].head.unwrap()));
    }

    #[test]
    fn test_liveness_narrows_flags() {
        // add sets zf for jnz; the second add's flags are overwritten before any read
        let disasm = SegmentDisassembler::from_instructions(vec![
            arith(0x0, Mnemonic::Add, X86Register::Ecx, 1),
            arith(0x3, Mnemonic::Add, X86Register::Eax, 1),
            jcc(0x6, Mnemonic::Jnz, 0x9),
            ret(0x8),
            ret(0x9),
        ])
        .unwrap();

        let stores = |function: &TranslatedFunction| -> Vec<CpuFlags> {
            let unit = &function.units()[0];
            kinds(function, unit.body[0])
                .into_iter()
                .filter_map(|k| match k {
                    CommandKind::FlagsStore(flags) => Some(flags),
                    _ => None,
                })
                .collect()
        };

        let narrow = stores(&translate(&disasm, TranslatorConfig::default()));
        assert_eq!(narrow, vec![CpuFlags::ZF]);

        let wide = stores(&translate(&disasm, TranslatorConfig::conservative()));
        assert_eq!(wide.len(), 2);
        assert!(wide.iter().all(|flags| flags.contains(CpuFlags::ZF | CpuFlags::CF)));
    }

    #[test]
    fn test_ignored_and_fallthrough() {
        // nop ; nop | jmp target 0x2 splits the nops into their own block
        let disasm = SegmentDisassembler::from_instructions(vec![nop(0x0), nop(0x1), jmp(0x2, 0x1)])
            .unwrap();
        let function = translate(&disasm, TranslatorConfig::default());
        let first = &function.units()[0];

        // only ignored instructions: a single empty native block linked to the tail
        assert_eq!(first.body.len(), 1);
        let body = function.block(first.body[0]).unwrap();
        assert!(!body.is_virtual());
        assert_eq!(body.len(), 1);

        let exit = function.block(first.tail.unwrap()).unwrap().exit_as_branch().unwrap().clone();
        assert_eq!(exit.fallthrough, BranchTarget::Block(function.units()[1].head.unwrap()));
    }

    #[test]
    fn test_unlifted_terminator_is_fatal() {
        // jkzd has no flag condition, so the jump lifter rejects it
        let disasm = SegmentDisassembler::from_instructions(vec![
            jcc(0x0, Mnemonic::Jkzd, 0x3),
            ret(0x2),
            ret(0x3),
        ])
        .unwrap();
        let registry = StandardRegistry::new();
        let result = IrTranslator::new(&disasm, &registry, TranslatorConfig::default()).translate();
        assert!(matches!(result, Err(Error::Invariant { ref message, .. }) if message.contains("unit_0")));

        // a registry without the jump handler leaves jnz native
        let disasm = SegmentDisassembler::from_instructions(vec![
            arith(0x0, Mnemonic::Add, X86Register::Eax, 1),
            jcc(0x3, Mnemonic::Jnz, 0x6),
            ret(0x5),
            ret(0x6),
        ])
        .unwrap();
        let registry = StandardRegistry::new().without(Mnemonic::Jmp);
        let result = IrTranslator::new(&disasm, &registry, TranslatorConfig::default()).translate();
        assert!(matches!(result, Err(Error::Invariant { ref message, .. }) if message.contains("jnz")));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let disasm = SegmentDisassembler::from_instructions(vec![
            arith(0x0, Mnemonic::Add, X86Register::Eax, 1),
            jcc(0x3, Mnemonic::Jz, 0x0),
            call(0x5, 0x100),
            arith(0xa, Mnemonic::Dec, X86Register::Ecx, 0),
            ret(0xd),
        ])
        .unwrap();

        let sequential = translate(&disasm, TranslatorConfig::default());
        let parallel = translate(&disasm, TranslatorConfig::fast());

        assert_eq!(sequential.units().len(), parallel.units().len());
        for (a, b) in sequential.units().iter().zip(parallel.units()) {
            assert_eq!(a.body.len(), b.body.len());
            assert_eq!(a.tail.is_some(), b.tail.is_some());
            for (x, y) in a.body.iter().zip(&b.body) {
                let x = sequential.block(*x).unwrap();
                let y = parallel.block(*y).unwrap();
                assert_eq!(x.state(), y.state());
                assert_eq!(x.len(), y.len());
            }
        }
    }
}
