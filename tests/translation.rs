//! Translation integration tests.
//!
//! These tests drive the translator through the public API:
//! 1. Build a function from decoded instructions (or prepared basic blocks)
//! 2. Translate it with the standard registry, with and without flag liveness
//! 3. Verify unit shapes: head, body alternation, tail exits and fallback behavior

use vmir::{
    analysis::{
        DecodedInstruction, FlagLivenessAnalyzer, Mnemonic, X86Memory, X86Operand, X86Register,
        X86Segment,
    },
    disassembler::{BasicBlock, BlockBranch, BlockEndReason, SegmentDisassembler},
    ir::{BlockState, BranchTarget, CommandKind, ExitCondition},
    translator::{
        IrTranslator, StandardRegistry, TranslatedFunction, TranslatorConfig, UnitId, UnitState,
    },
    Error, Result,
};

fn reg(register: X86Register) -> X86Operand {
    X86Operand::Register(register)
}

fn add(rva: u64, register: X86Register, imm: i64) -> DecodedInstruction {
    DecodedInstruction::new(rva, 3, Mnemonic::Add, vec![reg(register), X86Operand::imm(imm, 1)])
}

fn jump(rva: u64, mnemonic: Mnemonic, target: u64) -> DecodedInstruction {
    DecodedInstruction::new(
        rva,
        2,
        mnemonic,
        vec![X86Operand::Relative {
            displacement: target as i64 - (rva as i64 + 2),
            size: 1,
        }],
    )
}

fn ret(rva: u64) -> DecodedInstruction {
    DecodedInstruction::new(rva, 1, Mnemonic::Ret, vec![])
}

/// Translate with liveness and the default configuration.
fn translate(instructions: Vec<DecodedInstruction>) -> Result<TranslatedFunction> {
    translate_with(instructions, TranslatorConfig::default())
}

fn translate_with(
    instructions: Vec<DecodedInstruction>,
    config: TranslatorConfig,
) -> Result<TranslatedFunction> {
    let disassembler = SegmentDisassembler::from_instructions(instructions)?;
    let liveness = FlagLivenessAnalyzer::new(&disassembler);
    let registry = StandardRegistry::new();
    IrTranslator::new(&disassembler, &registry, config)
        .with_liveness(&liveness)
        .translate()
}

fn kinds(function: &TranslatedFunction, id: vmir::ir::BlockId) -> Vec<CommandKind> {
    function
        .block(id)
        .unwrap()
        .commands()
        .iter()
        .map(|c| c.kind().clone())
        .collect()
}

#[test]
fn test_add_then_jump_scenario() -> Result<()> {
    let function = translate(vec![
        add(0x1000, X86Register::Eax, 1),
        jump(0x1003, Mnemonic::Jmp, 0x1005),
        ret(0x1005),
    ])?;
    assert_eq!(function.units().len(), 2);

    let unit = function.unit(UnitId::new(0))?;
    assert_eq!(unit.state(), UnitState::Sealed);
    assert_eq!(unit.rva(), 0x1000);

    // head: vm_enter, then a virtual branch into the body
    let head = kinds(&function, unit.head.unwrap());
    assert_eq!(head.len(), 2);
    assert_eq!(head[0], CommandKind::VmEnter);
    match &head[1] {
        CommandKind::Branch(branch) => {
            assert!(branch.virtual_branch);
            assert_eq!(branch.fallthrough, BranchTarget::Block(unit.body[0]));
        }
        other => panic!("expected a branch, found {other:?}"),
    }

    // body: one virtual block running the add handler, leaving for the tail
    assert_eq!(unit.body.len(), 1);
    let body = function.block(unit.body[0])?;
    assert_eq!(body.state(), BlockState::Virtual);
    assert!(body
        .commands()
        .iter()
        .any(|c| matches!(c.kind(), CommandKind::HandlerCall { mnemonic: Mnemonic::Add, .. })));
    let tail = unit.tail.unwrap();
    assert_eq!(body.exit().unwrap().kind(), &CommandKind::VmExit(BranchTarget::Block(tail)));

    // tail: the jump, now pointing at the successor unit's head
    let exit = function.block(tail)?.exit_as_branch().unwrap().clone();
    assert_eq!(exit.condition, ExitCondition::Jmp);
    assert!(!exit.virtual_branch);
    assert_eq!(
        exit.fallthrough,
        BranchTarget::Block(function.unit(UnitId::new(1))?.head.unwrap())
    );
    Ok(())
}

#[test]
fn test_unsupported_instruction_scenario() -> Result<()> {
    // cpuid alone in a block that falls through into the next one
    let mut only = BasicBlock::new(0, 0x0, BlockEndReason::Fallthrough);
    only.instructions.push(DecodedInstruction::new(0x0, 2, Mnemonic::Cpuid, vec![]));
    only.branches.push(BlockBranch::new(0x2));
    let mut next = BasicBlock::new(1, 0x2, BlockEndReason::Return);
    next.instructions.push(ret(0x2));
    let disassembler = SegmentDisassembler::from_blocks(vec![only, next])?;
    let registry = StandardRegistry::new();
    let function =
        IrTranslator::new(&disassembler, &registry, TranslatorConfig::default()).translate()?;

    let unit = function.unit(UnitId::new(0))?;
    assert_eq!(unit.body.len(), 1);
    let body = kinds(&function, unit.body[0]);
    assert_eq!(body.len(), 2);
    assert!(matches!(&body[0], CommandKind::Native(request) if request.mnemonic == Mnemonic::Cpuid));
    assert!(matches!(
        &body[1],
        CommandKind::Branch(branch) if branch.fallthrough == BranchTarget::Block(unit.tail.unwrap())
    ));

    let head = kinds(&function, unit.head.unwrap());
    assert_eq!(
        head,
        vec![CommandKind::VmEnter, CommandKind::VmExit(BranchTarget::Block(unit.body[0]))]
    );

    let successor = function.unit(UnitId::new(1))?.head.unwrap();
    let exit = function.block(unit.tail.unwrap())?.exit_as_branch().unwrap().clone();
    assert_eq!(exit.fallthrough, BranchTarget::Block(successor));
    Ok(())
}

#[test]
fn test_conditional_exit_targets() -> Result<()> {
    // add ; jnz 0x6 | ret | ret
    let function = translate(vec![
        add(0x0, X86Register::Eax, 1),
        jump(0x3, Mnemonic::Jnz, 0x6),
        ret(0x5),
        ret(0x6),
    ])?;
    let units = function.units();
    let exit = function
        .block(units[0].tail.unwrap())?
        .exit_as_branch()
        .unwrap()
        .clone();

    assert_eq!(exit.condition, ExitCondition::Je);
    assert!(exit.inverted);
    assert_eq!(exit.targets().count(), 2);
    assert_eq!(exit.conditional, Some(BranchTarget::Block(units[2].head.unwrap())));
    assert_eq!(exit.fallthrough, BranchTarget::Block(units[1].head.unwrap()));
    Ok(())
}

#[test]
fn test_returning_unit_has_no_tail() -> Result<()> {
    let function = translate(vec![add(0x0, X86Register::Ecx, 4), ret(0x3)])?;
    let unit = function.unit(UnitId::new(0))?;

    assert!(unit.tail.is_none());
    let heads: Vec<_> = function.units().iter().filter_map(|u| u.head).collect();
    for block in &unit.body {
        for target in function.block(*block)?.targets() {
            if let BranchTarget::Block(id) = target {
                assert!(!heads.contains(&id));
            }
        }
    }
    Ok(())
}

#[test]
fn test_unaddressable_operand_falls_back() -> Result<()> {
    // mov eax, gs:[0x30] cannot be lifted
    let load = DecodedInstruction::new(
        0x0,
        9,
        Mnemonic::Mov,
        vec![
            reg(X86Register::Eax),
            X86Operand::Memory(X86Memory::absolute(0x30, 4).with_segment(X86Segment::Gs)),
        ],
    );
    let function = translate(vec![load, add(0x9, X86Register::Eax, 1), ret(0xc)])?;
    let unit = function.unit(UnitId::new(0))?;

    let states: Vec<_> = unit
        .body
        .iter()
        .map(|id| function.block(*id).map(|b| b.state()))
        .collect::<Result<_>>()?;
    assert_eq!(
        states,
        vec![BlockState::Native, BlockState::Virtual, BlockState::Native]
    );
    function.check_alternation()?;
    Ok(())
}

#[test]
fn test_ignored_mnemonics() -> Result<()> {
    let nop = DecodedInstruction::new(0x3, 1, Mnemonic::Nop, vec![]);
    let instructions = vec![add(0x0, X86Register::Eax, 1), nop, ret(0x4)];

    let skipped = translate(instructions.clone())?;
    let kept = translate_with(
        instructions,
        TranslatorConfig::default().with_ignored_mnemonics(vec![]),
    )?;

    let count = |function: &TranslatedFunction| function.units()[0].body.len();
    assert_eq!(count(&skipped), 2);
    assert_eq!(count(&kept), 2);

    let native = |function: &TranslatedFunction| {
        function
            .block(function.units()[0].body[1])
            .unwrap()
            .commands()
            .len()
    };
    assert_eq!(native(&skipped), 1);
    assert_eq!(native(&kept), 2);
    Ok(())
}

#[test]
fn test_missing_branch_is_invariant_violation() -> Result<()> {
    // a conditional block that only knows one successor
    let mut broken = BasicBlock::new(0, 0x0, BlockEndReason::ConditionalJump);
    broken.instructions.push(jump(0x0, Mnemonic::Jz, 0x2));
    broken.branches.push(BlockBranch::new(0x2));
    let mut next = BasicBlock::new(1, 0x2, BlockEndReason::Return);
    next.instructions.push(ret(0x2));

    let disassembler = SegmentDisassembler::from_blocks(vec![broken, next])?;
    let registry = StandardRegistry::new();
    let result =
        IrTranslator::new(&disassembler, &registry, TranslatorConfig::default()).translate();

    assert!(matches!(result, Err(Error::Invariant { .. })));
    Ok(())
}

#[test]
fn test_jump_end_without_jump_is_invariant_violation() -> Result<()> {
    let mut broken = BasicBlock::new(0, 0x0, BlockEndReason::UnconditionalJump);
    broken.instructions.push(add(0x0, X86Register::Eax, 1));
    broken.branches.push(BlockBranch::new(0x3));
    let mut next = BasicBlock::new(1, 0x3, BlockEndReason::Return);
    next.instructions.push(ret(0x3));

    let disassembler = SegmentDisassembler::from_blocks(vec![broken, next])?;
    let registry = StandardRegistry::new();
    let result =
        IrTranslator::new(&disassembler, &registry, TranslatorConfig::default()).translate();

    match result {
        Err(Error::Invariant { message, .. }) => assert!(message.contains("unit_0")),
        other => panic!("expected an invariant violation, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_registry_without_handler() -> Result<()> {
    let disassembler =
        SegmentDisassembler::from_instructions(vec![add(0x0, X86Register::Eax, 1), ret(0x3)])?;
    let registry = StandardRegistry::new().without(Mnemonic::Add);
    let function =
        IrTranslator::new(&disassembler, &registry, TranslatorConfig::default()).translate()?;

    let unit = function.unit(UnitId::new(0))?;
    assert_eq!(unit.body.len(), 1);
    assert_eq!(function.block(unit.body[0])?.state(), BlockState::Native);
    Ok(())
}

#[test]
fn test_lookup_and_dot() -> Result<()> {
    let function = translate(vec![
        add(0x10, X86Register::Eax, 1),
        jump(0x13, Mnemonic::Jz, 0x10),
        ret(0x15),
    ])?;

    assert_eq!(function.unit_at(0x15).map(|u| u.id()), Some(UnitId::new(1)));
    assert!(function.unit_at(0x11).is_none());
    assert_eq!(function.map_basic_block(UnitId::new(1)), Some(1));
    assert_eq!(function.map_unit(0).map(|u| u.rva()), Some(0x10));
    assert!(function.map_unit(5).is_none());
    assert!(matches!(function.unit(UnitId::new(9)), Err(Error::UnknownUnit(_))));

    let dot = function.to_dot();
    assert!(dot.starts_with("digraph"));
    assert!(dot.contains("unit_0"));
    assert!(function.dangling_references().is_empty());
    Ok(())
}
