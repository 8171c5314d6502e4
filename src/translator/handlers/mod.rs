//! Built-in handler registry.
//!
//! [`StandardRegistry`] covers the instructions compiler output is made of most of the
//! time: `add`, `sub`, `inc`, `dec`, `mov`, `push`, `pop`, `shl`, `shr` and `jmp`. The `jmp`
//! entry also serves every conditional jump, because the translator looks conditional
//! jumps up under [`Mnemonic::Jmp`].
//!
//! Each mnemonic has a [`SignatureTable`] listing the operand shapes a handler exists for.
//! The handler id of a shape is derived from the mnemonic and the shape's position in the
//! table, so it is stable across runs and registries.

mod arith;
mod jmp;
mod mov;
pub(crate) mod operand;
mod shift;
mod stack;

use std::collections::HashMap;

pub use arith::ArithLifter;
pub use jmp::JmpLifter;
pub use mov::MovLifter;
pub use shift::ShiftLifter;
pub use stack::{PopLifter, PushLifter};

use crate::{
    analysis::{DecodedInstruction, HandlerOperand, Mnemonic, OperandKind},
    ir::HandlerId,
    translator::{HandlerGenerator, HandlerRegistry, InstructionLifter, LiftContext},
};

/// Builds a lifter for one instruction with an already selected handler.
pub type LifterFactory = for<'a> fn(
    &'a LiftContext<'a>,
    &'a DecodedInstruction,
    u64,
    HandlerId,
) -> Box<dyn InstructionLifter + 'a>;

const R: OperandKind = OperandKind::Register;
const M: OperandKind = OperandKind::Memory;
const I: OperandKind = OperandKind::Immediate;

/// Handler generator backed by an explicit list of supported operand shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureTable {
    mnemonic: Mnemonic,
    signatures: Vec<Vec<HandlerOperand>>,
}

impl SignatureTable {
    /// Creates a table from its signatures.
    #[must_use]
    pub fn new(mnemonic: Mnemonic, signatures: Vec<Vec<HandlerOperand>>) -> Self {
        SignatureTable {
            mnemonic,
            signatures,
        }
    }

    /// The supported operand shapes, in handler order.
    #[must_use]
    pub fn signatures(&self) -> &[Vec<HandlerOperand>] {
        &self.signatures
    }

    /// Two-operand read-modify-write forms: `r, r`, `r, m`, `m, r`, `r, imm` and `m, imm`.
    ///
    /// Immediates are the sizes the encoder accepts for each width: 8-bit sign-extended
    /// everywhere, plus the full width up to 32 bits.
    #[must_use]
    pub fn binary(mnemonic: Mnemonic) -> Self {
        let mut signatures = Vec::new();
        for size in [1u8, 2, 4, 8] {
            let dst_r = HandlerOperand::new(R, size);
            let dst_m = HandlerOperand::new(M, size);
            signatures.push(vec![dst_r, dst_r]);
            signatures.push(vec![dst_r, dst_m]);
            signatures.push(vec![dst_m, dst_r]);
            for imm in immediate_sizes(size) {
                signatures.push(vec![dst_r, HandlerOperand::new(I, *imm)]);
                signatures.push(vec![dst_m, HandlerOperand::new(I, *imm)]);
            }
        }
        Self::new(mnemonic, signatures)
    }

    /// One-operand read-modify-write forms: `r` and `m` of every width.
    #[must_use]
    pub fn unary(mnemonic: Mnemonic) -> Self {
        let signatures = [1u8, 2, 4, 8]
            .iter()
            .flat_map(|size| {
                [
                    vec![HandlerOperand::new(R, *size)],
                    vec![HandlerOperand::new(M, *size)],
                ]
            })
            .collect();
        Self::new(mnemonic, signatures)
    }

    /// `mov`: the binary forms plus `mov r64, imm64`.
    #[must_use]
    pub fn mov() -> Self {
        let mut table = Self::binary(Mnemonic::Mov);
        table
            .signatures
            .push(vec![HandlerOperand::new(R, 8), HandlerOperand::new(I, 8)]);
        table
    }

    /// `push`: 64-bit and 16-bit registers and memory, sign-extended immediates.
    #[must_use]
    pub fn push() -> Self {
        Self::new(
            Mnemonic::Push,
            vec![
                vec![HandlerOperand::new(R, 8)],
                vec![HandlerOperand::new(R, 2)],
                vec![HandlerOperand::new(M, 8)],
                vec![HandlerOperand::new(I, 1)],
                vec![HandlerOperand::new(I, 4)],
            ],
        )
    }

    /// `pop`: 64-bit and 16-bit registers and memory.
    #[must_use]
    pub fn pop() -> Self {
        Self::new(
            Mnemonic::Pop,
            vec![
                vec![HandlerOperand::new(R, 8)],
                vec![HandlerOperand::new(R, 2)],
                vec![HandlerOperand::new(M, 8)],
            ],
        )
    }

    /// Shifts by an 8-bit immediate or by `cl`.
    #[must_use]
    pub fn shift(mnemonic: Mnemonic) -> Self {
        let mut signatures = Vec::new();
        for size in [1u8, 2, 4, 8] {
            for dst in [R, M] {
                signatures.push(vec![HandlerOperand::new(dst, size), HandlerOperand::new(I, 1)]);
                signatures.push(vec![HandlerOperand::new(dst, size), HandlerOperand::new(R, 1)]);
            }
        }
        Self::new(mnemonic, signatures)
    }

    /// Relative jumps with 8-bit and 32-bit displacements.
    #[must_use]
    pub fn jump() -> Self {
        Self::new(
            Mnemonic::Jmp,
            vec![
                vec![HandlerOperand::new(OperandKind::Relative, 1)],
                vec![HandlerOperand::new(OperandKind::Relative, 4)],
            ],
        )
    }
}

fn immediate_sizes(size: u8) -> &'static [u8] {
    match size {
        1 => &[1],
        2 => &[1, 2],
        _ => &[1, 4],
    }
}

impl HandlerGenerator for SignatureTable {
    fn mnemonic(&self) -> Mnemonic {
        self.mnemonic
    }

    fn get_handler_id(&self, operands: &[HandlerOperand]) -> Option<HandlerId> {
        let index = self
            .signatures
            .iter()
            .position(|signature| signature.as_slice() == operands)?;
        let index = u32::try_from(index).ok()?;
        Some(HandlerId(((self.mnemonic as u32) << 8) | index))
    }
}

/// The default [`HandlerRegistry`].
///
/// # Example
///
/// ```rust
/// use vmir::analysis::{HandlerOperand, Mnemonic, OperandKind};
/// use vmir::translator::{HandlerRegistry, StandardRegistry};
///
/// let registry = StandardRegistry::new();
/// let add = registry.handler_for(Mnemonic::Add).unwrap();
/// let shape = [
///     HandlerOperand::new(OperandKind::Register, 4),
///     HandlerOperand::new(OperandKind::Immediate, 1),
/// ];
/// assert!(add.get_handler_id(&shape).is_some());
/// assert!(registry.handler_for(Mnemonic::Cpuid).is_none());
/// ```
pub struct StandardRegistry {
    generators: HashMap<Mnemonic, SignatureTable>,
    factories: HashMap<Mnemonic, LifterFactory>,
}

impl StandardRegistry {
    /// Creates the registry with every built-in handler.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = StandardRegistry {
            generators: HashMap::new(),
            factories: HashMap::new(),
        };

        registry.register(SignatureTable::binary(Mnemonic::Add), arith::lifter);
        registry.register(SignatureTable::binary(Mnemonic::Sub), arith::lifter);
        registry.register(SignatureTable::unary(Mnemonic::Inc), arith::lifter);
        registry.register(SignatureTable::unary(Mnemonic::Dec), arith::lifter);
        registry.register(SignatureTable::mov(), mov::lifter);
        registry.register(SignatureTable::push(), stack::push);
        registry.register(SignatureTable::pop(), stack::pop);
        registry.register(SignatureTable::shift(Mnemonic::Shl), shift::lifter);
        registry.register(SignatureTable::shift(Mnemonic::Shr), shift::lifter);
        registry.register(SignatureTable::jump(), jmp::lifter);

        registry
    }

    /// Adds or replaces the handler for a mnemonic.
    pub fn register(&mut self, table: SignatureTable, factory: LifterFactory) {
        let mnemonic = table.mnemonic;
        self.generators.insert(mnemonic, table);
        self.factories.insert(mnemonic, factory);
    }

    /// Returns the registry without the handler for `mnemonic`.
    #[must_use]
    pub fn without(mut self, mnemonic: Mnemonic) -> Self {
        self.generators.remove(&mnemonic);
        self.factories.remove(&mnemonic);
        self
    }

    /// Mnemonics this registry has handlers for.
    pub fn mnemonics(&self) -> impl Iterator<Item = Mnemonic> + '_ {
        self.generators.keys().copied()
    }
}

impl Default for StandardRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry for StandardRegistry {
    fn handler_for(&self, mnemonic: Mnemonic) -> Option<&dyn HandlerGenerator> {
        self.generators
            .get(&mnemonic)
            .map(|table| table as &dyn HandlerGenerator)
    }

    fn lifter_for<'a>(
        &self,
        mnemonic: Mnemonic,
        context: &'a LiftContext<'a>,
        instruction: &'a DecodedInstruction,
        rva: u64,
    ) -> Option<Box<dyn InstructionLifter + 'a>> {
        let handler = self
            .generators
            .get(&mnemonic)?
            .get_handler_id(&instruction.operand_shapes())?;
        let factory = self.factories.get(&mnemonic)?;
        Some(factory(context, instruction, rva, handler))
    }
}
