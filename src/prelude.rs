//! # vmir Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the vmir library. Import this module to get quick access to everything needed to
//! translate, optimize and flatten a function.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all vmir operations
pub use crate::Error;

/// The result type used throughout vmir
pub use crate::Result;

// ================================================================================================
// Input Model
// ================================================================================================

/// Decoded x86 instructions and their operands
pub use crate::analysis::{
    CpuFlags, DecodedInstruction, Mnemonic, X86Memory, X86Operand, X86Register, X86Segment,
};

/// Flag liveness
pub use crate::analysis::{FlagLiveness, FlagLivenessAnalyzer, LivenessAnalyzer};

/// Basic blocks and their source
pub use crate::disassembler::{BasicBlock, BlockEndReason, Disassembler, SegmentDisassembler};

// ================================================================================================
// IR
// ================================================================================================

/// Blocks, commands and branches
pub use crate::ir::{
    BlockArena, BlockId, BlockState, Branch, BranchTarget, Command, CommandKind, ExitCondition,
    IrBlock,
};

// ================================================================================================
// Translation
// ================================================================================================

/// The translator and its configuration
pub use crate::translator::{
    IrTranslator, TranslatedFunction, TranslationUnit, TranslatorConfig, UnitId, UnitState,
};

/// Handler lookup and lifting
pub use crate::translator::{
    HandlerGenerator, HandlerRegistry, InstructionLifter, LiftContext, StandardRegistry,
};

// ================================================================================================
// Optimization
// ================================================================================================

/// Optimizer, flattening and VM-instance assignment
pub use crate::compiler::{
    assign_vm_ids, BlockTracker, FlatBlockGroup, Optimizer, OptimizerConfig, UnitPass,
};

/// Entropy for VM-instance assignment
pub use crate::utils::{EntropyProvider, SharedEntropy};
