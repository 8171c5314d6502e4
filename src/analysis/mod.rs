//! Native code analysis infrastructure.
//!
//! This module provides the instruction model the translator consumes and the flag
//! liveness analysis that gates flag computation in lifted handlers.
//!
//! # Architecture
//!
//! The analysis module is organized into focused sub-modules:
//!
//! - [`x86`] - Instruction, operand and register types, plus flag tables
//! - [`liveness`] - Backward flag-liveness data flow over a function's blocks
//!
//! # Usage
//!
//! ```rust
//! use vmir::analysis::{DecodedInstruction, FlagLivenessAnalyzer, LivenessAnalyzer, Mnemonic};
//! use vmir::disassembler::{Disassembler, SegmentDisassembler};
//!
//! let ret = DecodedInstruction::new(0x1000, 1, Mnemonic::Ret, vec![]);
//! let disassembler = SegmentDisassembler::from_instructions(vec![ret])?;
//!
//! let liveness = FlagLivenessAnalyzer::new(&disassembler);
//! let per_instruction = liveness.analyze_block(&disassembler.blocks()[0]);
//! assert_eq!(per_instruction.len(), 1);
//! # Ok::<(), vmir::Error>(())
//! ```

pub mod liveness;
pub mod x86;

// Re-export primary types at module level
pub use liveness::{FlagLiveness, FlagLivenessAnalyzer, LivenessAnalyzer};
pub use x86::{
    affected_flags, defined_flags, instruction_flags, read_flags, CpuFlags, DecodedInstruction,
    HandlerOperand, Mnemonic, OperandKind, X86Condition, X86Memory, X86Operand, X86Register,
    X86Segment,
};
