//! Basic block model and the disassembler interface.
//!
//! This module provides the view of a native function the translator consumes: an ordered
//! list of basic blocks, each carrying its decoded instructions, how control leaves it,
//! and the rvas of its successors.
//!
//! # Key Types
//! - [`BasicBlock`] - A sequence of instructions with single entry/exit
//! - [`BlockEndReason`] - How control leaves a block
//! - [`BlockBranch`] - A resolved successor rva
//! - [`Disassembler`] - Block list and rva lookup
//! - [`SegmentDisassembler`] - Partitioning of a decoded instruction stream
//!
//! # Example
//! ```rust
//! use vmir::analysis::{DecodedInstruction, Mnemonic};
//! use vmir::disassembler::{Disassembler, SegmentDisassembler};
//!
//! let ret = DecodedInstruction::new(0x1000, 1, Mnemonic::Ret, vec![]);
//! let disassembler = SegmentDisassembler::from_instructions(vec![ret])?;
//! assert_eq!(disassembler.get_block(0x1000, false).map(|b| b.id), Some(0));
//! # Ok::<(), vmir::Error>(())
//! ```

mod block;
mod segment;

pub use block::{BasicBlock, BlockBranch, BlockEndReason};
pub use segment::SegmentDisassembler;

/// Source of basic blocks for one function.
///
/// Implementations must be shareable across threads, since lifting may run in parallel.
pub trait Disassembler: Send + Sync {
    /// All basic blocks of the function, ordered by rva.
    fn blocks(&self) -> &[BasicBlock];

    /// Looks up a block by rva.
    ///
    /// With `inclusive` set, returns the block containing `rva`. Otherwise only a block
    /// starting exactly at `rva` matches.
    fn get_block(&self, rva: u64, inclusive: bool) -> Option<&BasicBlock>;
}
