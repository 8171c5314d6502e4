// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # vmir
//!
//! Translation of native x86-64 functions into a hybrid native/virtual intermediate
//! representation, as the middle stage of a code virtualizer.
//!
//! Every basic block of a function becomes a *translation unit*: a virtual entry block
//! (`head`), a body of blocks that alternate between virtualized commands and relocated
//! native instructions, and a native exit block (`tail`) carrying the outgoing branch.
//! Instructions for which a handler exists are lifted into stack-machine commands;
//! everything else passes through natively. A whole-function optimizer then removes
//! redundant VM transitions and flattens the units into ordered block groups.
//!
//! ## Features
//!
//! - **Handler-driven lifting** - a pluggable registry decides per operand shape what runs virtualized
//! - **Flag liveness** - lifted handlers only materialize flags a later instruction reads
//! - **Arena-backed IR** - blocks are addressed by stable ids, so branch rewrites never dangle
//! - **Parallel lifting** - units can be lifted on the rayon pool
//! - **Fail-fast invariants** - a translation either fully succeeds or reports the first violation
//!
//! ## Quick Start
//!
//! ```rust
//! use vmir::prelude::*;
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
//! let mut function = IrTranslator::new(&disassembler, &registry, TranslatorConfig::default())
//!     .with_liveness(&liveness)
//!     .translate()?;
//!
//! let mut tracker = BlockTracker::with_units([UnitId::new(0)]);
//! let groups = Optimizer::default().run(
//!     &mut function,
//!     &Default::default(),
//!     &Default::default(),
//!     &mut tracker,
//! )?;
//! assert_eq!(groups.len(), 1);
//! assert!(tracker.representative(UnitId::new(0)).is_some());
//! # Ok::<(), vmir::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! disassembler ─▶ translator ─▶ compiler (optimizer) ─▶ flatten ─▶ emission (external)
//!      │              │
//!      └─ analysis ───┘  (flag liveness)
//! ```
//!
//! - [`analysis`] - x86 instruction model, flag tables and liveness
//! - [`disassembler`] - basic blocks and the [`disassembler::Disassembler`] interface
//! - [`codec`] - re-encodable instruction requests for native passthrough
//! - [`ir`] - commands, branches, blocks and the block arena
//! - [`translator`] - units, lifters, handler registry and the translator itself
//! - [`compiler`] - optimizer passes, flattening and VM-instance assignment
//! - [`utils`] - entropy providers
//! - [`Error`] and [`Result`] - error handling
//!
//! ## Logging
//!
//! The crate logs through `tracing` and never installs a subscriber. Units are reported at
//! `debug`, native fallbacks at `trace`, and optimizer runs at `debug`/`info`.
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use vmir::prelude::*;
///
/// let config = TranslatorConfig::fast();
/// assert!(config.parallel_lifting);
/// ```
pub mod prelude;

/// x86 instruction model and flag liveness analysis.
pub mod analysis;

/// Re-encodable instruction requests.
///
/// Native instructions are carried through translation as [`codec::EncodeRequest`]s. Their
/// RIP-relative operands are stored as absolute targets so they can be re-relativized at
/// whatever address the instruction ends up at.
pub mod codec;

/// Whole-function optimization and flattening of translation units.
pub mod compiler;

/// Basic blocks and the disassembler interface.
///
/// # Key Types
///
/// - [`disassembler::BasicBlock`] - A straight-line instruction sequence with its successors
/// - [`disassembler::Disassembler`] - Source of a function's blocks
/// - [`disassembler::SegmentDisassembler`] - Builds blocks from a decoded instruction stream
pub mod disassembler;

/// The hybrid IR: commands, branches, blocks and the block arena.
pub mod ir;

/// Translation of basic blocks into translation units.
pub mod translator;

/// Shared utilities.
pub mod utils;

/// `vmir` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `vmir` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use vmir::{disassembler::SegmentDisassembler, Error};
/// use vmir::analysis::{DecodedInstruction, Mnemonic};
///
/// let a = DecodedInstruction::new(0x0, 4, Mnemonic::Nop, vec![]);
/// let b = DecodedInstruction::new(0x2, 1, Mnemonic::Ret, vec![]);
/// match SegmentDisassembler::from_instructions(vec![a, b]) {
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
///     Ok(_) => unreachable!(),
/// }
/// ```
pub use error::Error;
