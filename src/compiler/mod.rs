//! Whole-function optimization of translation units and their final layout.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Optimizer Pipeline                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  TranslatedFunction         Units + block arena from translation │
//! │                                                                  │
//! │  Optimizer                  Fixed order, one run per pass        │
//! │    ├─ HeadElisionPass        (vm_enter ; vm_exit heads)          │
//! │    ├─ TrailingBodyElisionPass (empty trailing virtual blocks)    │
//! │    └─ SameVmElisionPass      (reserved, no-op)                   │
//! │                                                                  │
//! │  flatten                    head + body + tail per unit          │
//! │    ├─ FlatBlockGroup         tagged with a VM instance id        │
//! │    └─ BlockTracker           representative of tracked units     │
//! │                                                                  │
//! │  assign_vm_ids              VM instance per unit (seedable)      │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Passes mutate branch targets across unit boundaries, so they always run sequentially.
//!
//! # Usage
//!
//! ```rust
//! use std::collections::HashSet;
//!
//! use vmir::analysis::{DecodedInstruction, Mnemonic, X86Operand};
//! use vmir::compiler::{assign_vm_ids, BlockTracker, Optimizer, OptimizerConfig};
//! use vmir::disassembler::SegmentDisassembler;
//! use vmir::translator::{IrTranslator, StandardRegistry, TranslatorConfig, UnitId};
//! use vmir::utils::EntropyProvider;
//!
//! let call = DecodedInstruction::new(
//!     0x1000,
//!     5,
//!     Mnemonic::Call,
//!     vec![X86Operand::Relative { displacement: 0x100, size: 4 }],
//! );
//! let ret = DecodedInstruction::new(0x1005, 1, Mnemonic::Ret, vec![]);
//! let disassembler = SegmentDisassembler::from_instructions(vec![call, ret])?;
//! let registry = StandardRegistry::new();
//! let mut function =
//!     IrTranslator::new(&disassembler, &registry, TranslatorConfig::default()).translate()?;
//!
//! let vm_ids = assign_vm_ids(function.units(), 1, &mut EntropyProvider::from_seed(0))?;
//! let mut tracker = BlockTracker::new();
//! let groups = Optimizer::new(OptimizerConfig::default()).run(
//!     &mut function,
//!     &HashSet::new(),
//!     &vm_ids,
//!     &mut tracker,
//! )?;
//!
//! // the native-only unit lost its head
//! assert!(function.unit(UnitId::new(0))?.head.is_none());
//! assert_eq!(groups[0].blocks.len(), 1);
//! # Ok::<(), vmir::Error>(())
//! ```

mod config;
mod flatten;
mod pass;
mod passes;
mod scheduler;
mod vmid;

pub use config::OptimizerConfig;
pub use flatten::{flatten, BlockTracker, FlatBlockGroup};
pub use pass::UnitPass;
pub use passes::{HeadElisionPass, SameVmElisionPass, TrailingBodyElisionPass};
pub use scheduler::{OptimizeStats, Optimizer};
pub use vmid::assign_vm_ids;
