//! Hybrid native/virtual intermediate representation.
//!
//! The IR is a graph of blocks stored in a [`BlockArena`]. Each [`IrBlock`] is tagged
//! [`BlockState::Native`] or [`BlockState::Virtual`] and holds an ordered list of
//! [`Command`]s. Control flow between blocks is expressed by [`Branch`] and VM-exit
//! commands whose [`BranchTarget`]s are either block handles or raw addresses outside the
//! function.
//!
//! # Key Types
//!
//! - [`Command`] / [`CommandKind`] - One IR operation with a unique [`CommandId`]
//! - [`Branch`] / [`ExitCondition`] - Control transfers with rewritable targets
//! - [`IrBlock`] / [`BlockState`] - State-tagged command sequences
//! - [`BlockArena`] / [`IdAllocator`] - Block storage and thread-safe id allocation
//!
//! # Aliasing
//!
//! Many branches may refer to the same block. Because references are plain [`BlockId`]s,
//! redirecting them is a matter of rewriting the handle in each referencing command; the
//! referenced block itself is never touched.

mod arena;
mod block;
mod branch;
mod command;
pub mod dot;

pub use arena::{BlockArena, IdAllocator};
pub use block::{BlockId, BlockState, IrBlock};
pub use branch::{Branch, BranchTarget, ExitCondition};
pub use command::{
    Command, CommandId, CommandKind, HandlerId, IrSize, LogicOp, PushValue, Store, VmRegister,
};
