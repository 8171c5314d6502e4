//! Built-in optimizer passes.
//!
//! - [`HeadElisionPass`] - drops heads that enter and immediately leave the VM
//! - [`TrailingBodyElisionPass`] - drops empty virtual blocks at the end of a body
//! - [`SameVmElisionPass`] - reserved for transitions within one VM instance

mod heads;
mod samevm;
mod trailing;

pub use heads::HeadElisionPass;
pub use samevm::SameVmElisionPass;
pub use trailing::TrailingBodyElisionPass;
