//! Shared utilities.
//!
//! - [`random`] - Seedable and shared entropy providers

pub mod random;

pub use random::{EntropyProvider, SharedEntropy};
