//! The trait every optimizer pass implements.

use std::collections::HashSet;

use crate::{
    translator::{TranslatedFunction, UnitId},
    Result,
};

/// An optimization pass over all translation units of a function.
///
/// Passes rewrite branch targets across unit boundaries, so they run one at a time on
/// the whole function; `Send + Sync` only allows a configured optimizer to be shared.
pub trait UnitPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Runs the pass once.
    ///
    /// Returns the number of blocks the pass removed or rewrote; zero means the function
    /// is unchanged.
    ///
    /// # Arguments
    ///
    /// * `function` - The translated function to transform.
    /// * `external` - Units referenced from outside the function; their heads must stay.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Invariant`] if the units violate an assumption of the pass.
    fn run(&self, function: &mut TranslatedFunction, external: &HashSet<UnitId>) -> Result<usize>;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
