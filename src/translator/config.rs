//! Configuration for the IR translator.
//!
//! This module provides the settings that control how basic blocks are lifted: whether
//! flag liveness narrows the flags handlers compute, which mnemonics are dropped, and
//! whether units are lifted in parallel.

use crate::analysis::Mnemonic;

/// Configuration for [`crate::translator::IrTranslator`].
#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    /// Use flag liveness to restrict the flags a lifter must produce (default: true).
    ///
    /// When disabled, or when no liveness analyzer is supplied, every flag an instruction
    /// can affect is requested.
    pub use_liveness: bool,

    /// Mnemonics skipped outright during lifting (default: `[nop]`).
    pub ignored_mnemonics: Vec<Mnemonic>,

    /// Lift units on the rayon thread pool (default: false).
    ///
    /// Unit creation always completes before lifting starts, and the result is identical
    /// to sequential lifting apart from the numbering of block and command ids.
    pub parallel_lifting: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            use_liveness: true,
            ignored_mnemonics: vec![Mnemonic::Nop],
            parallel_lifting: false,
        }
    }
}

impl TranslatorConfig {
    /// Creates a new configuration with default settings.
    ///
    /// # Returns
    ///
    /// A new `TranslatorConfig` with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a "fast" configuration for large functions.
    ///
    /// This configuration lifts units in parallel and keeps liveness-based flag
    /// elision enabled.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            parallel_lifting: true,
            ..Self::default()
        }
    }

    /// Creates a "conservative" configuration.
    ///
    /// This configuration ignores liveness, so every handler materializes every flag its
    /// instruction can affect, and lifts sequentially.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            use_liveness: false,
            parallel_lifting: false,
            ..Self::default()
        }
    }

    /// Enables or disables liveness-based flag elision.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_liveness(mut self, enable: bool) -> Self {
        self.use_liveness = enable;
        self
    }

    /// Replaces the set of ignored mnemonics.
    ///
    /// # Arguments
    ///
    /// * `mnemonics` - Mnemonics dropped without producing any command.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_ignored_mnemonics(mut self, mnemonics: Vec<Mnemonic>) -> Self {
        self.ignored_mnemonics = mnemonics;
        self
    }

    /// Enables or disables parallel lifting.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_parallel_lifting(mut self, enable: bool) -> Self {
        self.parallel_lifting = enable;
        self
    }

    /// Returns true if `mnemonic` is skipped during lifting.
    #[must_use]
    pub fn is_ignored(&self, mnemonic: Mnemonic) -> bool {
        self.ignored_mnemonics.contains(&mnemonic)
    }
}
