//! Configuration for the unit optimizer.

/// Switches for the optimizer passes.
///
/// Passes always run in the order heads, trailing bodies, same-VM; a disabled pass is
/// skipped without reordering the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerConfig {
    /// Remove heads whose first body block is native (default: true).
    pub elide_heads: bool,

    /// Remove trailing virtual body blocks that only enter and leave the VM (default: true).
    pub elide_trailing_bodies: bool,

    /// Run the same-VM transition pass (default: true).
    ///
    /// The pass currently never changes anything.
    pub elide_same_vm: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            elide_heads: true,
            elide_trailing_bodies: true,
            elide_same_vm: true,
        }
    }
}

impl OptimizerConfig {
    /// Creates a configuration with every pass enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with every pass disabled; optimizing only flattens.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            elide_heads: false,
            elide_trailing_bodies: false,
            elide_same_vm: false,
        }
    }

    /// Enables or disables head elision.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_head_elision(mut self, enable: bool) -> Self {
        self.elide_heads = enable;
        self
    }

    /// Enables or disables trailing-body elision.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_trailing_elision(mut self, enable: bool) -> Self {
        self.elide_trailing_bodies = enable;
        self
    }

    /// Enables or disables the same-VM pass.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_same_vm_elision(mut self, enable: bool) -> Self {
        self.elide_same_vm = enable;
        self
    }
}
