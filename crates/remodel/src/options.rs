//! Knobs for a single upgrade.

/// Options for [`plan_upgrade`](crate::plan_upgrade).
///
/// ```
/// use remodel::UpgradeOptions;
///
/// let options = UpgradeOptions::default()
///     .detect_column_renames(false)
///     .verify(false);
/// assert!(options.allow_deferred_foreign_keys);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeOptions {
    /// A storage-name change on an otherwise identical column becomes a
    /// `RenameColumn`. When off, the column is dropped and re-added.
    pub detect_column_renames: bool,

    /// Replay the plan on a copy of the old model and require the result to
    /// match the new model structurally.
    pub verify: bool,

    /// Break cycles by deferring foreign keys. When off, any cycle is an
    /// error.
    pub allow_deferred_foreign_keys: bool,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self {
            detect_column_renames: true,
            verify: true,
            allow_deferred_foreign_keys: true,
        }
    }
}

impl UpgradeOptions {
    pub fn detect_column_renames(mut self, enabled: bool) -> Self {
        self.detect_column_renames = enabled;
        self
    }

    pub fn verify(mut self, enabled: bool) -> Self {
        self.verify = enabled;
        self
    }

    pub fn allow_deferred_foreign_keys(mut self, enabled: bool) -> Self {
        self.allow_deferred_foreign_keys = enabled;
        self
    }
}
