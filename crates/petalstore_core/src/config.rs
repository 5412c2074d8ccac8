//! Database configuration.

/// Configuration applied by a [`crate::DatabaseFactory`] to every database
/// it opens.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether opening an unknown database creates it.
    pub create_if_missing: bool,

    /// Whether every commit and upgrade syncs the log (safer but slower).
    pub sync_on_commit: bool,

    /// Largest encoded record accepted by `add` and `put`, in bytes.
    pub max_record_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            max_record_size: 16 * 1024 * 1024, // 16 MiB
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the largest accepted encoded record size.
    #[must_use]
    pub const fn max_record_size(mut self, bytes: usize) -> Self {
        self.max_record_size = bytes;
        self
    }
}
