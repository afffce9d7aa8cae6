//! Store configuration.

/// Configuration for opening a [`crate::FileRecordStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync the snapshot on every write (safer but slower).
    pub sync_on_write: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync on every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_write);
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new()
            .create_if_missing(false)
            .sync_on_write(false);
        assert!(!config.create_if_missing);
        assert!(!config.sync_on_write);
    }
}
