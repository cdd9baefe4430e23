use serde::{Deserialize, Serialize};

/// Default upper bound on the size of a database file (4 GiB).
pub const DEFAULT_MAX_DATABASE_SIZE: u64 = 4 << 30;

/// Configuration options supplied when creating or opening a [`super::Database`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseOptions {
    /// Size in bytes the database may not outgrow. Exceeding it is fatal for the
    /// indexing operation that triggered the allocation.
    pub max_size: u64,
    /// Whether the header checksum is validated when an existing file is opened.
    pub verify_header_checksum: bool,
    /// Whether `flush` issues an fsync after writing dirty chunks.
    pub sync_on_flush: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_DATABASE_SIZE,
            verify_header_checksum: true,
            sync_on_flush: true,
        }
    }
}

impl DatabaseOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum database size in bytes.
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    /// Enables or disables header checksum validation on open.
    pub fn verify_header_checksum(mut self, enabled: bool) -> Self {
        self.verify_header_checksum = enabled;
        self
    }

    /// Enables or disables fsync after flushing.
    pub fn sync_on_flush(mut self, enabled: bool) -> Self {
        self.sync_on_flush = enabled;
        self
    }
}
