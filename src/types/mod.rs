#![forbid(unsafe_code)]
//! Identifiers and the error type shared by every layer of the index.

use std::fmt;

pub mod checksum;

pub use checksum::header_crc32;

/// Address of a record inside the heap database. `RecPtr::NULL` (zero) is the null pointer.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, serde::Serialize)]
pub struct RecPtr(pub u64);

impl RecPtr {
    /// The null record pointer.
    pub const NULL: RecPtr = RecPtr(0);

    /// Returns true for the null pointer.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns `None` for the null pointer.
    pub fn non_null(self) -> Option<RecPtr> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }

    /// Offsets the pointer by `delta` bytes.
    pub const fn add(self, delta: u64) -> RecPtr {
        RecPtr(self.0 + delta)
    }
}

impl fmt::Display for RecPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:#x}", self.0)
    }
}

/// Identifies a per-language partition of the index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct LinkageId(pub u16);

impl LinkageId {
    /// Linkage id of records that are not owned by any language (files, includes).
    pub const NONE: LinkageId = LinkageId(0);
    /// The C linkage.
    pub const C: LinkageId = LinkageId(1);
    /// The C++ linkage.
    pub const CPP: LinkageId = LinkageId(2);

    /// Human readable language name.
    pub fn name(self) -> &'static str {
        match self {
            LinkageId::C => "C",
            LinkageId::CPP => "C++",
            LinkageId::NONE => "none",
            _ => "unknown",
        }
    }
}

impl fmt::Display for LinkageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<u16> for LinkageId {
    fn from(value: u16) -> Self {
        LinkageId(value)
    }
}

/// Identifies one index fragment (one persisted database).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct FragmentId(pub u64);

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Errors raised by the index.
#[derive(thiserror::Error, Debug)]
pub enum PdomError {
    /// Reading or writing the backing file failed.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// The database would grow beyond its configured limit. Indexing cannot continue.
    #[error("database too large: {requested} bytes requested, limit is {limit} bytes")]
    TooLarge {
        /// Size the database would have had after the allocation.
        requested: u64,
        /// Configured maximum size.
        limit: u64,
    },
    /// A serialized type, value or evaluation could not be decoded.
    #[error("unmarshalling error: {0}")]
    Unmarshal(String),
    /// Structural damage found in persisted records.
    #[error("corruption: {0}")]
    Corruption(String),
    /// An API was called with arguments it cannot honour.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// A configuration file could not be read or parsed.
    #[error("configuration: {0}")]
    Config(String),
    /// A traversal observed its cancellation flag.
    #[error("operation cancelled")]
    Cancelled,
}

impl PdomError {
    /// Returns true for the fatal "database too large" condition.
    pub fn is_too_large(&self) -> bool {
        matches!(self, PdomError::TooLarge { .. })
    }

    pub(crate) fn unmarshal(msg: impl Into<String>) -> Self {
        PdomError::Unmarshal(msg.into())
    }

    pub(crate) fn corruption(msg: impl Into<String>) -> Self {
        PdomError::Corruption(msg.into())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PdomError>;
