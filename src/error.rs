//! Error types for the block storage adapter.

use thiserror::Error;

/// Errors that can occur while mapping blocks onto the key-value backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A namespace or metadata key was required to exist and does not.
    #[error("not found: {0}")]
    NotFound(String),

    /// A required metadata entry is absent or malformed for a block that
    /// is supposed to be initialized.
    #[error("corrupt metadata: {0}")]
    CorruptMetadata(String),

    /// The resolved namespace name does not fit the path buffer.
    #[error("namespace name too long: {len} bytes (max {max})")]
    NameTooLong { len: usize, max: usize },

    /// Slot holds no live item.
    #[error("tuple not found: slot {slot} is empty")]
    TupleNotFound { slot: u16 },

    /// Slot number outside the page's directory.
    #[error("invalid slot: {slot} (max: {max})")]
    InvalidSlot { slot: u16, max: u16 },

    /// Page has no room for the requested item.
    #[error("page is full: requires {required} bytes but only {available} available")]
    PageFull { required: usize, available: usize },

    /// The key-value backend reported an I/O failure.
    #[error("backend error: {0}")]
    Backend(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
