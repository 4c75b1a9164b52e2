//! Crate-wide error taxonomy (spec §7). Every variant names a condition the
//! spec calls out by kind, not by internal type name.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying file read/write/seek/sync failed. Propagated as-is;
    /// transient for reads, terminal for writes that leave durability
    /// uncertain.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Magic mismatch or unknown page-type byte on a page freshly read.
    /// Treated as corruption; the buffer pool never caches the result.
    #[error("invalid page: {0}")]
    InvalidPage(String),

    /// Generic on-disk corruption detected outside the page factory (a
    /// catalog row that can't be decoded, a string with invalid UTF-16).
    #[error("corruption: {0}")]
    Corruption(String),

    /// Every frame in the buffer pool is pinned; the caller is not retried.
    #[error("no evictable frame in buffer pool for tablespace {0}")]
    NoEvictable(String),

    /// Unique-index insert of an already-present key.
    #[error("duplicate key in unique index {0}")]
    Duplicate(String),

    /// A tablespace named in SYS_TABLESPACES has no container file on disk.
    /// Non-fatal: the caller marks the tablespace missing and continues.
    #[error("missing container file for tablespace {0}: {1}")]
    MissingContainer(String, String),

    /// A tablespace, table, index, or page id the caller named does not
    /// exist in this engine's registries.
    #[error("not found: {0}")]
    NotFound(String),

    /// A tablespace, table, or index with the given name already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Catalog bootstrap or reload could not make sense of a row, a
    /// table-header page, or an index-header page. The engine loads what
    /// it can and surfaces this per failed row/table.
    #[error("catalog corruption: {0}")]
    CatalogCorruption(String),

    /// Caller-supplied argument violates an invariant (page size, column
    /// count, tablespace name length, etc).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `EngineConfig` (de)serialization to/from JSON failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
