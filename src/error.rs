//! Error types for flatdb.
//!
//! Provides a unified error type for all operations. The variants are part of
//! the public contract: callers match on them to distinguish configuration
//! mistakes from format problems, key collisions, and I/O failures.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for flatdb operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Schema / Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Configuration(String),

    // -------------------------------------------------------------------------
    // File Format Errors
    // -------------------------------------------------------------------------
    #[error("not a flatdb file: magic number mismatch")]
    InvalidFormat,

    #[error("unsupported file version {found} (expected 1)")]
    UnsupportedVersion { found: i16 },

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("duplicate key: id {id} already exists in table '{table}'")]
    DuplicateKey { table: String, id: i32 },

    #[error("no record with id {id} in table '{table}'")]
    NotFound { table: String, id: i32 },

    #[error("codec error: {0}")]
    Codec(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("operation cancelled")]
    Cancelled,

    #[error("context has been closed")]
    Disposed,

    #[error("write queue is shut down")]
    QueueClosed,
}

impl StoreError {
    /// Shorthand for a [`StoreError::Configuration`] with the given message.
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        StoreError::Configuration(msg.into())
    }

    /// Shorthand for a [`StoreError::Codec`] with the given message.
    pub(crate) fn codec(msg: impl Into<String>) -> Self {
        StoreError::Codec(msg.into())
    }
}
