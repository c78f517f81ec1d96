//! Error types for DirDB core.

use crate::types::BlockId;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in DirDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] dirdb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The write-ahead log holds invalid content.
    ///
    /// Once a scanner reports this it keeps reporting it; recovery stops at
    /// the last good anchor.
    #[error("invalid log content: {message}")]
    InvalidLog {
        /// Description of the first invalid condition that was hit.
        message: String,
    },

    /// A closed log scanner was used again.
    #[error("log scanner is closed")]
    ScannerClosed,

    /// Another process holds the log directory lock.
    #[error("log directory locked: another process has exclusive access")]
    LogDirLocked,

    /// A page was requested while an earlier handle to it is still held.
    #[error("page {block} is already in use")]
    PageInUse {
        /// The block that is still held.
        block: BlockId,
    },

    /// Invalid page file format.
    #[error("invalid page format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// The filter uses a construct the cursor builder does not evaluate.
    #[error("unimplemented filter: {kind}")]
    UnsupportedFilter {
        /// Kind of filter node that was rejected.
        kind: &'static str,
    },

    /// The filter expression is malformed.
    #[error("invalid expression: {message}")]
    InvalidExpression {
        /// Description of what is wrong with the expression.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid log content error.
    pub fn invalid_log(message: impl Into<String>) -> Self {
        Self::InvalidLog {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid expression error.
    pub fn invalid_expression(message: impl Into<String>) -> Self {
        Self::InvalidExpression {
            message: message.into(),
        }
    }

    /// Creates an unsupported filter error.
    pub fn unsupported_filter(kind: &'static str) -> Self {
        Self::UnsupportedFilter { kind }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns `true` for invalid log content.
    #[must_use]
    pub fn is_invalid_log(&self) -> bool {
        matches!(self, Self::InvalidLog { .. })
    }

    /// Returns `true` when the error is a read that stopped short of the
    /// requested bytes.
    #[must_use]
    pub fn is_short_read(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_short_read(),
            Self::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}
