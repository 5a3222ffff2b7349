//! Error types for txfs.
//!
//! All operations return `Result<T>` which aliases `Result<T, TxfsError>`.

use crate::fs::TransactionId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from transactional file operations.
#[derive(Debug, Error)]
pub enum TxfsError {
    /// Unknown or already finalized transaction.
    #[error("No transaction found for ID `{0}`")]
    TransactionNotFound(TransactionId),

    /// Operation submitted in the wrong phase.
    #[error("Transaction `{id}`: {message}")]
    IllegalState { id: TransactionId, message: String },

    /// Structural misuse, e.g. writing to a directory.
    #[error("Illegal operation: {0}")]
    IllegalOperation(String),

    /// The transaction's own log deletes the path (or an ancestor).
    #[error("Path '{path}' is deleted by this transaction")]
    Conflict { path: String },

    /// Path rejected by validation rules.
    #[error("Invalid path '{0}': {1}")]
    InvalidPath(String, String),

    /// Staged payload missing or truncated.
    ///
    /// Staging is owned by a single transaction; this means something outside
    /// the engine touched it.
    #[error("Staging area corrupted: {0}")]
    CorruptStaging(PathBuf),

    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(String),

    /// Operation plan could not be parsed.
    #[error("Plan error: {0}")]
    Plan(String),

    /// File system operation failed, including reads past end of file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unexpected error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification, for callers mapping errors onto remote codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransactionNotFound,
    IllegalState,
    IllegalOperation,
    Conflict,
    Io,
    Other,
}

impl TxfsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TxfsError::TransactionNotFound(_) => ErrorKind::TransactionNotFound,
            TxfsError::IllegalState { .. } => ErrorKind::IllegalState,
            TxfsError::IllegalOperation(_) | TxfsError::InvalidPath(..) => {
                ErrorKind::IllegalOperation
            }
            TxfsError::Conflict { .. } => ErrorKind::Conflict,
            TxfsError::Io(_) | TxfsError::CorruptStaging(_) => ErrorKind::Io,
            TxfsError::Config(_) | TxfsError::Plan(_) | TxfsError::Other(_) => ErrorKind::Other,
        }
    }

    pub(crate) fn illegal_state(id: TransactionId, message: impl Into<String>) -> Self {
        TxfsError::IllegalState {
            id,
            message: message.into(),
        }
    }
}

/// Result type alias for txfs operations.
pub type Result<T> = std::result::Result<T, TxfsError>;
