use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Song '{0}' not found")]
    NotFound(String),

    #[error("Song '{0}' already exists")]
    DuplicateKey(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Transaction error: {0}")]
    TransactionState(String),

    #[error("Transaction {0} is read-only")]
    ReadOnlyTransaction(String),

    #[error("Snapshot file '{}' not found", .0.display())]
    SnapshotNotFound(PathBuf),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl DbError {
    /// True for lookups on an absent identifier and for a missing snapshot file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_) | DbError::SnapshotNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
