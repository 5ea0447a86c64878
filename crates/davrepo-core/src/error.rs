use thiserror::Error;

/// Errors that can occur in the repository layer.
///
/// Lock contention is not an error: a failed acquisition is reported
/// through [`LockAcquireResult`](crate::LockAcquireResult).
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("item already exists: {0}")]
    ItemAlreadyExists(String),

    #[error("access denied: {0}")]
    PermissionDenied(String),

    #[error("authorization failed: {0}")]
    Authorization(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
