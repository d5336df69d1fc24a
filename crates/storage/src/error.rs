//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Entry does not exist on the backend
    #[display("not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied (permissions or credentials)
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Entry already exists (for operations that require new entries)
    #[display("already exists: {}", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    /// Transport failure talking to the backend; the caller may retry with
    /// backoff.
    #[display("backend unavailable: {_0}")]
    BackendUnavailable(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Path contains invalid characters or escapes root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
    /// A comparison was attempted before both sides were probed, or when
    /// neither side exists. Programming error.
    #[display("indeterminate state: {}", _0.display())]
    IndeterminateState(#[error(not(source))] PathBuf),
    /// A type tag set violating the file/directory invariant was requested.
    #[display("invalid type transition: {}", _0.display())]
    InvalidTypeTransition(#[error(not(source))] PathBuf),
    /// A delete batch lists a directory before one of its descendants.
    #[display("directory deleted before its contents: {}", _0.display())]
    OutOfOrder(#[error(not(source))] PathBuf),
    /// Some items of a delete batch failed; the rest were deleted.
    #[display("failed to delete {} item(s)", _0.len())]
    PartialDeleteFailure(#[error(not(source))] Vec<PathBuf>),
    /// A directory was created but the existence checks disagree about it.
    #[display("inconsistent directory state: {}", _0.display())]
    InconsistentDirectoryState(#[error(not(source))] PathBuf),
    /// The backend has no default container and none was supplied.
    #[display("no default container")]
    NoDefaultContainer,
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendUnavailable(_) | Self::BackendError(_))
    }
}
