//! Sync Error Types
//!
//! Storage failures are wrapped rather than flattened, so the original
//! [`duet_storage::error::ErrorKind`] stays reachable in the error tree.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A storage operation (listing, probing) failed.
    #[display("storage operation failed")]
    Storage,
    /// An entry was submitted before both of its sides were probed.
    #[display("entry not probed: {}", _0.display())]
    IndeterminateState(#[error(not(source))] PathBuf),
    /// The path is not in the prompt list.
    #[display("not in the prompt list: {}", _0.display())]
    NotPrompted(#[error(not(source))] PathBuf),
    /// The work list was rejected during confirmation.
    #[display("work list rejected")]
    Rejected,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}
