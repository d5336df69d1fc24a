//! Config Error Types

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The configuration could not be read or deserialized.
    #[display("could not load configuration")]
    Load,
    /// The configuration was loaded but is not usable.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// A backend could not be set up from the configuration.
    #[display("could not connect to backend")]
    Connect,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect)
    }
}
