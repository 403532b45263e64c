use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// cinderdb errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The key is not present, or no record with a matching full key exists
    /// behind any of its candidate offsets.
    NotFound,
    /// Invalid on-disk data: a malformed log record, an unparseable size
    /// field, or a malformed checkpoint document.
    Corrupt(String),
    /// Invalid user input, typically a key or value the log format cannot
    /// carry (embedded comma or newline, empty key).
    InvalidInput(String),
    /// An IO error.
    IO(String),
    /// The store has been shut down and no longer accepts commands.
    Closed,
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::NotFound => write!(f, "key not found"),
            Error::Corrupt(msg) => write!(f, "corrupt data: {msg}"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::IO(msg) => write!(f, "io error: {msg}"),
            Error::Closed => write!(f, "store is shut down"),
        }
    }
}

/// A cinderdb Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Corrupt(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::IO(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::IO(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Error::NotFound.to_string(), "key not found");
        assert_eq!(
            Error::Corrupt("bad size field".into()).to_string(),
            "corrupt data: bad size field"
        );
        assert_eq!(Error::Closed.to_string(), "store is shut down");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert!(matches!(err, Error::IO(_)));
    }
}
