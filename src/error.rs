//! Error types for the shard writer.

use std::io;
use thiserror::Error;

/// The result type used throughout sstshard.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for shard writer operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading, writing or renaming a chunk or output file failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A record stream is malformed or truncated.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// An operation was invoked in the wrong lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The shard ran out of chunk generation numbers.
    #[error("Generation limit reached: a shard supports at most {0} generations")]
    GenerationLimit(u64),

    /// The merge produced a different number of entries than its inputs held.
    #[error("Entry count mismatch: expected {expected}, got {actual}")]
    CountMismatch {
        /// Entries recorded across all input chunks.
        expected: u64,
        /// Entries written to the merged output.
        actual: u64,
    },
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
