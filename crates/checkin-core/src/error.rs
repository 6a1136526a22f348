//! Error types for the check-in system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for check-in operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the check-in system
#[derive(Error, Debug)]
pub enum Error {
    /// Ciphertext token is malformed, truncated, or fails authentication
    #[error("Decrypt error: {0}")]
    Decrypt(String),

    /// An operation referenced an unknown subscriber id
    #[error("Subscriber not found: {0}")]
    NotFound(String),

    /// The durable medium could not be read or written
    #[error("Store I/O error: {0}")]
    StoreIo(String),

    /// The notifier failed to deliver a check-in
    #[error("Delivery error ({notifier}): {message}")]
    Delivery {
        /// Notifier name
        notifier: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Raw I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Stable classification of [`Error`] for callers that branch on the failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decrypt,
    NotFound,
    StoreIo,
    Delivery,
    Config,
    InvalidInput,
    Other,
}

impl Error {
    /// Create a decrypt error
    pub fn decrypt(msg: impl Into<String>) -> Self {
        Self::Decrypt(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a store I/O error
    pub fn store_io(msg: impl Into<String>) -> Self {
        Self::StoreIo(msg.into())
    }

    /// Create a delivery error
    pub fn delivery(notifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Delivery {
            notifier: notifier.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Classify this error
    ///
    /// Raw I/O and JSON failures only reach callers from the durable medium,
    /// so both are reported as [`ErrorKind::StoreIo`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Decrypt(_) => ErrorKind::Decrypt,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::StoreIo(_) | Error::Io(_) | Error::Json(_) => ErrorKind::StoreIo,
            Error::Delivery { .. } => ErrorKind::Delivery,
            Error::Config(_) => ErrorKind::Config,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Other(_) => ErrorKind::Other,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
