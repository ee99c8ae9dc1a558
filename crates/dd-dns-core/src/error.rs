//! Error types for the dd-dns system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for dd-dns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the dd-dns system
#[derive(Error, Debug)]
pub enum Error {
    /// The DNS publisher failed to publish or retract a record
    #[error("Publish failed ({publisher}): {message}")]
    Publish {
        /// Publisher name
        publisher: String,
        /// Error message
        message: String,
    },

    /// The backing store failed to read or write state
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Record or container not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// An internal invariant of the mapping store was violated
    #[error("Invalid store state: {0}")]
    InvalidState(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Container event source errors
    #[error("Event source error: {0}")]
    EventSource(String),

    /// The address to publish for a container could not be determined
    #[error("Address resolution failed: {0}")]
    AddressResolution(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a publish error
    pub fn publish(publisher: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            publisher: publisher.into(),
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an event source error
    pub fn event_source(msg: impl Into<String>) -> Self {
        Self::EventSource(msg.into())
    }

    /// Create an address resolution error
    pub fn address_resolution(msg: impl Into<String>) -> Self {
        Self::AddressResolution(msg.into())
    }

    /// Whether the engine must stop when this error surfaces.
    ///
    /// Lookup and resolution failures only concern a single container event
    /// and are skipped. Everything else may leave DNS and the store out of
    /// step, so the daemon exits and reconciles on restart.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NotFound(_) | Self::AddressResolution(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
