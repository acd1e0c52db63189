//! Error types for riderecorder.
//!
//! Sensor and input failures are handled close to their source (see
//! [`crate::ports`]); this module defines the crate-wide error for
//! everything that crosses the library surface.

use std::path::PathBuf;

use thiserror::Error;

use crate::store::StorageError;

/// The main error type for riderecorder operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Storage Errors ===
    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The named session does not exist.
    #[error("unknown session '{id}'")]
    UnknownSession {
        /// The identifier that was looked up.
        id: String,
    },

    /// The named session is still open and cannot be exported.
    #[error("session '{id}' is not sealed; run the recovery scan first")]
    SessionNotSealed {
        /// The identifier of the open session.
        id: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// GPX document generation failed.
    #[error("GPX export failed: {0}")]
    Gpx(String),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for riderecorder operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create an unknown-session error.
    #[must_use]
    pub fn unknown_session(id: impl Into<String>) -> Self {
        Self::UnknownSession { id: id.into() }
    }

    /// Create a GPX export error.
    #[must_use]
    pub fn gpx(message: impl Into<String>) -> Self {
        Self::Gpx(message.into())
    }

    /// Check if this error means the session was not found.
    #[must_use]
    pub fn is_unknown_session(&self) -> bool {
        matches!(self, Self::UnknownSession { .. })
    }
}
