//! Error types for quietpage.
//!
//! This module defines all error types used throughout the quietpage crate.
//! Filtering errors are local by nature: the session logs them and carries on
//! with the rest of the batch, so most variants never reach a user.

use std::path::PathBuf;
use thiserror::Error;

use crate::document::NodeId;

/// The main error type for quietpage operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Wordlist Errors ===
    /// A wordlist id was requested that was never registered.
    #[error("wordlist {id} is not registered")]
    WordlistMissing {
        /// The requested wordlist id.
        id: u8,
    },

    /// A configured word could not be compiled into a matcher.
    #[error("invalid pattern for word '{word}': {source}")]
    InvalidPattern {
        /// The configured word.
        word: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    // === Document Errors ===
    /// The media adapter could not decide what role a node plays.
    #[error("could not classify node {node}")]
    ClassificationUncertain {
        /// The node being classified.
        node: NodeId,
    },

    /// A change event referenced a node that no longer exists.
    #[error("change event references a dead or invalid node {node}")]
    MalformedTarget {
        /// The stale node handle.
        node: NodeId,
    },

    /// An edit script referenced an element id that is not in the document.
    #[error("no element with id '{id}'")]
    UnknownElement {
        /// The element id attribute that was looked up.
        id: String,
    },

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

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

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for quietpage operations.
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

    /// Create a configuration validation error.
    #[must_use]
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Check if this error is a missing wordlist.
    #[must_use]
    pub fn is_wordlist_missing(&self) -> bool {
        matches!(self, Self::WordlistMissing { .. })
    }

    /// Check if this error came from a stale or invalid node handle.
    #[must_use]
    pub fn is_malformed_target(&self) -> bool {
        matches!(self, Self::MalformedTarget { .. })
    }
}
