//! Core error types for rehabcue-core.
//!
//! Each concern gets its own thiserror enum; everything converts into
//! [`CoreError`] for callers that just want to bubble failures up.

use std::path::PathBuf;
use thiserror::Error;

use crate::playback::PlaybackState;

/// Core error type for rehabcue-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Playback engine errors
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by the playback controller and its collaborators.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// The session (or its resolved exercise list) has no entries.
    #[error("Session '{session}' has no exercises to play")]
    EmptySession { session: String },

    /// An operation was requested in a state that does not allow it.
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: PlaybackState,
    },

    /// Writing the journal checkpoint failed; retried on the next boundary.
    #[error("Couldn't save progress: {0}")]
    PersistenceWrite(#[source] DatabaseError),

    /// The audio output could not be initialized; cues are skipped.
    #[error("Audio unavailable: {0}")]
    AudioUnavailable(String),

    /// A persisted instance cannot be resumed.
    #[error("Session instance cannot be resumed: {0}")]
    ResumeUnavailable(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Stored payload could not be encoded or decoded
    #[error("Corrupt record {id} in {table}: {message}")]
    CorruptRecord {
        table: &'static str,
        id: i64,
        message: String,
    },

    /// Record with the given id does not exist
    #[error("No {table} record with id {id}")]
    NotFound { table: &'static str, id: i64 },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be prepared
    #[error("Cannot prepare data directory: {0}")]
    DataDir(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
