//! Error types for musterpoint.
//!
//! This module defines all error types used throughout the musterpoint crate.
//! State-machine violations are always surfaced to the caller; storage
//! failures are recoverable and the session layer degrades to in-memory state.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionStatus;

/// The main error type for musterpoint operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Session Errors ===
    /// A session is already active; at most one may be active at a time.
    #[error("muster session {session_id} is already active")]
    AlreadyActive {
        /// The id of the session that is currently active.
        session_id: String,
    },

    /// The session has ended and can no longer be mutated.
    #[error("muster session {session_id} is {status} and can no longer change")]
    TerminalState {
        /// The id of the terminal session.
        session_id: String,
        /// The terminal status the session ended in.
        status: SessionStatus,
    },

    /// No session has been activated yet.
    #[error("no muster session is active")]
    NoActiveSession,

    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of entity was looked up (e.g. "zone").
        kind: &'static str,
        /// The id that was looked up.
        id: String,
    },

    // === Input Errors ===
    /// A roster input record is malformed.
    #[error("invalid roster record: {message}")]
    InvalidRecord {
        /// Description of what is wrong with the record.
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

    // === Storage Errors ===
    /// The persistence gateway could not serve a request.
    #[error("storage unavailable during {operation}: {message}")]
    StorageUnavailable {
        /// The gateway operation that failed.
        operation: &'static str,
        /// Description of what went wrong.
        message: String,
    },

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

    // === Notification Errors ===
    /// An announcement could not be handed to the notifier.
    #[error("notification failed: {0}")]
    Notification(String),

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
}

/// A specialized Result type for musterpoint operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new storage-unavailable error.
    #[must_use]
    pub fn storage_unavailable(operation: &'static str, message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            operation,
            message: message.into(),
        }
    }

    /// Create a new invalid-record error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Create a new configuration validation error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create a zone-not-found error.
    #[must_use]
    pub fn zone_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "zone",
            id: id.into(),
        }
    }

    /// Check if this error is caller misuse of the session state machine.
    #[must_use]
    pub fn is_state_violation(&self) -> bool {
        matches!(
            self,
            Self::AlreadyActive { .. } | Self::TerminalState { .. } | Self::NoActiveSession
        )
    }

    /// Check if this error comes from the storage layer and can be
    /// recovered from by falling back to in-memory state.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. }
                | Self::DatabaseOpen { .. }
                | Self::DatabaseQuery(_)
                | Self::DatabaseMigration { .. }
                | Self::DirectoryCreate { .. }
                | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NoActiveSession;
        assert_eq!(err.to_string(), "no muster session is active");

        let err = Error::AlreadyActive {
            session_id: "muster-1".to_string(),
        };
        assert_eq!(err.to_string(), "muster session muster-1 is already active");
    }

    #[test]
    fn test_terminal_state_display() {
        let err = Error::TerminalState {
            session_id: "muster-7".to_string(),
            status: SessionStatus::Completed,
        };
        let msg = err.to_string();
        assert!(msg.contains("muster-7"));
        assert!(msg.contains("completed"));
    }

    #[test]
    fn test_is_state_violation() {
        assert!(Error::NoActiveSession.is_state_violation());
        assert!(Error::AlreadyActive {
            session_id: "x".to_string()
        }
        .is_state_violation());
        assert!(!Error::storage_unavailable("save_roster", "offline").is_state_violation());
        assert!(!Error::zone_not_found("roof").is_state_violation());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::storage_unavailable("load_session", "offline").is_recoverable());
        assert!(Error::DatabaseMigration {
            message: "bad version".to_string()
        }
        .is_recoverable());
        assert!(!Error::NoActiveSession.is_recoverable());
        assert!(!Error::invalid_record("missing id").is_recoverable());
    }

    #[test]
    fn test_storage_unavailable_display() {
        let err = Error::storage_unavailable("save_zones", "disk full");
        let msg = err.to_string();
        assert!(msg.contains("save_zones"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::zone_not_found("roof");
        assert_eq!(err.to_string(), "zone not found: roof");
    }

    #[test]
    fn test_invalid_record_display() {
        let err = Error::invalid_record("visitor record 3 has no name");
        assert!(err.to_string().contains("visitor record 3 has no name"));
    }

    #[test]
    fn test_config_validation_display() {
        let err = Error::config("refresh_interval_secs must be greater than 0");
        assert!(err.to_string().contains("refresh_interval_secs"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/muster.db",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
