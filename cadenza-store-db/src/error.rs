// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Error types for project storage operations.

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::types::BlockId;

/// Result type for project storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during project storage operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to open database with context
    #[error("Failed to open database at '{path}': {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Database file not found
    #[error("Database not found at: {0}")]
    DatabaseNotFound(PathBuf),

    /// A SQLite file that does not carry our application tag
    #[error("'{path}' is not a Cadenza project file (application id {found:#010x})")]
    NotOurFormat { path: PathBuf, found: i32 },

    /// File written by a newer schema revision
    #[error("'{path}' uses schema version {found}, newer than supported version {supported}")]
    TooNew {
        path: PathBuf,
        found: i32,
        supported: i32,
    },

    /// Schema upgrade failed; nothing was changed
    #[error("Failed to upgrade schema from version {from} to {to}: {source}")]
    Upgrade {
        from: i32,
        to: i32,
        #[source]
        source: rusqlite::Error,
    },

    /// Filesystem operation (rename, remove) failed
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// An operation was asked to do something it can never do correctly
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// An automatic commit failed earlier in this session
    #[error("Session is unusable after a failed automatic commit")]
    Poisoned,

    /// No database is currently open
    #[error("No project file is open")]
    NotOpen,

    /// The progress callback asked to stop
    #[error("Operation cancelled")]
    Cancelled,

    /// Neither document slot holds a document
    #[error("Unable to load project or autosave documents")]
    NoProjectDocument,

    /// Refused to overwrite an existing file
    #[error("Destination already exists: {0}")]
    DestinationExists(PathBuf),

    /// A referenced block is not stored in the source file
    #[error("Sample block {0} is missing")]
    MissingBlock(BlockId),

    /// Path is not representable as UTF-8 for SQLite
    #[error("Path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),

    /// Document codec error
    #[error("Document error: {0}")]
    Codec(#[from] cadenza_doc::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    /// Whether this is transient lock contention (`SQLITE_BUSY` or
    /// `SQLITE_LOCKED`). Such failures are never retried here; the caller
    /// decides whether to try again.
    pub fn is_busy(&self) -> bool {
        let source = match self {
            Error::Sqlite(e) | Error::DatabaseOpen { source: e, .. } => e,
            Error::Upgrade { source, .. } => source,
            _ => return false,
        };
        matches!(
            source.sqlite_error_code(),
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    }
}

/// Helper trait for adding context to IO errors
pub(crate) trait IoContext<T> {
    fn io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| Error::io(f(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: std::os::raw::c_int) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn test_busy_classification() {
        assert!(Error::Sqlite(sqlite_failure(rusqlite::ffi::SQLITE_BUSY)).is_busy());
        assert!(Error::Sqlite(sqlite_failure(rusqlite::ffi::SQLITE_LOCKED)).is_busy());
        assert!(!Error::Sqlite(sqlite_failure(rusqlite::ffi::SQLITE_CORRUPT)).is_busy());
        assert!(!Error::Cancelled.is_busy());
    }

    #[test]
    fn test_io_context() {
        let err: Result<()> = Err(std::io::Error::from(std::io::ErrorKind::NotFound))
            .io_context(|| "Failed to rename 'a'".to_string());
        let msg = err.unwrap_err().to_string();
        assert!(msg.starts_with("Failed to rename 'a': "), "{msg}");
    }
}
