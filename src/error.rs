// src/error.rs
//! The error taxonomy shared by every component.
//!
//! Failures are scoped to the smallest unit possible: a missing or unreadable file is an [`Error`]
//! for single-file operations, but batch operations (analytics, error summary) record it as a
//! [`FileFailure`] next to their successful results instead of aborting.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Convenience alias for results carrying an [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The file does not exist.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but can't be opened for reading.
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// A custom regex was rejected at configuration time.
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The rejected pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No plugin is registered under the given id.
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    /// The plugin exists but has been disabled in its settings.
    #[error("plugin disabled: {0}")]
    PluginDisabled(String),

    /// The requested path lies outside the plugin's base path.
    #[error("path not allowed: {}", .0.display())]
    PathNotAllowed(PathBuf),

    /// A request was well-formed JSON but semantically invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The settings store could not be read or written.
    #[error("settings store error: {0}")]
    Store(String),

    /// The requester gave up before the work finished.
    #[error("cancelled")]
    Cancelled,

    /// Any other I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Classify an `io::Error` raised while opening `path`.
    ///
    /// `NotFound` and `PermissionDenied` get their own variants so callers can report them as
    /// "missing" or "unreadable" rather than as generic failures.
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_path_buf()),
            _ => Error::Io(error),
        }
    }

    /// The HTTP status code this error maps to.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Error::NotFound(_) | Error::UnknownPlugin(_) => 404,
            Error::PermissionDenied(_) | Error::PathNotAllowed(_) | Error::PluginDisabled(_) => 403,
            Error::InvalidPattern { .. } | Error::InvalidRequest(_) => 400,
            Error::Store(_) | Error::Io(_) => 500,
            Error::Cancelled => 504,
        }
    }
}

/// A per-file failure recorded during a batch operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFailure {
    /// The plugin the file belongs to, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
    /// The file that could not be processed.
    pub file_path: PathBuf,
    /// A human readable description of the failure.
    pub error: String,
}

impl FileFailure {
    /// Record `error` against `file_path`.
    pub fn new(plugin_id: Option<&str>, file_path: &Path, error: impl ToString) -> Self {
        Self {
            plugin_id: plugin_id.map(str::to_string),
            file_path: file_path.to_path_buf(),
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::Path;

    use super::Error;

    #[test]
    fn io_errors_are_classified() {
        let path = Path::new("/var/log/missing.log");

        let error = Error::from_io(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(error, Error::NotFound(_)));
        assert_eq!(error.status(), 404);

        let error = Error::from_io(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(error, Error::PermissionDenied(_)));
        assert_eq!(error.status(), 403);

        let error = Error::from_io(path, io::Error::from(io::ErrorKind::InvalidData));
        assert!(matches!(error, Error::Io(_)));
        assert_eq!(error.status(), 500);
    }

    #[test]
    fn invalid_pattern_display() {
        let error = Error::InvalidPattern {
            pattern: "(".to_string(),
            reason: "unclosed group".to_string(),
        };
        assert_eq!(error.to_string(), "invalid pattern `(`: unclosed group");
        assert_eq!(error.status(), 400);
    }
}
