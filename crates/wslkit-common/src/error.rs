//! Unified error types for the wslkit workspace.
//!
//! Every fallible operation in the libraries returns [`WslkitError`]. The
//! coarse [`ErrorKind`] lets a presentation layer map failures to user
//! guidance without matching on every variant, while the variant itself keeps
//! the structured detail and underlying cause.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Boxed error used as an opaque underlying cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum WslkitError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A resource with the same identity already exists.
    #[error("{kind} already exists: {id}")]
    AlreadyExists {
        /// Type of the conflicting resource.
        kind: &'static str,
        /// Identifier of the conflicting resource.
        id: String,
    },

    /// A resource exists but cannot be used yet (e.g. template not downloaded).
    #[error("{kind} not available: {id} ({reason})")]
    NotAvailable {
        /// Type of the unavailable resource.
        kind: &'static str,
        /// Identifier of the unavailable resource.
        id: String,
        /// Why it is unavailable.
        reason: String,
    },

    /// A hash validation failed.
    #[error("hash mismatch for {resource}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// Resource that failed validation.
        resource: String,
        /// Expected hash value.
        expected: String,
        /// Actual computed hash value.
        actual: String,
    },

    /// The external tool could not be started or exited unsuccessfully.
    #[error("{command} failed (exit code {}): {stderr}", render_exit_code(.exit_code))]
    ExternalTool {
        /// Rendered command line, for diagnostics only.
        command: String,
        /// Exit code, if the process ran to completion.
        exit_code: Option<i32>,
        /// Captured standard error (trimmed).
        stderr: String,
        /// Spawn failure, if the process never started.
        #[source]
        source: Option<std::io::Error>,
    },

    /// An external operation exceeded its time budget and was terminated.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Budget that was exceeded.
        duration: Duration,
    },

    /// A network request failed.
    #[error("network error for {url}: {message}")]
    Network {
        /// URL being fetched.
        url: String,
        /// Human-readable description.
        message: String,
        /// Underlying transport error, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// Every stage of the download chain failed.
    #[error("all download stages failed for {name}")]
    DownloadExhausted {
        /// Template being acquired.
        name: String,
        /// Failure of the last attempted stage.
        #[source]
        last: Box<WslkitError>,
    },

    /// An argument was rejected before reaching disk or the external tool.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of the rejected input.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

#[allow(clippy::ref_option)]
fn render_exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Coarse classification of a [`WslkitError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Referenced template, image, or file does not exist.
    NotFound,
    /// Name collides with an existing resource.
    AlreadyExists,
    /// Resource exists but is not usable yet.
    NotAvailable,
    /// Content hash did not match.
    IntegrityMismatch,
    /// External tool failed or timed out.
    ExternalToolFailure,
    /// Local disk or serialization failure.
    IoFailure,
    /// Remote fetch failed.
    NetworkFailure,
    /// Caller supplied a malformed argument.
    InvalidInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not-found",
            Self::AlreadyExists => "already-exists",
            Self::NotAvailable => "not-available",
            Self::IntegrityMismatch => "integrity-mismatch",
            Self::ExternalToolFailure => "external-tool-failure",
            Self::IoFailure => "io-failure",
            Self::NetworkFailure => "network-failure",
            Self::InvalidInput => "invalid-input",
        };
        f.write_str(s)
    }
}

impl WslkitError {
    /// Returns the coarse classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::Serialization { .. } => ErrorKind::IoFailure,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::NotAvailable { .. } => ErrorKind::NotAvailable,
            Self::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            Self::ExternalTool { .. } | Self::Timeout { .. } => ErrorKind::ExternalToolFailure,
            Self::Network { .. } => ErrorKind::NetworkFailure,
            Self::DownloadExhausted { last, .. } => last.kind(),
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
        }
    }

    /// Builds an [`WslkitError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds a [`WslkitError::Network`] without an underlying cause.
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
            source: None,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, WslkitError>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn timeout_is_classified_as_tool_failure() {
        let err = WslkitError::Timeout {
            operation: "wsl --import".into(),
            duration: Duration::from_secs(5),
        };
        assert_eq!(err.kind(), ErrorKind::ExternalToolFailure);
    }

    #[test]
    fn exhausted_download_reports_kind_of_last_cause() {
        let err = WslkitError::DownloadExhausted {
            name: "alpine".into(),
            last: Box::new(WslkitError::IntegrityMismatch {
                resource: "alpine".into(),
                expected: "aa".into(),
                actual: "bb".into(),
            }),
        };
        assert_eq!(err.kind(), ErrorKind::IntegrityMismatch);
        assert!(err.source().is_some());
    }

    #[test]
    fn external_tool_display_includes_exit_code() {
        let err = WslkitError::ExternalTool {
            command: "wsl.exe --unregister dev".into(),
            exit_code: Some(1),
            stderr: "no such distribution".into(),
            source: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("no such distribution"));
    }

    #[test]
    fn serde_errors_convert_to_io_failure() {
        let err: WslkitError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }
}
