//! Error types for DocSmith.
//!
//! Library crates use [`DocsetError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all DocSmith operations.
#[derive(Debug, thiserror::Error)]
pub enum DocsetError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error (status, transport, or client setup).
    #[error("network error: {0}")]
    Network(String),

    /// A response arrived but its body was not what we expected.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad identity, unsafe path, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Archive could not be read or contained unsafe members.
    #[error("archive error: {0}")]
    Archive(String),

    /// An external program failed to start or exited unsuccessfully.
    #[error("{program} failed: {message}")]
    Process { program: String, message: String },

    /// A bounded operation ran past its deadline.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// Every source acquisition strategy was exhausted.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// No registered builder accepted the project.
    #[error("unsupported documentation type for {name} {version}")]
    UnsupportedDocType { name: String, version: String },

    /// A builder ran but did not produce a docset.
    #[error("build failed: {0}")]
    Build(String),

    /// The identity has a non-terminal build; the operation is rejected.
    #[error("a build for {name} {version} is in progress")]
    BuildInProgress { name: String, version: String },

    /// Persistence layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The coordinator no longer accepts work.
    #[error("task coordinator is shut down")]
    ShutDown,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocsetError>;

impl DocsetError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a process error for `program`.
    pub fn process(program: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Process {
            program: program.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error for a named operation.
    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    /// True for failures a fallback chain should absorb (network, timeout, bad payload).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout { .. } | Self::MalformedResponse(_)
        )
    }
}
