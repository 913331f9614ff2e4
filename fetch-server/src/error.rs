//! Application-wide error types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external tool exited unsuccessfully (or could not be awaited to completion).
    #[error("{program} exited with {}: {}", format_exit_code(.exit_code), last_line(.stderr))]
    Process {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The fetch tool succeeded but nothing matching the naming pattern appeared.
    #[error("No artifacts produced matching {pattern}")]
    NoArtifactsProduced { pattern: String },

    /// The completion detector gave up waiting for stable artifacts.
    #[error("Timed out after {waited:?} waiting for artifacts matching {pattern}")]
    Timeout { pattern: String, waited: Duration },

    #[error("Mux failed with {}: {}", format_exit_code(.exit_code), last_line(.stderr))]
    Mux {
        exit_code: Option<i32>,
        stderr: String,
        /// Diagnostics of the fetch stage that produced the mux inputs.
        fetch_stderr: String,
    },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} {}: {source}", .path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

fn format_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code".to_string(),
    }
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no diagnostic output")
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::Process { .. } => "ProcessError",
            Self::NoArtifactsProduced { .. } => "NoArtifactsProduced",
            Self::Timeout { .. } => "TimeoutError",
            Self::Mux { .. } => "MuxError",
            Self::Archive(_) => "ArchiveError",
            Self::Delivery(_) => "DeliveryError",
            Self::InvalidStateTransition { .. } => "InvalidStateTransition",
            Self::Configuration(_) => "ConfigurationError",
            Self::Serialization(_) => "SerializationError",
            Self::Io(_) | Self::IoPath { .. } => "IoError",
            Self::Other(_) => "InternalError",
        }
    }
}
