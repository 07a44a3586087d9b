//! Error types for label-dl
//!
//! Errors are split by how far they propagate:
//! - [`FetchFailure`] / [`ItemError`] - per-document, recorded in the report, never unwind a run
//! - [`ValidationError`] - rejected before any fetch is issued
//! - [`Error`] - fatal to the whole run (validation, cancellation, writer failures)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for label-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for label-dl
///
/// Any of these reaching the coordinator ends the run in the `Failed` stage
/// with no artifact.
#[derive(Debug, Error)]
pub enum Error {
    /// Preconditions for a run were not met
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Another run is already in flight on this instance
    #[error("a batch is already running")]
    Busy,

    /// The run was cancelled by the caller
    #[error("batch cancelled")]
    Cancelled,

    /// Artifact assembly failed as a whole
    #[error("assembly failed: {0}")]
    Assembly(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP writer error
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// PDF parsing or writing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network error outside of a per-item fetch (e.g. building the HTTP client)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// External tool execution failed (pdftoppm)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, no handler configured)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Output file collision
    #[error("file collision at {path}: {reason}")]
    FileCollision {
        /// The path where the collision occurred
        path: PathBuf,
        /// Why the collision could not be resolved
        reason: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Reasons a run is rejected before any work starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No requests were selected
    #[error("no shipping labels selected")]
    EmptySelection,

    /// A request is missing a required field
    #[error("request {index} is invalid: {reason}")]
    InvalidRequest {
        /// Original index of the offending request
        index: usize,
        /// What is wrong with it
        reason: String,
    },

    /// Two requests share an original index, so output order would be ambiguous
    #[error("duplicate original index {index}")]
    DuplicateIndex {
        /// The repeated index
        index: usize,
    },

    /// The selected transform has no backing implementation
    #[error("{transform} output is unavailable: {reason}")]
    MissingCapability {
        /// Name of the requested transform
        transform: String,
        /// What is missing
        reason: String,
    },

    /// The configuration cannot drive a run
    #[error("invalid configuration for {key}: {message}")]
    Config {
        /// The offending configuration key
        key: String,
        /// Human-readable description
        message: String,
    },
}

/// Why a single document could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchFailure {
    /// The server answered with a non-2xx status
    #[error("HTTP {status}: {status_text}")]
    Http {
        /// Numeric status code
        status: u16,
        /// Canonical reason phrase
        status_text: String,
    },

    /// Connection, DNS, TLS or body-read failure
    #[error("{message}")]
    Transport {
        /// Underlying error message
        message: String,
    },

    /// The per-request deadline elapsed
    #[error("timeout")]
    Timeout,

    /// The message channel to the fetch worker broke
    #[error("channel error: {message}")]
    Channel {
        /// What went wrong on the channel
        message: String,
    },

    /// The fetch worker answered with an error payload
    #[error("{message}")]
    Remote {
        /// Error text reported by the worker
        message: String,
    },
}

impl FetchFailure {
    /// True when the failure came from the message boundary rather than the remote server
    pub fn is_channel(&self) -> bool {
        matches!(self, FetchFailure::Channel { .. })
    }
}

/// Per-item error recorded in a report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    /// The document could not be retrieved
    #[error(transparent)]
    Fetch(#[from] FetchFailure),

    /// The document was retrieved but could not be read as a PDF
    #[error("unreadable document: {reason}")]
    Unreadable {
        /// Parser error text
        reason: String,
    },
}
