//! Core types for label-dl

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{FetchFailure, ItemError};
use crate::utils::sanitize_filename;

/// One document to retrieve
///
/// Built once by the caller (usually from a selected table row) and only read
/// by the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRequest {
    /// Absolute URL of the label document
    pub url: String,
    /// Output name (archive entry name)
    pub filename: String,
    /// Display code of the order, used in reports
    pub order_code: String,
    /// Marketplace order id, used in filenames
    pub order_id: String,
    /// Position in the caller's list; the only ordering key for assembly
    pub original_index: usize,
}

impl DocumentRequest {
    /// Create a request with an explicit filename (sanitized)
    pub fn new(
        url: impl Into<String>,
        filename: &str,
        order_code: impl Into<String>,
        original_index: usize,
    ) -> Self {
        Self {
            url: url.into(),
            filename: sanitize_filename(filename),
            order_code: order_code.into(),
            order_id: String::new(),
            original_index,
        }
    }

    /// Build a request from the cells of a selected row
    ///
    /// The filename is `"{order_id}--{order_code}.pdf"`. Blank cells (empty or
    /// a lone non-breaking space) fall back to `order_{row + 1}` for the code and
    /// an empty id.
    pub fn from_row(url: &str, order_id: &str, order_code: &str, row_index: usize) -> Self {
        let order_code = non_blank(order_code)
            .map(sanitize_filename)
            .unwrap_or_else(|| format!("order_{}", row_index + 1));
        let order_id = non_blank(order_id)
            .map(sanitize_filename)
            .unwrap_or_default();

        Self {
            url: url.trim().to_string(),
            filename: format!("{order_id}--{order_code}.pdf"),
            order_code,
            order_id,
            original_index: row_index,
        }
    }
}

fn non_blank(cell: &str) -> Option<&str> {
    let trimmed = cell.trim_matches(|c: char| c.is_whitespace() || c == '\u{00A0}');
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Result of resolving one request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The document bytes were retrieved
    Success {
        /// Originating request
        request: DocumentRequest,
        /// Raw document bytes
        bytes: Vec<u8>,
    },
    /// The document could not be retrieved
    Failure {
        /// Originating request
        request: DocumentRequest,
        /// Why
        reason: FetchFailure,
    },
}

impl FetchOutcome {
    /// The request this outcome belongs to
    pub fn request(&self) -> &DocumentRequest {
        match self {
            FetchOutcome::Success { request, .. } | FetchOutcome::Failure { request, .. } => {
                request
            }
        }
    }
}

/// A successfully fetched document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedDocument {
    /// Originating request
    pub request: DocumentRequest,
    /// Raw document bytes
    pub bytes: Vec<u8>,
}

/// A document that did not make it into the artifact
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedDocument {
    /// Originating request
    pub request: DocumentRequest,
    /// Why
    pub error: ItemError,
}

/// Everything the batch fetcher produced for one run
///
/// `successes` are in production order; `failures` are in completion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// Fetched documents, not yet ordered
    pub successes: Vec<FetchedDocument>,
    /// Failed documents, in the order they settled
    pub failures: Vec<FailedDocument>,
}

impl BatchResult {
    /// Number of requests accounted for
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    /// Classify one settled outcome
    pub(crate) fn record(&mut self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Success { request, bytes } => {
                self.successes.push(FetchedDocument { request, bytes });
            }
            FetchOutcome::Failure { request, reason } => {
                self.failures.push(FailedDocument {
                    request,
                    error: ItemError::Fetch(reason),
                });
            }
        }
    }
}

/// Terminal transform applied to the fetched documents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// ZIP archive of the raw files
    Archive,
    /// Single merged PDF
    Merge,
    /// HTML print view of rasterized pages
    Raster,
}

impl std::fmt::Display for TransformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransformKind::Archive => "archive",
            TransformKind::Merge => "merge",
            TransformKind::Raster => "raster",
        };
        f.write_str(name)
    }
}

/// Coordinator state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// No run in progress
    #[default]
    Idle,
    /// Checking preconditions
    Validating,
    /// Fetching documents
    Fetching,
    /// Building the artifact
    Assembling,
    /// Run completed with a report
    Done,
    /// Run aborted without a report
    Failed,
}

/// Event emitted during a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The coordinator moved to a new stage
    StageChanged {
        /// New stage
        stage: Stage,
    },

    /// Progress update for an overlay
    Progress {
        /// Units completed so far
        current: usize,
        /// Total units
        total: usize,
        /// Human-readable status line
        text: String,
    },

    /// One document failed
    ItemFailed {
        /// Original index of the request
        index: usize,
        /// Order code of the request
        order_code: String,
        /// Error message
        error: String,
    },

    /// Run finished with a report
    RunComplete {
        /// Documents included in the artifact
        success_count: usize,
        /// Documents that failed
        failure_count: usize,
    },

    /// Run aborted
    RunFailed {
        /// Error message
        error: String,
    },
}

/// The single output of a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// Which transform produced it
    pub kind: TransformKind,
    /// Suggested file name
    pub filename: String,
    /// MIME type of `bytes`
    pub content_type: &'static str,
    /// Artifact contents
    pub bytes: Vec<u8>,
    /// Archive entries or document pages, in output order
    pub parts: usize,
    /// Lowercase hex SHA-256 of `bytes`
    pub digest: String,
    /// How long a viewer should wait before opening the print dialog
    pub print_delay: Option<Duration>,
}

/// One line of the failure list in a report
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Order code of the failed request
    pub order_code: String,
    /// Filename of the failed request
    pub filename: String,
    /// Error message
    pub error: String,
}

impl From<&FailedDocument> for FailureDetail {
    fn from(failed: &FailedDocument) -> Self {
        Self {
            order_code: failed.request.order_code.clone(),
            filename: failed.request.filename.clone(),
            error: failed.error.to_string(),
        }
    }
}

/// Terminal report of a completed run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    /// The artifact, absent when nothing succeeded
    pub artifact: Option<Artifact>,
    /// Documents included in the artifact
    pub success_count: usize,
    /// Documents that failed to fetch or parse
    pub failure_count: usize,
    /// Failure details in the order they were recorded
    pub failures: Vec<FailureDetail>,
}

impl Report {
    /// Total number of requests in the run
    pub fn total(&self) -> usize {
        self.success_count + self.failure_count
    }

    /// End-of-run summary for display, listing at most `max_failures` failures
    pub fn summary(&self, max_failures: usize) -> String {
        let mut message = if self.success_count > 0 {
            format!(
                "Downloaded {}/{} labels",
                self.success_count,
                self.total()
            )
        } else {
            format!("No labels could be downloaded (0/{})", self.total())
        };

        if let Some(artifact) = &self.artifact {
            message.push_str(&format!("\nFile: {}", artifact.filename));
        }

        if self.failure_count > 0 {
            message.push_str(&format!("\nFailed: {}", self.failure_count));
            for failure in self.failures.iter().take(max_failures) {
                message.push_str(&format!("\n  - {}: {}", failure.order_code, failure.error));
            }
            if self.failures.len() > max_failures {
                message.push_str(&format!(
                    "\n  ... and {} more",
                    self.failures.len() - max_failures
                ));
            }
        }

        message
    }
}
