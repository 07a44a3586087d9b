//! Result assembly -- ordering fetched documents and building the artifact.
//!
//! Successes are sorted by `original_index` and fed to exactly one terminal
//! transform:
//! - [`TransformKind::Archive`] - ZIP of the raw bytes, never parsed
//! - [`TransformKind::Merge`] - one PDF concatenating every page
//! - [`TransformKind::Raster`] - HTML print view of every page as a PNG
//!
//! Documents the merge or raster step cannot read are moved to the failure
//! list as [`ItemError::Unreadable`]. A writer failure is fatal for the run.

pub mod archive;
pub mod merge;
pub mod raster;

pub use archive::build_archive;
pub use merge::{DocumentMerger, LopdfMerger, MergeOutput};
pub use raster::{CliRasterizer, PageRasterizer, RenderError, print_view_html};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, ItemError, Result, ValidationError};
use crate::progress::ProgressSink;
use crate::types::{Artifact, BatchResult, FailedDocument, FetchedDocument, TransformKind};
use crate::utils::{archive_filename, document_filename, sha256_hex};


/// Which transforms can run with the configured backends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// ZIP packaging (always available)
    pub archive: bool,
    /// PDF merging
    pub merge: bool,
    /// Rasterized print view
    pub raster: bool,
}

impl Capabilities {
    /// Whether `kind` can run
    pub fn supports(&self, kind: TransformKind) -> bool {
        match kind {
            TransformKind::Archive => self.archive,
            TransformKind::Merge => self.merge,
            TransformKind::Raster => self.raster,
        }
    }
}

/// What assembly produced
#[derive(Debug)]
pub struct Assembled {
    /// The artifact, absent when no document made it in
    pub artifact: Option<Artifact>,
    /// Documents included in the artifact
    pub included: usize,
    /// Fetch failures followed by documents rejected during assembly
    pub failures: Vec<FailedDocument>,
}

/// Applies one terminal transform to a [`BatchResult`]
pub struct Assembler<'a> {
    config: &'a Config,
    merger: Option<Arc<dyn DocumentMerger>>,
    rasterizer: Option<Arc<dyn PageRasterizer>>,
    progress: Arc<dyn ProgressSink>,
}

impl<'a> Assembler<'a> {
    /// Create an assembler that can only build archives
    pub fn new(config: &'a Config, progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            config,
            merger: None,
            rasterizer: None,
            progress,
        }
    }

    /// Enable [`TransformKind::Merge`]
    pub fn with_merger(mut self, merger: Option<Arc<dyn DocumentMerger>>) -> Self {
        self.merger = merger;
        self
    }

    /// Enable [`TransformKind::Raster`]
    pub fn with_rasterizer(mut self, rasterizer: Option<Arc<dyn PageRasterizer>>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    /// Transforms available with the configured backends
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            archive: true,
            merge: self.merger.is_some(),
            raster: self.rasterizer.is_some(),
        }
    }

    /// Order the successes and build the artifact for `kind`
    ///
    /// `now` names the artifact. With no successes there is no artifact and the
    /// failures pass through unchanged.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::MissingCapability`] if `kind` has no backend
    /// - [`Error::Zip`], [`Error::Pdf`], [`Error::ExternalTool`] and
    ///   [`Error::Assembly`] when the output as a whole cannot be produced
    pub async fn assemble(
        &self,
        batch: BatchResult,
        kind: TransformKind,
        now: DateTime<Utc>,
    ) -> Result<Assembled> {
        let BatchResult {
            mut successes,
            failures,
        } = batch;
        successes.sort_by_key(|document| document.request.original_index);

        if successes.is_empty() {
            info!(transform = %kind, failed = failures.len(), "nothing to assemble");
            return Ok(Assembled {
                artifact: None,
                included: 0,
                failures,
            });
        }

        info!(transform = %kind, documents = successes.len(), "assembling artifact");
        match kind {
            TransformKind::Archive => self.archive(successes, failures, now).await,
            TransformKind::Merge => self.merge(successes, failures, now).await,
            TransformKind::Raster => self.raster(successes, failures, now).await,
        }
    }

    async fn archive(
        &self,
        successes: Vec<FetchedDocument>,
        failures: Vec<FailedDocument>,
        now: DateTime<Utc>,
    ) -> Result<Assembled> {
        let included = successes.len();
        let level = self.config.output.compression_level;
        let progress = Arc::clone(&self.progress);

        let bytes =
            run_blocking(move || build_archive(&successes, level, progress.as_ref())).await?;

        Ok(Assembled {
            artifact: Some(self.artifact(
                TransformKind::Archive,
                archive_filename(&self.config.output.archive_prefix, now),
                "application/zip",
                bytes,
                included,
            )),
            included,
            failures,
        })
    }

    async fn merge(
        &self,
        successes: Vec<FetchedDocument>,
        mut failures: Vec<FailedDocument>,
        now: DateTime<Utc>,
    ) -> Result<Assembled> {
        let merger = self
            .merger
            .clone()
            .ok_or_else(|| missing(TransformKind::Merge, "no PDF merger configured"))?;
        let total = successes.len();
        self.progress.report(0, total, "Merging PDFs...");

        let (output, successes) = run_blocking(move || {
            let output = merger.merge(&successes)?;
            Ok((output, successes))
        })
        .await?;

        let mut rejected: HashMap<usize, String> = output.rejected.into_iter().collect();
        let mut included = 0;
        for (position, document) in successes.into_iter().enumerate() {
            match rejected.remove(&position) {
                Some(reason) => failures.push(FailedDocument {
                    request: document.request,
                    error: ItemError::Unreadable { reason },
                }),
                None => included += 1,
            }
        }
        self.progress.report(total, total, "Merge complete");

        if included == 0 {
            return Ok(Assembled {
                artifact: None,
                included,
                failures,
            });
        }

        let mut artifact = self.artifact(
            TransformKind::Merge,
            document_filename(&self.config.output.archive_prefix, now, "pdf"),
            "application/pdf",
            output.bytes,
            output.pages,
        );
        artifact.print_delay = Some(self.config.print.settle_delay);

        Ok(Assembled {
            artifact: Some(artifact),
            included,
            failures,
        })
    }

    async fn raster(
        &self,
        successes: Vec<FetchedDocument>,
        mut failures: Vec<FailedDocument>,
        now: DateTime<Utc>,
    ) -> Result<Assembled> {
        let rasterizer = self
            .rasterizer
            .clone()
            .ok_or_else(|| missing(TransformKind::Raster, "pdftoppm not found"))?;
        let total = successes.len();
        let dpi = self.config.print.render_dpi;
        let mut pages = Vec::new();
        let mut included = 0;

        for (i, document) in successes.into_iter().enumerate() {
            self.progress.report(
                i,
                total,
                &format!("Rendering {}...", document.request.filename),
            );
            match rasterizer.render_pages(&document.bytes, dpi).await {
                Ok(rendered) => {
                    debug!(
                        index = document.request.original_index,
                        pages = rendered.len(),
                        rasterizer = rasterizer.name(),
                        "rendered document"
                    );
                    pages.extend(rendered);
                    included += 1;
                }
                Err(RenderError::Unreadable(reason)) => {
                    warn!(
                        index = document.request.original_index,
                        filename = %document.request.filename,
                        error = %reason,
                        "skipping unrenderable document"
                    );
                    failures.push(FailedDocument {
                        request: document.request,
                        error: ItemError::Unreadable { reason },
                    });
                }
                Err(RenderError::Fatal(e)) => return Err(e),
            }
        }
        self.progress.report(total, total, "Rendering complete");

        if included == 0 {
            return Ok(Assembled {
                artifact: None,
                included,
                failures,
            });
        }

        let parts = pages.len();
        let html = print_view_html(&pages, self.config.print.settle_delay);
        let mut artifact = self.artifact(
            TransformKind::Raster,
            document_filename(&self.config.output.archive_prefix, now, "html"),
            "text/html",
            html.into_bytes(),
            parts,
        );
        artifact.print_delay = Some(self.config.print.settle_delay);

        Ok(Assembled {
            artifact: Some(artifact),
            included,
            failures,
        })
    }

    fn artifact(
        &self,
        kind: TransformKind,
        filename: String,
        content_type: &'static str,
        bytes: Vec<u8>,
        parts: usize,
    ) -> Artifact {
        let digest = sha256_hex(&bytes);
        debug!(%filename, size = bytes.len(), parts, %digest, "artifact built");
        Artifact {
            kind,
            filename,
            content_type,
            bytes,
            parts,
            digest,
            print_delay: None,
        }
    }
}

fn missing(kind: TransformKind, reason: &str) -> Error {
    ValidationError::MissingCapability {
        transform: kind.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Run CPU-bound assembly work on the blocking pool
async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| Error::Assembly(format!("assembly task failed: {}", e)))?
}
