//! Pipeline coordinator -- one validated fetch-then-assemble run at a time.
//!
//! A run moves through `Idle -> Validating -> Fetching -> Assembling` and ends
//! in `Done` (with a [`Report`]) or `Failed` (with an [`Error`]). Every stage
//! change is published as [`Event::StageChanged`] on the broadcast channel and
//! on a `watch` channel for callers that only need the latest stage.

mod output;

use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::assemble::{
    Assembler, Capabilities, CliRasterizer, DocumentMerger, LopdfMerger, PageRasterizer,
};
use crate::batch::BatchFetcher;
use crate::config::Config;
use crate::error::{Error, Result, ValidationError};
use crate::gateway::{FetchGateway, HttpFetchGateway};
use crate::progress::{BroadcastProgress, ProgressSink};
use crate::types::{DocumentRequest, Event, FailureDetail, Report, Stage, TransformKind};


/// Capacity of the event channel; slow subscribers lag rather than block runs
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Per-instance run bookkeeping
#[derive(Clone)]
pub(crate) struct RunState {
    /// Set while a run is in flight
    running: Arc<AtomicBool>,
    /// Latest stage
    stage_tx: Arc<watch::Sender<Stage>>,
    /// Cancellation token of the run in flight
    cancel_token: Arc<Mutex<Option<CancellationToken>>>,
}

impl RunState {
    fn token_slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.cancel_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the instance when a run ends, including when its future is dropped
///
/// A run dropped mid-flight leaves no token behind and ends in `Failed`.
struct RunGuard<'a>(&'a LabelDownloader);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let downloader = self.0;
        downloader.run_state.token_slot().take();

        let stage = downloader.stage();
        if matches!(stage, Stage::Validating | Stage::Fetching | Stage::Assembling) {
            warn!(?stage, "run dropped before completion");
            downloader.set_stage(Stage::Failed);
            downloader.emit_event(Event::RunFailed {
                error: "run dropped before completion".to_string(),
            });
        }

        downloader.run_state.running.store(false, Ordering::SeqCst);
    }
}

/// Batch label downloader (cloneable - all fields are Arc-wrapped)
///
/// # Examples
///
/// ```no_run
/// use label_dl::{Config, DocumentRequest, LabelDownloader, TransformKind};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let downloader = LabelDownloader::new(Config::default())?;
/// let requests = vec![
///     DocumentRequest::from_row("https://labels.example.com/1.pdf", "1001", "THG-1", 0),
///     DocumentRequest::from_row("https://labels.example.com/2.pdf", "1002", "THG-2", 1),
/// ];
///
/// let report = downloader.run(&requests, TransformKind::Archive).await?;
/// println!("{}", downloader.summary(&report));
/// if let Some(artifact) = &report.artifact {
///     artifact.save_to(std::path::Path::new("./labels"), Default::default()).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LabelDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Fetch boundary
    pub(crate) gateway: Arc<dyn FetchGateway>,
    /// PDF merger; `None` disables merge output
    pub(crate) merger: Option<Arc<dyn DocumentMerger>>,
    /// Page rasterizer; `None` disables print output
    pub(crate) rasterizer: Option<Arc<dyn PageRasterizer>>,
    /// Single-flight state
    pub(crate) run_state: RunState,
}

impl LabelDownloader {
    /// Create a downloader that fetches over HTTP
    ///
    /// Merging uses lopdf. Print output is available when pdftoppm is
    /// configured or found in PATH.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let gateway = HttpFetchGateway::new(&config.fetch)?;
        Ok(Self::with_gateway(config, Arc::new(gateway)))
    }

    /// Create a downloader around an existing fetch gateway
    pub fn with_gateway(config: Config, gateway: Arc<dyn FetchGateway>) -> Self {
        let rasterizer = CliRasterizer::from_config(&config)
            .map(|r| Arc::new(r) as Arc<dyn PageRasterizer>);
        if rasterizer.is_none() {
            info!("pdftoppm not available, print output disabled");
        }

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (stage_tx, _stage_rx) = watch::channel(Stage::Idle);

        Self {
            config: Arc::new(config),
            event_tx,
            gateway,
            merger: Some(Arc::new(LopdfMerger)),
            rasterizer,
            run_state: RunState {
                running: Arc::new(AtomicBool::new(false)),
                stage_tx: Arc::new(stage_tx),
                cancel_token: Arc::new(Mutex::new(None)),
            },
        }
    }

    /// Replace the PDF merger (`None` disables merge output)
    pub fn with_merger(mut self, merger: Option<Arc<dyn DocumentMerger>>) -> Self {
        self.merger = merger;
        self
    }

    /// Replace the page rasterizer (`None` disables print output)
    pub fn with_rasterizer(mut self, rasterizer: Option<Arc<dyn PageRasterizer>>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    /// Subscribe to run events
    ///
    /// Events emitted before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current stage of this instance
    pub fn stage(&self) -> Stage {
        *self.run_state.stage_tx.borrow()
    }

    /// Watch stage changes
    pub fn watch_stage(&self) -> watch::Receiver<Stage> {
        self.run_state.stage_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Transforms available with the configured backends
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            archive: true,
            merge: self.merger.is_some(),
            raster: self.rasterizer.is_some(),
        }
    }

    /// Whether a run is in flight
    pub fn is_running(&self) -> bool {
        self.run_state.running.load(Ordering::SeqCst)
    }

    /// End-of-run text for `report`, listing at most
    /// `output.max_displayed_failures` failures
    pub fn summary(&self, report: &Report) -> String {
        report.summary(self.config.output.max_displayed_failures)
    }

    /// Cancel the run in flight
    ///
    /// The run stops at the next chunk boundary (or during the inter-chunk
    /// delay) and ends in `Failed` with [`Error::Cancelled`]. Returns `false`
    /// if nothing was running or the run already reached `Assembling`.
    pub async fn cancel(&self) -> bool {
        match self.run_state.token_slot().as_ref() {
            Some(token) => {
                info!("cancelling batch");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Fetch every request and build the artifact for `kind`
    ///
    /// Per-document failures never fail the run; they are listed in the
    /// report. A report is returned even when nothing succeeded.
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] if another run is in flight on this instance
    /// - [`Error::Validation`] if the requests, configuration or capabilities
    ///   cannot support the run (nothing is fetched)
    /// - [`Error::Cancelled`] if [`cancel`](Self::cancel) was called
    /// - writer errors from the assembly stage
    pub async fn run(&self, requests: &[DocumentRequest], kind: TransformKind) -> Result<Report> {
        if self
            .run_state
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("rejecting run, a batch is already in flight");
            return Err(Error::Busy);
        }
        let _guard = RunGuard(self);

        let token = CancellationToken::new();
        *self.run_state.token_slot() = Some(token.clone());

        let result = self.execute(requests, kind, token).await;

        match &result {
            Ok(report) => {
                info!(
                    transform = %kind,
                    success_count = report.success_count,
                    failure_count = report.failure_count,
                    artifact = report.artifact.as_ref().map(|a| a.filename.as_str()),
                    "batch complete"
                );
                self.set_stage(Stage::Done);
                self.emit_event(Event::RunComplete {
                    success_count: report.success_count,
                    failure_count: report.failure_count,
                });
            }
            Err(e) => {
                error!(transform = %kind, error = %e, "batch failed");
                self.set_stage(Stage::Failed);
                self.emit_event(Event::RunFailed {
                    error: e.to_string(),
                });
            }
        }
        result
    }

    async fn execute(
        &self,
        requests: &[DocumentRequest],
        kind: TransformKind,
        token: CancellationToken,
    ) -> Result<Report> {
        self.set_stage(Stage::Validating);
        self.validate(requests, kind)?;

        self.set_stage(Stage::Fetching);
        let progress: Arc<dyn ProgressSink> =
            Arc::new(BroadcastProgress::new(self.event_tx.clone()));
        let batch = BatchFetcher::new(self.gateway.as_ref(), &self.config.fetch, progress.as_ref())
            .with_cancel_token(token.clone())
            .with_events(self.event_tx.clone())
            .run(requests)
            .await?;

        // Assembly runs to completion once started
        self.run_state.token_slot().take();
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.set_stage(Stage::Assembling);
        let assembled = Assembler::new(&self.config, progress)
            .with_merger(self.merger.clone())
            .with_rasterizer(self.rasterizer.clone())
            .assemble(batch, kind, Utc::now())
            .await?;

        let failures: Vec<FailureDetail> =
            assembled.failures.iter().map(FailureDetail::from).collect();
        Ok(Report {
            artifact: assembled.artifact,
            success_count: assembled.included,
            failure_count: failures.len(),
            failures,
        })
    }

    /// Reject runs that cannot succeed before any fetch is issued
    fn validate(
        &self,
        requests: &[DocumentRequest],
        kind: TransformKind,
    ) -> std::result::Result<(), ValidationError> {
        if requests.is_empty() {
            return Err(ValidationError::EmptySelection);
        }

        let mut seen = HashSet::with_capacity(requests.len());
        for request in requests {
            let index = request.original_index;
            if request.url.trim().is_empty() {
                return Err(invalid(index, "URL is empty"));
            }
            if let Err(e) = url::Url::parse(&request.url) {
                return Err(invalid(index, &format!("URL is not absolute: {}", e)));
            }
            if request.filename.trim().is_empty() {
                return Err(invalid(index, "filename is empty"));
            }
            if !seen.insert(index) {
                return Err(ValidationError::DuplicateIndex { index });
            }
        }

        if !self.capabilities().supports(kind) {
            let reason = match kind {
                TransformKind::Merge => "no PDF merger configured",
                _ => "pdftoppm not found",
            };
            return Err(ValidationError::MissingCapability {
                transform: kind.to_string(),
                reason: reason.to_string(),
            });
        }

        self.config.validate()
    }

    fn set_stage(&self, stage: Stage) {
        self.run_state.stage_tx.send_replace(stage);
        self.emit_event(Event::StageChanged { stage });
    }

    /// Emit an event to all subscribers
    ///
    /// Without subscribers the event is dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

fn invalid(index: usize, reason: &str) -> ValidationError {
    ValidationError::InvalidRequest {
        index,
        reason: reason.to_string(),
    }
}
