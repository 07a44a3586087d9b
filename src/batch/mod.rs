//! Batch fetcher -- bounded-concurrency retrieval of an ordered request list.
//!
//! Requests are cut into consecutive chunks of `concurrency_limit`. Every fetch
//! of a chunk is in flight at once and the whole chunk settles before the next
//! one starts, so at most `concurrency_limit` fetches are ever unresolved.
//! `inter_item_delay` is slept between chunks. Outcomes keep their request, so
//! completion order inside a chunk does not matter downstream.

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::error::{Error, FetchFailure, Result, ValidationError};
use crate::gateway::FetchGateway;
use crate::progress::ProgressSink;
use crate::types::{BatchResult, DocumentRequest, Event, FetchOutcome};


/// Drives one run of fetches against a gateway
pub struct BatchFetcher<'a> {
    gateway: &'a dyn FetchGateway,
    config: &'a FetchConfig,
    progress: &'a dyn ProgressSink,
    cancel_token: CancellationToken,
    event_tx: Option<broadcast::Sender<Event>>,
}

impl<'a> BatchFetcher<'a> {
    /// Create a fetcher; cancellation and events are optional
    pub fn new(
        gateway: &'a dyn FetchGateway,
        config: &'a FetchConfig,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            gateway,
            config,
            progress,
            cancel_token: CancellationToken::new(),
            event_tx: None,
        }
    }

    /// Abort between chunks once `token` is cancelled
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Emit [`Event::ItemFailed`] on `event_tx` as failures settle
    pub fn with_events(mut self, event_tx: broadcast::Sender<Event>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Fetch every request, returning one outcome per request
    ///
    /// # Errors
    ///
    /// - [`ValidationError::EmptySelection`] if `requests` is empty (nothing is fetched)
    /// - [`Error::Cancelled`] if the token fires between chunks or during the delay
    ///
    /// Per-item failures are never errors; they land in [`BatchResult::failures`].
    pub async fn run(&self, requests: &[DocumentRequest]) -> Result<BatchResult> {
        if requests.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }

        let total = requests.len();
        let limit = self.config.concurrency_limit.max(1);
        let chunk_count = total.div_ceil(limit);
        let mut result = BatchResult::default();

        info!(
            total,
            concurrency_limit = limit,
            chunks = chunk_count,
            gateway = self.gateway.name(),
            "starting batch fetch"
        );

        for (chunk_index, chunk) in requests.chunks(limit).enumerate() {
            if self.cancel_token.is_cancelled() {
                info!(completed = result.total(), total, "batch cancelled");
                return Err(Error::Cancelled);
            }

            let start = chunk_index * limit;
            let end = start + chunk.len();
            self.progress.report(start, total, &chunk_label(chunk, start, total));

            let mut in_flight: FuturesUnordered<_> =
                chunk.iter().map(|request| self.fetch_one(request)).collect();

            while let Some(outcome) = in_flight.next().await {
                self.observe(&outcome);
                result.record(outcome);
            }

            self.progress.report(end, total, &chunk_label(chunk, start, total));
            debug!(
                chunk = chunk_index,
                succeeded = result.successes.len(),
                failed = result.failures.len(),
                "chunk settled"
            );

            let is_last = chunk_index + 1 == chunk_count;
            if !is_last && !self.config.inter_item_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.inter_item_delay) => {}
                    _ = self.cancel_token.cancelled() => {
                        info!(completed = result.total(), total, "batch cancelled during delay");
                        return Err(Error::Cancelled);
                    }
                }
            }
        }

        info!(
            succeeded = result.successes.len(),
            failed = result.failures.len(),
            "batch fetch finished"
        );
        Ok(result)
    }

    /// Fetch one request under the per-request deadline
    async fn fetch_one(&self, request: &DocumentRequest) -> FetchOutcome {
        let fetched =
            match tokio::time::timeout(self.config.request_timeout, self.gateway.fetch(&request.url))
                .await
            {
                Ok(fetched) => fetched,
                Err(_) => Err(FetchFailure::Timeout),
            };

        match fetched {
            Ok(bytes) => FetchOutcome::Success {
                request: request.clone(),
                bytes,
            },
            Err(reason) => FetchOutcome::Failure {
                request: request.clone(),
                reason,
            },
        }
    }

    fn observe(&self, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Success { request, bytes } => {
                debug!(
                    index = request.original_index,
                    filename = %request.filename,
                    size = bytes.len(),
                    "document fetched"
                );
            }
            FetchOutcome::Failure { request, reason } => {
                warn!(
                    index = request.original_index,
                    order_code = %request.order_code,
                    error = %reason,
                    "document fetch failed"
                );
                if let Some(tx) = &self.event_tx {
                    tx.send(Event::ItemFailed {
                        index: request.original_index,
                        order_code: request.order_code.clone(),
                        error: reason.to_string(),
                    })
                    .ok();
                }
            }
        }
    }
}

/// Overlay text for a chunk: the filename when fetching one at a time, else the range
fn chunk_label(chunk: &[DocumentRequest], start: usize, total: usize) -> String {
    match chunk {
        [single] => format!("Downloading {}...", single.filename),
        _ => format!(
            "Downloading {}-{} of {}...",
            start + 1,
            start + chunk.len(),
            total
        ),
    }
}
