//! Shared test helpers: a scriptable fetch gateway and request builders.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchFailure;
use crate::gateway::FetchGateway;
use crate::progress::ProgressSink;
use crate::types::DocumentRequest;

/// How the mock answers one URL
#[derive(Clone, Debug)]
pub(crate) enum Behaviour {
    /// Answer with bytes after a delay
    Ok { bytes: Vec<u8>, delay: Duration },
    /// Fail after a delay
    Fail { failure: FetchFailure, delay: Duration },
    /// Never answer
    Hang,
}

/// Fetch lifecycle markers recorded by [`MockGateway`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Start(String),
    End(String),
}

/// Gateway with per-URL scripted answers and concurrency instrumentation
#[derive(Default)]
pub(crate) struct MockGateway {
    behaviours: HashMap<String, Behaviour>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    log: Mutex<Vec<Phase>>,
}

impl MockGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn ok(mut self, url: &str, bytes: &[u8], delay_ms: u64) -> Self {
        self.behaviours.insert(
            url.to_string(),
            Behaviour::Ok {
                bytes: bytes.to_vec(),
                delay: Duration::from_millis(delay_ms),
            },
        );
        self
    }

    pub(crate) fn fail(mut self, url: &str, failure: FetchFailure, delay_ms: u64) -> Self {
        self.behaviours.insert(
            url.to_string(),
            Behaviour::Fail {
                failure,
                delay: Duration::from_millis(delay_ms),
            },
        );
        self
    }

    pub(crate) fn hang(mut self, url: &str) -> Self {
        self.behaviours.insert(url.to_string(), Behaviour::Hang);
        self
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn log(&self) -> Vec<Phase> {
        self.log.lock().unwrap().clone()
    }
}

/// Decrements the in-flight counter even when the fetch future is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FetchGateway for MockGateway {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);
        self.log.lock().unwrap().push(Phase::Start(url.to_string()));

        let behaviour = self
            .behaviours
            .get(url)
            .cloned()
            .unwrap_or(Behaviour::Fail {
                failure: FetchFailure::Http {
                    status: 404,
                    status_text: "Not Found".to_string(),
                },
                delay: Duration::ZERO,
            });

        let result = match behaviour {
            Behaviour::Ok { bytes, delay } => {
                tokio::time::sleep(delay).await;
                Ok(bytes)
            }
            Behaviour::Fail { failure, delay } => {
                tokio::time::sleep(delay).await;
                Err(failure)
            }
            Behaviour::Hang => std::future::pending().await,
        };

        self.log.lock().unwrap().push(Phase::End(url.to_string()));
        result
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Progress sink that records every update
#[derive(Default)]
pub(crate) struct RecordingProgress {
    updates: Mutex<Vec<(usize, usize, String)>>,
}

impl RecordingProgress {
    pub(crate) fn counts(&self) -> Vec<(usize, usize)> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .map(|(c, t, _)| (*c, *t))
            .collect()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, text)| text.clone())
            .collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, current: usize, total: usize, text: &str) {
        self.updates
            .lock()
            .unwrap()
            .push((current, total, text.to_string()));
    }
}

/// URL used for the request at `index`
pub(crate) fn url(index: usize) -> String {
    format!("https://labels.test/{index}.pdf")
}

/// Request for `url(index)` with order code `ORD-{index}`
pub(crate) fn request(index: usize) -> DocumentRequest {
    DocumentRequest::new(url(index), &format!("label-{index}.pdf"), format!("ORD-{index}"), index)
}

/// Requests `0..n`
pub(crate) fn requests(n: usize) -> Vec<DocumentRequest> {
    (0..n).map(request).collect()
}

/// 404 failure used by most tests
pub(crate) fn not_found() -> FetchFailure {
    FetchFailure::Http {
        status: 404,
        status_text: "Not Found".to_string(),
    }
}
