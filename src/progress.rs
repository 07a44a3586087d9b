//! Progress reporting sinks
//!
//! The pipeline pushes `(current, total, text)` updates into a [`ProgressSink`].
//! Sinks never influence the outcome of a run.

use crate::types::Event;
use tokio::sync::broadcast;

/// Receiver of discrete progress updates
pub trait ProgressSink: Send + Sync {
    /// Report that `current` of `total` units are done
    fn report(&self, current: usize, total: usize, text: &str);
}

/// Sink that forwards updates as [`Event::Progress`] on a broadcast channel
#[derive(Clone)]
pub struct BroadcastProgress {
    event_tx: broadcast::Sender<Event>,
}

impl BroadcastProgress {
    /// Wrap an existing event channel
    pub fn new(event_tx: broadcast::Sender<Event>) -> Self {
        Self { event_tx }
    }
}

impl ProgressSink for BroadcastProgress {
    fn report(&self, current: usize, total: usize, text: &str) {
        // No subscribers is fine
        self.event_tx
            .send(Event::Progress {
                current,
                total,
                text: text.to_string(),
            })
            .ok();
    }
}

/// Sink that drops every update
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _current: usize, _total: usize, _text: &str) {}
}

/// Percentage of `current` over `total`, 0 when `total` is 0
pub fn percent(current: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        current as f32 / total as f32 * 100.0
    }
}
