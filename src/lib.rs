//! # label-dl
//!
//! Batch retrieval of shipping-label PDFs and assembly into one artifact.
//!
//! ## Design Philosophy
//!
//! label-dl is designed to be:
//! - **Partial-failure tolerant** - one bad label never sinks the batch; every failure is reported
//! - **Order preserving** - output follows the selection order, not completion order
//! - **Bounded** - at most `concurrency_limit` fetches in flight, chunk by chunk
//! - **Event-driven** - consumers subscribe to stage and progress events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use label_dl::{Config, DocumentRequest, FetchConfig, LabelDownloader, TransformKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         fetch: FetchConfig::sequential(),
//!         ..Default::default()
//!     };
//!     let downloader = LabelDownloader::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let requests = vec![DocumentRequest::from_row(
//!         "https://labels.example.com/1001.pdf",
//!         "1001",
//!         "THG-1001",
//!         0,
//!     )];
//!     println!("{}", label_dl::utils::preview_requests(&requests, 10));
//!
//!     let report = downloader.run(&requests, TransformKind::Archive).await?;
//!     if let Some(artifact) = &report.artifact {
//!         downloader.save(artifact).await?;
//!     }
//!     println!("{}", downloader.summary(&report));
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Artifact assembly (archive, merge, print view)
pub mod assemble;
/// Bounded-concurrency batch fetching
pub mod batch;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Fetch boundary implementations
pub mod gateway;
/// Run coordination
pub mod pipeline;
/// Progress reporting sinks
pub mod progress;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// unwrap/expect are acceptable in test helpers for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use assemble::{
    Assembler, Capabilities, CliRasterizer, DocumentMerger, LopdfMerger, PageRasterizer,
};
pub use batch::BatchFetcher;
pub use config::{Config, FetchConfig, FileCollisionAction, OutputConfig, PrintConfig};
pub use error::{Error, FetchFailure, ItemError, Result, ValidationError};
pub use gateway::{ChannelFetchGateway, FetchGateway, HttpFetchGateway, spawn_fetch_worker};
pub use pipeline::LabelDownloader;
pub use progress::{BroadcastProgress, NoopProgress, ProgressSink};
pub use types::{
    Artifact, BatchResult, DocumentRequest, Event, FailedDocument, FailureDetail, FetchOutcome,
    FetchedDocument, Report, Stage, TransformKind,
};
