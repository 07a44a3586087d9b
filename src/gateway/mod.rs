//! Fetch gateway -- the privileged "fetch by URL" boundary.
//!
//! - [`http`] - direct HTTP retrieval without caller credentials
//! - [`channel`] - message-passing client and worker around any gateway

use async_trait::async_trait;

use crate::error::FetchFailure;

pub mod channel;
pub mod http;

pub use channel::{
    ChannelFetchGateway, FileRef, FileResult, GatewayRequest, GatewayResponse, spawn_fetch_worker,
};
pub use http::HttpFetchGateway;

/// Retrieval of a single document
///
/// Implementations must not forward the caller's cookies or credentials.
/// Every call is awaited individually by the batch fetcher; a failure is
/// returned, never panicked, so sibling fetches keep going.
#[async_trait]
pub trait FetchGateway: Send + Sync {
    /// Fetch the bytes behind `url`
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchFailure>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
