//! HTTP fetch gateway backed by reqwest

use async_trait::async_trait;
use tracing::debug;

use super::FetchGateway;
use crate::config::FetchConfig;
use crate::error::{FetchFailure, Result};

/// Gateway that performs plain GET requests
///
/// The client has no cookie store and sends no authorization headers, so
/// requests carry no session of the page that selected the labels.
#[derive(Clone)]
pub struct HttpFetchGateway {
    client: reqwest::Client,
}

impl HttpFetchGateway {
    /// Build a gateway from fetch settings
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Use a preconfigured client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn classify(err: reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::Timeout
    } else {
        FetchFailure::Transport {
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl FetchGateway for HttpFetchGateway {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchFailure> {
        debug!(url, "fetching document");

        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            // Canonical phrase; reqwest does not expose the server's reason text
            return Err(FetchFailure::Http {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(classify)?;
        debug!(url, size = bytes.len(), "document fetched");
        Ok(bytes.to_vec())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
