//! Message-passing fetch boundary.
//!
//! A worker task owns the privileged gateway and answers requests that arrive
//! over an mpsc channel, replying on a per-request oneshot. Payloads follow the
//! JSON wire contract:
//!
//! ```json
//! {"action": "downloadFile", "url": "https://..."}
//! {"success": true, "blob": "<base64>"}
//! {"success": false, "error": "HTTP 404: Not Found"}
//! ```
//!
//! Failures of the channel itself surface as [`FetchFailure::Channel`], distinct
//! from errors the worker reports ([`FetchFailure::Remote`]).

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::FetchGateway;
use crate::error::{FetchFailure, Result};

/// Request sent to the fetch worker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum GatewayRequest {
    /// Fetch one document
    DownloadFile {
        /// Document URL
        url: String,
    },
    /// Fetch several documents one after another
    DownloadFiles {
        /// Documents to fetch
        urls: Vec<FileRef>,
    },
}

/// One entry of a `downloadFiles` request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    /// Document URL
    pub url: String,
    /// Output name, echoed back
    pub filename: String,
    /// Order code, echoed back
    pub order_code: String,
}

/// One entry of a `downloadFiles` response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    /// Whether this entry was fetched
    pub success: bool,
    /// Output name from the request
    pub filename: String,
    /// Order code from the request
    pub order_code: String,
    /// Base64 document bytes on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Error message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response from the fetch worker
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// Whether the request succeeded
    pub success: bool,
    /// Base64 document bytes (`downloadFile`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
    /// Per-file results (`downloadFiles`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<FileResult>>,
    /// Error message when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GatewayResponse {
    fn ok_blob(bytes: &[u8]) -> Self {
        Self {
            success: true,
            blob: Some(BASE64.encode(bytes)),
            ..Self::default()
        }
    }

    fn ok_results(results: Vec<FileResult>) -> Self {
        Self {
            success: true,
            results: Some(results),
            ..Self::default()
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// A request paired with its reply slot
struct Envelope {
    request: GatewayRequest,
    reply: oneshot::Sender<GatewayResponse>,
}

/// Handle one request against the privileged gateway
async fn handle_request(gateway: &dyn FetchGateway, request: GatewayRequest) -> GatewayResponse {
    match request {
        GatewayRequest::DownloadFile { url } => match gateway.fetch(&url).await {
            Ok(bytes) => {
                debug!(url = %url, size = bytes.len(), "worker fetched document");
                GatewayResponse::ok_blob(&bytes)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "worker fetch failed");
                GatewayResponse::err(e.to_string())
            }
        },
        GatewayRequest::DownloadFiles { urls } => {
            let mut results = Vec::with_capacity(urls.len());
            for file in urls {
                let result = match gateway.fetch(&file.url).await {
                    Ok(bytes) => FileResult {
                        success: true,
                        filename: file.filename,
                        order_code: file.order_code,
                        data: Some(BASE64.encode(&bytes)),
                        error: None,
                    },
                    Err(e) => FileResult {
                        success: false,
                        filename: file.filename,
                        order_code: file.order_code,
                        data: None,
                        error: Some(e.to_string()),
                    },
                };
                results.push(result);
            }
            GatewayResponse::ok_results(results)
        }
    }
}

/// Handle a JSON-encoded request and return the JSON-encoded response
///
/// For hosts that carry the contract over a byte transport. Malformed input
/// yields a `{success:false}` response rather than an error.
pub async fn handle_json(gateway: &dyn FetchGateway, message: &str) -> Result<String> {
    let response = match serde_json::from_str::<GatewayRequest>(message) {
        Ok(request) => handle_request(gateway, request).await,
        Err(e) => GatewayResponse::err(format!("invalid request: {e}")),
    };
    Ok(serde_json::to_string(&response)?)
}

/// Spawn a worker that owns `gateway` and serve requests from the returned client
///
/// Requests are handled concurrently; the worker stops when every client is dropped.
pub fn spawn_fetch_worker(
    gateway: Arc<dyn FetchGateway>,
    buffer: usize,
) -> (ChannelFetchGateway, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Envelope>(buffer.max(1));

    let handle = tokio::spawn(async move {
        debug!(gateway = gateway.name(), "fetch worker started");
        while let Some(Envelope { request, reply }) = rx.recv().await {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move {
                let response = handle_request(gateway.as_ref(), request).await;
                // Caller may have given up (timeout); nothing to do then
                reply.send(response).ok();
            });
        }
        debug!("fetch worker stopped");
    });

    (ChannelFetchGateway { tx }, handle)
}

/// Client side of the fetch worker
#[derive(Clone)]
pub struct ChannelFetchGateway {
    tx: mpsc::Sender<Envelope>,
}

impl ChannelFetchGateway {
    async fn call(&self, request: GatewayRequest) -> std::result::Result<GatewayResponse, FetchFailure> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope { request, reply })
            .await
            .map_err(|_| FetchFailure::Channel {
                message: "fetch worker is not running".to_string(),
            })?;
        reply_rx.await.map_err(|_| FetchFailure::Channel {
            message: "fetch worker dropped the request without answering".to_string(),
        })
    }

    /// Fetch several documents in one message, sequentially on the worker side
    pub async fn download_files(
        &self,
        files: Vec<FileRef>,
    ) -> std::result::Result<Vec<FileResult>, FetchFailure> {
        let response = self.call(GatewayRequest::DownloadFiles { urls: files }).await?;
        if !response.success {
            return Err(remote_error(response.error));
        }
        response.results.ok_or_else(|| FetchFailure::Channel {
            message: "response is missing results".to_string(),
        })
    }
}

fn remote_error(error: Option<String>) -> FetchFailure {
    FetchFailure::Remote {
        message: error.unwrap_or_else(|| "unknown error".to_string()),
    }
}

/// Decode a base64 payload from the worker
pub fn decode_blob(blob: &str) -> std::result::Result<Vec<u8>, FetchFailure> {
    BASE64.decode(blob).map_err(|e| FetchFailure::Channel {
        message: format!("invalid payload: {e}"),
    })
}

#[async_trait]
impl FetchGateway for ChannelFetchGateway {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchFailure> {
        let response = self
            .call(GatewayRequest::DownloadFile {
                url: url.to_string(),
            })
            .await?;

        if !response.success {
            return Err(remote_error(response.error));
        }

        match response.blob {
            Some(blob) => decode_blob(&blob),
            None => Err(FetchFailure::Channel {
                message: "response is missing blob".to_string(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}
