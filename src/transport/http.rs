//! Streamable HTTP transport implementation
//!
//! Speaks MCP Streamable HTTP: every JSON-RPC message is POSTed to a fixed
//! endpoint URL. The server may answer with a plain JSON body or with a
//! single-response SSE stream; both are handled. A session id issued via
//! the `mcp-session-id` response header is replayed on every subsequent
//! request and released with a DELETE on close.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, header};
use serde_json::Value;
use tracing::{debug, warn};

use super::Transport;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION, RequestId};
use crate::{Error, Result};

/// HTTP transport for MCP servers using the Streamable HTTP protocol
pub struct HttpTransport {
    /// HTTP client
    client: Client,
    /// Endpoint URL
    endpoint: String,
    /// Session ID issued by the server, if any
    session_id: RwLock<Option<String>>,
    /// Request ID counter
    request_id: AtomicU64,
    /// Connected flag
    connected: AtomicBool,
}

impl HttpTransport {
    /// Create a new HTTP transport
    ///
    /// No request timeout is configured; call-level deadlines are not
    /// implemented at this layer.
    pub fn new(url: &str) -> Result<Arc<Self>> {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Arc::new(Self {
            client,
            endpoint: url.to_string(),
            session_id: RwLock::new(None),
            request_id: AtomicU64::new(1),
            connected: AtomicBool::new(false),
        }))
    }

    /// POST a JSON-RPC message and decode the response body, if any
    async fn send(&self, body: &Value, expect_response: bool) -> Result<Option<JsonRpcResponse>> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(header::ACCEPT, "application/json, text/event-stream")
            .header("MCP-Protocol-Version", PROTOCOL_VERSION)
            .json(body);

        if let Some(session) = self.session_id.read().clone() {
            request = request.header("mcp-session-id", session);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(format!("POST failed: {e}")))?;

        // The server may issue (or rotate) a session id on any response.
        if let Some(session) = response
            .headers()
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.write() = Some(session.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("Endpoint returned: {status}")));
        }

        if !expect_response {
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let text = response.text().await?;

        if content_type.starts_with("text/event-stream") {
            return Ok(Some(parse_sse_response(&text)?));
        }

        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Get next request ID
    #[allow(clippy::cast_possible_wrap)]
    fn next_id(&self) -> RequestId {
        RequestId::Number(self.request_id.fetch_add(1, Ordering::Relaxed) as i64)
    }
}

/// Extract the JSON-RPC response from a single-response SSE body.
///
/// Streamable HTTP servers may frame the response as one or more SSE
/// events; the response is the first `data:` payload that parses as a
/// JSON-RPC response carrying a result or error.
fn parse_sse_response(body: &str) -> Result<JsonRpcResponse> {
    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(data) {
                if response.result.is_some() || response.error.is_some() {
                    return Ok(response);
                }
            }
        }
    }

    Err(Error::Protocol(
        "SSE body contained no JSON-RPC response".to_string(),
    ))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self) -> Result<()> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: self.next_id(),
            method: "initialize".to_string(),
            params: Some(serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "mcp-hub",
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
        };

        let response = self
            .send(&serde_json::to_value(&request)?, true)
            .await?
            .ok_or_else(|| Error::Protocol("Initialize returned no response".to_string()))?;

        if response.error.is_some() {
            return Err(Error::Protocol("Initialize failed".to_string()));
        }

        self.notify("notifications/initialized", None).await?;

        self.connected.store(true, Ordering::Relaxed);
        debug!(url = %self.endpoint, "HTTP transport initialized");

        Ok(())
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: self.next_id(),
            method: method.to_string(),
            params,
        };

        self.send(&serde_json::to_value(&request)?, true)
            .await?
            .ok_or_else(|| Error::Protocol("Request returned no response".to_string()))
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });

        self.send(&notification, false).await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::Relaxed);

        // Best-effort session termination; the server may not support it.
        let session = self.session_id.write().take();
        if let Some(session) = session {
            let result = self
                .client
                .delete(&self.endpoint)
                .header("mcp-session-id", session)
                .send()
                .await;
            if let Err(e) = result {
                warn!(url = %self.endpoint, error = %e, "Failed to terminate session");
            }
        }

        Ok(())
    }
}
