//! Hub server: lifecycle coordination and the frontend stdio loop
//!
//! Startup wires descriptors through the connection manager into a fresh
//! router; shutdown fans out close over every connected backend. The
//! frontend speaks line-delimited JSON-RPC over stdio, one request at a
//! time.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{debug, info, warn};

use super::router::Router;
use crate::backend::{ConnectedBackend, ConnectionManager};
use crate::config::BackendDescriptor;
use crate::error::rpc_codes;
use crate::protocol::{
    Info, InitializeResult, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION,
    PromptsCapability, ResourcesCapability, ServerCapabilities, ToolsCapability,
};
use crate::transport::TransportFactory;
use crate::{Error, Result};

/// Aggregating MCP hub: connected backends plus the router over them
pub struct Hub {
    /// Aggregation router
    router: Arc<Router>,
    /// Connected backends, in descriptor order
    backends: Vec<Arc<ConnectedBackend>>,
}

impl Hub {
    /// Connect all configured backends and wire them into a router.
    ///
    /// Partial success at the backend level is not an error; a hub with
    /// zero connected backends still serves (empty) catalogs.
    pub async fn start(
        descriptors: &[BackendDescriptor],
        factory: Arc<dyn TransportFactory>,
    ) -> Result<Self> {
        let manager = ConnectionManager::new(factory);
        let backends = manager.connect_all(descriptors).await;

        info!(
            connected = backends.len(),
            configured = descriptors.len(),
            "Connected to backends"
        );

        let router = Arc::new(Router::new(backends.clone()));

        Ok(Self { router, backends })
    }

    /// The aggregation router
    #[must_use]
    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.router)
    }

    /// Close every backend concurrently.
    ///
    /// Individual close failures are logged and ignored. Safe to call more
    /// than once; each backend's transport is closed at most once.
    pub async fn shutdown(&self) {
        let closes = self.backends.iter().map(|backend| {
            let backend = Arc::clone(backend);
            async move {
                if let Err(e) = backend.close().await {
                    warn!(backend = %backend.name, error = %e, "Failed to close backend");
                }
            }
        });

        futures::future::join_all(closes).await;
    }

    /// Serve the frontend protocol over stdio until EOF or an interrupt,
    /// then shut down all backends.
    pub async fn run(self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(stdin).lines();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        info!("MCP Hub ready on stdio");

        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if let Some(response) = self.handle_line(line).await {
                            let message = serde_json::to_string(&response)?;
                            stdout.write_all(message.as_bytes()).await?;
                            stdout.write_all(b"\n").await?;
                            stdout.flush().await?;
                        }
                    }
                    None => {
                        info!("Frontend closed stdin");
                        break;
                    }
                },
                () = &mut shutdown => break,
            }
        }

        info!("Shutting down backends");
        self.shutdown().await;

        Ok(())
    }

    /// Handle one frontend line; notifications and responses produce no reply
    async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let message: JsonRpcMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Invalid JSON-RPC message from frontend");
                return Some(JsonRpcResponse::error(
                    None,
                    rpc_codes::PARSE_ERROR,
                    "Parse error",
                ));
            }
        };

        match message {
            JsonRpcMessage::Request(request) => Some(self.dispatch(request).await),
            JsonRpcMessage::Notification(notification) => {
                debug!(method = %notification.method, "Ignoring frontend notification");
                None
            }
            JsonRpcMessage::Response(_) => None,
        }
    }

    /// Dispatch one frontend request to the router
    async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        debug!(method = %method, id = %id, "Frontend request");

        let outcome: Result<Value> = match method.as_str() {
            "initialize" => encode(initialize_result()),
            "ping" => Ok(json!({})),
            "tools/list" => match parse_params(params) {
                Ok(p) => encode(self.router.list_tools(p).await),
                Err(e) => Err(e),
            },
            "tools/call" => match required_params(params) {
                Ok(p) => self.router.call_tool(p).await,
                Err(e) => Err(e),
            },
            "prompts/list" => match parse_params(params) {
                Ok(p) => encode(self.router.list_prompts(p).await),
                Err(e) => Err(e),
            },
            "prompts/get" => match required_params(params) {
                Ok(p) => self.router.get_prompt(p).await,
                Err(e) => Err(e),
            },
            "resources/list" => match parse_params(params) {
                Ok(p) => encode(self.router.list_resources(p).await),
                Err(e) => Err(e),
            },
            "resources/read" => match required_params(params) {
                Ok(p) => self.router.read_resource(p).await,
                Err(e) => Err(e),
            },
            "resources/templates/list" => match parse_params(params) {
                Ok(p) => encode(self.router.list_resource_templates(p).await),
                Err(e) => Err(e),
            },
            _ => {
                return JsonRpcResponse::error(
                    Some(id),
                    rpc_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {method}"),
                );
            }
        };

        match outcome {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => {
                JsonRpcResponse::error_with_data(Some(id), e.to_rpc_code(), e.to_string(), e.to_rpc_data())
            }
        }
    }
}

/// Initialize result advertised to the frontend
fn initialize_result() -> InitializeResult {
    InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities {
            prompts: Some(PromptsCapability::default()),
            resources: Some(ResourcesCapability {
                subscribe: Some(true),
                list_changed: None,
            }),
            tools: Some(ToolsCapability::default()),
        },
        server_info: Info {
            name: "mcp-hub".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    }
}

/// Parse optional params, falling back to the type's default
fn parse_params<T: DeserializeOwned + Default>(params: Option<Value>) -> Result<T> {
    match params {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("Invalid params: {e}"))),
        None => Ok(T::default()),
    }
}

/// Parse params that a method cannot do without
fn required_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let value = params.ok_or_else(|| Error::Protocol("Missing params".to_string()))?;
    serde_json::from_value(value).map_err(|e| Error::Protocol(format!("Invalid params: {e}")))
}

/// Serialize a result payload
fn encode<T: serde::Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Resolves when the process receives an interrupt or terminate signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
