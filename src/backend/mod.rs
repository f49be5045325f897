//! Backend connection management
//!
//! Establishes one live connection per configured backend at startup.
//! Backends are connected one at a time, in descriptor order, with a fixed
//! retry budget; a backend that cannot be connected is dropped from the
//! result and never blocks the ones after it.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::config::BackendDescriptor;
use crate::protocol::{JsonRpcResponse, ToolsListResult};
use crate::transport::{Transport, TransportFactory};

/// Connect retry policy: fixed attempt budget, fixed inter-attempt delay
#[derive(Debug, Clone, Copy)]
pub struct ConnectRetry {
    /// Maximum connect attempts per backend
    pub max_attempts: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(2500),
        }
    }
}

/// A live connection to one MCP backend
pub struct ConnectedBackend {
    /// Backend name
    pub name: String,
    /// Tool allowlist from the descriptor; `None` exposes every tool
    pub allowed_tools: Option<HashSet<String>>,
    /// Transport handle, owned exclusively by this record
    transport: Arc<dyn Transport>,
    /// Set once the transport has been closed
    closed: AtomicBool,
}

impl ConnectedBackend {
    /// Create a new connected backend record.
    ///
    /// An empty allowlist means "no filtering", same as no allowlist.
    #[must_use]
    pub fn new(
        name: &str,
        transport: Arc<dyn Transport>,
        allowed_tools: Option<Vec<String>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            allowed_tools: allowed_tools
                .filter(|tools| !tools.is_empty())
                .map(|tools| tools.into_iter().collect()),
            transport,
            closed: AtomicBool::new(false),
        }
    }

    /// Forward a request to the backend
    #[tracing::instrument(
        skip(self, params),
        fields(
            backend = %self.name,
            method = %method,
            request_id = %uuid::Uuid::new_v4()
        )
    )]
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
        self.transport.request(method, params).await
    }

    /// Check if the backend connection is live
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Close the backend connection.
    ///
    /// Safe to call more than once; the transport is closed at most once.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.transport.close().await
    }
}

/// Connects configured backends through an injected transport factory
pub struct ConnectionManager {
    factory: Arc<dyn TransportFactory>,
    retry: ConnectRetry,
}

impl ConnectionManager {
    /// Create a connection manager with the default retry policy
    #[must_use]
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            retry: ConnectRetry::default(),
        }
    }

    /// Connect every descriptor, one at a time, in descriptor order.
    ///
    /// Partial success: a descriptor that cannot be connected within the
    /// retry budget contributes no entry; the rest still connect.
    pub async fn connect_all(
        &self,
        descriptors: &[BackendDescriptor],
    ) -> Vec<Arc<ConnectedBackend>> {
        let mut backends = Vec::new();

        for descriptor in descriptors {
            if let Some(backend) = self.connect_one(descriptor).await {
                backends.push(Arc::new(backend));
            }
        }

        backends
    }

    async fn connect_one(&self, descriptor: &BackendDescriptor) -> Option<ConnectedBackend> {
        info!(backend = %descriptor.name, transport = %descriptor.transport.transport_type(), "Connecting to backend");

        for attempt in 1..=self.retry.max_attempts {
            let transport = match self.factory.create(&descriptor.transport) {
                Ok(transport) => transport,
                Err(e) => {
                    // A bad command or URL cannot improve with retries.
                    warn!(backend = %descriptor.name, error = %e, "Failed to construct transport, skipping backend");
                    return None;
                }
            };

            match transport.open().await {
                Ok(()) => {
                    info!(backend = %descriptor.name, "Connected to backend");
                    log_tool_catalog(&descriptor.name, transport.as_ref()).await;
                    return Some(ConnectedBackend::new(
                        &descriptor.name,
                        transport,
                        descriptor.allowed_tools.clone(),
                    ));
                }
                Err(e) => {
                    error!(backend = %descriptor.name, attempt, error = %e, "Failed to connect");
                    let _ = transport.close().await;

                    if attempt < self.retry.max_attempts {
                        info!(
                            backend = %descriptor.name,
                            delay_ms = u64::try_from(self.retry.delay.as_millis()).unwrap_or(u64::MAX),
                            attempt,
                            max_attempts = self.retry.max_attempts,
                            "Retrying connection"
                        );
                        sleep(self.retry.delay).await;
                    }
                }
            }
        }

        warn!(backend = %descriptor.name, "Retry budget exhausted, skipping backend");
        None
    }
}

/// Fetch and log the backend's tool catalog after a successful connect.
///
/// Diagnostic only: nothing is stored, and failures are logged and ignored.
async fn log_tool_catalog(name: &str, transport: &dyn Transport) {
    match transport.request("tools/list", None).await {
        Ok(response) => {
            let tools = response
                .result
                .and_then(|result| serde_json::from_value::<ToolsListResult>(result).ok())
                .map(|result| result.tools)
                .unwrap_or_default();

            if tools.is_empty() {
                info!(backend = %name, "No tools available");
                return;
            }

            for tool in &tools {
                debug!(
                    backend = %name,
                    tool = %tool.name,
                    description = tool.description.as_deref().unwrap_or(""),
                    "Discovered tool"
                );
            }
            info!(backend = %name, count = tools.len(), "Tools available");
        }
        Err(e) => warn!(backend = %name, error = %e, "Failed to fetch tool catalog"),
    }
}
