//! Stdio transport implementation (subprocess)

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error};

use super::Transport;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION, RequestId};
use crate::{Error, Result};

type PendingMap = dashmap::DashMap<String, oneshot::Sender<JsonRpcResponse>>;

/// Stdio transport for subprocess MCP servers
pub struct StdioTransport {
    /// Child process
    child: Mutex<Option<Child>>,
    /// Pending requests waiting for response (shared with the reader task)
    pending: Arc<PendingMap>,
    /// Request ID counter
    request_id: AtomicU64,
    /// Connected flag (shared with the reader task)
    connected: Arc<AtomicBool>,
    /// Command to execute
    command: String,
    /// Command arguments
    args: Vec<String>,
    /// Environment passed to the subprocess; already resolved, the child
    /// never inherits the hub's full environment through this map
    env: HashMap<String, String>,
    /// Writer handle
    writer: Mutex<Option<tokio::process::ChildStdin>>,
}

impl StdioTransport {
    /// Create a new stdio transport
    #[must_use]
    pub fn new(command: &str, args: Vec<String>, env: HashMap<String, String>) -> Arc<Self> {
        Arc::new(Self {
            child: Mutex::new(None),
            pending: Arc::new(PendingMap::new()),
            request_id: AtomicU64::new(1),
            connected: Arc::new(AtomicBool::new(false)),
            command: command.to_string(),
            args,
            env,
            writer: Mutex::new(None),
        })
    }

    /// Spawn the subprocess and start the reader task
    async fn spawn(&self) -> Result<()> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Transport(format!("Failed to spawn '{}': {e}", self.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("Failed to get stdin".to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("Failed to get stdout".to_string()))?;

        *self.writer.lock().await = Some(stdin);
        *self.child.lock().await = Some(child);

        let pending = Arc::clone(&self.pending);
        let connected = Arc::clone(&self.connected);
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();

            while let Ok(Some(line)) = reader.next_line().await {
                if let Err(e) = handle_response(&pending, &line) {
                    error!(error = %e, "Failed to handle response");
                }
            }

            connected.store(false, Ordering::Relaxed);
            // Wake any waiters; their oneshot senders drop with the map entries.
            pending.clear();
            debug!("Stdio reader task ended");
        });

        Ok(())
    }

    /// Initialize the MCP connection
    async fn initialize(&self) -> Result<()> {
        let response = self
            .request(
                "initialize",
                Some(serde_json::json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "mcp-hub",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                })),
            )
            .await?;

        if response.error.is_some() {
            return Err(Error::Protocol("Initialize failed".to_string()));
        }

        self.notify("notifications/initialized", None).await?;

        self.connected.store(true, Ordering::Relaxed);
        debug!(command = %self.command, "Stdio transport initialized");

        Ok(())
    }

    /// Write a message to stdin
    async fn write_message(&self, message: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        if let Some(ref mut stdin) = *writer {
            stdin
                .write_all(message.as_bytes())
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;
            stdin
                .write_all(b"\n")
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;
            stdin
                .flush()
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;
            Ok(())
        } else {
            Err(Error::Transport("Not connected".to_string()))
        }
    }

    /// Get next request ID
    #[allow(clippy::cast_possible_wrap)]
    fn next_id(&self) -> RequestId {
        RequestId::Number(self.request_id.fetch_add(1, Ordering::Relaxed) as i64)
    }
}

/// Route a response line from the subprocess to its pending request
fn handle_response(pending: &PendingMap, line: &str) -> Result<()> {
    let response: JsonRpcResponse = serde_json::from_str(line)?;

    if let Some(ref id) = response.id {
        let key = id.to_string();
        if let Some((_, sender)) = pending.remove(&key) {
            let _ = sender.send(response);
        }
    }

    Ok(())
}

#[async_trait]
impl Transport for StdioTransport {
    async fn open(&self) -> Result<()> {
        self.spawn().await?;
        self.initialize().await
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
        let id = self.next_id();
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: id.clone(),
            method: method.to_string(),
            params,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.to_string(), tx);

        let message = serde_json::to_string(&request)?;
        if let Err(e) = self.write_message(&message).await {
            self.pending.remove(&id.to_string());
            return Err(e);
        }

        match rx.await {
            Ok(response) => Ok(response),
            Err(_) => Err(Error::Transport("Response channel closed".to_string())),
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });

        let message = serde_json::to_string(&notification)?;
        self.write_message(&message).await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::Relaxed);

        // Drop stdin first so a well-behaved server exits on its own.
        *self.writer.lock().await = None;

        if let Some(ref mut child) = *self.child.lock().await {
            let _ = child.kill().await;
        }

        Ok(())
    }
}
