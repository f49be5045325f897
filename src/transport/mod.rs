//! Transport implementations for MCP backends

mod http;
mod stdio;

pub use self::http::HttpTransport;
pub use self::stdio::StdioTransport;

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::config::TransportSpec;
use crate::{Error, Result, protocol::JsonRpcResponse};

/// Transport trait for MCP communication
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the transport and run the MCP initialize handshake
    async fn open(&self) -> Result<()>;

    /// Send a request and wait for response
    async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse>;

    /// Send a notification (no response expected)
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;

    /// Check if transport is connected
    fn is_connected(&self) -> bool;

    /// Close the transport
    async fn close(&self) -> Result<()>;
}

/// Builds unopened transports from backend transport specs.
///
/// The connection manager takes a factory instead of constructing
/// transports itself, so tests and alternative stream implementations can
/// substitute their own.
pub trait TransportFactory: Send + Sync {
    /// Construct an unopened transport for the given spec.
    ///
    /// Construction errors (bad URL, empty command) are non-retryable; the
    /// caller skips the backend without attempting to connect.
    fn create(&self, spec: &TransportSpec) -> Result<Arc<dyn Transport>>;
}

/// Production factory: stdio subprocess and streamable HTTP transports
#[derive(Debug, Default)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, spec: &TransportSpec) -> Result<Arc<dyn Transport>> {
        match spec {
            TransportSpec::Stdio { command, args, env } => {
                if command.trim().is_empty() {
                    return Err(Error::Config("Empty command".to_string()));
                }
                let transport: Arc<dyn Transport> =
                    StdioTransport::new(command, args.clone(), passthrough_env(env));
                Ok(transport)
            }
            TransportSpec::Http { url } => {
                let parsed = Url::parse(url)
                    .map_err(|e| Error::Config(format!("Invalid URL '{url}': {e}")))?;
                let transport: Arc<dyn Transport> = HttpTransport::new(parsed.as_str())?;
                Ok(transport)
            }
        }
    }
}

/// Resolve passthrough keys against the current process environment.
///
/// Only the named keys are forwarded, with unset keys resolving to empty
/// strings; the subprocess never inherits the hub's full environment
/// through this map.
fn passthrough_env(keys: &[String]) -> HashMap<String, String> {
    keys.iter()
        .map(|key| (key.clone(), env::var(key).unwrap_or_default()))
        .collect()
}
