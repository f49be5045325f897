//! Backend descriptor configuration
//!
//! Two on-disk schema variants normalize to the same descriptor list:
//!
//! - explicit: `{"servers": [{"name": "...", "transport": {...}, "tools": [...]}]}`
//! - map-style: `{"mcpServers": {"name": {"command"|"url": "...", ...}}}`
//!
//! A missing or malformed config file yields an empty descriptor list; the
//! hub starts with zero backends rather than refusing to start.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

/// Normalized connection parameters for one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    /// Backend name (unique, caller-supplied)
    pub name: String,
    /// Transport parameters
    pub transport: TransportSpec,
    /// Optional tool allowlist; `None` exposes every tool
    pub allowed_tools: Option<Vec<String>>,
}

/// Transport parameters for one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSpec {
    /// Subprocess transport
    Stdio {
        /// Command to execute
        command: String,
        /// Command arguments
        args: Vec<String>,
        /// Environment variable names passed through from the hub's
        /// own environment (values are never stored in config)
        env: Vec<String>,
    },
    /// Streamable HTTP transport
    Http {
        /// Endpoint URL
        url: String,
    },
}

impl TransportSpec {
    /// Get transport type name
    #[must_use]
    pub fn transport_type(&self) -> &'static str {
        match self {
            Self::Stdio { .. } => "stdio",
            Self::Http { .. } => "http",
        }
    }
}

/// On-disk config document, one of two supported shapes.
///
/// The untagged enum is the single point where the two schemas are told
/// apart; a document carrying both keys parses as the explicit shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    /// Explicit list of named server entries
    Explicit {
        servers: Vec<RawServer>,
    },
    /// Map of server name to connection parameters
    MapStyle {
        #[serde(rename = "mcpServers")]
        mcp_servers: BTreeMap<String, RawMapServer>,
    },
}

#[derive(Debug, Deserialize)]
struct RawServer {
    name: String,
    transport: RawTransport,
    #[serde(default)]
    tools: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawTransport {
    /// "stdio" or "sse"; anything else (or absent) means stdio
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Option<Vec<String>>,
    #[serde(default)]
    env: Option<Vec<String>>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMapServer {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Option<Vec<String>>,
    #[serde(default)]
    env: Option<Vec<String>>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    tools: Option<Vec<String>>,
}

/// Load backend descriptors from a config file.
///
/// Never fails: a missing or unparseable file logs a warning and yields an
/// empty list.
pub fn load_descriptors(path: &Path) -> Vec<BackendDescriptor> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Config file not readable, starting with zero backends");
            return Vec::new();
        }
    };

    match serde_json::from_str::<ConfigFile>(&raw) {
        Ok(file) => {
            match &file {
                ConfigFile::Explicit { .. } => info!("Using explicit configuration format"),
                ConfigFile::MapStyle { .. } => info!("Detected map-style configuration format"),
            }
            normalize(file)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Config file not valid, starting with zero backends");
            Vec::new()
        }
    }
}

/// Normalize an on-disk document into descriptors.
///
/// Total: every well-typed document maps to a descriptor list. Entries with
/// missing commands or URLs still normalize; transport construction rejects
/// them later, which is what keeps one bad entry from blocking the rest.
/// Map-style entries normalize in name order so descriptor order (and with
/// it collision resolution) is reproducible.
fn normalize(file: ConfigFile) -> Vec<BackendDescriptor> {
    match file {
        ConfigFile::Explicit { servers } => servers
            .into_iter()
            .map(|server| BackendDescriptor {
                name: server.name,
                transport: normalize_transport(server.transport),
                allowed_tools: server.tools,
            })
            .collect(),
        ConfigFile::MapStyle { mcp_servers } => mcp_servers
            .into_iter()
            .map(|(name, server)| {
                let transport = match server.url {
                    Some(url) => TransportSpec::Http { url },
                    None => TransportSpec::Stdio {
                        command: server.command.unwrap_or_default(),
                        args: server.args.unwrap_or_default(),
                        env: server.env.unwrap_or_default(),
                    },
                };
                BackendDescriptor {
                    name,
                    transport,
                    allowed_tools: server.tools,
                }
            })
            .collect(),
    }
}

fn normalize_transport(raw: RawTransport) -> TransportSpec {
    // Only an explicit "sse" selects the streamed transport; an absent or
    // unknown type falls back to the subprocess transport.
    if raw.kind.as_deref() == Some("sse") {
        TransportSpec::Http {
            url: raw.url.unwrap_or_default(),
        }
    } else {
        TransportSpec::Stdio {
            command: raw.command.unwrap_or_default(),
            args: raw.args.unwrap_or_default(),
            env: raw.env.unwrap_or_default(),
        }
    }
}
