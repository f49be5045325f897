//! Error types for MCP Hub

use std::io;

use thiserror::Error;

/// Result type alias for MCP Hub
pub type Result<T> = std::result::Result<T, Error>;

/// Capability kinds the hub routes by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    /// A callable tool
    Tool,
    /// A prompt template
    Prompt,
    /// A URI-addressed resource
    Resource,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool => write!(f, "tool"),
            Self::Prompt => write!(f, "prompt"),
            Self::Resource => write!(f, "resource"),
        }
    }
}

/// MCP Hub errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Capability absent from the current ownership index
    #[error("Unknown {kind}: {name}")]
    CapabilityNotFound {
        /// Capability kind (tool, prompt, resource)
        kind: CapabilityKind,
        /// Requested name or URI
        name: String,
    },

    /// Error returned by the owning backend, propagated verbatim
    #[error("Upstream error {code}: {message}")]
    Upstream {
        /// JSON-RPC error code from the backend
        code: i32,
        /// Error message from the backend
        message: String,
        /// Optional error data from the backend
        data: Option<serde_json::Value>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::Upstream { code, .. } => *code,
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            Self::Protocol(_) => rpc_codes::INVALID_REQUEST,
            Self::CapabilityNotFound { .. } => rpc_codes::INVALID_PARAMS,
            Self::Transport(_) | Self::Http(_) => rpc_codes::SERVER_ERROR_START,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }

    /// Error data payload for JSON-RPC responses (upstream data is replayed verbatim)
    #[must_use]
    pub fn to_rpc_data(&self) -> Option<serde_json::Value> {
        match self {
            Self::Upstream { data, .. } => data.clone(),
            _ => None,
        }
    }
}

/// Standard JSON-RPC error codes
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Server error range start
    pub const SERVER_ERROR_START: i32 = -32000;
}
