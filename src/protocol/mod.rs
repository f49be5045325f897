//! MCP protocol types

mod messages;
mod types;

pub use messages::*;
pub use types::*;

/// MCP protocol version spoken to backends and the frontend
pub const PROTOCOL_VERSION: &str = "2024-11-05";
