//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

/// MCP Hub - aggregate multiple MCP servers behind one stdio endpoint
#[derive(Parser, Debug)]
#[command(name = "mcp-hub")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (JSON)
    #[arg(short, long, default_value = "config.json", env = "MCP_HUB_CONFIG")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_HUB_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "MCP_HUB_LOG_FORMAT")]
    pub log_format: Option<String>,
}
