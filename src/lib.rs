//! MCP Hub Library
//!
//! Aggregates an arbitrary number of MCP servers behind a single stdio
//! endpoint. The hub connects to every configured backend, merges their
//! tool/prompt/resource catalogs into one annotated catalog, and routes
//! each call back to whichever backend owns the named capability.
//!
//! # Components
//!
//! - **Connection manager**: sequential bounded-retry startup, partial
//!   success (one broken backend never blocks the rest)
//! - **Aggregation router**: merged catalogs with `[backend]` source tags,
//!   per-backend tool allowlists, name-to-backend ownership routing
//! - **Multi-transport backends**: stdio subprocess and streamable HTTP

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod transport;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// Output goes to stderr: stdout carries the frontend JSON-RPC stream.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            subscriber
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
