//! MCP OAuth Bridge Library
//!
//! Three-legged OAuth bridge that lets MCP clients use an OAuth2-protected
//! upstream API (LinkedIn) without ever seeing the upstream credentials.
//!
//! # Features
//!
//! - **Authorization server**: RFC 8414 metadata, RFC 7591 dynamic client
//!   registration, authorization code flow with mandatory PKCE (S256)
//! - **Upstream client**: the bridge performs the provider's code exchange
//!   and keeps the provider tokens server-side
//! - **Bearer tokens**: HS256 JWTs bound to the stored provider tokens
//! - **MCP endpoint**: `initialize`, `ping`, `tools/list` and `tools/call`
//!   over JSON-RPC, with tools calling the provider on the user's behalf
//!
//! All state lives in memory; restarting the process signs everyone out.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod tools;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install subscriber: {e}")))?,
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install subscriber: {e}")))?,
    }

    Ok(())
}
