//! MCP Protocol types (the subset served on `/mcp`)

mod messages;
mod types;

pub use messages::*;
pub use types::*;

/// Latest MCP protocol version
pub const PROTOCOL_VERSION: &str = "2025-11-25";

/// Versions accepted in `initialize`; anything else is answered with the latest
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] =
    &[PROTOCOL_VERSION, "2025-06-18", "2025-03-26", "2024-11-05"];

/// Version to answer an `initialize` request with
#[must_use]
pub fn negotiate_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|v| **v == requested)
        .copied()
        .unwrap_or(PROTOCOL_VERSION)
}
