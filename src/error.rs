//! Error types for the OAuth bridge

use std::io;

use axum::http::StatusCode;
use thiserror::Error;

use crate::auth::TokenError;

/// Result type alias for the OAuth bridge
pub type Result<T> = std::result::Result<T, Error>;

/// OAuth bridge errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or missing request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown session, state, authorization code or token id
    #[error("Not found: {0}")]
    NotFound(String),

    /// The upstream provider rejected the exchange or is unreachable
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Bearer token rejected
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Operation the bridge never supports
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

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
    /// HTTP status surfaced to callers of client-facing endpoints
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::NotFound(_) | Self::NotImplemented(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Token(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// RFC 6749 error code
    #[must_use]
    pub fn oauth_error(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "invalid_grant",
            Self::Token(_) => "invalid_token",
            Self::NotImplemented(_) => "unsupported_grant_type",
            _ => "server_error",
        }
    }

    /// Whether this is a server-side failure (logged before responding)
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            Self::InvalidRequest(_) => rpc_codes::INVALID_PARAMS,
            Self::Upstream(_) | Self::Http(_) => rpc_codes::SERVER_ERROR_START,
            _ => rpc_codes::INTERNAL_ERROR,
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
