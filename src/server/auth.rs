//! Bearer token middleware for the MCP endpoint
//!
//! Verified requests carry the [`AuthInfo`] as a request extension; handlers
//! read it with `Extension<AuthInfo>`.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, warn};

use super::router::AppState;
use crate::auth::AuthInfo;
use crate::error::rpc_codes;

/// Authentication middleware
pub async fn bearer_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let Some(token) = token else {
        warn!(path = %path, "Missing Authorization header");
        return unauthorized_response(
            &state,
            "Missing Authorization header. Use: Authorization: Bearer <token>",
        );
    };

    match state.bridge.verify_access_token(token) {
        Ok(auth) => {
            debug!(client_id = %auth.client_id, path = %path, "Authenticated request");
            request.extensions_mut().insert::<AuthInfo>(auth);
            next.run(request).await
        }
        Err(e) => {
            warn!(path = %path, error = %e, "Bearer token rejected");
            unauthorized_response(&state, &e.to_string())
        }
    }
}

/// 401 pointing the client at the protected resource metadata (RFC 9728 §5.1)
fn unauthorized_response(state: &AppState, message: &str) -> Response {
    let challenge = format!(
        "Bearer error=\"invalid_token\", resource_metadata=\"{}\"",
        state.resource_metadata_url
    );

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, challenge)],
        Json(json!({
            "jsonrpc": "2.0",
            "error": {
                "code": rpc_codes::SERVER_ERROR_START,
                "message": message
            },
            "id": null
        })),
    )
        .into_response()
}
