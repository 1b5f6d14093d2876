//! HTTP router and shared state

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use url::Url;

use super::auth::bearer_middleware;
use super::{mcp, oauth};
use crate::Result;
use crate::auth::{AuthorizationBridge, AuthorizationServerMetadata, ProtectedResourceMetadata};
use crate::config::ServerConfig;
use crate::tools::Tools;

/// Path of the bearer-protected MCP endpoint
pub const MCP_PATH: &str = "/mcp";

const AUTHORIZATION_SERVER_METADATA_PATH: &str = "/.well-known/oauth-authorization-server";
const PROTECTED_RESOURCE_METADATA_PATH: &str = "/.well-known/oauth-protected-resource";

/// Shared application state
pub struct AppState {
    /// Authorization bridge
    pub bridge: Arc<AuthorizationBridge>,
    /// Tool dispatcher
    pub tools: Arc<Tools>,
    /// RFC 8414 document
    pub authorization_metadata: AuthorizationServerMetadata,
    /// RFC 9728 document for [`MCP_PATH`]
    pub resource_metadata: ProtectedResourceMetadata,
    /// Absolute URL of the protected resource metadata, advertised on 401
    pub resource_metadata_url: String,
}

impl AppState {
    /// Build the state for a bridge reachable at `issuer`.
    pub fn new(bridge: Arc<AuthorizationBridge>, tools: Arc<Tools>, issuer: &Url) -> Result<Self> {
        let scopes = bridge.scopes().to_vec();
        let authorization_metadata = AuthorizationServerMetadata::for_issuer(issuer, &scopes)?;
        let resource_metadata = ProtectedResourceMetadata::for_resource(issuer, MCP_PATH, &scopes)?;
        let resource_metadata_url = format!(
            "{}{PROTECTED_RESOURCE_METADATA_PATH}",
            issuer.as_str().trim_end_matches('/')
        );

        Ok(Self {
            bridge,
            tools,
            authorization_metadata,
            resource_metadata,
            resource_metadata_url,
        })
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let protected = Router::new()
        .route(MCP_PATH, post(mcp::mcp_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            bearer_middleware,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route(AUTHORIZATION_SERVER_METADATA_PATH, get(authorization_metadata_handler))
        .route(PROTECTED_RESOURCE_METADATA_PATH, get(resource_metadata_handler))
        // RFC 9728 §3.1 path-suffixed form
        .route(
            &format!("{PROTECTED_RESOURCE_METADATA_PATH}{MCP_PATH}"),
            get(resource_metadata_handler),
        )
        .route("/register", post(oauth::register_handler))
        .route("/authorize", get(oauth::authorize_handler))
        .route("/callback", get(oauth::callback_handler))
        .route("/token", post(oauth::token_handler))
        .merge(protected)
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "clients": state.bridge.clients_store().len()
    }))
}

async fn authorization_metadata_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.authorization_metadata.clone())
}

async fn resource_metadata_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.resource_metadata.clone())
}
