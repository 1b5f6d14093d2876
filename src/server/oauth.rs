//! OAuth endpoints facing the downstream MCP client.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/register` | RFC 7591 dynamic client registration |
//! | `GET` | `/authorize` | Start a flow; redirects to the upstream provider |
//! | `GET` | `/callback` | Upstream redirect target; redirects to the client |
//! | `POST` | `/token` | Redeem an authorization code (PKCE required) |
//!
//! Errors use RFC 6749 §5.2 bodies: `{"error": "...", "error_description": "..."}`.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum::extract::{Form, rejection::FormRejection};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};
use url::Url;

use super::router::AppState;
use crate::Error;
use crate::auth::bridge::random_token;
use crate::auth::{AuthorizationParams, ClientDescriptor, pkce};

const AUTH_METHOD_NONE: &str = "none";
const AUTH_METHOD_CLIENT_SECRET_POST: &str = "client_secret_post";

// ── Registration ────────────────────────────────────────────────────────────

/// RFC 7591 client metadata
#[derive(Debug, Deserialize)]
pub(super) struct RegistrationRequest {
    #[serde(default)]
    redirect_uris: Vec<String>,
    #[serde(default)]
    token_endpoint_auth_method: Option<String>,
    #[serde(default)]
    grant_types: Vec<String>,
    #[serde(default)]
    response_types: Vec<String>,
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// `POST /register`
pub(super) async fn register_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_client_metadata", &e.body_text());
        }
    };

    if request.redirect_uris.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_redirect_uri",
            "At least one redirect_uri is required",
        );
    }
    if let Some(bad) = request.redirect_uris.iter().find(|u| Url::parse(u).is_err()) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_redirect_uri",
            &format!("Invalid redirect_uri: {bad}"),
        );
    }

    let auth_method = request
        .token_endpoint_auth_method
        .unwrap_or_else(|| AUTH_METHOD_CLIENT_SECRET_POST.to_string());
    if auth_method != AUTH_METHOD_NONE && auth_method != AUTH_METHOD_CLIENT_SECRET_POST {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_client_metadata",
            &format!("Unsupported token_endpoint_auth_method: {auth_method}"),
        );
    }

    let mut client = ClientDescriptor::new(uuid::Uuid::new_v4().to_string(), request.redirect_uris);
    client.client_secret = (auth_method != AUTH_METHOD_NONE).then(random_token);
    client.client_id_issued_at = Some(chrono::Utc::now().timestamp());
    client.token_endpoint_auth_method = Some(auth_method);
    client.client_name = request.client_name;
    client.scope = request.scope;
    client.extra = request.extra;
    if !request.grant_types.is_empty() {
        client.grant_types = request.grant_types;
    }
    if !request.response_types.is_empty() {
        client.response_types = request.response_types;
    }

    let client = state.bridge.clients_store().register(client);
    info!(
        client_id = %client.client_id,
        client_name = ?client.client_name,
        redirect_uris = client.redirect_uris.len(),
        "Registered client"
    );

    (StatusCode::CREATED, Json(client)).into_response()
}

// ── Authorization ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct AuthorizeQuery {
    client_id: Option<String>,
    redirect_uri: Option<String>,
    response_type: Option<String>,
    code_challenge: Option<String>,
    code_challenge_method: Option<String>,
    state: Option<String>,
    scope: Option<String>,
}

/// `GET /authorize`
///
/// Client and redirect URI problems are answered directly; anything after
/// that is reported to the client's redirect URI.
pub(super) async fn authorize_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    let Some(client_id) = query.client_id.as_deref().filter(|c| !c.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid_request", "Missing client_id");
    };
    let Some(client) = state.bridge.clients_store().get(client_id) else {
        warn!(client_id = %client_id, "Authorization for unknown client");
        return error_response(StatusCode::BAD_REQUEST, "invalid_client", "Unknown client_id");
    };

    let redirect_uri = match query.redirect_uri.as_deref() {
        Some(uri) if client.has_redirect_uri(uri) => uri.to_string(),
        Some(uri) => {
            warn!(client_id = %client_id, redirect_uri = %uri, "Unregistered redirect_uri");
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "Unregistered redirect_uri",
            );
        }
        None => match client.redirect_uris.as_slice() {
            [only] => only.clone(),
            _ => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "invalid_request",
                    "redirect_uri is required when several are registered",
                );
            }
        },
    };

    let client_state = query.state.as_deref();

    if query.response_type.as_deref() != Some("code") {
        return error_redirect(&redirect_uri, "response_type must be code", client_state);
    }
    let Some(code_challenge) = query.code_challenge.filter(|c| !c.is_empty()) else {
        return error_redirect(&redirect_uri, "code_challenge is required", client_state);
    };
    if query.code_challenge_method.as_deref() != Some(pkce::S256) {
        return error_redirect(&redirect_uri, "code_challenge_method must be S256", client_state);
    }

    // Only what the client asked for is granted; no scope means none
    let scopes: Vec<String> = query
        .scope
        .as_deref()
        .map(|scope| scope.split_whitespace().map(String::from).collect())
        .unwrap_or_default();

    let params = AuthorizationParams {
        redirect_uri,
        scopes,
        code_challenge,
        state: query.state,
    };

    match state.bridge.authorize(&client, params) {
        Ok(url) => redirect(&url),
        Err(e) => error_from(&e),
    }
}

// ── Callback ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// `GET /callback`
pub(super) async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(upstream_error) = query.error {
        let description = query
            .error_description
            .unwrap_or_else(|| "Authorization was not granted".to_string());
        warn!(error = %upstream_error, description = %description, "Provider refused authorization");
        if let Some(pending) = query.state.as_deref() {
            state.bridge.abandon(pending, &upstream_error);
        }
        return error_response(StatusCode::BAD_REQUEST, &upstream_error, &description);
    }

    let code = query.code.unwrap_or_default();
    let pending = query.state.unwrap_or_default();

    match state.bridge.callback(&code, &pending).await {
        Ok(url) => redirect(&url),
        Err(e) if e.is_server_error() => error_from(&e),
        Err(e) => error_response(e.status_code(), "invalid_request", &e.to_string()),
    }
}

// ── Token ───────────────────────────────────────────────────────────────────

/// RFC 6749 §4.1.3 / §6 token request
#[derive(Debug, Deserialize)]
pub(super) struct TokenRequest {
    grant_type: Option<String>,
    code: Option<String>,
    code_verifier: Option<String>,
    redirect_uri: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

/// `POST /token`
pub(super) async fn token_handler(
    State(state): State<Arc<AppState>>,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let request = match form {
        Ok(Form(request)) => request,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "invalid_request", &e.body_text()),
    };

    let client = match authenticate_client(&state, &request) {
        Ok(client) => client,
        Err(response) => return response,
    };

    match request.grant_type.as_deref() {
        Some("authorization_code") => exchange_code(&state, &client, &request),
        Some("refresh_token") => {
            let scopes: Vec<String> = request
                .scope
                .as_deref()
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default();
            let refresh_token = request.refresh_token.as_deref().unwrap_or_default();
            match state.bridge.exchange_refresh_token(&client, refresh_token, &scopes) {
                Ok(token) => token_response(&token),
                Err(e) => error_from(&e),
            }
        }
        Some(other) => error_response(
            StatusCode::BAD_REQUEST,
            "unsupported_grant_type",
            &format!("Unsupported grant_type: {other}"),
        ),
        None => error_response(StatusCode::BAD_REQUEST, "invalid_request", "Missing grant_type"),
    }
}

fn exchange_code(state: &AppState, client: &ClientDescriptor, request: &TokenRequest) -> Response {
    let Some(code) = request.code.as_deref().filter(|c| !c.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid_request", "Missing code");
    };
    let Some(verifier) = request.code_verifier.as_deref() else {
        return error_response(StatusCode::BAD_REQUEST, "invalid_request", "Missing code_verifier");
    };

    let session = match state.bridge.authorization_code_session(code) {
        Ok(session) => session,
        Err(e) => return error_from(&e),
    };
    if session.client.client_id != client.client_id {
        warn!(client_id = %client.client_id, "Authorization code issued to another client");
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_grant",
            "Authorization code was issued to another client",
        );
    }
    if request
        .redirect_uri
        .as_deref()
        .is_some_and(|uri| uri != session.params.redirect_uri)
    {
        return error_response(StatusCode::BAD_REQUEST, "invalid_grant", "redirect_uri mismatch");
    }

    let challenge = match state.bridge.challenge_for_authorization_code(code) {
        Ok(challenge) => challenge,
        Err(e) => return error_from(&e),
    };
    if !pkce::verify(verifier, &challenge) {
        warn!(client_id = %client.client_id, "PKCE verification failed");
        return error_response(StatusCode::BAD_REQUEST, "invalid_grant", "PKCE verification failed");
    }

    match state.bridge.exchange_authorization_code(code) {
        Ok(token) => {
            debug!(client_id = %client.client_id, "Issued bearer token");
            token_response(&token)
        }
        Err(e) => error_from(&e),
    }
}

/// Look up the client and check its secret (constant time) when it has one.
fn authenticate_client(
    state: &AppState,
    request: &TokenRequest,
) -> Result<ClientDescriptor, Response> {
    let Some(client_id) = request.client_id.as_deref() else {
        return Err(error_response(StatusCode::UNAUTHORIZED, "invalid_client", "Missing client_id"));
    };
    let Some(client) = state.bridge.clients_store().get(client_id) else {
        return Err(error_response(StatusCode::UNAUTHORIZED, "invalid_client", "Unknown client"));
    };

    if let Some(expected) = client.client_secret.as_deref() {
        let presented = request.client_secret.as_deref().unwrap_or_default();
        if !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            warn!(client_id = %client_id, "Client authentication failed");
            return Err(error_response(
                StatusCode::UNAUTHORIZED,
                "invalid_client",
                "Client authentication failed",
            ));
        }
    }

    Ok(client)
}

// ── Responses ───────────────────────────────────────────────────────────────

fn token_response(token: &crate::auth::IssuedToken) -> Response {
    (
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(token),
    )
        .into_response()
}

/// 302 to `url`
fn redirect(url: &Url) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response()
}

/// `invalid_request` delivered to the client's redirect URI (RFC 6749 §4.1.2.1)
fn error_redirect(redirect_uri: &str, description: &str, client_state: Option<&str>) -> Response {
    let Ok(mut url) = Url::parse(redirect_uri) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid_request", description);
    };
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("error", "invalid_request");
        query.append_pair("error_description", description);
        if let Some(s) = client_state {
            query.append_pair("state", s);
        }
    }
    redirect(&url)
}

/// Map a bridge error; server errors are logged and their details withheld
/// unless they carry a provider message.
fn error_from(err: &Error) -> Response {
    let description = match err {
        Error::Upstream(_) => err.to_string(),
        e if e.is_server_error() => "Internal server error".to_string(),
        e => e.to_string(),
    };
    if err.is_server_error() {
        error!(error = %err, "OAuth request failed");
    }
    error_response(err.status_code(), err.oauth_error(), &description)
}

/// Create an RFC 6749 JSON error response.
fn error_response(status: StatusCode, error: &str, description: &str) -> Response {
    (
        status,
        [(header::CACHE_CONTROL, "no-store")],
        Json(json!({"error": error, "error_description": description})),
    )
        .into_response()
}
