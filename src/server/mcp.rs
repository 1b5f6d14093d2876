//! JSON-RPC handling for `POST /mcp`

use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error};

use super::router::AppState;
use crate::auth::AuthInfo;
use crate::error::rpc_codes;
use crate::protocol::{
    Info, InitializeParams, InitializeResult, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
    RequestId, ServerCapabilities, ToolsCallParams, ToolsCapability, ToolsListResult,
    negotiate_version,
};
use crate::tools::Tools;

/// Name advertised in `serverInfo`
pub const SERVER_NAME: &str = "Linkedin";

/// MCP handler (POST /mcp)
pub(super) async fn mcp_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthInfo>,
    body: Bytes,
) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return rejection(rpc_codes::PARSE_ERROR, format!("Parse error: {e}"));
        }
    };
    let message: JsonRpcMessage = match serde_json::from_value(value) {
        Ok(m) => m,
        Err(e) => {
            return rejection(
                rpc_codes::INVALID_REQUEST,
                format!("Invalid JSON-RPC message: {e}"),
            );
        }
    };

    match message {
        JsonRpcMessage::Notification(n) => {
            debug!(method = %n.method, client_id = %auth.client_id, "Notification received");
            StatusCode::ACCEPTED.into_response()
        }
        JsonRpcMessage::Request(request) => Json(dispatch(&state, &auth, request).await).into_response(),
    }
}

/// 400 for a body that never reached dispatch
fn rejection(code: i32, message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(JsonRpcResponse::error(None, code, message)),
    )
        .into_response()
}

async fn dispatch(state: &AppState, auth: &AuthInfo, request: JsonRpcRequest) -> JsonRpcResponse {
    let JsonRpcRequest { id, method, params, .. } = request;
    debug!(method = %method, id = %id, client_id = %auth.client_id, "MCP request");

    match method.as_str() {
        "initialize" => {
            let params: InitializeParams = match parse_params(&id, params) {
                Ok(p) => p,
                Err(response) => return response,
            };
            if let Some(client) = &params.client_info {
                debug!(client = %client.name, version = %client.version, "MCP client initializing");
            }
            respond(id, &initialize_result(&params.protocol_version))
        }
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => respond(
            id,
            &ToolsListResult {
                tools: Tools::list(),
                next_cursor: None,
            },
        ),
        "tools/call" => {
            let params: ToolsCallParams = match params {
                Some(p) => match serde_json::from_value(p) {
                    Ok(p) => p,
                    Err(e) => {
                        return JsonRpcResponse::error(
                            Some(id),
                            rpc_codes::INVALID_PARAMS,
                            format!("Invalid tools/call params: {e}"),
                        );
                    }
                },
                None => {
                    return JsonRpcResponse::error(
                        Some(id),
                        rpc_codes::INVALID_PARAMS,
                        "Missing tools/call params",
                    );
                }
            };

            match state.tools.call(&params.name, params.arguments, auth).await {
                Ok(result) => respond(id, &result),
                Err(e) => JsonRpcResponse::error(Some(id), e.to_rpc_code(), e.to_string()),
            }
        }
        _ => JsonRpcResponse::error(
            Some(id),
            rpc_codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        ),
    }
}

fn initialize_result(requested_version: &str) -> InitializeResult {
    InitializeResult {
        protocol_version: negotiate_version(requested_version).to_string(),
        capabilities: ServerCapabilities {
            tools: Some(ToolsCapability { list_changed: true }),
        },
        server_info: Info {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
        },
        instructions: None,
    }
}

/// Absent params deserialize from `{}`
fn parse_params<T: DeserializeOwned>(
    id: &RequestId,
    params: Option<Value>,
) -> Result<T, JsonRpcResponse> {
    serde_json::from_value(params.unwrap_or_else(|| json!({}))).map_err(|e| {
        JsonRpcResponse::error(
            Some(id.clone()),
            rpc_codes::INVALID_PARAMS,
            format!("Invalid params: {e}"),
        )
    })
}

fn respond<T: Serialize>(id: RequestId, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => {
            error!(error = %e, "Failed to serialize result");
            JsonRpcResponse::error(Some(id), rpc_codes::INTERNAL_ERROR, "Internal error")
        }
    }
}
