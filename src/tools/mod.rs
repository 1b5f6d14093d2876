//! MCP tools backed by the upstream API.
//!
//! Every call runs with the upstream tokens attached to the caller's verified
//! bearer token ([`AuthInfo::extra`]).

pub mod linkedin;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::auth::AuthInfo;
use crate::protocol::{Content, Tool, ToolAnnotations, ToolsCallResult};
use crate::{Error, Result};

pub use linkedin::{ApiError, LinkedInApi};

/// Name of the profile tool
pub const USER_INFO: &str = "user-info";
/// Name of the posting tool
pub const CREATE_POST: &str = "create-post";

#[derive(Debug, Deserialize)]
struct CreatePostArgs {
    content: String,
}

/// Tool catalogue and dispatcher.
pub struct Tools {
    api: LinkedInApi,
}

impl Tools {
    /// Wrap an API client.
    #[must_use]
    pub fn new(api: LinkedInApi) -> Self {
        Self { api }
    }

    /// Tool definitions for `tools/list`.
    #[must_use]
    pub fn list() -> Vec<Tool> {
        vec![
            Tool {
                name: USER_INFO.to_string(),
                title: None,
                description: Some(
                    "Get information about currently logged in LinkedIn user".to_string(),
                ),
                input_schema: json!({"type": "object", "properties": {}}),
                annotations: Some(ToolAnnotations {
                    read_only_hint: Some(true),
                    open_world_hint: Some(true),
                }),
            },
            Tool {
                name: CREATE_POST.to_string(),
                title: None,
                description: Some("Create a new post on LinkedIn".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "content": {"type": "string", "description": "Post text"}
                    },
                    "required": ["content"]
                }),
                annotations: Some(ToolAnnotations {
                    read_only_hint: Some(false),
                    open_world_hint: Some(true),
                }),
            },
        ]
    }

    /// Run `name` for the authenticated caller.
    ///
    /// Unknown tools and malformed arguments are protocol errors; API failures
    /// are tool results with `isError` set.
    pub async fn call(&self, name: &str, arguments: Value, auth: &AuthInfo) -> Result<ToolsCallResult> {
        let access_token = auth.extra.upstream_tokens.access_token.as_str();

        let outcome = match name {
            USER_INFO => self.user_info(access_token).await,
            CREATE_POST => {
                let args: CreatePostArgs = serde_json::from_value(arguments)
                    .map_err(|e| Error::InvalidRequest(format!("Invalid arguments for {name}: {e}")))?;
                self.create_post(access_token, &args.content).await
            }
            _ => return Err(Error::InvalidRequest(format!("Unknown tool: {name}"))),
        };

        Ok(match outcome {
            Ok(content) => {
                info!(tool = name, client_id = %auth.client_id, "Tool call succeeded");
                ToolsCallResult::ok(content)
            }
            Err(e) => {
                warn!(tool = name, client_id = %auth.client_id, error = %e, "Tool call failed");
                ToolsCallResult::error(e.to_string())
            }
        })
    }

    async fn user_info(&self, access_token: &str) -> std::result::Result<Vec<Content>, ApiError> {
        let profile = self.api.profile(access_token).await?;

        let mut content = vec![Content::text(format!(
            "Currently logged in user is {} {} - {}",
            profile.localized_first_name, profile.localized_last_name, profile.localized_headline
        ))];

        if let Some(url) = profile.picture_url() {
            let image = self.api.fetch_image(url).await?;
            content.push(Content::Image {
                data: image.data,
                mime_type: image.mime_type,
            });
        }

        Ok(content)
    }

    async fn create_post(
        &self,
        access_token: &str,
        commentary: &str,
    ) -> std::result::Result<Vec<Content>, ApiError> {
        let person_id = self.api.person_id(access_token).await?;
        self.api
            .create_post(access_token, &person_id, commentary)
            .await?;
        Ok(vec![Content::text("Your post has been successfully created!")])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Json, Router,
        extract::{Query, State},
        http::{HeaderMap, StatusCode, header},
        response::IntoResponse,
        routing::{get, post},
    };
    use tokio::net::TcpListener;

    use super::*;
    use crate::auth::{AuthExtra, UpstreamTokens};
    use crate::config::UpstreamConfig;

    #[derive(Default)]
    struct Seen {
        picture_url: String,
        projections: Vec<String>,
        posts: Vec<Value>,
        bearer: Option<String>,
    }

    type Shared = Arc<Mutex<Seen>>;

    async fn me(
        State(seen): State<Shared>,
        headers: HeaderMap,
        Query(q): Query<std::collections::HashMap<String, String>>,
    ) -> axum::response::Response {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let projection = q.get("projection").cloned().unwrap_or_default();
        let picture_url = {
            let mut seen = seen.lock().unwrap();
            seen.bearer = bearer.clone();
            seen.projections.push(projection.clone());
            seen.picture_url.clone()
        };

        if bearer.as_deref() != Some("Bearer upstream-ok") {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"message": "Invalid access token"})),
            )
                .into_response();
        }
        if projection == "(id)" {
            return Json(json!({"id": "abc123"})).into_response();
        }
        Json(json!({
            "localizedFirstName": "Ada",
            "localizedLastName": "Lovelace",
            "localizedHeadline": "Analyst",
            "profilePicture": {
                "displayImage~": {
                    "elements": [
                        {"identifiers": [{"identifier": picture_url}]}
                    ]
                }
            }
        }))
        .into_response()
    }

    async fn posts(State(seen): State<Shared>, Json(body): Json<Value>) -> StatusCode {
        seen.lock().unwrap().posts.push(body);
        StatusCode::CREATED
    }

    async fn picture() -> impl IntoResponse {
        ([(header::CONTENT_TYPE, "image/png")], vec![1_u8, 2, 3])
    }

    /// Fake API; the profile picture points back at this server.
    async fn spawn_api() -> (Tools, Shared) {
        let seen: Shared = Arc::default();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        seen.lock().unwrap().picture_url = format!("http://{addr}/media/large.png");

        let app = Router::new()
            .route("/v2/me", get(me))
            .route("/v2/posts", post(posts))
            .route("/media/large.png", get(picture))
            .with_state(Arc::clone(&seen));

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = UpstreamConfig {
            api_base_url: format!("http://{addr}/v2"),
            ..UpstreamConfig::default()
        };
        (Tools::new(LinkedInApi::new(&config).unwrap()), seen)
    }

    fn auth(access_token: &str) -> AuthInfo {
        AuthInfo {
            token: "jwt".to_string(),
            client_id: "c1".to_string(),
            scopes: vec!["r_basicprofile".to_string()],
            expires_at: 0,
            extra: AuthExtra {
                upstream_tokens: UpstreamTokens {
                    access_token: access_token.to_string(),
                    token_type: "Bearer".to_string(),
                    expires_in: None,
                    refresh_token: None,
                    refresh_token_expires_in: None,
                    scope: None,
                },
            },
        }
    }

    #[test]
    fn list_contains_both_tools() {
        let names: Vec<String> = Tools::list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec![USER_INFO, CREATE_POST]);
    }

    #[tokio::test]
    async fn user_info_returns_text_and_image() {
        // GIVEN: a fake API accepting our upstream token
        let (tools, seen) = spawn_api().await;

        // WHEN: calling user-info
        let result = tools
            .call(USER_INFO, Value::Null, &auth("upstream-ok"))
            .await
            .unwrap();

        // THEN: greeting text plus the base64 picture, using the upstream token
        assert!(!result.is_error);
        assert_eq!(
            result.content[0],
            Content::text("Currently logged in user is Ada Lovelace - Analyst")
        );
        assert_eq!(
            result.content[1],
            Content::Image {
                data: "AQID".to_string(),
                mime_type: "image/png".to_string(),
            }
        );
        let seen = seen.lock().unwrap();
        assert_eq!(seen.bearer.as_deref(), Some("Bearer upstream-ok"));
        assert!(seen.projections[0].starts_with("(localizedFirstName"));
    }

    #[tokio::test]
    async fn api_rejection_is_tool_error() {
        let (tools, _) = spawn_api().await;

        let result = tools
            .call(USER_INFO, Value::Null, &auth("revoked"))
            .await
            .unwrap();

        assert!(result.is_error);
        let Content::Text { text } = &result.content[0] else {
            panic!("expected text content");
        };
        assert!(text.contains("401"));
        assert!(text.contains("Invalid access token"));
    }

    #[tokio::test]
    async fn create_post_authors_as_member() {
        // GIVEN: the fake API
        let (tools, seen) = spawn_api().await;

        // WHEN: posting
        let result = tools
            .call(CREATE_POST, json!({"content": "Hello"}), &auth("upstream-ok"))
            .await
            .unwrap();

        // THEN: one public post authored by the member urn
        assert!(!result.is_error);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.posts.len(), 1);
        assert_eq!(seen.posts[0]["author"], "urn:li:person:abc123");
        assert_eq!(seen.posts[0]["commentary"], "Hello");
        assert_eq!(seen.posts[0]["visibility"], "PUBLIC");
    }

    #[tokio::test]
    async fn create_post_requires_content() {
        let (tools, _) = spawn_api().await;
        let err = tools
            .call(CREATE_POST, json!({}), &auth("upstream-ok"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_request() {
        let (tools, _) = spawn_api().await;
        let err = tools
            .call("delete-account", Value::Null, &auth("upstream-ok"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
