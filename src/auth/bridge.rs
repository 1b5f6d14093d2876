//! Authorization bridge: the three-legged flow state machine.
//!
//! ```text
//! authorize ──► AWAITING_CALLBACK ──callback──► CODE_ISSUED ──exchange──► EXCHANGED
//!                      │                             │
//!                      └──────────── FAILED ◄────────┘
//! ```
//!
//! A flow is stored under its upstream `state` while the user is at the
//! provider, then under a fresh downstream authorization code. Both keys are
//! single-use: [`SessionStore::take`] removes the entry before anything else
//! happens, so a replayed callback or code finds nothing.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use super::audit::{self, AuditEvent, FlowStage};
use super::clients::{ClientDescriptor, ClientRegistry};
use super::sessions::{AuthorizationParams, Session, SessionStore};
use super::tokens::{IssuedToken, TokenError, TokenStore};
use super::upstream::{UpstreamOAuth, UpstreamTokens};
use crate::{Error, Result};

/// Default lifetime of a downstream authorization code.
pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(300);

/// Flow settings that do not belong to any one store.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Fixed scope set requested from the upstream provider
    pub scopes: Vec<String>,
    /// Lifetime of code-keyed sessions
    pub code_ttl: Duration,
    /// Lifetime of state-keyed sessions (unbounded when `None`)
    pub state_ttl: Option<Duration>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            scopes: vec!["r_basicprofile".to_string(), "w_member_social".to_string()],
            code_ttl: DEFAULT_CODE_TTL,
            state_ttl: None,
        }
    }
}

/// Provider tokens attached to a verified request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthExtra {
    /// Tokens for calling the upstream API on the user's behalf
    pub upstream_tokens: UpstreamTokens,
}

/// Result of verifying a bearer token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthInfo {
    /// The presented bearer token
    pub token: String,
    /// Audience of the token (downstream client id)
    pub client_id: String,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Expiry (Unix epoch seconds)
    pub expires_at: u64,
    /// Upstream credentials
    pub extra: AuthExtra,
}

/// Orchestrates authorize, callback, code exchange and token verification.
pub struct AuthorizationBridge {
    clients: Arc<ClientRegistry>,
    sessions: Arc<SessionStore>,
    tokens: Arc<TokenStore>,
    upstream: Arc<dyn UpstreamOAuth>,
    settings: BridgeSettings,
}

impl AuthorizationBridge {
    /// Wire the bridge to its stores and upstream adapter.
    pub fn new(
        clients: Arc<ClientRegistry>,
        sessions: Arc<SessionStore>,
        tokens: Arc<TokenStore>,
        upstream: Arc<dyn UpstreamOAuth>,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            clients,
            sessions,
            tokens,
            upstream,
            settings,
        }
    }

    /// Start a flow: remember the request under a new state and return the
    /// upstream authorization URL to redirect the user agent to.
    pub fn authorize(&self, client: &ClientDescriptor, params: AuthorizationParams) -> Result<Url> {
        let state = random_token();

        let url = match self.upstream.authorization_url(&self.settings.scopes, &state) {
            Ok(url) => url,
            Err(e) => {
                audit::emit(&AuditEvent::failed(
                    FlowStage::Initiated,
                    Some(&state),
                    e.to_string(),
                ));
                return Err(e);
            }
        };

        self.sessions.put(
            state.clone(),
            Session::new(client.clone(), params),
            self.settings.state_ttl,
        );

        audit::emit(&AuditEvent::awaiting_callback(&client.client_id, &state));
        Ok(url)
    }

    /// Complete the upstream leg and return the downstream redirect carrying a
    /// fresh authorization code.
    pub async fn callback(&self, code: &str, state: &str) -> Result<Url> {
        if code.is_empty() || state.is_empty() {
            return Err(Error::InvalidRequest(
                "Missing code or state parameter".to_string(),
            ));
        }

        // Consumed before the upstream call: a duplicate callback finds nothing.
        let Some(session) = self.sessions.take(state) else {
            audit::emit(&AuditEvent::failed(
                FlowStage::AwaitingCallback,
                Some(state),
                "unknown or expired state",
            ));
            return Err(Error::NotFound("Unknown or expired state".to_string()));
        };

        let upstream_tokens = match self.upstream.exchange_code(code).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(client_id = %session.client.client_id, error = %e, "Upstream code exchange failed");
                audit::emit(&AuditEvent::failed(
                    FlowStage::AwaitingCallback,
                    Some(state),
                    e.to_string(),
                ));
                return Err(e);
            }
        };

        let client_id = session.client.client_id.clone();
        let token_id = self.tokens.mint(&session, upstream_tokens)?;
        audit::emit(&AuditEvent::minted(&client_id, &token_id));

        let new_code = random_token();
        let redirect = downstream_redirect(&session.params, &new_code)?;

        self.sessions.put(
            new_code.clone(),
            session.with_token_id(token_id.clone()),
            Some(self.settings.code_ttl),
        );

        audit::emit(&AuditEvent::code_issued(&client_id, &token_id, &new_code));
        Ok(redirect)
    }

    /// Drop a pending authorization the provider refused.
    ///
    /// Returns whether a session existed for `state`.
    pub fn abandon(&self, state: &str, reason: &str) -> bool {
        let existed = self.sessions.take(state).is_some();
        audit::emit(&AuditEvent::failed(
            FlowStage::AwaitingCallback,
            Some(state),
            reason,
        ));
        existed
    }

    /// PKCE challenge stored for a pending authorization code.
    pub fn challenge_for_authorization_code(&self, code: &str) -> Result<String> {
        self.sessions
            .get(code)
            .map(|s| s.params.code_challenge)
            .ok_or_else(|| Error::NotFound("Invalid authorization code".to_string()))
    }

    /// Session behind a pending authorization code, without consuming it.
    pub fn authorization_code_session(&self, code: &str) -> Result<Session> {
        self.sessions
            .get(code)
            .ok_or_else(|| Error::NotFound("Invalid authorization code".to_string()))
    }

    /// Redeem an authorization code for the bearer token minted at callback time.
    pub fn exchange_authorization_code(&self, code: &str) -> Result<IssuedToken> {
        let Some(session) = self.sessions.take(code) else {
            audit::emit(&AuditEvent::failed(
                FlowStage::CodeIssued,
                Some(code),
                "unknown or expired authorization code",
            ));
            return Err(Error::NotFound("Invalid authorization code".to_string()));
        };

        let Some(token_id) = session.token_id else {
            audit::emit(&AuditEvent::failed(
                FlowStage::CodeIssued,
                Some(code),
                "authorization code has no issued token",
            ));
            return Err(Error::NotFound(
                "Authorization code has no issued token".to_string(),
            ));
        };

        let Some(pair) = self.tokens.get(&token_id) else {
            audit::emit(&AuditEvent::failed(
                FlowStage::CodeIssued,
                Some(code),
                "token pair missing",
            ));
            return Err(Error::Internal(format!("Token pair {token_id} missing")));
        };

        audit::emit(&AuditEvent::exchanged(&session.client.client_id, &token_id));
        Ok(pair.server_token)
    }

    /// Refresh tokens are never issued, so this always fails.
    pub fn exchange_refresh_token(
        &self,
        client: &ClientDescriptor,
        _refresh_token: &str,
        _scopes: &[String],
    ) -> Result<IssuedToken> {
        debug!(client_id = %client.client_id, "Refused refresh token exchange");
        Err(Error::NotImplemented("refresh token exchange"))
    }

    /// Verify a bearer token and attach the upstream tokens it stands for.
    pub fn verify_access_token(&self, token: &str) -> Result<AuthInfo> {
        let claims = match self.tokens.decode(token) {
            Ok(claims) => claims,
            Err(e) => {
                audit::emit(&AuditEvent::rejected(e.to_string()));
                return Err(e.into());
            }
        };

        let Some(pair) = self.tokens.get(&claims.jti) else {
            audit::emit(&AuditEvent::rejected("no token pair for jti"));
            return Err(TokenError::Unknown.into());
        };

        audit::emit(&AuditEvent::verified(&claims.aud, &claims.jti));
        Ok(AuthInfo {
            token: token.to_string(),
            client_id: claims.aud,
            scopes: claims.scopes,
            expires_at: claims.exp,
            extra: AuthExtra {
                upstream_tokens: pair.upstream_tokens,
            },
        })
    }

    /// Registered downstream clients
    #[must_use]
    pub fn clients_store(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Scopes requested from the upstream provider
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.settings.scopes
    }
}

/// 256 random bits, hex encoded (64 characters).
pub(crate) fn random_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

/// Client redirect URI with `code` (and the client's `state`, if any).
///
/// Existing query parameters survive; stale `code`/`state` pairs are replaced.
fn downstream_redirect(params: &AuthorizationParams, code: &str) -> Result<Url> {
    let mut url = Url::parse(&params.redirect_uri)
        .map_err(|e| Error::InvalidRequest(format!("Invalid redirect_uri: {e}")))?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .into_owned()
        .filter(|(k, _)| k != "code" && k != "state")
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (k, v) in &kept {
            query.append_pair(k, v);
        }
        query.append_pair("code", code);
        if let Some(state) = &params.state {
            query.append_pair("state", state);
        }
    }

    Ok(url)
}
