//! Upstream OAuth provider adapter.
//!
//! The bridge is an OAuth *client* toward the provider: it builds the
//! provider's authorization URL and exchanges the provider's authorization
//! code for provider tokens. [`UpstreamOAuth`] is the seam; the
//! [`LinkedInOAuthClient`] is the production implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::config::UpstreamConfig;
use crate::{Error, Result};

/// Tokens returned by the upstream provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamTokens {
    /// Provider access token
    pub access_token: String,
    /// Token type (always normalized to `Bearer`)
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Access token lifetime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Provider refresh token, if the app is allowed one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Refresh token lifetime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_in: Option<u64>,
    /// Scopes granted by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// OAuth client toward the upstream provider.
#[async_trait]
pub trait UpstreamOAuth: Send + Sync + 'static {
    /// Provider authorization URL carrying `scopes` and `state`.
    fn authorization_url(&self, scopes: &[String], state: &str) -> Result<Url>;

    /// Exchange a provider authorization code for provider tokens.
    async fn exchange_code(&self, code: &str) -> Result<UpstreamTokens>;
}

/// Provider error body (`error_description` for OAuth endpoints, `message` for REST).
#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ProviderError {
    fn into_message(self) -> Option<String> {
        self.error_description.or(self.message).or(self.error)
    }
}

/// LinkedIn three-legged OAuth client.
pub struct LinkedInOAuthClient {
    http_client: Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    authorization_endpoint: Url,
    token_endpoint: Url,
}

impl LinkedInOAuthClient {
    /// Build a client from resolved upstream settings.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let authorization_endpoint = Url::parse(&config.authorization_endpoint)
            .map_err(|e| Error::Config(format!("Invalid upstream authorization endpoint: {e}")))?;
        let token_endpoint = Url::parse(&config.token_endpoint)
            .map_err(|e| Error::Config(format!("Invalid upstream token endpoint: {e}")))?;

        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http_client,
            client_id: config.resolve_client_id()?,
            client_secret: config.resolve_client_secret()?,
            redirect_url: config.redirect_url.clone(),
            authorization_endpoint,
            token_endpoint,
        })
    }
}

#[async_trait]
impl UpstreamOAuth for LinkedInOAuthClient {
    fn authorization_url(&self, scopes: &[String], state: &str) -> Result<Url> {
        let mut url = self.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("state", state)
            .append_pair("scope", &scopes.join(" "));
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<UpstreamTokens> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());
        params.insert("redirect_uri", self.redirect_url.as_str());

        debug!(endpoint = %self.token_endpoint, "Exchanging upstream authorization code");

        let response = self
            .http_client
            .post(self.token_endpoint.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ProviderError>()
                .await
                .ok()
                .and_then(ProviderError::into_message)
                .unwrap_or_else(|| "no error description".to_string());
            return Err(Error::Upstream(format!(
                "Token exchange failed: HTTP {status} - {message}"
            )));
        }

        let mut tokens: UpstreamTokens = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Failed to parse token response: {e}")))?;
        tokens.token_type = default_token_type();

        info!(expires_in = ?tokens.expires_in, "Upstream authorization code exchanged");
        Ok(tokens)
    }
}
