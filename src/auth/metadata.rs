//! OAuth metadata documents served by the bridge.
//!
//! Implements RFC 8414 (OAuth Authorization Server Metadata) and
//! RFC 9728 (OAuth Protected Resource Metadata) so MCP clients can discover
//! the authorize, token and registration endpoints.

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use super::pkce;
use crate::{Error, Result};

/// OAuth Authorization Server Metadata (RFC 8414)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// Authorization server issuer URL
    pub issuer: String,

    /// Authorization endpoint URL
    pub authorization_endpoint: String,

    /// Token endpoint URL
    pub token_endpoint: String,

    /// Dynamic client registration endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    /// Supported grant types
    #[serde(default)]
    pub grant_types_supported: Vec<String>,

    /// Supported response types
    #[serde(default)]
    pub response_types_supported: Vec<String>,

    /// Supported scopes (string or array when parsing)
    #[serde(default, deserialize_with = "deserialize_scopes")]
    pub scopes_supported: Vec<String>,

    /// Supported token endpoint auth methods
    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Vec<String>,

    /// Supported PKCE code challenge methods
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

/// OAuth Protected Resource Metadata (RFC 9728)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// Protected resource identifier
    pub resource: String,

    /// Authorization servers that can issue tokens for this resource
    #[serde(default)]
    pub authorization_servers: Vec<String>,

    /// Supported bearer token methods
    #[serde(default)]
    pub bearer_methods_supported: Vec<String>,

    /// Supported scopes (string or array when parsing)
    #[serde(default, deserialize_with = "deserialize_scopes")]
    pub scopes_supported: Vec<String>,
}

/// Accept scopes as either a space-separated string or an array
fn deserialize_scopes<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::String(s) => Ok(s.split_whitespace().map(String::from).collect()),
        StringOrVec::Vec(v) => Ok(v),
    }
}

impl AuthorizationServerMetadata {
    /// Metadata for a bridge reachable at `issuer`.
    ///
    /// Refresh tokens are never issued, so only `authorization_code` is advertised.
    pub fn for_issuer(issuer: &Url, scopes: &[String]) -> Result<Self> {
        Ok(Self {
            issuer: issuer_string(issuer),
            authorization_endpoint: endpoint(issuer, "authorize")?,
            token_endpoint: endpoint(issuer, "token")?,
            registration_endpoint: Some(endpoint(issuer, "register")?),
            grant_types_supported: vec!["authorization_code".to_string()],
            response_types_supported: vec!["code".to_string()],
            scopes_supported: scopes.to_vec(),
            token_endpoint_auth_methods_supported: vec![
                "client_secret_post".to_string(),
                "none".to_string(),
            ],
            code_challenge_methods_supported: vec![pkce::S256.to_string()],
        })
    }

    /// Check if PKCE is supported (S256 method)
    #[must_use]
    pub fn supports_pkce(&self) -> bool {
        self.code_challenge_methods_supported
            .iter()
            .any(|m| m == pkce::S256)
    }
}

impl ProtectedResourceMetadata {
    /// Metadata for the MCP endpoint at `resource_path` under `issuer`.
    pub fn for_resource(issuer: &Url, resource_path: &str, scopes: &[String]) -> Result<Self> {
        Ok(Self {
            resource: endpoint(issuer, resource_path)?,
            authorization_servers: vec![issuer_string(issuer)],
            bearer_methods_supported: vec!["header".to_string()],
            scopes_supported: scopes.to_vec(),
        })
    }

    /// Get the first authorization server URL
    pub fn authorization_server(&self) -> Option<&str> {
        self.authorization_servers
            .first()
            .map(std::string::String::as_str)
    }
}

/// Issuer identifier without a trailing slash (RFC 8414 §2)
fn issuer_string(issuer: &Url) -> String {
    issuer.as_str().trim_end_matches('/').to_string()
}

/// Absolute URL of `path` relative to the issuer root
fn endpoint(issuer: &Url, path: &str) -> Result<String> {
    let mut base = issuer.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
        .map(String::from)
        .map_err(|e| Error::Config(format!("Invalid endpoint {path}: {e}")))
}
