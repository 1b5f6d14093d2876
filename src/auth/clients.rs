//! Registered downstream OAuth clients.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Registered downstream OAuth client (RFC 7591 client information).
///
/// Only the fields the bridge reads are typed; any other registration
/// metadata is kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientDescriptor {
    /// Client identifier (registry key)
    pub client_id: String,
    /// Client secret for confidential clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Issuance time (Unix epoch seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id_issued_at: Option<i64>,
    /// Registered redirect URIs
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Allowed grant types
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_types: Vec<String>,
    /// Allowed response types
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_types: Vec<String>,
    /// Token endpoint authentication method (`none`, `client_secret_post`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,
    /// Human-readable client name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Space-separated scope string requested at registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Remaining registration metadata, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientDescriptor {
    /// Create a public client with the given redirect URIs.
    pub fn new(client_id: impl Into<String>, redirect_uris: Vec<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            client_id_issued_at: None,
            redirect_uris,
            grant_types: vec!["authorization_code".to_string()],
            response_types: vec!["code".to_string()],
            token_endpoint_auth_method: Some("none".to_string()),
            client_name: None,
            scope: None,
            extra: Map::new(),
        }
    }

    /// Whether `uri` is one of the registered redirect URIs (exact match).
    #[must_use]
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }
}

/// Flat in-memory client registry keyed by client id.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<String, ClientDescriptor>,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `client`, overwriting any entry with the same id.
    pub fn register(&self, client: ClientDescriptor) -> ClientDescriptor {
        debug!(client_id = %client.client_id, "Registered OAuth client");
        self.clients.insert(client.client_id.clone(), client.clone());
        client
    }

    /// Look up a client. Unknown ids are not an error.
    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<ClientDescriptor> {
        self.clients.get(client_id).map(|c| c.clone())
    }

    /// Number of registered clients
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no client has registered yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
