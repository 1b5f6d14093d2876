//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Environment variable prefix (nested keys split on `__`)
pub const ENV_PREFIX: &str = "MCP_OAUTH_BRIDGE_";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Environment files to load before resolving secrets.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Upstream OAuth provider
    pub upstream: UpstreamConfig,
    /// Bearer token and session lifetimes
    pub auth: AuthConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Env files must be in the process environment before any `env:` lookup
        config.load_env_files();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Check every URL and resolve every secret without starting anything.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting or unresolvable secret.
    pub fn validate(&self) -> Result<()> {
        self.server.issuer()?;
        parse_url("upstream.redirect_url", &self.upstream.redirect_url)?;
        parse_url(
            "upstream.authorization_endpoint",
            &self.upstream.authorization_endpoint,
        )?;
        parse_url("upstream.token_endpoint", &self.upstream.token_endpoint)?;
        self.upstream.api_base()?;

        if self.upstream.scopes.is_empty() {
            return Err(Error::Config("upstream.scopes must not be empty".to_string()));
        }
        if self.auth.code_ttl.is_zero() {
            return Err(Error::Config("auth.code_ttl must be positive".to_string()));
        }
        if self.auth.reap_interval.is_zero() {
            return Err(Error::Config("auth.reap_interval must be positive".to_string()));
        }

        self.upstream.resolve_client_id()?;
        self.upstream.resolve_client_secret()?;
        let secret = self.auth.resolve_jwt_secret()?;
        if secret.len() < 32 {
            tracing::warn!(
                length = secret.len(),
                "auth.jwt_secret is shorter than 32 bytes"
            );
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public base URL; metadata endpoints are derived from it
    pub issuer_url: String,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            issuer_url: "http://localhost:3001".to_string(),
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

impl ServerConfig {
    /// Parsed issuer URL
    pub fn issuer(&self) -> Result<Url> {
        parse_url("server.issuer_url", &self.issuer_url)
    }
}

/// Upstream OAuth provider configuration (LinkedIn defaults)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// OAuth client id registered with the provider (supports `env:VAR_NAME`)
    pub client_id: String,
    /// OAuth client secret (supports `env:VAR_NAME`)
    pub client_secret: String,
    /// Where the provider sends the user back (this bridge's `/callback`)
    pub redirect_url: String,
    /// Provider authorization endpoint
    pub authorization_endpoint: String,
    /// Provider token endpoint
    pub token_endpoint: String,
    /// Base URL for provider API calls made by tools
    pub api_base_url: String,
    /// Fixed scope set requested from the provider
    pub scopes: Vec<String>,
    /// Timeout for provider HTTP calls
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            client_id: "env:LINKEDIN_CLIENT_ID".to_string(),
            client_secret: "env:LINKEDIN_CLIENT_SECRET".to_string(),
            redirect_url: "http://localhost:3001/callback".to_string(),
            authorization_endpoint: "https://www.linkedin.com/oauth/v2/authorization".to_string(),
            token_endpoint: "https://www.linkedin.com/oauth/v2/accessToken".to_string(),
            api_base_url: "https://api.linkedin.com/v2".to_string(),
            scopes: vec!["r_basicprofile".to_string(), "w_member_social".to_string()],
            timeout: Duration::from_secs(15),
        }
    }
}

impl UpstreamConfig {
    /// Resolve the provider client id
    pub fn resolve_client_id(&self) -> Result<String> {
        resolve_secret("upstream.client_id", &self.client_id)
    }

    /// Resolve the provider client secret
    pub fn resolve_client_secret(&self) -> Result<String> {
        resolve_secret("upstream.client_secret", &self.client_secret)
    }

    /// Parsed API base URL
    pub fn api_base(&self) -> Result<Url> {
        parse_url("upstream.api_base_url", &self.api_base_url)
    }
}

/// Bearer token and session lifetime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret (supports `env:VAR_NAME`).
    /// Changing it invalidates every issued bearer token.
    pub jwt_secret: String,
    /// Bearer token lifetime
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,
    /// Downstream authorization code lifetime
    #[serde(with = "humantime_serde")]
    pub code_ttl: Duration,
    /// Pending-authorization lifetime (unbounded when unset)
    #[serde(default, with = "humantime_serde::option")]
    pub state_ttl: Option<Duration>,
    /// How often expired sessions are reaped
    #[serde(with = "humantime_serde")]
    pub reap_interval: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "env:JWT_SECRET".to_string(),
            token_ttl: Duration::from_secs(60 * 60),
            code_ttl: Duration::from_secs(5 * 60),
            state_ttl: None,
            reap_interval: Duration::from_secs(60),
        }
    }
}

impl AuthConfig {
    /// Resolve the signing secret
    pub fn resolve_jwt_secret(&self) -> Result<String> {
        resolve_secret("auth.jwt_secret", &self.jwt_secret)
    }
}

/// Resolve a literal or `env:VAR_NAME` value.
///
/// Unlike optional settings, a secret that cannot be resolved is an error.
fn resolve_secret(field: &str, value: &str) -> Result<String> {
    let resolved = match value.strip_prefix("env:") {
        Some(var_name) => env::var(var_name).map_err(|_| {
            Error::Config(format!(
                "{field}: environment variable {var_name} is not set"
            ))
        })?,
        None => value.to_string(),
    };

    if resolved.trim().is_empty() {
        return Err(Error::Config(format!("{field} is empty")));
    }
    Ok(resolved)
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| Error::Config(format!("{field}: invalid URL {value:?}: {e}")))
}

/// Human-readable durations for serde (`"30s"`, `"5m"`, `"1h"`, `"100ms"`)
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    /// Parse a single duration value
    ///
    /// # Errors
    ///
    /// Returns the integer parse error message for malformed input.
    pub fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let parsed = if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>().map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>().map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>().map(|m| Duration::from_secs(m * 60))
        } else if let Some(hours) = s.strip_suffix('h') {
            hours.parse::<u64>().map(|h| Duration::from_secs(h * 3600))
        } else {
            // Assume seconds
            s.parse::<u64>().map(Duration::from_secs)
        };
        parsed.map_err(|e| format!("invalid duration {s:?}: {e}"))
    }

    /// Same format for `Option<Duration>`; absent or null means `None`.
    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        /// Serialize an optional duration
        ///
        /// # Errors
        ///
        /// Returns a serialization error if the serializer fails.
        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize an optional duration
        ///
        /// # Errors
        ///
        /// Returns a deserialization error if a present value cannot be parsed.
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| super::parse(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
