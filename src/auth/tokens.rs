//! Token store: signed bearer tokens and their upstream counterparts.
//!
//! Every successful upstream exchange produces one [`TokenPair`]: the bearer
//! token this bridge hands to the downstream client, plus the raw provider
//! tokens. The pair is keyed by a fresh UUID that is also signed into the
//! bearer token as the `jti` claim, so verifying a token yields the key needed
//! to find its provider tokens.
//!
//! Tokens are HS256 JWTs signed with the configured secret. Anyone holding the
//! secret can forge tokens; rotating it invalidates every issued token.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sessions::Session;
use super::upstream::UpstreamTokens;
use crate::{Error, Result};

/// Default bearer token lifetime (60 minutes).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Reasons a presented bearer token is rejected.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Bad signature, wrong algorithm, or structurally malformed token.
    #[error("Invalid access token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    /// Authentic token whose `exp` has passed.
    #[error("Access token expired")]
    Expired,

    /// Authentic token with no stored Token Pair.
    #[error("Access token not recognized")]
    Unknown,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Invalid(err),
        }
    }
}

/// Claims signed into every bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Token Pair id
    pub jti: String,
    /// Issued-at (Unix epoch seconds)
    pub iat: u64,
    /// Expires-at (Unix epoch seconds)
    pub exp: u64,
    /// Client id of the session the token was minted for
    pub aud: String,
    /// Granted scopes
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Bearer token metadata as returned from the token endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedToken {
    /// Signed JWT
    pub access_token: String,
    /// Always `"Bearer"`
    pub token_type: String,
    /// Seconds until expiry
    pub expires_in: u64,
    /// Space-separated granted scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Outcome of one successful upstream exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPair {
    /// Token issued to the downstream client
    pub server_token: IssuedToken,
    /// Tokens issued by the upstream provider
    pub upstream_tokens: UpstreamTokens,
}

/// Mints, verifies and remembers bearer tokens.
pub struct TokenStore {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    pairs: DashMap<String, TokenPair>,
}

impl TokenStore {
    /// Create a store signing with `secret`; tokens live for `ttl`.
    #[must_use]
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Audience is returned to the caller, not matched here.
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "aud"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
            pairs: DashMap::new(),
        }
    }

    /// Sign a bearer token for `session` and store it with `upstream`.
    ///
    /// Returns the Token Pair id (never the pair itself).
    pub fn mint(&self, session: &Session, upstream: UpstreamTokens) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let iat = now_secs();
        let expires_in = self.ttl.as_secs();
        let scopes = session.params.scopes.clone();

        let claims = AccessClaims {
            jti: id.clone(),
            iat,
            exp: iat + expires_in,
            aud: session.client.client_id.clone(),
            scopes: scopes.clone(),
        };
        let access_token = self.sign(&claims)?;

        let server_token = IssuedToken {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            scope: (!scopes.is_empty()).then(|| scopes.join(" ")),
        };

        self.pairs.insert(
            id.clone(),
            TokenPair {
                server_token,
                upstream_tokens: UpstreamTokens {
                    token_type: "Bearer".to_string(),
                    ..upstream
                },
            },
        );

        debug!(jti = %id, aud = %claims.aud, exp = claims.exp, "Minted bearer token");
        Ok(id)
    }

    /// Look up a Token Pair by id.
    #[must_use]
    pub fn get(&self, token_id: &str) -> Option<TokenPair> {
        self.pairs.get(token_id).map(|p| p.clone())
    }

    /// Verify signature and expiry of `server_token` and return its claims.
    pub fn decode(&self, server_token: &str) -> std::result::Result<AccessClaims, TokenError> {
        let data = jsonwebtoken::decode::<AccessClaims>(
            server_token,
            &self.decoding_key,
            &self.validation,
        )?;
        Ok(data.claims)
    }

    /// Number of stored Token Pairs
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no token has been minted yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn sign(&self, claims: &AccessClaims) -> Result<String> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("Failed to sign access token: {e}")))
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clients::ClientDescriptor;
    use crate::auth::sessions::AuthorizationParams;

    const SECRET: &[u8] = b"test-signing-secret";

    fn make_session(scopes: &[&str]) -> Session {
        Session::new(
            ClientDescriptor::new("c1", vec!["https://app/cb".to_string()]),
            AuthorizationParams {
                redirect_uri: "https://app/cb".to_string(),
                scopes: scopes.iter().map(ToString::to_string).collect(),
                code_challenge: "abc".to_string(),
                state: None,
            },
        )
    }

    fn make_upstream() -> UpstreamTokens {
        UpstreamTokens {
            access_token: "upstream-access".to_string(),
            token_type: "bearer".to_string(),
            expires_in: Some(5_184_000),
            refresh_token: None,
            refresh_token_expires_in: None,
            scope: Some("r_basicprofile,w_member_social".to_string()),
        }
    }

    fn flip_char(c: char) -> char {
        if c == 'A' { 'B' } else { 'A' }
    }

    #[test]
    fn mint_stores_pair_under_returned_id() {
        // GIVEN: a store and a completed session
        let store = TokenStore::new(SECRET, DEFAULT_TOKEN_TTL);

        // WHEN: minting
        let id = store.mint(&make_session(&["r_basicprofile"]), make_upstream()).unwrap();

        // THEN: the pair is stored under that id with bearer metadata
        let pair = store.get(&id).unwrap();
        assert_eq!(pair.server_token.token_type, "Bearer");
        assert_eq!(pair.server_token.expires_in, 3600);
        assert_eq!(pair.server_token.scope.as_deref(), Some("r_basicprofile"));
        assert_eq!(pair.upstream_tokens.access_token, "upstream-access");
        assert_eq!(pair.upstream_tokens.token_type, "Bearer");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn decode_round_trips_claims() {
        // GIVEN: a minted token
        let store = TokenStore::new(SECRET, DEFAULT_TOKEN_TTL);
        let id = store
            .mint(&make_session(&["r_basicprofile", "w_member_social"]), make_upstream())
            .unwrap();
        let token = store.get(&id).unwrap().server_token.access_token;

        // WHEN: decoding it
        let claims = store.decode(&token).unwrap();

        // THEN: the signed claims match what was minted
        assert_eq!(claims.jti, id);
        assert_eq!(claims.aud, "c1");
        assert_eq!(claims.scopes, vec!["r_basicprofile", "w_member_social"]);
        assert_eq!(claims.exp, claims.iat + 3600);
    }

    #[test]
    fn empty_scopes_omit_scope_string() {
        let store = TokenStore::new(SECRET, DEFAULT_TOKEN_TTL);
        let id = store.mint(&make_session(&[]), make_upstream()).unwrap();
        let pair = store.get(&id).unwrap();

        assert!(pair.server_token.scope.is_none());
        assert!(store.decode(&pair.server_token.access_token).unwrap().scopes.is_empty());
    }

    #[test]
    fn decode_rejects_expired_token() {
        // GIVEN: an authentic token whose exp lies in the past
        let store = TokenStore::new(SECRET, DEFAULT_TOKEN_TTL);
        let now = now_secs();
        let token = store
            .sign(&AccessClaims {
                jti: "old".to_string(),
                iat: now - 7200,
                exp: now - 10,
                aud: "c1".to_string(),
                scopes: Vec::new(),
            })
            .unwrap();

        // THEN: it is reported as expired, not invalid
        assert!(matches!(store.decode(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn decode_rejects_other_secret() {
        // GIVEN: a token minted by a store with a different secret
        let other = TokenStore::new(b"someone-else", DEFAULT_TOKEN_TTL);
        let id = other.mint(&make_session(&["r_basicprofile"]), make_upstream()).unwrap();
        let token = other.get(&id).unwrap().server_token.access_token;

        // WHEN: verified with ours
        let store = TokenStore::new(SECRET, DEFAULT_TOKEN_TTL);

        // THEN: rejected as invalid
        assert!(matches!(store.decode(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn decode_rejects_any_altered_signature_char() {
        // GIVEN: a valid token split into its three segments
        let store = TokenStore::new(SECRET, DEFAULT_TOKEN_TTL);
        let id = store.mint(&make_session(&["r_basicprofile"]), make_upstream()).unwrap();
        let token = store.get(&id).unwrap().server_token.access_token;
        let (signed, signature) = token.rsplit_once('.').unwrap();

        // WHEN/THEN: every signature character (the last carries padding bits) breaks it
        for i in 0..signature.len() - 1 {
            let tampered_sig: String = signature
                .chars()
                .enumerate()
                .map(|(j, c)| if j == i { flip_char(c) } else { c })
                .collect();
            let tampered = format!("{signed}.{tampered_sig}");
            assert!(
                store.decode(&tampered).is_err(),
                "tampered signature at {i} was accepted"
            );
        }
    }

    #[test]
    fn decode_rejects_altered_claims() {
        // GIVEN: a token whose payload is swapped for a forged one
        let store = TokenStore::new(SECRET, DEFAULT_TOKEN_TTL);
        let id = store.mint(&make_session(&["r_basicprofile"]), make_upstream()).unwrap();
        let token = store.get(&id).unwrap().server_token.access_token;
        let parts: Vec<&str> = token.split('.').collect();

        let forged_claims = AccessClaims {
            jti: id,
            iat: now_secs(),
            exp: now_secs() + 999_999,
            aud: "attacker".to_string(),
            scopes: vec!["admin".to_string()],
        };
        let forged_payload = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            serde_json::to_vec(&forged_claims).unwrap(),
        );
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        // THEN: rejected
        assert!(matches!(store.decode(&forged), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn decode_rejects_malformed_token() {
        let store = TokenStore::new(SECRET, DEFAULT_TOKEN_TTL);
        assert!(matches!(store.decode("not-a-jwt"), Err(TokenError::Invalid(_))));
        assert!(matches!(store.decode(""), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn get_unknown_id_is_none() {
        let store = TokenStore::new(SECRET, DEFAULT_TOKEN_TTL);
        assert!(store.get("missing").is_none());
        assert!(store.is_empty());
    }
}
