//! Three-legged OAuth bridge.
//!
//! Toward MCP clients this module is an OAuth authorization server; toward the
//! upstream provider it is an OAuth client.
//!
//! 1. **Authorize**: a registered client is sent to the provider with a fresh
//!    256-bit `state`; the request is parked in the [`SessionStore`].
//! 2. **Callback**: the provider's code is exchanged for provider tokens, a
//!    signed bearer token is minted into the [`TokenStore`], and the client
//!    receives a one-time authorization code.
//! 3. **Exchange**: the client redeems the code (PKCE-checked) for the bearer
//!    token.
//! 4. **Verify**: every MCP request presents the bearer token; verification
//!    yields the client id, scopes and the provider tokens for tool calls.
//!
//! All stores are plain in-memory maps owned by the process. Nothing survives
//! a restart.

pub mod audit;
pub mod bridge;
pub mod clients;
pub mod metadata;
pub mod pkce;
pub mod sessions;
pub mod tokens;
pub mod upstream;

pub use bridge::{AuthExtra, AuthInfo, AuthorizationBridge, BridgeSettings};
pub use clients::{ClientDescriptor, ClientRegistry};
pub use metadata::{AuthorizationServerMetadata, ProtectedResourceMetadata};
pub use sessions::{AuthorizationParams, Session, SessionStore, spawn_reaper};
pub use tokens::{AccessClaims, IssuedToken, TokenError, TokenPair, TokenStore};
pub use upstream::{LinkedInOAuthClient, UpstreamOAuth, UpstreamTokens};
