//! HTTP server: OAuth endpoints, metadata and the bearer-protected MCP endpoint

pub mod auth;
mod mcp;
mod oauth;
mod router;

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub use auth::bearer_middleware;
pub use mcp::SERVER_NAME;
pub use router::{AppState, MCP_PATH, create_router};

use crate::auth::{
    AuthorizationBridge, BridgeSettings, ClientRegistry, LinkedInOAuthClient, SessionStore,
    TokenStore, UpstreamOAuth, spawn_reaper,
};
use crate::config::Config;
use crate::tools::{LinkedInApi, Tools};
use crate::{Error, Result};

/// OAuth bridge server
pub struct Server {
    config: Config,
    state: Arc<AppState>,
    sessions: Arc<SessionStore>,
}

impl Server {
    /// Wire stores, upstream client and tools from a validated configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let jwt_secret = config.auth.resolve_jwt_secret()?;
        let clients = Arc::new(ClientRegistry::new());
        let sessions = Arc::new(SessionStore::new());
        let tokens = Arc::new(TokenStore::new(jwt_secret.as_bytes(), config.auth.token_ttl));
        let upstream: Arc<dyn UpstreamOAuth> =
            Arc::new(LinkedInOAuthClient::new(&config.upstream)?);

        let bridge = Arc::new(AuthorizationBridge::new(
            clients,
            Arc::clone(&sessions),
            tokens,
            upstream,
            BridgeSettings {
                scopes: config.upstream.scopes.clone(),
                code_ttl: config.auth.code_ttl,
                state_ttl: config.auth.state_ttl,
            },
        ));
        let tools = Arc::new(Tools::new(LinkedInApi::new(&config.upstream)?));
        let state = Arc::new(AppState::new(bridge, tools, &config.server.issuer()?)?);

        Ok(Self {
            config,
            state,
            sessions,
        })
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let server = &self.config.server;
        let addr = SocketAddr::new(
            server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            server.port,
        );

        let (shutdown_tx, _) = broadcast::channel(1);
        spawn_reaper(
            Arc::clone(&self.sessions),
            self.config.auth.reap_interval,
            shutdown_tx.subscribe(),
        );

        let app = create_router(Arc::clone(&self.state), server);
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("MCP OAUTH BRIDGE v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %server.host, port = %server.port, "Listening");
        info!(issuer = %server.issuer_url, "Issuer");
        info!(scopes = ?self.config.upstream.scopes, "Upstream scopes");
        info!("  POST {}{MCP_PATH}  (bearer-protected MCP)", server.issuer_url);
        info!("============================================================");

        let mut drain_rx = shutdown_tx.subscribe();
        let drain_deadline = server.shutdown_timeout;
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .into_future();

        tokio::select! {
            result = serve => result.map_err(|e| Error::Internal(e.to_string()))?,
            () = async {
                let _ = drain_rx.recv().await;
                tokio::time::sleep(drain_deadline).await;
            } => {
                warn!(timeout = ?drain_deadline, "Graceful shutdown timed out, dropping open connections");
            }
        }

        info!(
            pending_sessions = self.sessions.len(),
            "Server stopped"
        );
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
