//! MCP OAuth Bridge - OAuth authorization server in front of an OAuth2-protected API

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use mcp_oauth_bridge::{
    cli::{Cli, Command},
    config::Config,
    server::Server,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::CheckConfig) => check_config(&config),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Load the configuration file and apply CLI overrides
fn load_config(cli: &Cli) -> mcp_oauth_bridge::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
    }
    Ok(config)
}

/// Validate and print the effective settings (secrets are never printed)
fn check_config(config: &Config) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("❌ {e}");
        return ExitCode::FAILURE;
    }

    println!("✅ Configuration is valid\n");
    println!("Server:");
    println!("  Listen:          {}:{}", config.server.host, config.server.port);
    println!("  Issuer:          {}", config.server.issuer_url);
    println!("  Request timeout: {:?}", config.server.request_timeout);
    println!("Upstream:");
    println!("  Authorize:       {}", config.upstream.authorization_endpoint);
    println!("  Token:           {}", config.upstream.token_endpoint);
    println!("  Redirect:        {}", config.upstream.redirect_url);
    println!("  API:             {}", config.upstream.api_base_url);
    println!("  Scopes:          {}", config.upstream.scopes.join(" "));
    println!("Tokens:");
    println!("  Bearer TTL:      {:?}", config.auth.token_ttl);
    println!("  Code TTL:        {:?}", config.auth.code_ttl);
    match config.auth.state_ttl {
        Some(ttl) => println!("  State TTL:       {ttl:?}"),
        None => println!("  State TTL:       unbounded"),
    }
    ExitCode::SUCCESS
}

/// Run the bridge server
async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        issuer = %config.server.issuer_url,
        "Starting MCP OAuth bridge"
    );

    let server = match Server::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
