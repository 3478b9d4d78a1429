use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use relevo_core::{AnthropicBackend, RequestHandler, SessionManager, SessionStore};
use relevo_gateway::GatewayServer;

mod config;

use config::RelevoConfig;

#[derive(Parser)]
#[command(name = "relevo")]
#[command(version)]
#[command(about = "relevo: chat sessions handed off between a triage and a document agent")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Start,

    /// Send one message on a session and print the reply
    Ask {
        /// Session the message belongs to
        #[arg(short, long, default_value = "cli")]
        session: String,

        /// The message to send
        message: String,
    },

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the --debug switch
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Start => cmd_start(&cli.config).await,
        Commands::Ask { session, message } => cmd_ask(&cli.config, &session, &message).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("relevo initialized at {}", config_dir.display());
    println!(
        "Set ANTHROPIC_API_KEY or edit {} to configure the backend.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = RelevoConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.masked())?);
    Ok(())
}

async fn cmd_start(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = RelevoConfig::load(config_path)?;
    info!("Starting relevo gateway...");

    let handler = build_handler(&cfg)?;
    let bind = cfg.gateway.socket_addr()?;
    let server = GatewayServer::new(bind, handler.clone());

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
        }
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    server.run(cancel.cancelled_owned()).await?;

    let released = handler.shutdown().await;
    info!("Released {} session client(s), bye", released);
    Ok(())
}

async fn cmd_ask(config_path: &Option<PathBuf>, session: &str, message: &str) -> Result<()> {
    let cfg = RelevoConfig::load(config_path)?;
    let handler = build_handler(&cfg)?;

    let result = handler.handle(session, message).await;
    handler.shutdown().await;

    let reply = result?;
    println!("[{}] {}", reply.active_agent, reply.reply);
    Ok(())
}

fn build_handler(cfg: &RelevoConfig) -> Result<Arc<RequestHandler>> {
    if cfg.backend.api_key.is_empty() {
        warn!("No backend API key configured; every session will fail to connect");
    }

    let api_key = cfg.backend.api_key.clone();
    let backend = AnthropicBackend::new(api_key, Some(cfg.backend.model.clone()))
        .context("Failed to initialize Anthropic backend")?
        .with_base_url(cfg.backend.base_url.clone())
        .with_max_tokens(cfg.backend.max_tokens);
    info!("Backend model: {}", backend.model());

    let sessions = SessionManager::new(
        Arc::new(SessionStore::new()),
        Arc::new(cfg.persona_catalog()),
        Arc::new(backend),
    );
    let handler = RequestHandler::new(cfg.persona_router(), sessions)
        .with_timeout(cfg.session.exchange_timeout());
    Ok(Arc::new(handler))
}
