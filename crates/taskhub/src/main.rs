//! # taskhub
//!
//! Chat server binary. Loads settings, opens the store, and serves the
//! HTTP/WebSocket surface until Ctrl-C.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use taskhub_core::UserIdentity;
use taskhub_server::{ChatServer, JwtAuth, ServerConfig, issue_token};
use taskhub_settings::TaskhubSettings;
use taskhub_store::{ChatStore, ConnectionConfig, MemoryChatStore, SqliteChatStore};

/// Taskhub chat server.
#[derive(Parser, Debug)]
#[command(name = "taskhub", about = "Taskhub chat server")]
struct Cli {
    /// Settings file (defaults to `~/.taskhub/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Keep all chat state in memory instead of `SQLite`.
    #[arg(long)]
    memory: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Run the server (default).
    Serve,
    /// Print a signed access token for a user.
    Token {
        /// User ID carried in the token.
        #[arg(long)]
        user_id: u64,
        /// Display name carried in the token.
        #[arg(long)]
        username: String,
        /// Application role carried in the token.
        #[arg(long, default_value = "employee")]
        role: String,
        /// Token lifetime in seconds (defaults to `auth.tokenTtlSecs`).
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
}

impl Cli {
    fn load_settings(&self) -> Result<TaskhubSettings> {
        let mut settings = match &self.config {
            Some(path) => taskhub_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => taskhub_settings::load_settings().context("Failed to load settings")?,
        };
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(db_path) = &self.db_path {
            settings.database.path = db_path.to_string_lossy().into_owned();
        }
        Ok(settings)
    }
}

fn db_path(settings: &TaskhubSettings) -> PathBuf {
    if settings.database.path.is_empty() {
        taskhub_settings::default_db_path()
    } else {
        PathBuf::from(&settings.database.path)
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn open_store(settings: &TaskhubSettings, memory: bool) -> Result<Arc<dyn ChatStore>> {
    if memory {
        tracing::info!("using in-memory chat store");
        return Ok(Arc::new(MemoryChatStore::new()));
    }

    let path = db_path(settings);
    ensure_parent_dir(&path)?;
    let config = ConnectionConfig {
        pool_size: settings.database.pool_size,
        busy_timeout_ms: settings.database.busy_timeout_ms,
    };
    let pool = taskhub_store::new_file(&path.to_string_lossy(), &config)
        .context("Failed to open database")?;
    {
        let conn = pool.get().context("Failed to get DB connection")?;
        let applied = taskhub_store::run_migrations(&conn).context("Failed to run migrations")?;
        tracing::info!(path = %path.display(), applied, "database ready");
    }
    Ok(Arc::new(SqliteChatStore::new(pool)))
}

fn build_server(
    settings: &TaskhubSettings,
    store: Arc<dyn ChatStore>,
    metrics_handle: PrometheusHandle,
) -> ChatServer {
    ChatServer::new(
        ServerConfig::from_settings(settings),
        store,
        JwtAuth::new(&settings.auth.jwt_secret),
        metrics_handle,
    )
}

async fn serve(cli: &Cli, settings: &TaskhubSettings) -> Result<()> {
    let store = open_store(settings, cli.memory)?;
    let metrics_handle =
        taskhub_server::metrics::install_recorder().context("Failed to install metrics recorder")?;
    let server = build_server(settings, store, metrics_handle);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("taskhub listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    let report = server.shutdown().drain(handle, Duration::from_secs(10)).await;
    tracing::info!(
        sessions_closed = report.sessions_closed,
        serve_finished = report.serve_finished,
        "shutdown complete"
    );
    Ok(())
}

fn mint_token(
    settings: &TaskhubSettings,
    user: &UserIdentity,
    ttl_secs: Option<u64>,
) -> Result<String> {
    let ttl = Duration::from_secs(ttl_secs.unwrap_or(settings.auth.token_ttl_secs));
    issue_token(&settings.auth.jwt_secret, user, ttl).context("Failed to sign token")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    taskhub_core::logging::init_subscriber(&settings.logging.level);

    match &cli.command {
        None | Some(Command::Serve) => serve(&cli, &settings).await,
        Some(Command::Token {
            user_id,
            username,
            role,
            ttl_secs,
        }) => {
            let user = UserIdentity {
                id: *user_id,
                username: username.clone(),
                role: role.clone(),
            };
            println!("{}", mint_token(&settings, &user, *ttl_secs)?);
            Ok(())
        }
    }
}
