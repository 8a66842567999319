use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use cli::{Command, DebugArgs, ImportCliArgs};

mod cli;
mod cli_db;
mod commands;
mod config;
mod errors;
mod framing;
mod paths;
mod routes;
mod services;
mod state;
mod stream_mode;
mod token;
mod token_store;
mod translator;
mod utils;

use token_store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let mut config = match config::AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {}", err);
            std::process::exit(1);
        }
    };

    if cli.use_cli_db {
        config.cli_db.enabled = true;
    }

    init_tracing(cli.verbose, &config.logging.level);

    let mut client_builder = reqwest::Client::builder()
        .user_agent(concat!("amazonq-api-rs/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(config.performance.request_timeout_seconds))
        .connect_timeout(std::time::Duration::from_secs(10))
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .pool_max_idle_per_host(20);
    if cli.proxy_env {
        if let Ok(proxy) = std::env::var("ALL_PROXY") {
            if let Ok(p) = reqwest::Proxy::all(proxy) {
                client_builder = client_builder.proxy(p);
            }
        }
        if let Ok(proxy) = std::env::var("HTTPS_PROXY") {
            if let Ok(p) = reqwest::Proxy::https(proxy) {
                client_builder = client_builder.proxy(p);
            }
        }
        if let Ok(proxy) = std::env::var("HTTP_PROXY") {
            if let Ok(p) = reqwest::Proxy::http(proxy) {
                client_builder = client_builder.proxy(p);
            }
        }
    }

    let client = match client_builder.build() {
        Ok(client) => client,
        Err(err) => {
            eprintln!("Failed to build HTTP client: {}", err);
            std::process::exit(1);
        }
    };

    let (store, credentials_path) = match build_store(&cli, &config) {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("Failed to resolve credentials store: {}", err);
            std::process::exit(1);
        }
    };
    let state = state::AppState::new(config, client, store);

    match &cli.command {
        Some(Command::RefreshToken) => {
            if let Err(err) = commands::run_refresh_token(&state).await {
                eprintln!("Failed to refresh token: {}", err);
                std::process::exit(1);
            }
            return;
        }
        Some(Command::Debug(DebugArgs { json })) => {
            if let Err(err) = commands::run_debug(&state, credentials_path.as_deref(), *json).await {
                eprintln!("Failed to print debug info: {}", err);
            }
            return;
        }
        Some(Command::ImportCli(ImportCliArgs { db, print })) => {
            if let Err(err) = commands::run_import_cli(&state, db.as_deref(), *print).await {
                eprintln!("Failed to import Amazon Q CLI credentials: {}", err);
                std::process::exit(1);
            }
            return;
        }
        Some(Command::Start) | None => {}
    }

    let has_grant = token::TokenManager::load(&state).await.credentials().has_refresh_grant();
    if let Some(path) = state.config.cli_db_path() {
        tracing::info!("Refreshing from Amazon Q CLI database {} before the refresh grant", path.display());
    } else if !has_grant {
        tracing::warn!("No refresh credentials configured; POST /credentials before sending chat requests");
    }

    let app = routes::router(state);

    let listener = match tokio::net::TcpListener::bind(&cli.addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("Failed to bind {}: {}", cli.addr, err);
            std::process::exit(1);
        }
    };

    tracing::info!("listening on {}", cli.addr);
    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("server failed: {}", err);
    }
}

/// `--memory-store` wins; otherwise the file path comes from `--credentials`,
/// then configuration, then the per-user data directory.
fn build_store(
    cli: &cli::Cli,
    config: &config::AppConfig,
) -> errors::ApiResult<(Arc<dyn CredentialStore>, Option<std::path::PathBuf>)> {
    if cli.memory_store {
        return Ok((Arc::new(MemoryCredentialStore::default()), None));
    }
    let path = match cli.credentials.clone().or_else(|| config.credentials_path.clone()) {
        Some(path) => path,
        None => paths::get_paths()?.credentials_path,
    };
    let store = FileCredentialStore::new(path);
    tracing::info!("Using credentials file {}", store.path().display());
    let path = store.path().to_path_buf();
    Ok((Arc::new(store), Some(path)))
}

fn init_tracing(verbose: bool, configured_level: &str) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(configured_level))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
