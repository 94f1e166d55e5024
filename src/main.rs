// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{error::Error, net::SocketAddr, path::PathBuf, sync::Arc};

use chrono::Duration;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use export_guard::{
    api::{self, OutboxSink},
    auth::{Scope, TokenAuthority},
    clock::SystemClock,
    config::{GuardConfig, LogFormat, PresenceMode},
    identity::DeviceIdentity,
    providers::OAuthClient,
    rate_limit::RateLimiter,
    state::AppState,
    storage::{SecureStorage, StoragePaths},
    validation::UrlValidator,
    vault::{PresenceGate, TermuxFingerprint, Vault},
};

type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "export-guard", version, about = "Security core for the research export webhook")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook server
    Serve,
    /// Issue an access/refresh token pair bound to this device
    IssueToken {
        #[arg(long, default_value = "shortcuts")]
        subject: String,
        /// Comma-separated scopes
        #[arg(long, default_value = "export:create")]
        scopes: String,
    },
    /// Delete the device identity, invalidating every issued token
    RevokeDevice,
    /// Drop revocation entries for tokens that have expired
    CompactRevocations,
    /// Print the OAuth authorization URL and its CSRF state
    AuthorizeUrl,
    /// Exchange an OAuth authorization code and store the tokens in the vault
    ExchangeCode { code: String },
    /// Move credentials from a plaintext .env file into the vault
    MigrateEnv { path: PathBuf },
}

/// Storage, identity and token authority, opened for one command.
struct Core {
    storage: SecureStorage,
    device_id: Uuid,
    authority: TokenAuthority,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let config = GuardConfig::from_env()?;
    init_tracing(config.log_format);

    match cli.command {
        Command::Serve => serve(&config).await,
        Command::IssueToken { subject, scopes } => {
            let scopes = Scope::parse_list(&scopes)?;
            let core = open_core(&config)?;
            let pair = core.authority.issue_token_pair(&subject, core.device_id, scopes)?;
            println!("{}", serde_json::to_string_pretty(&pair)?);
            Ok(())
        }
        Command::RevokeDevice => revoke_device(&config),
        Command::CompactRevocations => {
            let core = open_core(&config)?;
            let removed = core.authority.compact_revocations()?;
            println!("Removed {removed} expired revocation entries");
            Ok(())
        }
        Command::AuthorizeUrl => {
            let client = oauth_client(&config)?;
            let (url, state) = client.build_authorize_url(None)?;
            println!("Open this URL to grant access:\n{url}\n\nExpected state: {state}");
            Ok(())
        }
        Command::ExchangeCode { code } => {
            let client = oauth_client(&config)?;
            let tokens = client.exchange_code(code.trim()).await?;
            println!(
                "Connected workspace {}",
                tokens.workspace_name.as_deref().unwrap_or("(unnamed)")
            );
            Ok(())
        }
        Command::MigrateEnv { path } => {
            let core = open_core(&config)?;
            let vault = open_vault(&config, &core)?;
            let imported = vault.migrate_from_env(&path)?;
            println!("Imported {imported} credentials; plaintext file renamed to *.backup");
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn open_storage(config: &GuardConfig) -> Result<SecureStorage, BoxError> {
    let mut storage = SecureStorage::new(StoragePaths::new(&config.data_dir));
    storage.initialize()?;
    Ok(storage)
}

fn open_core(config: &GuardConfig) -> Result<Core, BoxError> {
    let storage = open_storage(config)?;
    let identity = Arc::new(DeviceIdentity::new(storage.clone()));
    let device_id = identity.get_or_create_device_id()?;

    let authority = TokenAuthority::open(&storage, identity, Arc::new(SystemClock))?
        .with_ttls(
            Duration::seconds(config.access_ttl_secs),
            Duration::seconds(config.refresh_ttl_secs),
        )
        .with_device_binding(device_id);

    Ok(Core {
        storage,
        device_id,
        authority,
    })
}

fn open_vault(config: &GuardConfig, core: &Core) -> Result<Vault, BoxError> {
    let vault = Vault::open(core.storage.clone(), core.device_id.as_bytes())?;
    Ok(match config.presence {
        PresenceMode::Off => vault,
        PresenceMode::Termux => {
            vault.with_presence_gate(PresenceGate::Required(Box::new(TermuxFingerprint::new())))
        }
    })
}

fn oauth_client(config: &GuardConfig) -> Result<OAuthClient, BoxError> {
    let settings = config.require_oauth()?;
    let core = open_core(config)?;
    let vault = Arc::new(open_vault(config, &core)?);
    Ok(OAuthClient::new(
        &settings.client_id,
        &settings.client_secret,
        &settings.redirect_uri,
        vault,
    )?)
}

/// The vault key derives from the device id, so the vault goes too.
fn revoke_device(config: &GuardConfig) -> Result<(), BoxError> {
    let storage = open_storage(config)?;
    let identity = DeviceIdentity::new(storage.clone());

    if !identity.revoke()? {
        println!("No device identity to revoke");
        return Ok(());
    }
    if storage.secure_delete(storage.paths().vault_blob())? {
        warn!("Vault deleted with the device identity; re-run the OAuth setup");
    }
    println!("Device identity revoked; all issued tokens are now invalid");
    Ok(())
}

async fn serve(config: &GuardConfig) -> Result<(), BoxError> {
    let core = open_core(config)?;
    let device_id = core.device_id;
    let sink = Arc::new(OutboxSink::new(core.storage.clone()));

    let state = AppState::new(
        core.authority,
        RateLimiter::new(config.rate_limit),
        UrlValidator::new(&config.allowed_domains),
    )
    .with_sink(sink);
    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, %device_id, "Export guard webhook listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
