//! mediashelf entry point
//!
//! Loads the environment configuration and the settings document, brings the
//! database schema and legacy settings up to date, then serves the HTTP API
//! until a shutdown signal or the `restart` action.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediashelf::actions::{Collaborators, WebActions};
use mediashelf::config::{Config, SettingsStore, check_settings, upgrade_settings};
use mediashelf::db::Database;
use mediashelf::services::{LogBuffer, WallpaperService};
use mediashelf::{AppState, app, jobs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(Config::from_env()?);

    let log_buffer = LogBuffer::new(config.log_buffer_lines);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediashelf=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .with(log_buffer.layer())
        .init();

    tracing::info!("Starting mediashelf");

    let db = Database::connect(&config.database_url).await?;
    tracing::info!("Database connected");

    let settings = Arc::new(SettingsStore::load(&config.config_path)?);
    let mut document = settings.snapshot();
    if upgrade_settings(&mut document, &db).await? {
        settings.replace(document);
        settings.save().context("Failed to save upgraded settings")?;
        tracing::info!("Settings document upgraded");
    }
    let warnings = check_settings(&settings.snapshot());

    let shutdown = CancellationToken::new();
    let actions = Arc::new(WebActions::new(
        db.clone(),
        config.clone(),
        settings,
        Collaborators::default(),
        log_buffer,
        shutdown.clone(),
    )?);
    actions.reload_caches().await?;
    for warning in &warnings {
        actions.message_center.insert("WARN", "Settings check", warning);
    }

    let wallpaper = Arc::new(WallpaperService::new()?);
    let _scheduler = jobs::start_scheduler(actions.clone(), wallpaper.clone(), shutdown.clone()).await?;

    let state = AppState {
        config: config.clone(),
        db,
        actions: actions.clone(),
        wallpaper,
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let signal = shutdown.clone();
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = signal.cancelled() => {}
                _ = tokio::signal::ctrl_c() => signal.cancel(),
            }
        })
        .await?;

    if let Err(e) = actions.meta_cache.save(true) {
        tracing::error!(error = %e, "Failed to save metadata cache on shutdown");
    }
    tracing::info!("Server stopped");
    Ok(())
}
