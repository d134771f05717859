//! mediashelf: media library automation service
//!
//! Watches sync directories, transfers recognized media into the library,
//! keeps the transfer history and serves the admin actions over HTTP.

pub mod actions;
pub mod api;
pub mod config;
pub mod db;
pub mod jobs;
pub mod media;
pub mod services;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::actions::WebActions;
use crate::config::Config;
use crate::db::Database;
use crate::services::WallpaperService;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub actions: Arc<WebActions>,
    pub wallpaper: Arc<WallpaperService>,
}

/// The full router with middleware and state applied
pub fn app(state: AppState) -> Router {
    api::router()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
