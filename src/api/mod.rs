//! HTTP route definitions
//!
//! The admin page talks to `/do` with a session token from `/login`.
//! Scripts use `/api/v1/action/{cmd}` with the configured api key.

pub mod actions;
pub mod health;

use axum::Router;

use crate::AppState;

/// Every route, without middleware or state
pub fn router() -> Router<AppState> {
    Router::new().merge(health::router()).merge(actions::router())
}
