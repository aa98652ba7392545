//! Agora API — axum HTTP surface over the session engine.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

use axum::Router;

use crate::state::AppState;

/// Builds the full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/sessions", routes::sessions::router())
        .nest("/api/v1/scenarios", routes::scenarios::router())
        .nest("/api/v1/engine", routes::engine::router())
        .with_state(state)
}
