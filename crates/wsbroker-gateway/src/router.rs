//! Axum router for the ops surface.
//!
//! WebSocket traffic does not pass through here; see `transport::listener`.

use axum::{routing::get, Router};

use crate::{app_state::AppState, ops};

pub fn build_ops_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
