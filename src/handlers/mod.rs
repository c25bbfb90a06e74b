pub mod callback;

use axum::{Json, Router, response::IntoResponse, routing::{get, post}};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::queue::MessageBus;

/// Shared state of the callback intake server.
#[derive(Clone)]
pub struct ApiState {
    pub bus: Arc<dyn MessageBus>,
    pub callback_topic: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

pub async fn health() -> impl IntoResponse {
    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/callback/:transaction_id", post(callback::receive_callback))
        .with_state(state)
}
