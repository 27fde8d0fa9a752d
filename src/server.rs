//! HTTP trigger surface.
//!
//! `/predict` (GET, POST or PATCH) runs the whole pipeline for the configured
//! mailbox and returns the processed batch as a JSON array. It takes no
//! parameters. `/health` is a liveness check.

use std::sync::Arc;

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::pipeline::processor::TriageProcessor;
use crate::pipeline::types::Message;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<TriageProcessor>,
}

/// Build the Axum router.
pub fn triage_routes(processor: Arc<TriageProcessor>) -> Router {
    let state = AppState { processor };

    Router::new()
        .route("/predict", get(predict).post(predict).patch(predict))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mail-triage"
    }))
}

/// Always answers 200 with the batch; a failed fetch is an empty array.
async fn predict(State(state): State<AppState>) -> Json<Vec<Message>> {
    info!("Triage run triggered");
    Json(state.processor.run().await)
}
