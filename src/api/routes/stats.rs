//! Dispatch statistics endpoint

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::api::state::ApiState;

/// GET /api/v1/stats
///
/// Returns the call counters of every running dispatch loop
pub async fn get_stats(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "node": state.node,
        "configs": state.observer.snapshot(),
        "running": state.loops.running(),
    }))
}
