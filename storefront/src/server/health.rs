//! Health and readiness probes.

use axum::Json;
use serde_json::{Value, json};

/// Liveness probe
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness probe. The in-memory stores are ready as soon as the process
/// is up.
pub async fn ready() -> Json<Value> {
    Json(json!({ "status": "ready" }))
}
