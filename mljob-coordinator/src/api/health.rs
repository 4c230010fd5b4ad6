//! Health Check API Handler
//!
//! Simple health check endpoint for monitoring.

use axum::Json;
use serde_json::{Value, json};

/// GET /health
/// Health check endpoint, no token required
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
