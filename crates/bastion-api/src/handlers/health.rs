//! Liveness endpoint.

use axum::Json;
use serde_json::{json, Value};

/// `GET /health`. Needs no authentication and touches no backing service.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
