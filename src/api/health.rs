//! Liveness and service description.

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

async fn root() -> Json<Value> {
    Json(json!({
        "name": "netshow",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Execute read-only show commands on network devices",
        "endpoints": {
            "health": "/health",
            "execute": "/execute (POST)",
            "execute_v1": "/api/v1/execute (POST)",
            "jumphost_test": "/jumphost/test (POST)",
        }
    }))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}
