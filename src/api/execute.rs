use super::error::ApiError;
use crate::app::App;
use crate::models::{ExecutionRequestInput, ExecutionResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

async fn execute(
    State(app): State<App>,
    body: Result<Json<ExecutionRequestInput>, JsonRejection>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    let Json(input) = body?;
    match app.execution_manager.execute(&input).await {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            let logger = app.logger.child("api");
            let meta = json!({"kind": err.kind.as_str(), "error": err.message});
            if err.kind.aborts_request() {
                logger.info("Request rejected", Some(&meta));
            } else {
                logger.error("Execution failed", Some(&meta));
            }
            Err(err.into())
        }
    }
}

pub fn router(app: App) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/api/v1/execute", post(execute))
        .with_state(app)
}
