use super::error::ApiError;
use crate::app::App;
use crate::models::{JumphostInput, JumphostTestResult};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

async fn test_jumphost(
    State(app): State<App>,
    body: Result<Json<JumphostInput>, JsonRejection>,
) -> Result<Json<JumphostTestResult>, ApiError> {
    let Json(input) = body?;
    let result = app.execution_manager.test_jumphost(&input).await?;
    Ok(Json(result))
}

pub fn router(app: App) -> Router {
    Router::new()
        .route("/jumphost/test", post(test_jumphost))
        .with_state(app)
}
