use crate::errors::ServiceError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// HTTP face of [`ServiceError`]. Request-level problems are reported to the
/// caller as 400; anything else is logged by the handler and hidden behind a
/// generic 500.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ServiceError::invalid_params(format!(
            "Malformed request body: {}",
            rejection.body_text()
        )))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        if err.kind.aborts_request() {
            let body = ErrorBody {
                detail: err.message,
                kind: Some(err.kind.as_str()),
                hint: err.hint,
            };
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
        let body = ErrorBody {
            detail: "Internal server error".to_string(),
            kind: None,
            hint: None,
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_are_bad_request() {
        let response = ApiError(ServiceError::invalid_params("Command cannot be empty")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = ApiError(ServiceError::configuration("no jumphost")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn other_errors_are_hidden() {
        let response = ApiError(ServiceError::internal("db password=hunter2 leaked")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
