use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use triage_core::error::{self, ApiError};
use triage_engine::EngineError;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Pipeline fault surfaced by the engine (500)
    Engine(EngineError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Engine(err) => {
                tracing::error!("Evaluation error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::EVALUATION_FAILED.to_string(),
                        message: "Evaluation failed unexpectedly; the event was not classified"
                            .to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: Some(
                            "Retry the request; CRITICAL events are never lost to internal faults."
                                .to_string(),
                        ),
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::Engine(err)
    }
}
