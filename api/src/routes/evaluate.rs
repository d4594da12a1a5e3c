use axum::extract::State;
use axum::{Json, Router, routing::post};
use triage_core::event::{Decision, EvaluateRequest};

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/evaluate", post(evaluate))
}

/// Classify one notification event.
///
/// Returns exactly one decision: NOW (dispatch immediately), LATER (defer
/// to `schedule_at`) or NEVER (suppress). Every call leaves an audit record
/// reachable via the returned `audit_id`.
#[utoipa::path(
    post,
    path = "/v1/evaluate",
    request_body = EvaluateRequest,
    responses(
        (status = 200, description = "Event classified", body = Decision),
        (status = 400, description = "Invalid event", body = triage_core::error::ApiError),
        (status = 500, description = "Pipeline fault", body = triage_core::error::ApiError)
    ),
    tag = "evaluation"
)]
pub async fn evaluate(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<Decision>, AppError> {
    validate(&request)?;
    let event = request.into_event();
    let decision = state.engine.evaluate(&event).await?;
    Ok(Json(decision))
}

fn validate(request: &EvaluateRequest) -> Result<(), AppError> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::Validation {
            message: "user_id must not be empty".to_string(),
            field: Some("user_id".to_string()),
            received: Some(serde_json::Value::String(request.user_id.clone())),
            docs_hint: Some("Identify the recipient of the notification.".to_string()),
        });
    }
    if request.event_type.trim().is_empty() {
        return Err(AppError::Validation {
            message: "event_type must not be empty".to_string(),
            field: Some("event_type".to_string()),
            received: Some(serde_json::Value::String(request.event_type.clone())),
            docs_hint: Some(
                "Tag the event with a type such as 'direct_message' or 'promotion'.".to_string(),
            ),
        });
    }
    Ok(())
}
