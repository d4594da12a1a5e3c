use axum::http::{Response, StatusCode};
use tower_governor::{
    GovernorError, GovernorLayer, governor::GovernorConfigBuilder,
    key_extractor::SmartIpKeyExtractor,
};
use triage_core::error::{ApiError, codes};

type RateLimitLayer =
    GovernorLayer<SmartIpKeyExtractor, governor::middleware::NoOpMiddleware, axum::body::Body>;

/// Rate limit for POST /v1/evaluate: 120 requests/minute per IP.
pub fn evaluate_layer() -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_millisecond(500) // 120 per minute = 2 per second replenish
            .burst_size(30)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("invalid governor config for evaluate"),
    )
    .error_handler(rate_limit_response)
}

/// Render a governor rejection as the structured [`ApiError`] envelope.
///
/// With a single rate-limited route only the too-many-requests case carries
/// information; any other governor failure degrades to a plain 500.
fn rate_limit_response(err: GovernorError) -> Response<axum::body::Body> {
    let retry_after_secs = match err {
        GovernorError::TooManyRequests { wait_time, .. } => Some(wait_time),
        GovernorError::UnableToExtractKey | GovernorError::Other { .. } => None,
    };

    let api_error = ApiError {
        error: codes::RATE_LIMITED.to_string(),
        message: match retry_after_secs {
            Some(wait) => format!("Evaluation rate limit reached. Retry after {wait} seconds."),
            None => "Rate limiting could not be applied to this request".to_string(),
        },
        field: None,
        received: None,
        request_id: uuid::Uuid::now_v7().to_string(),
        docs_hint: Some("Keep evaluate calls below 120 per minute per client.".to_string()),
    };
    let body = serde_json::to_string(&api_error).unwrap_or_else(|_| "{}".to_string());

    let status = if retry_after_secs.is_some() {
        StatusCode::TOO_MANY_REQUESTS
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let mut builder = Response::builder()
        .status(status)
        .header("content-type", "application/json");
    if let Some(wait) = retry_after_secs {
        builder = builder.header("retry-after", wait.to_string());
    }
    builder
        .body(axum::body::Body::from(body))
        .expect("rate limit response should build")
}
