use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use triage_core::event::Event;

use crate::config::EngineConfig;
use crate::error::EngineError;

/// Adjustment bounds; responses outside are clamped, not rejected.
const ADJUSTMENT_MIN: i32 = -10;
const ADJUSTMENT_MAX: i32 = 15;

#[derive(Debug, Serialize)]
struct AiScoreRequest<'a> {
    user_id: &'a str,
    event_type: &'a str,
    channel: &'a str,
    source: &'a str,
    hour_of_day: u32,
}

#[derive(Debug, Deserialize)]
struct AiScoreResponse {
    score_adjustment: i32,
}

/// Client for the relevance model. The call is bounded by a hard deadline
/// (200 ms by default); the orchestrator treats any fault as a zero
/// adjustment. Without a configured endpoint a deterministic-ish mock
/// stands in: a per-type base plus a little uniform noise.
#[derive(Clone)]
pub struct AiClient {
    endpoint: Option<String>,
    timeout: Duration,
    http: reqwest::Client,
}

impl AiClient {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            endpoint: config.ai_endpoint.clone(),
            timeout: Duration::from_millis(config.ai_timeout_ms),
            http: reqwest::Client::new(),
        }
    }

    pub async fn score_adjustment(
        &self,
        event: &Event,
        hour_of_day: u32,
    ) -> Result<i32, EngineError> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return Ok(mock_adjustment(&event.event_type));
        };

        let body = AiScoreRequest {
            user_id: &event.user_id,
            event_type: &event.event_type,
            channel: event.channel.as_str(),
            source: &event.source,
            hour_of_day,
        };
        let request = async {
            let response = self
                .http
                .post(endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|err| EngineError::AiHttp(err.to_string()))?;
            if !response.status().is_success() {
                return Err(EngineError::AiHttp(format!(
                    "endpoint returned {}",
                    response.status()
                )));
            }
            response
                .json::<AiScoreResponse>()
                .await
                .map_err(|err| EngineError::AiHttp(err.to_string()))
        };

        let parsed = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| EngineError::AiTimeout(self.timeout.as_millis() as u64))??;
        Ok(parsed.score_adjustment.clamp(ADJUSTMENT_MIN, ADJUSTMENT_MAX))
    }
}

/// Stand-in adjustment when no endpoint is configured.
fn mock_adjustment(event_type: &str) -> i32 {
    let base = match event_type {
        "security_alert" => 12,
        "payment_alert" => 11,
        "direct_message" => 10,
        "reminder" => 8,
        "system_update" => 2,
        "promotion" => -5,
        "low_value_promo" => -8,
        _ => 0,
    };
    let noise = rand::thread_rng().gen_range(-3..=2);
    (base + noise).clamp(ADJUSTMENT_MIN, ADJUSTMENT_MAX)
}
