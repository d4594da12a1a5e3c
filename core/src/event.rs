use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Caller-supplied urgency hint. CRITICAL events are guaranteed delivery:
/// they bypass dedup and survive pipeline faults via the failsafe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriorityHint {
    Critical,
    High,
    Medium,
    Low,
}

impl PriorityHint {
    pub fn as_str(self) -> &'static str {
        match self {
            PriorityHint::Critical => "CRITICAL",
            PriorityHint::High => "HIGH",
            PriorityHint::Medium => "MEDIUM",
            PriorityHint::Low => "LOW",
        }
    }
}

impl Default for PriorityHint {
    fn default() -> Self {
        PriorityHint::Medium
    }
}

/// Delivery channel. Influences the composite score only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Push,
    Email,
    Sms,
    #[serde(rename = "in-app")]
    InApp,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Push => "push",
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::InApp => "in-app",
        }
    }
}

impl Default for Channel {
    fn default() -> Self {
        Channel::Push
    }
}

/// A single notification event flowing through the evaluation pipeline.
///
/// event_type is a free-form string, NOT an enum. New event types emerge from
/// producers; unknown types score with conservative defaults.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Event {
    /// Unique event ID (UUIDv7, time-sortable)
    pub id: Uuid,
    /// Owner of this event; never empty
    pub user_id: String,
    /// Free-form event type (e.g. "security_alert", "promotion")
    pub event_type: String,
    /// Message body; empty permitted
    #[serde(default)]
    pub message: String,
    /// Producing service; "unknown" when the producer does not identify itself
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub priority_hint: PriorityHint,
    #[serde(default)]
    pub channel: Channel,
    /// When the event happened (as reported by the producer, not server time).
    /// Absent means the producer did not say; freshness scoring treats that
    /// as mildly stale rather than brand new.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Caller-provided idempotency key for exact deduplication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
    /// Events past this instant are suppressed unconditionally
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Opaque pass-through payload; the pipeline never inspects it
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn default_source() -> String {
    "unknown".to_string()
}

/// Request to evaluate a notification event. Same shape as [`Event`] minus
/// the server-assigned id.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EvaluateRequest {
    pub user_id: String,
    pub event_type: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub priority_hint: PriorityHint,
    #[serde(default)]
    pub channel: Channel,
    pub timestamp: Option<DateTime<Utc>>,
    pub dedupe_key: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl EvaluateRequest {
    /// Assign a fresh event id and promote to a pipeline [`Event`].
    pub fn into_event(self) -> Event {
        Event {
            id: Uuid::now_v7(),
            user_id: self.user_id,
            event_type: self.event_type,
            message: self.message,
            source: self.source,
            priority_hint: self.priority_hint,
            channel: self.channel,
            timestamp: self.timestamp,
            dedupe_key: self.dedupe_key,
            expires_at: self.expires_at,
            metadata: self.metadata,
        }
    }
}

/// Terminal outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Dispatch immediately
    Now,
    /// Defer to `schedule_at`
    Later,
    /// Suppress
    Never,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Now => "NOW",
            Verdict::Later => "LATER",
            Verdict::Never => "NEVER",
        }
    }
}

/// The caller-facing decision envelope.
///
/// `schedule_at` is populated exactly when `decision` is LATER, with one
/// exception: a failsafe NOW produced after a pipeline fault carries no
/// schedule either.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Decision {
    pub decision: Verdict,
    /// Composite score in [0, 100]
    pub score: i32,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_at: Option<DateTime<Utc>>,
    /// `aud_` followed by 8 hex chars; joins the decision to its audit record
    pub audit_id: String,
}
