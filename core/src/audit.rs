use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::event::Verdict;

/// Append-only record of one evaluation. Exactly one is written per
/// `evaluate` call, including failsafe outcomes.
///
/// `stages` holds one diagnostic string per pipeline stage that ran
/// (`expiry`, `dedup`, `rules`, `dnd`, `scorer`, `fatigue`, `ai`,
/// `conflict`, `decision`, and `failsafe` when the envelope fired).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditRecord {
    pub audit_id: String,
    pub event_id: Uuid,
    pub user_id: String,
    pub event_type: String,
    pub decision: Verdict,
    pub score: i32,
    pub reason: String,
    pub stages: BTreeMap<String, String>,
    /// Ids of rules whose conditions matched, highest priority first
    pub rules_matched: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
