use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::event::Event;

/// What a matched rule asks the pipeline to do.
///
/// Only SUPPRESS terminates the pipeline today; the other actions are
/// annotated on the audit record and composed with the later stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAction {
    Defer,
    Suppress,
    SendNow,
    Cap,
}

impl RuleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleAction::Defer => "DEFER",
            RuleAction::Suppress => "SUPPRESS",
            RuleAction::SendNow => "SEND_NOW",
            RuleAction::Cap => "CAP",
        }
    }
}

/// Field-by-field match condition. An absent field or the literal `"*"`
/// matches any value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RuleCondition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl RuleCondition {
    pub fn matches(&self, event: &Event) -> bool {
        field_matches(self.event_type.as_deref(), &event.event_type)
            && field_matches(self.channel.as_deref(), event.channel.as_str())
            && field_matches(self.source.as_deref(), &event.source)
            && field_matches(self.priority.as_deref(), event.priority_hint.as_str())
    }
}

fn field_matches(condition: Option<&str>, value: &str) -> bool {
    match condition {
        None | Some("*") => true,
        Some(expected) => expected == value,
    }
}

/// Frequency cap carried by CAP rules. Annotate-only today.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MaxPer {
    pub count: u32,
    /// Opaque window label from the rules file, e.g. "1h"
    pub window: String,
}

/// One hot-reloadable routing rule.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Rule {
    pub rule_id: String,
    #[serde(default)]
    pub condition: RuleCondition,
    pub action: RuleAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_per: Option<MaxPer>,
    /// Higher wins; ties keep file order
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}
