use chrono::{DateTime, Utc};
use triage_core::event::{Channel, Event, PriorityHint};

/// Base scores never exceed this; the remaining headroom up to 100 belongs
/// to the AI adjustment.
const BASE_CAP: i32 = 75;

pub fn priority_weight(hint: PriorityHint) -> i32 {
    match hint {
        PriorityHint::Critical => 40,
        PriorityHint::High => 25,
        PriorityHint::Medium => 15,
        PriorityHint::Low => 5,
    }
}

pub fn event_type_weight(event_type: &str) -> i32 {
    match event_type {
        "security_alert" => 30,
        "payment_alert" => 28,
        "direct_message" => 25,
        "reminder" => 20,
        "system_alert" => 18,
        "system_update" => 10,
        "promotion" => 5,
        "digest" => 3,
        "low_value_promo" => 2,
        _ => 5,
    }
}

pub fn channel_weight(channel: Channel) -> i32 {
    match channel {
        Channel::Sms => 10,
        Channel::Push => 8,
        Channel::Email => 5,
        Channel::InApp => 3,
    }
}

/// Recency bonus by event age. A producer that omits the timestamp gets the
/// mildly-stale middle value rather than the brand-new bonus.
pub fn freshness_weight(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i32 {
    let Some(timestamp) = timestamp else {
        return 5;
    };
    let age_minutes = (now - timestamp).num_minutes();
    if age_minutes < 1 {
        10
    } else if age_minutes < 5 {
        8
    } else if age_minutes < 15 {
        5
    } else if age_minutes < 60 {
        2
    } else {
        0
    }
}

/// Composite base score in [0, 75].
pub fn compute_base(event: &Event, now: DateTime<Utc>) -> i32 {
    let base = priority_weight(event.priority_hint)
        + event_type_weight(&event.event_type)
        + channel_weight(event.channel)
        + freshness_weight(event.timestamp, now);
    base.min(BASE_CAP)
}

/// Final score in [0, 100].
pub fn final_score(base: i32, fatigue_penalty: i32, ai_adjustment: i32) -> i32 {
    (base - fatigue_penalty + ai_adjustment).clamp(0, 100)
}

/// Promotional traffic gets longer dedup memory and its own fatigue budget.
pub fn is_promotional(event_type: &str) -> bool {
    matches!(event_type, "promotion" | "low_value_promo")
}
