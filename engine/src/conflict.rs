use triage_core::event::{PriorityHint, Verdict};

use crate::fatigue::FatigueLevel;

/// Sources whose traffic is routinely high-volume and low-signal. The list
/// is static input; the engine does not learn it.
pub const NOISY_SOURCES: [&str; 5] = [
    "marketing-svc",
    "promo-service",
    "analytics-alerts",
    "noisy-svc",
    "bulk-sender",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Later or Never; the resolver never emits Now.
    pub verdict: Verdict,
    pub reason: String,
}

/// Arbitrate between urgency and fatigue before the score boundary applies.
///
/// Important traffic that collides with an exhausted attention budget is
/// deferred, never dropped; unimportant traffic that happens to score high
/// under fatigue is also deferred. A pure function of its four inputs.
pub fn resolve(
    priority: PriorityHint,
    fatigue: FatigueLevel,
    source: &str,
    final_score: i32,
) -> Option<Resolution> {
    match (priority, fatigue) {
        (PriorityHint::High, FatigueLevel::Maxed) => Some(Resolution {
            verdict: Verdict::Later,
            reason: "HIGH priority against a maxed-out attention budget; deferred briefly instead of dropped".to_string(),
        }),
        (PriorityHint::High, FatigueLevel::High) if is_noisy(source) => Some(Resolution {
            verdict: Verdict::Later,
            reason: format!(
                "HIGH priority from noisy source '{source}' under high fatigue; deferred briefly"
            ),
        }),
        (PriorityHint::Medium, FatigueLevel::Maxed) => Some(Resolution {
            verdict: Verdict::Never,
            reason: "MEDIUM priority with a maxed-out attention budget; suppressed".to_string(),
        }),
        (PriorityHint::Low, FatigueLevel::Maxed) if final_score >= 60 => Some(Resolution {
            verdict: Verdict::Later,
            reason: format!(
                "LOW priority scored {final_score} under a maxed-out attention budget; deferred briefly"
            ),
        }),
        _ => None,
    }
}

fn is_noisy(source: &str) -> bool {
    NOISY_SOURCES.contains(&source)
}
