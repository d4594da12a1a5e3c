use std::sync::Arc;

use triage_core::event::Event;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::kv::KvStore;
use crate::score::is_promotional;

const HOUR_MS: i64 = 3_600_000;
const PROMO_WINDOW_MS: i64 = 4 * HOUR_MS;
/// Counter keys outlive their widest window so pruning stays lazy.
const COUNTER_TTL_SECS: u64 = 4 * 3_600;

/// Qualitative attention-budget label, distinct from event priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatigueLevel {
    Low,
    Medium,
    High,
    Maxed,
    /// The counter store was unreadable; the pipeline proceeds unpenalized.
    Unknown,
}

impl FatigueLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            FatigueLevel::Low => "LOW",
            FatigueLevel::Medium => "MEDIUM",
            FatigueLevel::High => "HIGH",
            FatigueLevel::Maxed => "MAXED",
            FatigueLevel::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FatigueReading {
    /// Deliveries across all sources in the past hour
    pub total: i64,
    /// Deliveries from this event's source in the past hour
    pub source: i64,
    /// Promotional deliveries in the past four hours
    pub promo: i64,
    pub penalty: i32,
    pub level: FatigueLevel,
}

/// Sliding-window delivery accounting per user.
///
/// The penalty is derived from the total counter only; the per-source and
/// promo counters feed diagnostics and the audit trail.
#[derive(Clone)]
pub struct FatigueAccountant {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    cap_total: i64,
    cap_source: i64,
    cap_promo: i64,
}

impl FatigueAccountant {
    pub fn new(kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self {
            kv,
            clock,
            cap_total: config.cap_total_per_hour,
            cap_source: config.cap_per_source_per_hour,
            cap_promo: config.cap_promo_per_4h,
        }
    }

    /// Counter-vs-cap summary for stage diagnostics and the audit trail.
    pub fn describe(&self, reading: &FatigueReading) -> String {
        format!(
            "total={}/{} source={}/{} promo={}/{} penalty={} level={}",
            reading.total,
            self.cap_total,
            reading.source,
            self.cap_source,
            reading.promo,
            self.cap_promo,
            reading.penalty,
            reading.level.as_str()
        )
    }

    pub async fn read(&self, user_id: &str, source: &str) -> FatigueReading {
        let now_ms = self.clock.now_ms();

        let total = match self
            .kv
            .zcount_by_score(&total_key(user_id), now_ms - HOUR_MS, now_ms)
            .await
        {
            Ok(total) => total,
            Err(err) => {
                tracing::warn!(error = %err, user_id, "fatigue counter unreadable; proceeding unpenalized");
                return FatigueReading {
                    total: 0,
                    source: 0,
                    promo: 0,
                    penalty: 0,
                    level: FatigueLevel::Unknown,
                };
            }
        };
        let source = self
            .kv
            .zcount_by_score(&source_key(user_id, source), now_ms - HOUR_MS, now_ms)
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, user_id, "per-source counter unreadable");
                0
            });
        let promo = self
            .kv
            .zcount_by_score(&promo_key(user_id), now_ms - PROMO_WINDOW_MS, now_ms)
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, user_id, "promo counter unreadable");
                0
            });

        let penalty = penalty_for(total, self.cap_total);
        FatigueReading {
            total,
            source,
            promo,
            penalty,
            level: level_for(penalty),
        }
    }

    /// Charge this event against the user's budgets. Called only for
    /// outcomes that consume user attention.
    pub async fn record(&self, event: &Event) {
        let now_ms = self.clock.now_ms();
        let member = format!("{now_ms}:{}", event.event_type);

        self.bump(&total_key(&event.user_id), now_ms, &member, HOUR_MS).await;
        self.bump(
            &source_key(&event.user_id, &event.source),
            now_ms,
            &member,
            HOUR_MS,
        )
        .await;
        if is_promotional(&event.event_type) {
            self.bump(&promo_key(&event.user_id), now_ms, &member, PROMO_WINDOW_MS)
                .await;
        }
    }

    async fn bump(&self, key: &str, now_ms: i64, member: &str, window_ms: i64) {
        if let Err(err) = self.kv.zadd(key, now_ms, member).await {
            tracing::warn!(error = %err, key, "failed to record fatigue entry");
            return;
        }
        if let Err(err) = self.kv.expire(key, COUNTER_TTL_SECS).await {
            tracing::warn!(error = %err, key, "failed to refresh fatigue counter TTL");
        }
        if let Err(err) = self.kv.zrem_by_score(key, 0, now_ms - window_ms - 1).await {
            tracing::warn!(error = %err, key, "failed to prune fatigue counter");
        }
    }
}

/// Penalty curve over the total counter. The branches overlap; they are
/// evaluated highest ratio first.
fn penalty_for(total: i64, cap_total: i64) -> i32 {
    let ratio = total as f64 / cap_total.max(1) as f64;
    if ratio >= 1.0 {
        30
    } else if ratio >= 0.8 {
        20
    } else if ratio >= 0.5 {
        10
    } else if total >= 2 {
        5
    } else {
        0
    }
}

fn level_for(penalty: i32) -> FatigueLevel {
    if penalty == 0 {
        FatigueLevel::Low
    } else if penalty <= 10 {
        FatigueLevel::Medium
    } else if penalty <= 20 {
        FatigueLevel::High
    } else {
        FatigueLevel::Maxed
    }
}

fn total_key(user_id: &str) -> String {
    format!("freq:{user_id}:total")
}

fn source_key(user_id: &str, source: &str) -> String {
    format!("freq:{user_id}:{source}")
}

fn promo_key(user_id: &str) -> String {
    format!("freq:{user_id}:promo")
}
