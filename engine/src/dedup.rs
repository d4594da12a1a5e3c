use std::sync::Arc;

use triage_core::event::Event;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::hash::{build_fingerprint, hamming, simhash};
use crate::kv::KvStore;
use crate::score::is_promotional;

/// Dedup memory for transactional traffic.
const EXACT_TTL_SECS: u64 = 600;
/// Promotional traffic is remembered for a full day.
const PROMO_TTL_SECS: u64 = 86_400;
/// Messages shorter than this carry too little signal for SimHash.
const NEAR_DUP_MIN_CHARS: usize = 10;
/// Strict upper bound: a stored hash at this distance is NOT a duplicate.
const NEAR_DUP_MAX_DISTANCE: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    ExactKey,
    ExactFingerprint,
    NearDuplicate,
}

impl DuplicateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DuplicateKind::ExactKey => "EXACT_KEY",
            DuplicateKind::ExactFingerprint => "EXACT_FINGERPRINT",
            DuplicateKind::NearDuplicate => "NEAR_DUPLICATE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateHit {
    pub kind: DuplicateKind,
    pub detail: String,
}

/// Exact-plus-near duplicate detection over the KV store.
///
/// Reads fail open: a KV fault during any probe downgrades that probe to
/// "no duplicate" rather than blocking the event. Writes are logged and
/// swallowed; the pipeline never retries them.
#[derive(Clone)]
pub struct Deduplicator {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    window_secs: i64,
}

impl Deduplicator {
    pub fn new(kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self {
            kv,
            clock,
            window_secs: config.near_dup_window_secs,
        }
    }

    /// Run the three checks in order: idempotency key, content fingerprint,
    /// SimHash neighborhood.
    pub async fn check(&self, event: &Event) -> Option<DuplicateHit> {
        if let Some(key) = event.dedupe_key.as_deref() {
            match self.kv.get(&format!("dedup:key:{key}")).await {
                Ok(Some(_)) => {
                    return Some(DuplicateHit {
                        kind: DuplicateKind::ExactKey,
                        detail: format!("idempotency key '{key}' seen within TTL"),
                    });
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "dedup key probe failed; treating as not a duplicate");
                }
            }
        }

        let fingerprint = fingerprint_of(event);
        match self.kv.get(&format!("dedup:fp:{fingerprint}")).await {
            Ok(Some(_)) => {
                return Some(DuplicateHit {
                    kind: DuplicateKind::ExactFingerprint,
                    detail: format!("fingerprint {} seen within TTL", &fingerprint[..12]),
                });
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "dedup fingerprint probe failed; treating as not a duplicate");
            }
        }

        if event.message.chars().count() < NEAR_DUP_MIN_CHARS {
            return None;
        }
        let hash = simhash(&event.message);
        let sim_key = sim_key(event);
        let stored = match self.kv.zrange_all(&sim_key).await {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!(error = %err, "near-duplicate probe failed; treating as not a duplicate");
                return None;
            }
        };
        for member in stored {
            let Ok(candidate) = member.parse::<u64>() else {
                tracing::warn!(key = %sim_key, member = %member, "unparseable simhash member skipped");
                continue;
            };
            let distance = hamming(hash, candidate);
            if distance < NEAR_DUP_MAX_DISTANCE {
                return Some(DuplicateHit {
                    kind: DuplicateKind::NearDuplicate,
                    detail: format!("hamming distance {distance} from a recent message"),
                });
            }
        }
        None
    }

    /// Remember this event for future checks. Called only for outcomes that
    /// consume user attention.
    pub async fn store(&self, event: &Event) {
        let ttl = if is_promotional(&event.event_type) {
            PROMO_TTL_SECS
        } else {
            EXACT_TTL_SECS
        };

        if let Some(key) = event.dedupe_key.as_deref()
            && let Err(err) = self.kv.set(&format!("dedup:key:{key}"), "1", ttl).await
        {
            tracing::warn!(error = %err, "failed to store dedup key");
        }

        let fingerprint = fingerprint_of(event);
        if let Err(err) = self.kv.set(&format!("dedup:fp:{fingerprint}"), "1", ttl).await {
            tracing::warn!(error = %err, "failed to store fingerprint");
        }

        if event.message.chars().count() < NEAR_DUP_MIN_CHARS {
            return;
        }
        let sim_key = sim_key(event);
        let now_ms = self.clock.now_ms();
        let member = simhash(&event.message).to_string();
        if let Err(err) = self.kv.zadd(&sim_key, now_ms, &member).await {
            tracing::warn!(error = %err, "failed to store simhash");
            return;
        }
        if let Err(err) = self.kv.expire(&sim_key, self.window_secs as u64).await {
            tracing::warn!(error = %err, "failed to refresh simhash window TTL");
        }
        let cutoff = now_ms - self.window_secs * 1_000;
        if let Err(err) = self.kv.zrem_by_score(&sim_key, 0, cutoff - 1).await {
            tracing::warn!(error = %err, "failed to prune simhash window");
        }
    }
}

pub fn fingerprint_of(event: &Event) -> String {
    build_fingerprint(&event.user_id, &event.event_type, &event.message, &event.source)
}

fn sim_key(event: &Event) -> String {
    format!("sim:{}:{}", event.user_id, event.event_type)
}
