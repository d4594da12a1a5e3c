use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use triage_core::audit::AuditRecord;
use triage_core::event::{Decision, Event, PriorityHint, Verdict};
use triage_core::rules::RuleAction;
use uuid::Uuid;

use crate::ai::AiClient;
use crate::audit::AuditSink;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::conflict;
use crate::dedup::Deduplicator;
use crate::dispatch::DeferredDispatch;
use crate::dnd::{self, DndGate};
use crate::error::EngineError;
use crate::fatigue::FatigueAccountant;
use crate::kv::KvStore;
use crate::rules::{RulesCache, match_rules};
use crate::score;

const CRITICAL_SCORE: i32 = 97;
const FAILSAFE_SCORE: i32 = 90;
const DND_SCORE: i32 = 35;
const NOW_THRESHOLD: i32 = 60;
const NEVER_THRESHOLD: i32 = 30;
/// Pseudo-rule id surfaced in `rules_matched` for the CRITICAL short-circuit.
const CRITICAL_RULE_ID: &str = "critical-always-now";

/// What the guarded stages produced: either a terminal verdict from a
/// short-circuit or the boundary outcome, plus everything the audit record
/// needs.
struct Staged {
    verdict: Verdict,
    score: i32,
    reason: String,
    schedule_at: Option<DateTime<Utc>>,
    stages: BTreeMap<String, String>,
    rules_matched: Vec<String>,
}

/// The nine-stage evaluation pipeline.
///
/// `evaluate` is safe to call concurrently; all shared state lives behind
/// the KV adapter and the rules snapshot. Within one call the stages run
/// strictly in order and every exit path funnels through `finalize`, so an
/// audit record is written per evaluation even when the caller stops
/// polling partway through.
#[derive(Clone)]
pub struct Engine {
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    dispatch: Arc<dyn DeferredDispatch>,
    rules: Arc<RulesCache>,
    dedup: Deduplicator,
    fatigue: FatigueAccountant,
    dnd: DndGate,
    ai: AiClient,
}

impl Engine {
    pub fn new(
        config: &EngineConfig,
        kv: Arc<dyn KvStore>,
        audit: Arc<dyn AuditSink>,
        dispatch: Arc<dyn DeferredDispatch>,
        rules: Arc<RulesCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dedup: Deduplicator::new(kv.clone(), clock.clone(), config),
            fatigue: FatigueAccountant::new(kv, clock.clone(), config),
            dnd: DndGate::new(config),
            ai: AiClient::new(config),
            clock,
            audit,
            dispatch,
            rules,
        }
    }

    pub async fn evaluate(&self, event: &Event) -> Result<Decision, EngineError> {
        // The evaluation runs detached from the caller's future: once it is
        // underway, dropping `evaluate` (client disconnect, caller-side
        // timeout) must not stop the audit write or the failsafe.
        let engine = self.clone();
        let task_event = event.clone();
        let task = tokio::spawn(async move { engine.evaluate_to_completion(task_event).await });
        match task.await {
            Ok(result) => result,
            Err(join_err) => Err(EngineError::Pipeline(format!(
                "evaluation task died: {join_err}"
            ))),
        }
    }

    async fn evaluate_to_completion(&self, event: Event) -> Result<Decision, EngineError> {
        let audit_id = new_audit_id();
        let now = self.clock.now();

        // Stage 1: expiry guard. Runs outside the failsafe envelope and
        // outranks everything, CRITICAL included.
        if let Some(expires_at) = event.expires_at
            && expires_at < now
        {
            let mut stages = BTreeMap::new();
            stages.insert("expiry".to_string(), format!("EXPIRED ({})", expires_at.to_rfc3339()));
            let staged = Staged {
                verdict: Verdict::Never,
                score: 0,
                reason: format!("Event expired at {}", expires_at.to_rfc3339()),
                schedule_at: None,
                stages,
                rules_matched: Vec::new(),
            };
            return Ok(self.finalize(&event, audit_id, staged).await);
        }

        // Stages 2-9 get their own inner task purely for panic containment:
        // a panicking stage surfaces here as a join error, and the failsafe
        // and audit write below still run in this (already detached) task.
        let engine = self.clone();
        let stage_event = event.clone();
        let outcome = tokio::spawn(async move { engine.run_stages(stage_event).await }).await;
        match outcome {
            Ok(Ok(staged)) => Ok(self.finalize(&event, audit_id, staged).await),
            Ok(Err(err)) => self.handle_fault(&event, audit_id, err).await,
            Err(join_err) => {
                let err = EngineError::Pipeline(format!("stage task died: {join_err}"));
                self.handle_fault(&event, audit_id, err).await
            }
        }
    }

    async fn run_stages(&self, event: Event) -> Result<Staged, EngineError> {
        let now = self.clock.now();
        let mut stages = BTreeMap::new();
        let mut rules_matched: Vec<String> = Vec::new();
        stages.insert("expiry".to_string(), "PASS".to_string());

        // Stage 2: dedup guard. CRITICAL traffic bypasses it: a duplicate
        // CRITICAL still sends.
        if event.priority_hint == PriorityHint::Critical {
            stages.insert("dedup".to_string(), "SKIPPED (critical)".to_string());
        } else if let Some(hit) = self.dedup.check(&event).await {
            let label = format!("Duplicate ({}): {}", hit.kind.as_str(), hit.detail);
            stages.insert("dedup".to_string(), label.clone());
            return Ok(Staged {
                verdict: Verdict::Never,
                score: 0,
                reason: label,
                schedule_at: None,
                stages,
                rules_matched,
            });
        } else {
            stages.insert("dedup".to_string(), "PASS".to_string());
        }

        // Stage 3: CRITICAL short-circuit.
        if event.priority_hint == PriorityHint::Critical {
            self.record_attention(&event).await;
            rules_matched.push(CRITICAL_RULE_ID.to_string());
            return Ok(Staged {
                verdict: Verdict::Now,
                score: CRITICAL_SCORE,
                reason: "CRITICAL priority always sends immediately".to_string(),
                schedule_at: None,
                stages,
                rules_matched,
            });
        }

        // Stage 4: rule matching; only SUPPRESS terminates.
        let snapshot = self.rules.snapshot().await;
        let matched = match_rules(&event, &snapshot);
        rules_matched.extend(matched.iter().map(|rule| rule.rule_id.clone()));
        stages.insert(
            "rules".to_string(),
            if matched.is_empty() {
                "0 matched".to_string()
            } else {
                format!("{} matched: {}", matched.len(), rules_matched.join(","))
            },
        );
        if let Some(suppressing) = matched.iter().find(|rule| rule.action == RuleAction::Suppress) {
            return Ok(Staged {
                verdict: Verdict::Never,
                score: 0,
                reason: format!("Suppressed by rule '{}'", suppressing.rule_id),
                schedule_at: None,
                stages,
                rules_matched,
            });
        }
        // TODO: DEFER, SEND_NOW and CAP matches are only annotated in
        // rules_matched; enforcing SEND_NOW needs a decision on whether it
        // outranks the DND gate.

        // Stage 5: DND gate.
        if let Some(window) = self.dnd.check(now) {
            stages.insert("dnd".to_string(), format!("IN_WINDOW ({window})"));
            let schedule_at = self.dnd.next_allowed(now);
            self.record_attention(&event).await;
            return Ok(Staged {
                verdict: Verdict::Later,
                score: DND_SCORE,
                reason: format!("Deferred past quiet hours {window}"),
                schedule_at: Some(schedule_at),
                stages,
                rules_matched,
            });
        }
        stages.insert("dnd".to_string(), "PASS".to_string());

        // Stage 6: base score.
        let base = score::compute_base(&event, now);
        stages.insert("scorer".to_string(), format!("base={base}"));

        // Stage 7: fatigue accounting.
        let fatigue = self.fatigue.read(&event.user_id, &event.source).await;
        stages.insert("fatigue".to_string(), self.fatigue.describe(&fatigue));

        // Stage 8: AI adjustment; any fault downgrades to zero.
        let ai_adjustment = match self.ai.score_adjustment(&event, now.hour()).await {
            Ok(adjustment) => {
                stages.insert("ai".to_string(), format!("adjustment={adjustment}"));
                adjustment
            }
            Err(err) => {
                tracing::warn!(error = %err, event_id = %event.id, "ai enrichment skipped");
                stages.insert("ai".to_string(), format!("SKIPPED ({err})"));
                0
            }
        };

        let final_score = score::final_score(base, fatigue.penalty, ai_adjustment);

        // Stage 9: urgency-vs-fatigue arbitration.
        if let Some(resolution) =
            conflict::resolve(event.priority_hint, fatigue.level, &event.source, final_score)
        {
            stages.insert(
                "conflict".to_string(),
                format!("RESOLVED ({})", resolution.verdict.as_str()),
            );
            let schedule_at = match resolution.verdict {
                Verdict::Later => {
                    self.record_attention(&event).await;
                    Some(dnd::short_defer(now))
                }
                _ => None,
            };
            return Ok(Staged {
                verdict: resolution.verdict,
                score: final_score,
                reason: resolution.reason,
                schedule_at,
                stages,
                rules_matched,
            });
        }
        stages.insert("conflict".to_string(), "PASS".to_string());

        // Stage 10: score boundary.
        if final_score >= NOW_THRESHOLD {
            self.record_attention(&event).await;
            Ok(Staged {
                verdict: Verdict::Now,
                score: final_score,
                reason: format!("Score {final_score} clears the immediate threshold"),
                schedule_at: None,
                stages,
                rules_matched,
            })
        } else if final_score >= NEVER_THRESHOLD {
            let schedule_at = dnd::optimal_window(&event.event_type, now);
            self.record_attention(&event).await;
            Ok(Staged {
                verdict: Verdict::Later,
                score: final_score,
                reason: format!("Score {final_score} lands in the deferral band"),
                schedule_at: Some(schedule_at),
                stages,
                rules_matched,
            })
        } else {
            Ok(Staged {
                verdict: Verdict::Never,
                score: final_score,
                reason: format!("Score {final_score} falls below the send floor"),
                schedule_at: None,
                stages,
                rules_matched,
            })
        }
    }

    /// Charge the user's budgets and remember the content. Only outcomes
    /// that consume user attention get here; suppressed traffic must stay
    /// invisible to dedup and fatigue.
    async fn record_attention(&self, event: &Event) {
        self.dedup.store(event).await;
        self.fatigue.record(event).await;
    }

    async fn handle_fault(
        &self,
        event: &Event,
        audit_id: String,
        err: EngineError,
    ) -> Result<Decision, EngineError> {
        if event.priority_hint == PriorityHint::Critical {
            tracing::error!(
                error = %err,
                event_id = %event.id,
                "pipeline fault; failsafe NOW for CRITICAL event"
            );
            let mut stages = BTreeMap::new();
            stages.insert("failsafe".to_string(), "true".to_string());
            let staged = Staged {
                verdict: Verdict::Now,
                score: FAILSAFE_SCORE,
                reason: "FAILSAFE: pipeline error - CRITICAL sent NOW".to_string(),
                schedule_at: None,
                stages,
                rules_matched: Vec::new(),
            };
            return Ok(self.finalize(event, audit_id, staged).await);
        }

        // Non-CRITICAL faults surface to the caller, but the audit trail
        // still gets a record of the attempt.
        tracing::error!(error = %err, event_id = %event.id, "pipeline fault; surfacing to caller");
        let mut stages = BTreeMap::new();
        stages.insert("failsafe".to_string(), format!("fault: {err}"));
        let record = AuditRecord {
            audit_id,
            event_id: event.id,
            user_id: event.user_id.clone(),
            event_type: event.event_type.clone(),
            decision: Verdict::Never,
            score: 0,
            reason: format!("PIPELINE_ERROR: {err}"),
            stages,
            rules_matched: Vec::new(),
            schedule_at: None,
            created_at: self.clock.now(),
        };
        self.write_audit(&record).await;
        Err(err)
    }

    /// Single exit: assemble the audit record, hand deferred events to the
    /// dispatch adapter, and build the caller-facing envelope.
    async fn finalize(&self, event: &Event, audit_id: String, mut staged: Staged) -> Decision {
        let decision_note = match staged.schedule_at {
            Some(at) => format!(
                "{} (score {}, at {})",
                staged.verdict.as_str(),
                staged.score,
                at.to_rfc3339()
            ),
            None => format!("{} (score {})", staged.verdict.as_str(), staged.score),
        };
        staged.stages.insert("decision".to_string(), decision_note);

        let record = AuditRecord {
            audit_id: audit_id.clone(),
            event_id: event.id,
            user_id: event.user_id.clone(),
            event_type: event.event_type.clone(),
            decision: staged.verdict,
            score: staged.score,
            reason: staged.reason.clone(),
            stages: staged.stages,
            rules_matched: staged.rules_matched,
            schedule_at: staged.schedule_at,
            created_at: self.clock.now(),
        };
        self.write_audit(&record).await;

        if staged.verdict == Verdict::Later
            && let Some(schedule_at) = staged.schedule_at
            && let Err(err) = self.dispatch.schedule(event, schedule_at, &audit_id).await
        {
            tracing::warn!(error = %err, audit_id, "deferred dispatch hand-off failed");
        }

        Decision {
            decision: staged.verdict,
            score: staged.score,
            reason: staged.reason,
            schedule_at: staged.schedule_at,
            audit_id,
        }
    }

    async fn write_audit(&self, record: &AuditRecord) {
        if let Err(err) = self.audit.write(record).await {
            tracing::warn!(error = %err, audit_id = %record.audit_id, "audit write failed");
        }
    }
}

fn new_audit_id() -> String {
    let hex = Uuid::now_v7().simple().to_string();
    format!("aud_{}", &hex[..8])
}

#[cfg(test)]
mod tests {
    use super::{Engine, new_audit_id};
    use crate::audit::MemoryAuditSink;
    use crate::clock::{Clock, ManualClock};
    use crate::config::EngineConfig;
    use crate::dispatch::MemoryDispatchQueue;
    use crate::error::EngineError;
    use crate::kv::{KvStore, MemoryKv};
    use crate::rules::RulesCache;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use triage_core::event::{Channel, Event, PriorityHint, Verdict};
    use triage_core::rules::{Rule, RuleAction, RuleCondition};
    use uuid::Uuid;

    /// KV double that panics on any access; drives the failsafe envelope.
    struct PanickyKv;

    #[async_trait]
    impl KvStore for PanickyKv {
        async fn get(&self, _key: &str) -> Result<Option<String>, EngineError> {
            panic!("kv exploded");
        }
        async fn set(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<(), EngineError> {
            panic!("kv exploded");
        }
        async fn zadd(&self, _key: &str, _score: i64, _member: &str) -> Result<(), EngineError> {
            panic!("kv exploded");
        }
        async fn zrange_all(&self, _key: &str) -> Result<Vec<String>, EngineError> {
            panic!("kv exploded");
        }
        async fn zcount_by_score(&self, _key: &str, _min: i64, _max: i64) -> Result<i64, EngineError> {
            panic!("kv exploded");
        }
        async fn zrem_by_score(&self, _key: &str, _min: i64, _max: i64) -> Result<(), EngineError> {
            panic!("kv exploded");
        }
        async fn expire(&self, _key: &str, _ttl_secs: u64) -> Result<(), EngineError> {
            panic!("kv exploded");
        }
    }

    struct Harness {
        clock: Arc<ManualClock>,
        kv: Arc<MemoryKv>,
        audit: Arc<MemoryAuditSink>,
        queue: Arc<MemoryDispatchQueue>,
        engine: Engine,
    }

    fn harness() -> Harness {
        harness_with_rules(Vec::new())
    }

    fn harness_with_rules(rules: Vec<Rule>) -> Harness {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
        ));
        let kv = Arc::new(MemoryKv::new(clock.clone()));
        let audit = Arc::new(MemoryAuditSink::new());
        let queue = Arc::new(MemoryDispatchQueue::new());
        let engine = Engine::new(
            &EngineConfig::default(),
            kv.clone(),
            audit.clone(),
            queue.clone(),
            Arc::new(RulesCache::with_rules(rules)),
            clock.clone(),
        );
        Harness {
            clock,
            kv,
            audit,
            queue,
            engine,
        }
    }

    fn event(priority_hint: PriorityHint, event_type: &str, message: &str) -> Event {
        Event {
            id: Uuid::now_v7(),
            user_id: "u1".to_string(),
            event_type: event_type.to_string(),
            message: message.to_string(),
            source: "billing".to_string(),
            priority_hint,
            channel: Channel::Push,
            timestamp: None,
            dedupe_key: None,
            expires_at: None,
            metadata: serde_json::Map::new(),
        }
    }

    async fn exhaust_attention_budget(harness: &Harness) {
        let now_ms = harness.clock.now_ms();
        for i in 0..5i64 {
            let at = now_ms - i * 60_000;
            harness
                .kv
                .zadd("freq:u1:total", at, &format!("{at}:reminder"))
                .await
                .expect("seed counter");
        }
    }

    #[tokio::test]
    async fn critical_security_alert_sends_now_with_score_97() {
        let harness = harness();
        let decision = harness
            .engine
            .evaluate(&event(PriorityHint::Critical, "security_alert", "New sign-in detected"))
            .await
            .expect("evaluation succeeds");

        assert_eq!(decision.decision, Verdict::Now);
        assert_eq!(decision.score, 97);
        assert!(decision.reason.contains("CRITICAL"));
        assert!(decision.schedule_at.is_none());

        let records = harness.audit.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stages["dedup"], "SKIPPED (critical)");
        assert_eq!(records[0].rules_matched, ["critical-always-now"]);
    }

    #[tokio::test]
    async fn expired_event_is_never_even_when_critical() {
        let harness = harness();
        let mut stale = event(PriorityHint::Critical, "security_alert", "Old alert");
        stale.expires_at = Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());

        let decision = harness.engine.evaluate(&stale).await.expect("evaluation succeeds");
        assert_eq!(decision.decision, Verdict::Never);
        assert_eq!(decision.score, 0);
        assert!(decision.reason.to_lowercase().contains("expired"));
        assert!(decision.schedule_at.is_none());

        // Expired traffic never charges the budget.
        let count = harness
            .kv
            .zcount_by_score("freq:u1:total", 0, i64::MAX)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn fresh_direct_message_clears_the_now_threshold() {
        let harness = harness();
        let mut message = event(PriorityHint::High, "direct_message", "Hey, are you around later?");
        message.timestamp = Some(harness.clock.now());

        let decision = harness.engine.evaluate(&message).await.expect("evaluation succeeds");
        assert_eq!(decision.decision, Verdict::Now);
        assert!(decision.score >= 60);
        assert!(decision.schedule_at.is_none());
    }

    #[tokio::test]
    async fn low_value_promo_is_suppressed_or_deferred() {
        let harness = harness();
        let decision = harness
            .engine
            .evaluate(&event(PriorityHint::Low, "low_value_promo", "You may like these deals"))
            .await
            .expect("evaluation succeeds");
        assert!(matches!(decision.decision, Verdict::Never | Verdict::Later));
    }

    #[tokio::test]
    async fn resubmitted_event_is_suppressed_as_an_exact_duplicate() {
        let harness = harness();
        let first = event(PriorityHint::High, "direct_message", "Lunch tomorrow at noon?");
        let decision = harness.engine.evaluate(&first).await.expect("evaluation succeeds");
        assert_ne!(decision.decision, Verdict::Never);

        let mut resend = event(PriorityHint::High, "direct_message", "Lunch tomorrow at noon?");
        resend.id = Uuid::now_v7();
        let decision = harness.engine.evaluate(&resend).await.expect("evaluation succeeds");
        assert_eq!(decision.decision, Verdict::Never);
        assert!(decision.reason.contains("Duplicate"));
        assert!(decision.reason.contains("EXACT_FINGERPRINT"));
    }

    #[tokio::test]
    async fn maxed_budget_suppresses_medium_traffic_via_the_resolver() {
        let harness = harness();
        exhaust_attention_budget(&harness).await;

        let decision = harness
            .engine
            .evaluate(&event(PriorityHint::Medium, "reminder", "Time to stretch"))
            .await
            .expect("evaluation succeeds");
        assert_eq!(decision.decision, Verdict::Never);
        assert!(decision.reason.contains("MEDIUM"));

        let records = harness.audit.records().await;
        assert!(records[0].stages["conflict"].contains("RESOLVED"));
    }

    #[tokio::test]
    async fn maxed_budget_defers_high_traffic_by_fifteen_minutes() {
        let harness = harness();
        exhaust_attention_budget(&harness).await;

        let decision = harness
            .engine
            .evaluate(&event(PriorityHint::High, "payment_alert", "Card charge above your limit"))
            .await
            .expect("evaluation succeeds");
        assert_eq!(decision.decision, Verdict::Later);
        assert_eq!(
            decision.schedule_at,
            Some(harness.clock.now() + Duration::minutes(15))
        );

        let entries = harness.queue.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].audit_id, decision.audit_id);
    }

    #[tokio::test]
    async fn quiet_hours_defer_to_the_next_morning_boundary() {
        let harness = harness();
        harness
            .clock
            .set(Utc.with_ymd_and_hms(2026, 3, 2, 23, 30, 0).unwrap());

        let decision = harness
            .engine
            .evaluate(&event(PriorityHint::Medium, "reminder", "Evening check-in"))
            .await
            .expect("evaluation succeeds");
        assert_eq!(decision.decision, Verdict::Later);
        assert_eq!(decision.score, 35);
        assert_eq!(
            decision.schedule_at,
            Some(Utc.with_ymd_and_hms(2026, 3, 3, 8, 0, 0).unwrap())
        );

        let records = harness.audit.records().await;
        assert!(records[0].stages["dnd"].contains("IN_WINDOW"));
        // Deferred traffic still consumes attention.
        let count = harness
            .kv
            .zcount_by_score("freq:u1:total", 0, i64::MAX)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn suppress_rule_short_circuits_with_the_rule_id() {
        let harness = harness_with_rules(vec![Rule {
            rule_id: "mute-promos".to_string(),
            condition: RuleCondition {
                event_type: Some("promotion".to_string()),
                ..RuleCondition::default()
            },
            action: RuleAction::Suppress,
            max_per: None,
            priority: 5,
            enabled: true,
        }]);

        let decision = harness
            .engine
            .evaluate(&event(PriorityHint::Medium, "promotion", "Weekend flash sale"))
            .await
            .expect("evaluation succeeds");
        assert_eq!(decision.decision, Verdict::Never);
        assert!(decision.reason.contains("mute-promos"));

        let records = harness.audit.records().await;
        assert_eq!(records[0].rules_matched, ["mute-promos"]);
    }

    #[tokio::test]
    async fn suppressed_outcomes_do_not_charge_the_budget() {
        let harness = harness_with_rules(vec![Rule {
            rule_id: "mute-promos".to_string(),
            condition: RuleCondition {
                event_type: Some("promotion".to_string()),
                ..RuleCondition::default()
            },
            action: RuleAction::Suppress,
            max_per: None,
            priority: 5,
            enabled: true,
        }]);

        let promo = event(PriorityHint::Medium, "promotion", "Weekend flash sale starts now");
        harness.engine.evaluate(&promo).await.expect("evaluation succeeds");

        let count = harness
            .kv
            .zcount_by_score("freq:u1:total", 0, i64::MAX)
            .await
            .unwrap();
        assert_eq!(count, 0, "suppressed traffic must not consume attention");

        // Not remembered by dedup either: the same content evaluated again
        // is still judged by the rules, not the dedup guard.
        let resend = event(PriorityHint::Medium, "promotion", "Weekend flash sale starts now");
        let decision = harness.engine.evaluate(&resend).await.expect("evaluation succeeds");
        assert!(decision.reason.contains("mute-promos"));
    }

    #[tokio::test]
    async fn mid_band_scores_defer_into_the_optimal_window() {
        let harness = harness();
        let mut reminder = event(PriorityHint::Medium, "reminder", "Renew your passport soon");
        reminder.channel = Channel::Email;
        reminder.timestamp = Some(harness.clock.now() - Duration::hours(2));

        // base 15 + 20 + 5 + 0 = 40; mock ai for reminders stays positive,
        // so the score lands in [30, 60).
        let decision = harness.engine.evaluate(&reminder).await.expect("evaluation succeeds");
        assert_eq!(decision.decision, Verdict::Later);
        let schedule_at = decision.schedule_at.expect("deferred decisions carry a schedule");
        let delay = schedule_at - harness.clock.now();
        assert!(delay >= Duration::minutes(15) && delay <= Duration::minutes(45));
    }

    #[tokio::test]
    async fn rock_bottom_scores_are_never_sent() {
        let harness = harness();
        let mut digest = event(PriorityHint::Low, "digest", "Your weekly activity digest");
        digest.channel = Channel::InApp;
        digest.timestamp = Some(harness.clock.now() - Duration::hours(3));

        // base 5 + 3 + 3 + 0 = 11; even the kindest adjustment stays below 30.
        let decision = harness.engine.evaluate(&digest).await.expect("evaluation succeeds");
        assert_eq!(decision.decision, Verdict::Never);
        assert!(decision.schedule_at.is_none());
    }

    #[tokio::test]
    async fn failsafe_turns_a_panicking_pipeline_into_now_for_critical() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
        ));
        let audit = Arc::new(MemoryAuditSink::new());
        let engine = Engine::new(
            &EngineConfig::default(),
            Arc::new(PanickyKv),
            audit.clone(),
            Arc::new(MemoryDispatchQueue::new()),
            Arc::new(RulesCache::with_rules(Vec::new())),
            clock,
        );

        let decision = engine
            .evaluate(&event(PriorityHint::Critical, "security_alert", "New sign-in detected"))
            .await
            .expect("failsafe must produce a decision");
        assert_eq!(decision.decision, Verdict::Now);
        assert_eq!(decision.score, 90);
        assert!(decision.reason.contains("FAILSAFE"));
        assert!(decision.schedule_at.is_none());

        let records = audit.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stages["failsafe"], "true");
    }

    #[tokio::test]
    async fn non_critical_pipeline_faults_surface_but_still_audit() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
        ));
        let audit = Arc::new(MemoryAuditSink::new());
        let engine = Engine::new(
            &EngineConfig::default(),
            Arc::new(PanickyKv),
            audit.clone(),
            Arc::new(MemoryDispatchQueue::new()),
            Arc::new(RulesCache::with_rules(Vec::new())),
            clock,
        );

        let result = engine
            .evaluate(&event(PriorityHint::High, "direct_message", "Hello there friend"))
            .await;
        assert!(result.is_err());

        let records = audit.records().await;
        assert_eq!(records.len(), 1);
        assert!(records[0].reason.contains("PIPELINE_ERROR"));
    }

    #[tokio::test]
    async fn audit_ids_use_the_aud_prefix_with_eight_hex_chars() {
        for _ in 0..20 {
            let audit_id = new_audit_id();
            let suffix = audit_id.strip_prefix("aud_").expect("aud_ prefix");
            assert_eq!(suffix.len(), 8);
            assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[tokio::test]
    async fn dropping_the_caller_future_still_writes_the_audit_record() {
        let harness = harness();
        let message = event(PriorityHint::Critical, "security_alert", "New sign-in detected");

        // Poll once, then drop, the way a disconnecting HTTP client would.
        let abandoned =
            tokio::time::timeout(std::time::Duration::from_millis(0), harness.engine.evaluate(&message))
                .await;
        assert!(abandoned.is_err(), "first poll cannot complete the evaluation");

        // The detached evaluation still runs to completion.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let records = harness.audit.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].decision, Verdict::Now);
        assert_eq!(records[0].score, 97);
    }

    #[tokio::test]
    async fn every_evaluation_writes_exactly_one_audit_record() {
        let harness = harness();
        harness
            .engine
            .evaluate(&event(PriorityHint::High, "direct_message", "One"))
            .await
            .unwrap();
        harness
            .engine
            .evaluate(&event(PriorityHint::Low, "digest", "Two"))
            .await
            .unwrap();

        let records = harness.audit.records().await;
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].audit_id, records[1].audit_id);
        for record in records {
            assert!(record.stages.contains_key("decision"));
        }
    }
}
