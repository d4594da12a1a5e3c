use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use triage_core::event::Event;
use triage_core::rules::Rule;

use crate::error::EngineError;

/// Subset of `rules` whose conditions all match `event`, enabled rules only,
/// sorted by priority descending. Ties keep file order (the sort is stable).
pub fn match_rules(event: &Event, rules: &[Rule]) -> Vec<Rule> {
    let mut matched: Vec<Rule> = rules
        .iter()
        .filter(|rule| rule.enabled && rule.condition.matches(event))
        .cloned()
        .collect();
    matched.sort_by(|a, b| b.priority.cmp(&a.priority));
    matched
}

/// Process-wide rules snapshot, re-read from the backing file on an
/// interval. Readers always see a complete snapshot, either the old one or
/// the new one. A load failure keeps the last successfully loaded snapshot
/// in effect.
pub struct RulesCache {
    path: Option<PathBuf>,
    reload_secs: u64,
    snapshot: RwLock<Arc<Vec<Rule>>>,
}

impl RulesCache {
    pub fn new(path: Option<PathBuf>, reload_secs: u64) -> Self {
        Self {
            path,
            reload_secs,
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Fixed in-process rules, no backing file. Reloads are no-ops.
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self {
            path: None,
            reload_secs: 0,
            snapshot: RwLock::new(Arc::new(rules)),
        }
    }

    pub async fn snapshot(&self) -> Arc<Vec<Rule>> {
        self.snapshot.read().await.clone()
    }

    /// Re-read the backing file and swap the snapshot. On failure the
    /// current snapshot is left untouched.
    pub async fn load(&self) -> Result<usize, EngineError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(self.snapshot.read().await.len());
        };
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| EngineError::RulesLoad(format!("{}: {err}", path.display())))?;
        let rules: Vec<Rule> = serde_json::from_str(&raw)
            .map_err(|err| EngineError::RulesLoad(format!("{}: {err}", path.display())))?;
        let count = rules.len();
        *self.snapshot.write().await = Arc::new(rules);
        Ok(count)
    }

    /// Background reload loop. The first tick fires immediately, so callers
    /// get an initial load without a separate await.
    pub fn spawn_reloader(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = self;
        let period = std::time::Duration::from_secs(cache.reload_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match cache.load().await {
                    Ok(count) => {
                        tracing::debug!(count, "rules snapshot refreshed");
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "rules reload failed; keeping last snapshot");
                    }
                }
            }
        })
    }
}
