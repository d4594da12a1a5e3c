use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::error::EngineError;

/// The narrow key-value surface the pipeline consumes: plain string keys
/// with TTLs plus score-ordered sets for the sliding windows.
///
/// All failures surface as [`EngineError::Kv`]; each caller decides between
/// fail-open (reads) and log-and-swallow (writes).
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, EngineError>;

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), EngineError>;

    /// Insert `member` with a millisecond `score` into the ordered set at `key`.
    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), EngineError>;

    /// All members of the ordered set at `key`, ascending by score.
    async fn zrange_all(&self, key: &str) -> Result<Vec<String>, EngineError>;

    /// Count members whose score lies in `[min, max]`.
    async fn zcount_by_score(&self, key: &str, min: i64, max: i64) -> Result<i64, EngineError>;

    /// Remove members whose score lies in `[min, max]`.
    async fn zrem_by_score(&self, key: &str, min: i64, max: i64) -> Result<(), EngineError>;

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), EngineError>;
}

enum Value {
    Plain(String),
    /// `(score, member)` pairs kept sorted by score
    Sorted(Vec<(i64, String)>),
}

struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// In-memory [`KvStore`] for embedding and tests. Expiry is lazy: entries
/// past their deadline are dropped on the next access.
pub struct MemoryKv {
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn deadline(&self, ttl_secs: u64) -> Option<DateTime<Utc>> {
        Some(self.clock.now() + Duration::seconds(ttl_secs as i64))
    }

    fn is_live(&self, entry: &Entry) -> bool {
        match entry.expires_at {
            Some(deadline) => self.clock.now() < deadline,
            None => true,
        }
    }

    fn purge_expired(&self, entries: &mut HashMap<String, Entry>, key: &str) {
        if entries.get(key).is_some_and(|entry| !self.is_live(entry)) {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, EngineError> {
        let mut entries = self.entries.write().await;
        self.purge_expired(&mut entries, key);
        Ok(entries.get(key).and_then(|entry| match &entry.value {
            Value::Plain(value) => Some(value.clone()),
            Value::Sorted(_) => None,
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), EngineError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Plain(value.to_string()),
                expires_at: self.deadline(ttl_secs),
            },
        );
        Ok(())
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), EngineError> {
        let mut entries = self.entries.write().await;
        self.purge_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Sorted(Vec::new()),
            expires_at: None,
        });
        if let Value::Sorted(members) = &mut entry.value {
            members.retain(|(_, existing)| existing != member);
            let at = members.partition_point(|(existing, _)| *existing <= score);
            members.insert(at, (score, member.to_string()));
            Ok(())
        } else {
            Err(EngineError::Kv(format!(
                "key {key} holds a plain value, not an ordered set"
            )))
        }
    }

    async fn zrange_all(&self, key: &str) -> Result<Vec<String>, EngineError> {
        let mut entries = self.entries.write().await;
        self.purge_expired(&mut entries, key);
        match entries.get(key) {
            Some(Entry {
                value: Value::Sorted(members),
                ..
            }) => Ok(members.iter().map(|(_, member)| member.clone()).collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn zcount_by_score(&self, key: &str, min: i64, max: i64) -> Result<i64, EngineError> {
        let mut entries = self.entries.write().await;
        self.purge_expired(&mut entries, key);
        match entries.get(key) {
            Some(Entry {
                value: Value::Sorted(members),
                ..
            }) => Ok(members
                .iter()
                .filter(|(score, _)| (min..=max).contains(score))
                .count() as i64),
            _ => Ok(0),
        }
    }

    async fn zrem_by_score(&self, key: &str, min: i64, max: i64) -> Result<(), EngineError> {
        let mut entries = self.entries.write().await;
        if let Some(Entry {
            value: Value::Sorted(members),
            ..
        }) = entries.get_mut(key)
        {
            members.retain(|(score, _)| !(min..=max).contains(score));
        }
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), EngineError> {
        let deadline = self.deadline(ttl_secs);
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = deadline;
        }
        Ok(())
    }
}
