use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use triage_core::event::Event;

use crate::error::EngineError;

/// Hand-off point for deferred events. The engine only produces the
/// schedule; transport and durability belong to the adapter behind this
/// trait. A failing hand-off is logged, and LATER is returned regardless.
#[async_trait]
pub trait DeferredDispatch: Send + Sync {
    async fn schedule(
        &self,
        event: &Event,
        schedule_at: DateTime<Utc>,
        audit_id: &str,
    ) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
pub struct DeferredEntry {
    pub event: Event,
    pub schedule_at: DateTime<Utc>,
    pub audit_id: String,
}

/// In-memory deferred queue for embedding and tests.
#[derive(Default)]
pub struct MemoryDispatchQueue {
    entries: RwLock<Vec<DeferredEntry>>,
}

impl MemoryDispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<DeferredEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl DeferredDispatch for MemoryDispatchQueue {
    async fn schedule(
        &self,
        event: &Event,
        schedule_at: DateTime<Utc>,
        audit_id: &str,
    ) -> Result<(), EngineError> {
        self.entries.write().await.push(DeferredEntry {
            event: event.clone(),
            schedule_at,
            audit_id: audit_id.to_string(),
        });
        Ok(())
    }
}
