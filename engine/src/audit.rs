use async_trait::async_trait;
use tokio::sync::RwLock;
use triage_core::audit::AuditRecord;

use crate::error::EngineError;

/// Destination for audit records. Exactly one record is offered per
/// evaluation; a failing sink must never fail the evaluation, so the
/// orchestrator logs and continues when `write` errors.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, record: &AuditRecord) -> Result<(), EngineError>;
}

/// In-memory audit sink for embedding and tests.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, record: &AuditRecord) -> Result<(), EngineError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}
