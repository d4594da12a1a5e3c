use thiserror::Error;

/// Faults crossing the engine's adapter seams.
///
/// Dispositions differ per component: KV read faults are treated as absence
/// by the callers, KV write faults are logged and swallowed, AI faults fall
/// back to a zero adjustment, and anything escaping a pipeline stage is
/// caught by the failsafe envelope.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("kv store operation failed: {0}")]
    Kv(String),

    #[error("ai enrichment timed out after {0} ms")]
    AiTimeout(u64),

    #[error("ai enrichment request failed: {0}")]
    AiHttp(String),

    #[error("rules snapshot load failed: {0}")]
    RulesLoad(String),

    #[error("audit sink write failed: {0}")]
    Audit(String),

    #[error("deferred dispatch failed: {0}")]
    Dispatch(String),

    #[error("pipeline failure: {0}")]
    Pipeline(String),
}
