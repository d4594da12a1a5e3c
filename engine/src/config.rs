use std::path::PathBuf;

/// Engine tunables. Defaults match production; every field can be overridden
/// through `TRIAGE_*` environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Attention budget per user across all sources (1-hour sliding window)
    pub cap_total_per_hour: i64,
    /// Attention budget per user per source (1-hour sliding window)
    pub cap_per_source_per_hour: i64,
    /// Promotional budget per user (4-hour sliding window)
    pub cap_promo_per_4h: i64,
    /// Quiet-hours start, wall-clock hour
    pub dnd_start_hour: u32,
    /// Quiet-hours end, wall-clock hour; deferrals land on this boundary
    pub dnd_end_hour: u32,
    /// Relevance model endpoint; the deterministic mock is used when absent
    pub ai_endpoint: Option<String>,
    /// Hard deadline for the relevance call
    pub ai_timeout_ms: u64,
    /// Rules file consumed by the hot-reload cache; no file means no rules
    pub rules_path: Option<PathBuf>,
    pub rules_reload_secs: u64,
    /// Near-duplicate lookback window
    pub near_dup_window_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cap_total_per_hour: 5,
            cap_per_source_per_hour: 2,
            cap_promo_per_4h: 1,
            dnd_start_hour: 23,
            dnd_end_hour: 8,
            ai_endpoint: None,
            ai_timeout_ms: 200,
            rules_path: None,
            rules_reload_secs: 30,
            near_dup_window_secs: 600,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cap_total_per_hour: env_parsed("TRIAGE_CAP_TOTAL_PER_HOUR", defaults.cap_total_per_hour),
            cap_per_source_per_hour: env_parsed(
                "TRIAGE_CAP_PER_SOURCE_PER_HOUR",
                defaults.cap_per_source_per_hour,
            ),
            cap_promo_per_4h: env_parsed("TRIAGE_CAP_PROMO_PER_4H", defaults.cap_promo_per_4h),
            dnd_start_hour: env_parsed("TRIAGE_DND_START_HOUR", defaults.dnd_start_hour),
            dnd_end_hour: env_parsed("TRIAGE_DND_END_HOUR", defaults.dnd_end_hour),
            ai_endpoint: std::env::var("TRIAGE_AI_ENDPOINT")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            ai_timeout_ms: env_parsed("TRIAGE_AI_TIMEOUT_MS", defaults.ai_timeout_ms),
            rules_path: std::env::var("TRIAGE_RULES_PATH")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
            rules_reload_secs: env_parsed("TRIAGE_RULES_RELOAD_SECS", defaults.rules_reload_secs),
            near_dup_window_secs: env_parsed(
                "TRIAGE_NEAR_DUP_WINDOW_SECS",
                defaults.near_dup_window_secs,
            ),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
