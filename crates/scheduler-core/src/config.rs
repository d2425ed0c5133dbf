use serde::Deserialize;

/// The environment configuration enumerated for the core engine. The worker
/// binary layers this over `figment` (TOML file + env var prefix); the core
/// itself only needs the resolved values, so `EngineConfig` stays a plain,
/// independently-constructible struct with sane defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "EngineConfig::default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    #[serde(default = "EngineConfig::default_claim_batch_limit")]
    pub claim_batch_limit: i64,

    #[serde(default = "EngineConfig::default_recovery_batch_limit")]
    pub recovery_batch_limit: i64,

    #[serde(default = "EngineConfig::default_webhook_timeout_millis")]
    pub webhook_timeout_millis: u64,

    #[serde(default = "EngineConfig::default_webhook_retry_backoff_millis_sequence")]
    pub webhook_retry_backoff_millis_sequence: Vec<u64>,

    #[serde(default = "EngineConfig::default_queue_visibility_timeout_seconds")]
    pub queue_visibility_timeout_seconds: u64,

    #[serde(default = "EngineConfig::default_queue_max_receive_count")]
    pub queue_max_receive_count: u32,

    /// Optional `HH:MM:SS` override of the daily delivery time; testing only.
    #[serde(default)]
    pub delivery_time_override: Option<String>,

    #[serde(default = "EngineConfig::default_late_execution_grace_millis")]
    pub late_execution_grace_millis: i64,

    #[serde(default = "EngineConfig::default_processing_reclaim_threshold_seconds")]
    pub processing_reclaim_threshold_seconds: i64,

    #[serde(default = "EngineConfig::default_executor_concurrency")]
    pub executor_concurrency: usize,
}

impl EngineConfig {
    fn default_poll_interval_seconds() -> u64 {
        60
    }
    fn default_claim_batch_limit() -> i64 {
        100
    }
    fn default_recovery_batch_limit() -> i64 {
        1000
    }
    fn default_webhook_timeout_millis() -> u64 {
        10_000
    }
    fn default_webhook_retry_backoff_millis_sequence() -> Vec<u64> {
        vec![1000, 2000, 4000]
    }
    fn default_queue_visibility_timeout_seconds() -> u64 {
        30
    }
    fn default_queue_max_receive_count() -> u32 {
        3
    }
    fn default_late_execution_grace_millis() -> i64 {
        300_000
    }
    fn default_processing_reclaim_threshold_seconds() -> i64 {
        300
    }
    fn default_executor_concurrency() -> usize {
        10
    }

    /// The daily local delivery time, honoring `delivery_time_override` when set.
    pub fn delivery_time(&self) -> Result<chrono::NaiveTime, crate::error::CoreError> {
        match &self.delivery_time_override {
            Some(raw) => chrono::NaiveTime::parse_from_str(raw, "%H:%M:%S").map_err(|_| {
                crate::error::CoreError::Configuration(format!(
                    "deliveryTimeOverride '{raw}' is not HH:MM:SS"
                ))
            }),
            None => Ok(chrono::NaiveTime::from_hms_opt(9, 0, 0).expect("valid constant time")),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: Self::default_poll_interval_seconds(),
            claim_batch_limit: Self::default_claim_batch_limit(),
            recovery_batch_limit: Self::default_recovery_batch_limit(),
            webhook_timeout_millis: Self::default_webhook_timeout_millis(),
            webhook_retry_backoff_millis_sequence: Self::default_webhook_retry_backoff_millis_sequence(),
            queue_visibility_timeout_seconds: Self::default_queue_visibility_timeout_seconds(),
            queue_max_receive_count: Self::default_queue_max_receive_count(),
            delivery_time_override: None,
            late_execution_grace_millis: Self::default_late_execution_grace_millis(),
            processing_reclaim_threshold_seconds: Self::default_processing_reclaim_threshold_seconds(),
            executor_concurrency: Self::default_executor_concurrency(),
        }
    }
}
