//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::{BackoffParams, BackoffPolicy};

/// Configuration for the production orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Enable/disable the orchestrator.
    /// When disabled, submitted jobs sit in Pending until it is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// How often the admission loop looks for a pending job (milliseconds).
    /// Admission is single-flight: one job initiates at a time.
    #[serde(default = "default_admission_interval")]
    pub admission_poll_interval_ms: u64,

    /// Fixed interval between polls of a running operation (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Hard ceiling on total poll calls per operation, independent of
    /// backoff retries. Exceeding it fails the job with a timeout error.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Base delay for transient-failure retries (milliseconds).
    #[serde(default = "default_transient_base_delay")]
    pub transient_base_delay_ms: u64,

    /// Geometric multiplier for transient retries.
    #[serde(default = "default_multiplier")]
    pub transient_multiplier: u32,

    /// Retry delays granted for transient failures before giving up.
    #[serde(default = "default_transient_max_attempts")]
    pub transient_max_attempts: u32,

    /// Base delay for quota-limited retries (milliseconds). Deliberately
    /// longer than the transient base.
    #[serde(default = "default_quota_base_delay")]
    pub quota_base_delay_ms: u64,

    /// Geometric multiplier for quota retries.
    #[serde(default = "default_multiplier")]
    pub quota_multiplier: u32,

    /// Retry delays granted for quota failures before giving up.
    #[serde(default = "default_quota_max_attempts")]
    pub quota_max_attempts: u32,

    /// Maximum scenes planned per job.
    #[serde(default = "default_max_scenes")]
    pub max_scenes: usize,
}

fn default_admission_interval() -> u64 {
    2000 // 2 seconds
}

fn default_poll_interval() -> u64 {
    8000 // 8 seconds
}

fn default_max_poll_attempts() -> u32 {
    120 // 16 minutes at the default interval
}

fn default_transient_base_delay() -> u64 {
    2000
}

fn default_multiplier() -> u32 {
    2
}

fn default_transient_max_attempts() -> u32 {
    5
}

fn default_quota_base_delay() -> u64 {
    30_000
}

fn default_quota_max_attempts() -> u32 {
    3
}

fn default_max_scenes() -> usize {
    6
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn admission_poll_interval(&self) -> Duration {
        Duration::from_millis(self.admission_poll_interval_ms)
    }

    /// Build the backoff policy from the configured curves.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            BackoffParams::new(
                Duration::from_millis(self.transient_base_delay_ms),
                self.transient_multiplier,
                self.transient_max_attempts,
            ),
            BackoffParams::new(
                Duration::from_millis(self.quota_base_delay_ms),
                self.quota_multiplier,
                self.quota_max_attempts,
            ),
        )
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            admission_poll_interval_ms: default_admission_interval(),
            poll_interval_ms: default_poll_interval(),
            max_poll_attempts: default_max_poll_attempts(),
            transient_base_delay_ms: default_transient_base_delay(),
            transient_multiplier: default_multiplier(),
            transient_max_attempts: default_transient_max_attempts(),
            quota_base_delay_ms: default_quota_base_delay(),
            quota_multiplier: default_multiplier(),
            quota_max_attempts: default_quota_max_attempts(),
            max_scenes: default_max_scenes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.admission_poll_interval_ms, 2000);
        assert_eq!(config.poll_interval_ms, 8000);
        assert_eq!(config.max_poll_attempts, 120);
        assert_eq!(config.quota_max_attempts, 3);
    }

    #[test]
    fn test_deserialize_minimal() {
        let toml = r#"
            enabled = true
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert!(config.enabled);
        assert_eq!(config.poll_interval_ms, 8000);
        assert_eq!(config.transient_max_attempts, 5);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            enabled = true
            admission_poll_interval_ms = 500
            poll_interval_ms = 5000
            max_poll_attempts = 60
            transient_base_delay_ms = 1000
            transient_multiplier = 3
            transient_max_attempts = 4
            quota_base_delay_ms = 60000
            quota_multiplier = 2
            quota_max_attempts = 2
            max_scenes = 4
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.admission_poll_interval_ms, 500);
        assert_eq!(config.max_poll_attempts, 60);
        assert_eq!(config.quota_base_delay_ms, 60000);
        assert_eq!(config.max_scenes, 4);
    }

    #[test]
    fn test_backoff_policy_uses_both_curves() {
        let config = OrchestratorConfig::default();
        let policy = config.backoff_policy();
        assert_eq!(policy.transient.base_delay, Duration::from_secs(2));
        assert_eq!(policy.quota.base_delay, Duration::from_secs(30));
        assert!(policy.quota.max_attempts < policy.transient.max_attempts);
    }
}
