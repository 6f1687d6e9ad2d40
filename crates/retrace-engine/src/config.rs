//! Replay configuration and validation.
//!
//! [`ReplayConfig`] is plain data with sensible defaults.
//! [`validate()`](ReplayConfig::validate) is called by
//! [`Replayer::new`](crate::Replayer::new) before anything else happens.

use std::time::Duration;

/// Errors detected during [`ReplayConfig::validate()`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Periodic checkpoints need a cadence of at least one action.
    #[error("checkpoint_interval must be at least 1")]
    CheckpointIntervalZero,
}

/// Tuning for checkpoint cadence, seek jumps and input throttling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Actions between periodic checkpoints. Default: 50. Minimum: 1.
    pub checkpoint_interval: u64,
    /// Forward distance (actions) beyond which a seek tries a checkpoint
    /// jump instead of plain stepping. Default: 200.
    pub jump_threshold: u64,
    /// Desync checkpoints retained after a seek concludes. Default: 100.
    pub desync_checkpoint_budget: usize,
    /// Minimum spacing of served advance requests. Default: 20 ms.
    /// `Duration::ZERO` disables throttling.
    pub advance_interval: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 50,
            jump_threshold: 200,
            desync_checkpoint_budget: 100,
            advance_interval: Duration::from_millis(20),
        }
    }
}

impl ReplayConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::CheckpointIntervalZero);
        }
        Ok(())
    }

    /// Whether `action` falls on the periodic checkpoint cadence.
    pub(crate) fn is_checkpoint_action(&self, action: u64) -> bool {
        action >= 1 && (action - 1) % self.checkpoint_interval == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = ReplayConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.checkpoint_interval, 50);
        assert_eq!(cfg.jump_threshold, 200);
        assert_eq!(cfg.desync_checkpoint_budget, 100);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let cfg = ReplayConfig {
            checkpoint_interval: 0,
            ..ReplayConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::CheckpointIntervalZero));
    }

    #[test]
    fn cadence_starts_at_first_action() {
        let cfg = ReplayConfig::default();
        let hits: Vec<u64> = (1..=160).filter(|&a| cfg.is_checkpoint_action(a)).collect();
        assert_eq!(hits, vec![1, 51, 101, 151]);
        assert!(!cfg.is_checkpoint_action(0));
    }
}
