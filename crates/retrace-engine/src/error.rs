//! Errors surfaced by the replay engine.
//!
//! Checksum mismatches are absent on purpose: they are handled inside the
//! desync tracker and never reach the caller.

use retrace_core::{ActionIndex, SimulationError};
use retrace_log::LogError;

use crate::config::ConfigError;

/// Errors returned by [`Replayer`](crate::Replayer) operations.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// The simulation asked for input that has no recorded answer and no
    /// meaning during replay. The session is aborted.
    #[error("'{call}' has no recorded answer and is not valid during replay")]
    InvalidDuringReplay {
        /// Name of the offending input call.
        call: String,
    },
    /// A checkpoint could not be reconstructed and no earlier one was left
    /// to fall back on.
    #[error("checkpoint at action {action} could not be restored")]
    CheckpointRestore {
        /// Nominal action of the failed checkpoint.
        action: ActionIndex,
        /// What the simulation reported.
        #[source]
        source: SimulationError,
    },
    /// The action log is unreadable.
    #[error("action log: {0}")]
    Log(#[from] LogError),
    /// The simulation failed while replaying a command. The session is
    /// aborted.
    #[error("simulation failed at action {action}: {source}")]
    Simulation {
        /// Action whose command failed.
        action: ActionIndex,
        /// What the simulation reported.
        #[source]
        source: SimulationError,
    },
    /// `begin_replay` was called while a session is running.
    #[error("a replay session is already active")]
    SessionActive,
    /// The operation needs an active session.
    #[error("no replay session is active")]
    NoSession,
    /// The configuration failed validation.
    #[error("invalid replay config: {0}")]
    Config(#[from] ConfigError),
}

impl ReplayError {
    /// Whether the error ended the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidDuringReplay { .. } | Self::Simulation { .. } | Self::CheckpointRestore { .. }
        )
    }
}
