//! Error types raised by the engine's external collaborators.
//!
//! [`SimulationError`] comes back from [`Simulation`](crate::Simulation)
//! calls; [`InputError`] from [`InputProvider`](crate::InputProvider)
//! prompts. The replay engine classifies both when they surface mid-replay.

use crate::command::QueryKind;

/// Errors from the simulation while executing a command or loading state.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    /// The command name is not understood by this build.
    #[error("unknown command '{name}'")]
    UnknownCommand {
        /// The unrecognized command name.
        name: String,
    },
    /// A command argument is missing or out of range.
    #[error("invalid argument for '{command}': {reason}")]
    InvalidArgument {
        /// The command that rejected its arguments.
        command: String,
        /// Description of what was wrong.
        reason: String,
    },
    /// A state image could not be decoded.
    #[error("corrupt state image: {reason}")]
    CorruptState {
        /// Description of the decode failure.
        reason: String,
    },
    /// A prompt raised during the command failed.
    #[error("input failed: {0}")]
    Input(#[from] InputError),
}

/// Errors from an input request.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    /// The request has no recorded answer and no meaning during replay.
    #[error("'{call}' is not valid during replay")]
    InvalidDuringReplay {
        /// Name of the offending input call.
        call: String,
    },
    /// A recorded answer exists but does not fit the prompt.
    #[error("recorded {recorded:?} answer does not fit a {requested:?} prompt")]
    AnswerMismatch {
        /// Kind of the next recorded answer.
        recorded: QueryKind,
        /// Kind the simulation asked for.
        requested: QueryKind,
    },
    /// The player dismissed the prompt.
    #[error("prompt cancelled")]
    Cancelled,
}
