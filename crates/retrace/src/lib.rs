//! Retrace: deterministic replay and checkpoint seeking for recorded
//! simulation sessions.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all retrace sub-crates. Adding `retrace` as a single dependency is
//! enough for most embedders.
//!
//! # Quick start
//!
//! ```rust
//! use retrace::prelude::*;
//! use retrace_test_utils::{LogBuilder, ScriptedInput};
//!
//! // A recorded 200-action session and a simulation at its start.
//! let recording = LogBuilder::new("ada", 42).actions(200);
//! let log = recording.build();
//!
//! let mut replayer = Replayer::new(
//!     recording.initial_simulation(),
//!     ScriptedInput::new(),
//!     ReplayConfig::default(),
//! )
//! .unwrap();
//! let max = replayer.begin_replay(&log).unwrap();
//! assert_eq!(max, ActionIndex(201));
//!
//! // Forward, then back: the second seek restores a checkpoint.
//! assert_eq!(replayer.goto(150, false).unwrap(), SeekStatus::AtGoal);
//! assert_eq!(replayer.goto(20, false).unwrap(), SeekStatus::AtGoal);
//! assert_eq!(replayer.current_position().unwrap().action, ActionIndex(20));
//! assert_eq!(
//!     replayer.simulation().state_hash(),
//!     recording.state_at(20).state_hash()
//! );
//!
//! replayer.end_replay().unwrap();
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `retrace-core` | Indices, commands, prompt answers, collaborator traits |
//! | [`log`] | `retrace-log` | Action log format, writer, indexed reader |
//! | [`checkpoint`] | `retrace-checkpoint` | Checkpoint chain and its arena store |
//! | [`engine`] | `retrace-engine` | Seek controller, interception shim, desync tracking |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and collaborator traits (`retrace-core`).
///
/// The embedding program implements [`types::Simulation`] for its game
/// state and [`types::InputProvider`] for its user-facing surface.
pub use retrace_core as types;

/// Append-only action log (`retrace-log`).
///
/// Record sessions with [`log::LogWriter`], open them for replay with
/// [`log::LogReader`].
pub use retrace_log as log;

/// Ordered checkpoint chain (`retrace-checkpoint`).
pub use retrace_checkpoint as checkpoint;

/// Replay controller (`retrace-engine`).
///
/// [`engine::Replayer`] owns the simulation for the length of a replay
/// session and seeks it to any recorded position.
pub use retrace_engine as engine;

/// Common imports for typical retrace usage.
///
/// ```rust
/// use retrace::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use retrace_core::{
        ActionIndex, Answer, Command, InputProvider, MoveIndex, Position, Query, SessionId,
        Simulation,
    };

    // Errors
    pub use retrace_core::{InputError, SimulationError};
    pub use retrace_engine::ReplayError;
    pub use retrace_log::LogError;

    // Log
    pub use retrace_log::{LogReader, LogRecord, LogWriter, SessionHeader};

    // Engine
    pub use retrace_engine::{
        Advance, Direction, ReplayConfig, ReplayStats, Replayer, SeekStatus, Target,
    };
}
