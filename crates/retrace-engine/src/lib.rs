//! Replay controller for retrace.
//!
//! Provides the [`Replayer`], which drives a [`Simulation`] through a
//! recorded action log and seeks to any recorded position, backward or
//! forward, by restoring checkpoints and replaying from there. Input the
//! simulation requests while replaying goes through the
//! [`InterceptionShim`], which answers prompts from the log and hides
//! display output. Replays that stop matching the log are contained by the
//! [`DesyncTracker`] and continued from recorded change data.
//!
//! # Seeking
//!
//! ```text
//!   begin_replay(log) ──► Idle
//!   seek / goto / step ─► Seeking ──poll()──► AtGoal | Exhausted
//!   end_replay()     ───► no session
//! ```
//!
//! All work happens on the caller's thread. [`Replayer::poll`] performs
//! one bounded unit of work so a front end can interleave seeking with its
//! own event loop; [`Replayer::run`] polls to completion.
//!
//! [`Simulation`]: retrace_core::Simulation

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod diff;
pub mod error;
pub mod replayer;
pub mod session;
pub mod shim;
pub mod stats;
pub mod throttle;

pub use config::{ConfigError, ReplayConfig};
pub use diff::{reached_target, DesyncTracker, DiffBitmap, DiffMark};
pub use error::ReplayError;
pub use replayer::{Replayer, SeekStatus};
pub use session::{Direction, ReplaySession, Target};
pub use shim::InterceptionShim;
pub use stats::ReplayStats;
pub use throttle::{Advance, Throttle};
