//! Test utilities and mock types for retrace development.
//!
//! Provides a deterministic [`MockSimulation`] (a small seeded dungeon
//! walk), a [`ScriptedInput`] provider that records every call it sees,
//! and log fixtures ([`LogBuilder`], [`record_log`]) that record a mock
//! session the way a live recorder would.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod input;
pub mod sim;

pub use fixtures::{record_log, LogBuilder};
pub use input::{InputCall, ScriptedInput};
pub use sim::MockSimulation;
