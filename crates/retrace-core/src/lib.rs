//! Core types and traits for the retrace replay engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the log, checkpoint and engine crates:
//! position newtypes, recorded commands and prompt answers, the error
//! types raised by external collaborators, and the two collaborator
//! traits ([`Simulation`] and [`InputProvider`]).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod command;
pub mod error;
pub mod id;
pub mod traits;

pub use command::{Answer, Argument, Arguments, Command, Compass, Query, QueryKind};
pub use error::{InputError, SimulationError};
pub use id::{ActionIndex, MoveIndex, Position, SessionId};
pub use traits::{InputProvider, Simulation};
