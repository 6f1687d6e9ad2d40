//! Ordered checkpoint chain for retrace replay sessions.
//!
//! A checkpoint is a restorable snapshot of the complete simulation state at
//! an (action, move) pair. The store keeps them in an arena addressed by
//! generational [`CheckpointId`]s and threads them into a doubly-linked
//! chain ordered by action, at most one per action.
//!
//! # Architecture
//!
//! ```text
//! CheckpointStore
//! ├── slots: Vec<Slot>        (arena; freed slots bump their generation)
//! ├── free_list: Vec<u32>     (slot indices available for reuse)
//! ├── head / tail             (chain ends, ordered by action)
//! └── near                    (last touched node, search starting point)
//! ```
//!
//! The store never interprets checkpoint state. Restoring is the engine's
//! job; the store only brackets it with
//! [`begin_restore`](CheckpointStore::begin_restore) and
//! [`end_restore`](CheckpointStore::end_restore) so that a nested restore is
//! caught.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod checkpoint;
pub mod id;
pub mod store;

pub use checkpoint::{Checkpoint, CheckpointState, Origin};
pub use id::CheckpointId;
pub use store::CheckpointStore;
