//! Stable checkpoint identifiers.

use std::fmt;

/// Handle to a checkpoint in a [`CheckpointStore`](crate::CheckpointStore).
///
/// Ids stay valid while the checkpoint is linked. Once it is removed the
/// slot's generation moves on, so a stale id resolves to nothing instead of
/// to whatever checkpoint reused the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CheckpointId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl CheckpointId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the arena.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cp#{}g{}", self.index, self.generation)
    }
}
