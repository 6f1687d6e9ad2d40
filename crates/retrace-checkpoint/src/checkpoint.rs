//! Checkpoint records.

use retrace_core::{ActionIndex, MoveIndex};

use crate::id::CheckpointId;

/// Why a checkpoint exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Created on the regular cadence during forward replay.
    Periodic,
    /// Created where desync recovery regained a consistent state.
    Desync,
}

/// How the frozen state is held.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckpointState {
    /// Full in-memory snapshot from `Simulation::save_state`.
    Blob(Vec<u8>),
    /// Record index of a state-change image in the open log.
    LogOffset(usize),
}

impl CheckpointState {
    /// Whether restoring goes through the in-memory fast path.
    pub fn is_blob(&self) -> bool {
        matches!(self, Self::Blob(_))
    }
}

/// A restorable snapshot and its place in the chain.
///
/// `action`/`moves` are the nominal position. `from_action`/`from_move` are
/// where forward replay actually resumes after a restore; they equal the
/// nominal position for periodic checkpoints and lie strictly later for
/// desync checkpoints.
///
/// # Examples
///
/// ```
/// use retrace_checkpoint::{Checkpoint, CheckpointState, Origin};
/// use retrace_core::{ActionIndex, MoveIndex};
///
/// let cp = Checkpoint::new(ActionIndex(51), MoveIndex(70), CheckpointState::Blob(vec![1]), 150);
/// assert_eq!(cp.origin, Origin::Periodic);
/// assert_eq!(cp.from_action, ActionIndex(51));
///
/// let recovered = Checkpoint::new(ActionIndex(200), MoveIndex(260), CheckpointState::LogOffset(640), 645)
///     .resumed_from(ActionIndex(203), MoveIndex(266));
/// assert_eq!(recovered.origin, Origin::Desync);
/// assert!(recovered.covers(ActionIndex(201)));
/// ```
#[derive(Clone, Debug)]
pub struct Checkpoint {
    /// Nominal action index.
    pub action: ActionIndex,
    /// Move index at the nominal action.
    pub moves: MoveIndex,
    /// Action forward replay resumes from.
    pub from_action: ActionIndex,
    /// Move index at `from_action`.
    pub from_move: MoveIndex,
    /// Periodic or desync.
    pub origin: Origin,
    /// The frozen state.
    pub state: CheckpointState,
    /// Log record index the reader cursor resumes at after a restore.
    pub resume_record: usize,
    pub(crate) prev: Option<CheckpointId>,
    pub(crate) next: Option<CheckpointId>,
}

impl Checkpoint {
    /// A periodic checkpoint whose resume point is its nominal position.
    pub fn new(
        action: ActionIndex,
        moves: MoveIndex,
        state: CheckpointState,
        resume_record: usize,
    ) -> Self {
        Self {
            action,
            moves,
            from_action: action,
            from_move: moves,
            origin: Origin::Periodic,
            state,
            resume_record,
            prev: None,
            next: None,
        }
    }

    /// Mark as a desync checkpoint resuming from a later position.
    pub fn resumed_from(mut self, from_action: ActionIndex, from_move: MoveIndex) -> Self {
        self.from_action = from_action;
        self.from_move = from_move;
        self.origin = Origin::Desync;
        self
    }

    /// Whether this is a desync checkpoint.
    pub fn is_desync(&self) -> bool {
        self.origin == Origin::Desync
    }

    /// Whether `target` lies in the unreachable gap after the nominal
    /// action, where a seek must be clamped up to `from_action`.
    pub fn covers(&self, target: ActionIndex) -> bool {
        self.action < target && target < self.from_action
    }

    /// Previous checkpoint in the chain.
    pub fn prev(&self) -> Option<CheckpointId> {
        self.prev
    }

    /// Next checkpoint in the chain.
    pub fn next(&self) -> Option<CheckpointId> {
        self.next
    }
}
