//! Strongly-typed positions and the [`SessionId`] identity.

use std::fmt;

/// Position in the recorded action sequence.
///
/// One-based: `ActionIndex(n)` names the simulation state *before* the
/// n-th recorded command runs. The initial state is [`ActionIndex::FIRST`],
/// and a log holding `N` commands ends at `ActionIndex(N + 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionIndex(pub u64);

impl ActionIndex {
    /// The state before any recorded command has run.
    pub const FIRST: Self = Self(1);

    /// The position after one more command.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The position one command earlier, never below [`ActionIndex::FIRST`].
    pub fn prev(self) -> Self {
        Self(self.0.saturating_sub(1).max(1))
    }

    /// Offset by a signed delta, clamping the result to [`ActionIndex::FIRST`].
    ///
    /// ```
    /// use retrace_core::ActionIndex;
    ///
    /// assert_eq!(ActionIndex(10).offset(5), ActionIndex(15));
    /// assert_eq!(ActionIndex(1).offset(-1000), ActionIndex(1));
    /// ```
    pub fn offset(self, delta: i64) -> Self {
        let raw = if delta < 0 {
            self.0.saturating_sub(delta.unsigned_abs())
        } else {
            self.0.saturating_add(delta as u64)
        };
        Self(raw.max(1))
    }

    /// Number of actions from `self` forward to `other` (zero if `other` is behind).
    pub fn distance_to(self, other: Self) -> u64 {
        other.0.saturating_sub(self.0)
    }
}

impl fmt::Display for ActionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ActionIndex {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// The simulation's own turn counter.
///
/// Several actions may share a move (free actions), and one action may
/// span several moves (multi-turn occupations).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MoveIndex(pub u64);

impl MoveIndex {
    /// Offset by a signed delta, saturating at zero.
    pub fn offset(self, delta: i64) -> Self {
        if delta < 0 {
            Self(self.0.saturating_sub(delta.unsigned_abs()))
        } else {
            Self(self.0.saturating_add(delta as u64))
        }
    }
}

impl fmt::Display for MoveIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MoveIndex {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// An `(action, move)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Position {
    /// Action-log position.
    pub action: ActionIndex,
    /// Simulation turn counter at that position.
    pub moves: MoveIndex,
}

impl Position {
    /// Create a position from raw counters.
    pub fn new(action: u64, moves: u64) -> Self {
        Self {
            action: ActionIndex(action),
            moves: MoveIndex(moves),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action {} (move {})", self.action, self.moves)
    }
}

/// Opaque identity of a recorded session: player name plus start time.
///
/// Two logs with equal identities belong to the same game, so checkpoints
/// built for one remain valid for the other.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId {
    /// Name the session was started under.
    pub player: String,
    /// Session start time in unix seconds.
    pub started_at: u64,
}

impl SessionId {
    /// Create a session identity.
    pub fn new(player: impl Into<String>, started_at: u64) -> Self {
        Self {
            player: player.into(),
            started_at,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.player, self.started_at)
    }
}
