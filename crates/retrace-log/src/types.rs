//! Data types for action-log records.

use indexmap::IndexMap;
use retrace_core::{ActionIndex, Answer, Command, MoveIndex, SessionId};

/// Session metadata stored at the head of every log.
///
/// # Examples
///
/// ```
/// use retrace_core::SessionId;
/// use retrace_log::SessionHeader;
///
/// let header = SessionHeader::new(SessionId::new("valk", 1_700_000_000), 42)
///     .with_option("autopickup", "off");
///
/// assert_eq!(header.seed, 42);
/// assert_eq!(header.options.get("autopickup").map(String::as_str), Some("off"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionHeader {
    /// Identity of the recorded session.
    pub session: SessionId,
    /// RNG seed the session started from.
    pub seed: u64,
    /// Options in effect at session start, in the order they were set.
    pub options: IndexMap<String, String>,
}

impl SessionHeader {
    /// Header with no initial options.
    pub fn new(session: SessionId, seed: u64) -> Self {
        Self {
            session,
            seed,
            options: IndexMap::new(),
        }
    }

    /// Add an initial option.
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }
}

/// One recorded top-level command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRecord {
    /// Position of this command in the log (state before it runs).
    pub action: ActionIndex,
    /// Turn counter before the command ran.
    pub moves: MoveIndex,
    /// RNG checksum before the command ran.
    pub rng_checksum: u64,
    /// The command, its arguments and repeat count.
    pub command: Command,
    /// Answers to the prompts the command raised, in the order asked.
    pub answers: Vec<Answer>,
}

/// A single entry of the action log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogRecord {
    /// A command the player issued.
    Command(CommandRecord),
    /// State hash after a command finished.
    ResultChecksum {
        /// The command this checksum follows.
        action: ActionIndex,
        /// Turn counter after the command finished.
        moves: MoveIndex,
        /// FNV-1a hash of the post-command state.
        state_hash: u64,
    },
    /// The player changed an option between commands.
    OptionChange {
        /// Option name.
        name: String,
        /// New value.
        value: String,
    },
    /// Wall-clock marker written when the session was resumed or saved.
    Timestamp {
        /// Unix seconds.
        unix_secs: u64,
    },
    /// Recorded post-command state image for change-by-change replay.
    StateChange {
        /// The command this image follows.
        action: ActionIndex,
        /// Opaque image produced by the simulation.
        image: Vec<u8>,
    },
}

impl LogRecord {
    /// Wire tag for this record.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Command(_) => TAG_COMMAND,
            Self::ResultChecksum { .. } => TAG_RESULT_CHECKSUM,
            Self::OptionChange { .. } => TAG_OPTION_CHANGE,
            Self::Timestamp { .. } => TAG_TIMESTAMP,
            Self::StateChange { .. } => TAG_STATE_CHANGE,
        }
    }

    /// The command record, if this is one.
    pub fn as_command(&self) -> Option<&CommandRecord> {
        match self {
            Self::Command(rec) => Some(rec),
            _ => None,
        }
    }
}

// ── Record tag constants ────────────────────────────────────────

/// Tag for [`LogRecord::Command`].
pub const TAG_COMMAND: u8 = 1;
/// Tag for [`LogRecord::ResultChecksum`].
pub const TAG_RESULT_CHECKSUM: u8 = 2;
/// Tag for [`LogRecord::OptionChange`].
pub const TAG_OPTION_CHANGE: u8 = 3;
/// Tag for [`LogRecord::Timestamp`].
pub const TAG_TIMESTAMP: u8 = 4;
/// Tag for [`LogRecord::StateChange`].
pub const TAG_STATE_CHANGE: u8 = 5;
