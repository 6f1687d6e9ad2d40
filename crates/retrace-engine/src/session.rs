//! Per-session replay context.
//!
//! A [`ReplaySession`] exists exactly while a log is open for replay. It
//! owns the log reader (and with it the only cursor into the log), the
//! current position and the seek target. "Replay active" means "a session
//! is present on the [`Replayer`](crate::Replayer)".

use indexmap::IndexMap;
use retrace_core::{ActionIndex, Command, MoveIndex, SessionId};
use retrace_log::{LogReader, LogRecord};

/// Seek direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Toward later actions.
    Forward,
    /// Toward earlier actions.
    Backward,
}

/// Where a seek is headed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    /// A position in the action log.
    Action(ActionIndex),
    /// The first action at which the simulation's turn counter reaches
    /// this value.
    Move(MoveIndex),
}

/// State of one open replay.
#[derive(Debug)]
pub struct ReplaySession {
    pub(crate) log: LogReader,
    pub(crate) current: ActionIndex,
    pub(crate) target: Target,
    pub(crate) direction: Direction,
    /// Set once the jump decision for the current seek has been made.
    pub(crate) jumped: bool,
    /// Whether live state is known to match the log at `current`.
    pub(crate) in_sync: bool,
    pub(crate) options: IndexMap<String, String>,
    pub(crate) last_timestamp: Option<u64>,
}

impl ReplaySession {
    pub(crate) fn new(log: LogReader) -> Self {
        let options = log.header().options.clone();
        Self {
            log,
            current: ActionIndex::FIRST,
            target: Target::Action(ActionIndex::FIRST),
            direction: Direction::Forward,
            jumped: true,
            in_sync: true,
            options,
            last_timestamp: None,
        }
    }

    /// Identity of the recorded session.
    pub fn id(&self) -> &SessionId {
        self.log.session_id()
    }

    /// The open log.
    pub fn log(&self) -> &LogReader {
        &self.log
    }

    /// Current action position.
    pub fn current(&self) -> ActionIndex {
        self.current
    }

    /// Target of the latest seek.
    pub fn target(&self) -> Target {
        self.target
    }

    /// Direction of the latest seek.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Whether live state is known to match the log.
    pub fn in_sync(&self) -> bool {
        self.in_sync
    }

    /// Options in effect, in the order they were first set.
    pub fn options(&self) -> &IndexMap<String, String> {
        &self.options
    }

    /// Unix seconds of the last timestamp marker crossed.
    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    /// The recorded command at the current position, not yet executed.
    pub fn pending_command(&self) -> Option<&Command> {
        self.log.command(self.current).map(|rec| &rec.command)
    }

    /// The target expressed as an action. Move targets resolve through the
    /// turn counters recorded in the log.
    pub fn target_action(&self) -> ActionIndex {
        match self.target {
            Target::Action(action) => action,
            Target::Move(moves) => self.log.action_for_move(moves),
        }
    }

    /// Move the log cursor to `record` and rebuild what the records before
    /// it established: the options in effect and the last timestamp.
    pub(crate) fn rewind_to(&mut self, record: usize) {
        self.log.seek_record(record);
        self.options = self.log.header().options.clone();
        self.last_timestamp = None;
        for index in 0..self.log.cursor() {
            match self.log.record(index) {
                Some(LogRecord::OptionChange { name, value }) => {
                    self.options.insert(name.clone(), value.clone());
                }
                Some(LogRecord::Timestamp { unix_secs }) => self.last_timestamp = Some(*unix_secs),
                _ => {}
            }
        }
    }

    /// Point the session at a new target. Clears the jump guard.
    ///
    /// Action targets below the first action clamp to it.
    pub(crate) fn aim(&mut self, target: Target, current_moves: MoveIndex) {
        let target = match target {
            Target::Action(action) => Target::Action(action.max(ActionIndex::FIRST)),
            moves => moves,
        };
        self.direction = match target {
            Target::Action(action) if action < self.current => Direction::Backward,
            Target::Move(moves) if moves < current_moves => Direction::Backward,
            _ => Direction::Forward,
        };
        self.target = target;
        self.jumped = false;
    }
}
