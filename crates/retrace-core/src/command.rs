//! Recorded commands, prompt queries, and the answers given to them.

use smallvec::SmallVec;

/// One of the eight compass directions, plus vertical and self-targeting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Compass {
    /// Up the map (negative y).
    North,
    /// Diagonal up-right.
    NorthEast,
    /// Right (positive x).
    East,
    /// Diagonal down-right.
    SouthEast,
    /// Down the map (positive y).
    South,
    /// Diagonal down-left.
    SouthWest,
    /// Left (negative x).
    West,
    /// Diagonal up-left.
    NorthWest,
    /// Up a staircase.
    Up,
    /// Down a staircase.
    Down,
    /// The acting entity's own square.
    Here,
}

impl Compass {
    /// All directions in wire-tag order.
    pub const ALL: [Compass; 11] = [
        Compass::North,
        Compass::NorthEast,
        Compass::East,
        Compass::SouthEast,
        Compass::South,
        Compass::SouthWest,
        Compass::West,
        Compass::NorthWest,
        Compass::Up,
        Compass::Down,
        Compass::Here,
    ];

    /// Planar `(dx, dy)` step for this direction. Vertical and `Here` are `(0, 0)`.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::NorthEast => (1, -1),
            Self::East => (1, 0),
            Self::SouthEast => (1, 1),
            Self::South => (0, 1),
            Self::SouthWest => (-1, 1),
            Self::West => (-1, 0),
            Self::NorthWest => (-1, -1),
            Self::Up | Self::Down | Self::Here => (0, 0),
        }
    }

    /// Stable wire tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Inverse of [`tag`](Compass::tag).
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }
}

/// A single argument attached to a recorded command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Argument {
    /// A direction (move, fight, apply-in-direction).
    Direction(Compass),
    /// A map position (travel, targeted spells).
    Position {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
    },
    /// An inventory letter.
    Item(char),
    /// A numeric count or limit.
    Count(i32),
    /// Free text (engrave, name, wish).
    Text(String),
}

/// Inline storage for command arguments; almost every command has 0–2.
pub type Arguments = SmallVec<[Argument; 2]>;

/// A top-level, turn-advancing command as the player issued it.
///
/// # Examples
///
/// ```
/// use retrace_core::{Argument, Command, Compass};
///
/// let cmd = Command::new("move")
///     .with_arg(Argument::Direction(Compass::East))
///     .with_repeat(3);
///
/// assert_eq!(cmd.name, "move");
/// assert_eq!(cmd.args.len(), 1);
/// assert_eq!(cmd.repeat, 3);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    /// Command identifier understood by the simulation.
    pub name: String,
    /// Arguments supplied up front.
    pub args: Arguments,
    /// Repeat count prefix (1 = run once).
    pub repeat: u32,
}

impl Command {
    /// A command with no arguments that runs once.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: SmallVec::new(),
            repeat: 1,
        }
    }

    /// Append an argument.
    pub fn with_arg(mut self, arg: Argument) -> Self {
        self.args.push(arg);
        self
    }

    /// Set the repeat count.
    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    /// First direction argument, if any.
    pub fn direction(&self) -> Option<Compass> {
        self.args.iter().find_map(|a| match a {
            Argument::Direction(d) => Some(*d),
            _ => None,
        })
    }
}

/// What kind of answer a prompt expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Single-key choice (`y`/`n`/`q`, menu accelerators).
    Choice,
    /// A compass direction.
    Direction,
    /// A map position.
    Position,
    /// A line of text.
    Line,
    /// A multi-select menu.
    Menu,
}

/// A prompt raised by the simulation while a command executes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    /// Expected answer kind.
    pub kind: QueryKind,
    /// Prompt text shown to the player.
    pub prompt: String,
}

impl Query {
    /// Create a query.
    pub fn new(kind: QueryKind, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
        }
    }
}

/// The answer a player gave to a [`Query`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Answer {
    /// Answer to a [`QueryKind::Choice`] prompt.
    Choice(char),
    /// Answer to a [`QueryKind::Direction`] prompt.
    Direction(Compass),
    /// Answer to a [`QueryKind::Position`] prompt.
    Position {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
    },
    /// Answer to a [`QueryKind::Line`] prompt.
    Line(String),
    /// Answer to a [`QueryKind::Menu`] prompt: selected item ids.
    Selection(Vec<u32>),
}

impl Answer {
    /// The query kind this answer satisfies.
    pub fn kind(&self) -> QueryKind {
        match self {
            Self::Choice(_) => QueryKind::Choice,
            Self::Direction(_) => QueryKind::Direction,
            Self::Position { .. } => QueryKind::Position,
            Self::Line(_) => QueryKind::Line,
            Self::Selection(_) => QueryKind::Menu,
        }
    }
}
