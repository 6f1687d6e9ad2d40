//! Recorded-session fixtures.
//!
//! [`LogBuilder`] plays a [`MockSimulation`] through a seeded command
//! script and writes what a live recorder would: per action, any option
//! changes and timestamps, then the command with its prompt answers, the
//! post-command checksum, and the post-command state image.

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use retrace_core::{
    ActionIndex, Answer, Argument, Command, Compass, InputError, InputProvider, Query, QueryKind,
    SessionId, Simulation,
};
use retrace_log::{LogRecord, LogWriter, SessionHeader};

use crate::sim::MockSimulation;

/// Default session start time used by fixtures.
pub const STARTED_AT: u64 = 1_700_000_000;

/// Record a plain `actions`-command session of `player` from `seed`.
///
/// ```
/// use retrace_log::LogReader;
/// use retrace_test_utils::record_log;
///
/// let log = LogReader::from_bytes(&record_log("ada", 7, 30)).unwrap();
/// assert_eq!(log.command_count(), 30);
/// ```
pub fn record_log(player: &str, seed: u64, actions: u64) -> Vec<u8> {
    LogBuilder::new(player, seed).actions(actions).build()
}

/// Configurable recorder for mock sessions.
#[derive(Clone, Debug)]
pub struct LogBuilder {
    player: String,
    started_at: u64,
    seed: u64,
    actions: u64,
    changes: bool,
    checksums: bool,
    header_options: Vec<(String, String)>,
    option_changes: Vec<(u64, String, String)>,
    timestamps: Vec<(u64, u64)>,
    dropped_answers: Vec<u64>,
}

impl LogBuilder {
    pub fn new(player: &str, seed: u64) -> Self {
        Self {
            player: player.to_string(),
            started_at: STARTED_AT,
            seed,
            actions: 100,
            changes: true,
            checksums: true,
            header_options: Vec::new(),
            option_changes: Vec::new(),
            timestamps: Vec::new(),
            dropped_answers: Vec::new(),
        }
    }

    pub fn started_at(mut self, unix_secs: u64) -> Self {
        self.started_at = unix_secs;
        self
    }

    pub fn actions(mut self, actions: u64) -> Self {
        self.actions = actions;
        self
    }

    /// Omit state-change records.
    pub fn without_changes(mut self) -> Self {
        self.changes = false;
        self
    }

    /// Omit post-command checksums.
    pub fn without_checksums(mut self) -> Self {
        self.checksums = false;
        self
    }

    /// Option set before the first command and stored in the header.
    pub fn header_option(mut self, name: &str, value: &str) -> Self {
        self.header_options.push((name.to_string(), value.to_string()));
        self
    }

    /// Option changed just before the command at `action`.
    pub fn option_at(mut self, action: u64, name: &str, value: &str) -> Self {
        self.option_changes
            .push((action, name.to_string(), value.to_string()));
        self
    }

    /// Timestamp written just before the command at `action`.
    pub fn timestamp_at(mut self, action: u64, unix_secs: u64) -> Self {
        self.timestamps.push((action, unix_secs));
        self
    }

    /// Record the command at `action` without its prompt answers.
    pub fn drop_answers_at(mut self, action: u64) -> Self {
        self.dropped_answers.push(action);
        self
    }

    /// Identity written into the header.
    pub fn session_id(&self) -> SessionId {
        SessionId::new(self.player.clone(), self.started_at)
    }

    /// A simulation at the log's starting state.
    pub fn initial_simulation(&self) -> MockSimulation {
        let mut sim = MockSimulation::new(self.seed);
        for (name, value) in &self.header_options {
            sim.set_option(name, value);
        }
        sim
    }

    /// Record the session.
    pub fn build(&self) -> Vec<u8> {
        self.record(self.actions).0
    }

    /// The simulation at `action` (before its command), reached by plain
    /// execution.
    pub fn state_at(&self, action: u64) -> MockSimulation {
        self.record(action.saturating_sub(1).min(self.actions)).1
    }

    fn record(&self, commands: u64) -> (Vec<u8>, MockSimulation) {
        let mut header = SessionHeader::new(self.session_id(), self.seed);
        for (name, value) in &self.header_options {
            header = header.with_option(name.clone(), value.clone());
        }
        let mut writer = LogWriter::new(Vec::new(), &header).expect("in-memory write");
        let mut sim = self.initial_simulation();
        let mut script = CommandScript::new(self.seed);
        let mut input = RecordingInput::new(self.seed);

        for a in 1..=commands {
            let action = ActionIndex(a);
            for (_, name, value) in self.option_changes.iter().filter(|(at, ..)| *at == a) {
                sim.set_option(name, value);
                writer
                    .append(&LogRecord::OptionChange {
                        name: name.clone(),
                        value: value.clone(),
                    })
                    .expect("in-memory write");
            }
            for &(_, unix_secs) in self.timestamps.iter().filter(|(at, _)| *at == a) {
                writer
                    .append(&LogRecord::Timestamp { unix_secs })
                    .expect("in-memory write");
            }

            let command = script.next_command();
            let (moves, rng) = (sim.move_index(), sim.rng_checksum());
            sim.execute(&command, &mut input)
                .unwrap_or_else(|e| panic!("recording action {a} failed: {e}"));
            let mut answers = input.take_answers();
            if self.dropped_answers.contains(&a) {
                answers.clear();
            }
            writer
                .record_command(action, moves, rng, command, answers)
                .expect("in-memory write");
            if self.checksums {
                writer
                    .record_result(action, sim.move_index(), sim.state_hash())
                    .expect("in-memory write");
            }
            if self.changes {
                writer
                    .append(&LogRecord::StateChange {
                        action,
                        image: sim.save_state(),
                    })
                    .expect("in-memory write");
            }
        }
        sim.clear_history();
        (writer.into_inner(), sim)
    }
}

/// Seeded stream of player commands.
struct CommandScript {
    rng: ChaCha8Rng,
}

impl CommandScript {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed ^ 0x5eed_c0de),
        }
    }

    fn next_command(&mut self) -> Command {
        let roll = self.rng.next_u32() % 20;
        let dir = Compass::ALL[(self.rng.next_u32() % 8) as usize];
        match roll {
            0..=9 => Command::new("walk").with_arg(Argument::Direction(dir)),
            10..=11 => Command::new("search"),
            12..=13 => Command::new("rest").with_repeat(1 + roll % 3),
            14 => Command::new("look"),
            15 => Command::new("dig"),
            16 => Command::new("pray"),
            17 => Command::new("engrave"),
            _ => Command::new("walk")
                .with_arg(Argument::Direction(dir))
                .with_repeat(2),
        }
    }
}

/// Answers prompts the way a player would and keeps the answers for the
/// command record.
struct RecordingInput {
    rng: ChaCha8Rng,
    answers: Vec<Answer>,
}

impl RecordingInput {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed.rotate_left(17)),
            answers: Vec::new(),
        }
    }

    fn take_answers(&mut self) -> Vec<Answer> {
        std::mem::take(&mut self.answers)
    }
}

impl InputProvider for RecordingInput {
    fn show_message(&mut self, _text: &str) {}

    fn update_status(&mut self) {}

    fn redraw_map(&mut self) {}

    fn delay(&mut self, _millis: u32) {}

    fn query(&mut self, query: &Query) -> Result<Answer, InputError> {
        let roll = self.rng.next_u32();
        let answer = match query.kind {
            QueryKind::Choice => Answer::Choice(if roll % 4 == 0 { 'n' } else { 'y' }),
            QueryKind::Direction => Answer::Direction(Compass::ALL[(roll % 8) as usize]),
            QueryKind::Position => Answer::Position {
                x: (roll % 80) as i32,
                y: (roll / 80 % 21) as i32,
            },
            QueryKind::Line => Answer::Line(if roll % 2 == 0 { "Elbereth" } else { "x" }.into()),
            QueryKind::Menu => Answer::Selection(vec![roll % 4]),
        };
        self.answers.push(answer.clone());
        Ok(answer)
    }

    fn diagnostic(&mut self, _text: &str) {}

    fn request_command(&mut self) -> Result<Command, InputError> {
        Err(InputError::Cancelled)
    }

    fn confirm_save(&mut self) -> Result<bool, InputError> {
        Ok(true)
    }

    fn full_refresh(&mut self) {}
}
