//! A deterministic roguelike stand-in.
//!
//! [`MockSimulation`] walks a character around an unbounded grid, drawing
//! from a seeded ChaCha8 stream for incidental events. It supports every
//! hook the replay engine needs: full state images, change records,
//! multi-turn occupations, free actions, and prompts. Two knobs make it
//! misbehave on purpose: a version quirk (one extra RNG draw at a chosen
//! action, as a code change between recording and replay would cause) and
//! injected load or execute failures.

use std::collections::BTreeMap;

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use retrace_core::{
    Answer, Command, InputProvider, MoveIndex, Query, QueryKind, Simulation, SimulationError,
};
use retrace_log::codec::{put_i32, put_str, put_u32, put_u64, ByteCursor};
use retrace_log::hash::image_hash;
use retrace_log::{Fnv1a, LogError};

const IMAGE_MAGIC: &[u8; 4] = b"MSIM";
const MAX_HP: i32 = 16;

#[derive(Clone, Debug)]
struct World {
    rng: ChaCha8Rng,
    commands_done: u64,
    moves: u64,
    x: i32,
    y: i32,
    hp: i32,
    gold: u64,
    /// Turns of rubble left from the last dig; finished by the next command.
    occupation: u32,
    engraving: u64,
    options: BTreeMap<String, String>,
}

impl World {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            commands_done: 0,
            moves: 0,
            x: 0,
            y: 0,
            hp: MAX_HP,
            gold: 0,
            occupation: 0,
            engraving: 0,
            options: BTreeMap::new(),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(IMAGE_MAGIC);
        buf.extend_from_slice(&self.rng.get_seed());
        put_u64(&mut buf, self.rng.get_stream());
        let word_pos = self.rng.get_word_pos();
        put_u64(&mut buf, word_pos as u64);
        put_u64(&mut buf, (word_pos >> 64) as u64);
        put_u64(&mut buf, self.commands_done);
        put_u64(&mut buf, self.moves);
        put_i32(&mut buf, self.x);
        put_i32(&mut buf, self.y);
        put_i32(&mut buf, self.hp);
        put_u64(&mut buf, self.gold);
        put_u32(&mut buf, self.occupation);
        put_u64(&mut buf, self.engraving);
        put_u32(&mut buf, self.options.len() as u32);
        for (name, value) in &self.options {
            put_str(&mut buf, name).expect("option text fits a u32 length");
            put_str(&mut buf, value).expect("option text fits a u32 length");
        }
        buf
    }

    fn decode(image: &[u8]) -> Result<Self, SimulationError> {
        Self::decode_inner(image).map_err(|e| SimulationError::CorruptState {
            reason: e.to_string(),
        })
    }

    fn decode_inner(image: &[u8]) -> Result<Self, LogError> {
        let mut cur = ByteCursor::new(image, 0);
        if cur.take(4)? != IMAGE_MAGIC {
            return Err(LogError::InvalidMagic);
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(cur.take(32)?);
        let mut rng = ChaCha8Rng::from_seed(seed);
        rng.set_stream(cur.read_u64()?);
        let lo = cur.read_u64()? as u128;
        let hi = cur.read_u64()? as u128;
        rng.set_word_pos(lo | (hi << 64));

        let mut world = Self {
            rng,
            commands_done: cur.read_u64()?,
            moves: cur.read_u64()?,
            x: cur.read_i32()?,
            y: cur.read_i32()?,
            hp: cur.read_i32()?,
            gold: cur.read_u64()?,
            occupation: cur.read_u32()?,
            engraving: cur.read_u64()?,
            options: BTreeMap::new(),
        };
        let count = cur.read_u32()?;
        for _ in 0..count {
            let name = cur.read_str()?;
            let value = cur.read_str()?;
            world.options.insert(name, value);
        }
        cur.finish()?;
        Ok(world)
    }
}

/// Deterministic seeded simulation with test instrumentation.
///
/// Instrumentation (execution history, load and change counters) lives
/// outside the state image and survives restores.
#[derive(Clone, Debug)]
pub struct MockSimulation {
    world: World,
    quirk_at: Option<u64>,
    fault_at: Option<u64>,
    failing_loads: u32,
    executed: Vec<u64>,
    loads: u64,
    changes: u64,
    recomputes: u64,
    derived: Option<u64>,
}

impl MockSimulation {
    /// Fresh game from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            world: World::new(seed),
            quirk_at: None,
            fault_at: None,
            failing_loads: 0,
            executed: Vec::new(),
            loads: 0,
            changes: 0,
            recomputes: 0,
            derived: None,
        }
    }

    /// Draw one extra RNG value while executing the command at `action`.
    pub fn with_quirk_at(mut self, action: u64) -> Self {
        self.quirk_at = Some(action);
        self
    }

    /// Fail with [`SimulationError::InvalidArgument`] when asked to
    /// execute the command at `action`.
    pub fn with_fault_at(mut self, action: u64) -> Self {
        self.fault_at = Some(action);
        self
    }

    /// Start with an option already set.
    pub fn with_option(mut self, name: &str, value: &str) -> Self {
        self.set_option(name, value);
        self
    }

    /// Make the next `count` [`load_state`](Simulation::load_state) calls fail.
    pub fn fail_next_loads(&mut self, count: u32) {
        self.failing_loads = count;
    }

    /// Action numbers of every command executed, in order.
    pub fn executed(&self) -> &[u64] {
        &self.executed
    }

    /// Forget the execution history.
    pub fn clear_history(&mut self) {
        self.executed.clear();
    }

    /// Successful full-state loads.
    pub fn loads(&self) -> u64 {
        self.loads
    }

    /// Change records applied.
    pub fn changes_applied(&self) -> u64 {
        self.changes
    }

    /// Calls to [`recompute_derived`](Simulation::recompute_derived).
    pub fn recomputes(&self) -> u64 {
        self.recomputes
    }

    /// Whether derived state is current with the last state change.
    pub fn derived_fresh(&self) -> bool {
        self.derived == Some(self.view_hash())
    }

    /// Commands completed since the game started.
    pub fn commands_done(&self) -> u64 {
        self.world.commands_done
    }

    pub fn position(&self) -> (i32, i32) {
        (self.world.x, self.world.y)
    }

    pub fn gold(&self) -> u64 {
        self.world.gold
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        self.world.options.get(name).map(String::as_str)
    }

    fn view_hash(&self) -> u64 {
        Fnv1a::new()
            .i32(self.world.x)
            .i32(self.world.y)
            .i32(self.world.hp)
            .finish()
    }

    fn run_once(
        &mut self,
        command: &Command,
        input: &mut dyn InputProvider,
    ) -> Result<(), SimulationError> {
        let w = &mut self.world;
        match command.name.as_str() {
            "walk" => {
                let dir = command.direction().ok_or_else(|| SimulationError::InvalidArgument {
                    command: command.name.clone(),
                    reason: "no direction".into(),
                })?;
                let (dx, dy) = dir.delta();
                w.x += dx;
                w.y += dy;
                w.moves += 1;
                if w.rng.next_u32() % 8 == 0 {
                    w.gold += 1 + u64::from(w.rng.next_u32() % 20);
                    input.show_message("You see here some gold pieces.");
                }
                input.redraw_map();
                input.delay(10);
            }
            "search" => {
                w.moves += 1;
                if w.rng.next_u32() % 5 == 0 {
                    input.show_message("You find a hidden passage.");
                }
            }
            "rest" => {
                w.moves += 1;
                w.hp = (w.hp + 1).min(MAX_HP);
            }
            "look" => input.show_message("You see no objects here."),
            "dig" => {
                let answer =
                    input.query(&Query::new(QueryKind::Direction, "In what direction do you want to dig?"))?;
                let Answer::Direction(dir) = answer else {
                    return Err(SimulationError::InvalidArgument {
                        command: command.name.clone(),
                        reason: "dig needs a direction".into(),
                    });
                };
                let (dx, dy) = dir.delta();
                w.x += dx;
                w.y += dy;
                w.moves += 3;
                w.occupation = 1;
                w.hp -= (w.rng.next_u32() % 2) as i32;
                input.show_message("You dig a pit in the floor.");
            }
            "pray" => {
                let answer =
                    input.query(&Query::new(QueryKind::Choice, "Are you sure you want to pray? [yn]"))?;
                if answer == Answer::Choice('y') {
                    w.moves += 3;
                    if w.rng.next_u32() % 3 != 0 {
                        w.hp = MAX_HP;
                        input.show_message("You feel much better.");
                    }
                }
            }
            "engrave" => {
                let answer =
                    input.query(&Query::new(QueryKind::Line, "What do you want to engrave here?"))?;
                let Answer::Line(text) = answer else {
                    return Err(SimulationError::InvalidArgument {
                        command: command.name.clone(),
                        reason: "engrave needs text".into(),
                    });
                };
                w.engraving = Fnv1a::new().u64(w.engraving).str(&text).finish();
                w.moves += 1;
            }
            other => {
                return Err(SimulationError::UnknownCommand {
                    name: other.to_string(),
                })
            }
        }
        Ok(())
    }
}

impl Simulation for MockSimulation {
    fn execute(
        &mut self,
        command: &Command,
        input: &mut dyn InputProvider,
    ) -> Result<(), SimulationError> {
        let action = self.world.commands_done + 1;
        if self.fault_at == Some(action) {
            return Err(SimulationError::InvalidArgument {
                command: command.name.clone(),
                reason: format!("injected fault at action {action}"),
            });
        }
        self.executed.push(action);
        self.derived = None;
        if self.quirk_at == Some(action) {
            self.world.rng.next_u32();
        }
        if self.world.occupation > 0 {
            self.world.occupation -= 1;
            self.world.moves += 1;
            input.show_message("You finish clearing the rubble.");
        }
        for _ in 0..command.repeat.max(1) {
            self.run_once(command, input)?;
        }
        self.world.commands_done += 1;
        input.update_status();
        Ok(())
    }

    fn move_index(&self) -> MoveIndex {
        MoveIndex(self.world.moves)
    }

    fn rng_checksum(&self) -> u64 {
        let word_pos = self.world.rng.get_word_pos();
        Fnv1a::new()
            .bytes(&self.world.rng.get_seed())
            .u64(self.world.rng.get_stream())
            .u64(word_pos as u64)
            .u64((word_pos >> 64) as u64)
            .finish()
    }

    fn state_hash(&self) -> u64 {
        image_hash(&self.world.encode())
    }

    fn multi_step_in_progress(&self) -> bool {
        self.world.occupation > 0
    }

    fn save_state(&self) -> Vec<u8> {
        self.world.encode()
    }

    fn load_state(&mut self, image: &[u8]) -> Result<(), SimulationError> {
        if self.failing_loads > 0 {
            self.failing_loads -= 1;
            return Err(SimulationError::CorruptState {
                reason: "injected load failure".into(),
            });
        }
        self.world = World::decode(image)?;
        self.derived = None;
        self.loads += 1;
        Ok(())
    }

    fn apply_change(&mut self, change: &[u8]) -> Result<(), SimulationError> {
        self.world = World::decode(change)?;
        self.derived = None;
        self.changes += 1;
        Ok(())
    }

    fn set_option(&mut self, name: &str, value: &str) {
        self.world.options.insert(name.to_string(), value.to_string());
    }

    fn recompute_derived(&mut self) {
        self.recomputes += 1;
        self.derived = Some(self.view_hash());
    }
}
