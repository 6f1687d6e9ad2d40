//! The seek controller.
//!
//! [`Replayer`] composes the action log, the checkpoint store and the
//! interception shim into a seek state machine:
//!
//! ```text
//!           aim()                      current == target
//!   Idle ──────────► Seeking ──────────────────────────► AtGoal
//!                    │  ▲  │ one jump decision per seek
//!                    │  └──┘ then one command per poll()
//!                    │
//!                    └────────────────────────────────► Exhausted
//!                              log ran out first
//! ```
//!
//! Each [`poll()`](Replayer::poll) does at most one unit of work: the jump
//! decision (restore a checkpoint when seeking backward or far forward),
//! the goal check, or feeding exactly one recorded command to the
//! simulation. [`seek()`](Replayer::seek) and [`goto()`](Replayer::goto)
//! poll until the state leaves `Seeking`.
//!
//! # Ordering
//!
//! Log records are consumed strictly in written order through the session's
//! single cursor. Restoring a checkpoint is the only operation that moves
//! the position backward, and it rebuilds derived state before any further
//! record is read.

use std::time::Instant;

use retrace_checkpoint::{Checkpoint, CheckpointId, CheckpointState, CheckpointStore, Origin};
use retrace_core::{
    ActionIndex, Command, InputError, InputProvider, MoveIndex, Position, Simulation,
    SimulationError,
};
use retrace_log::{CommandRecord, LogReader, LogRecord};
use tracing::{debug, error, info, warn};

use crate::config::ReplayConfig;
use crate::diff::{reached_target, DesyncTracker};
use crate::error::ReplayError;
use crate::session::{Direction, ReplaySession, Target};
use crate::shim::InterceptionShim;
use crate::stats::ReplayStats;
use crate::throttle::{Advance, Throttle};

// ── SeekStatus ──────────────────────────────────────────────────

/// Controller state, also reported as the outcome of a seek.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekStatus {
    /// No seek has been requested in this session.
    Idle,
    /// A seek is in progress; keep polling.
    Seeking,
    /// The target was reached.
    AtGoal,
    /// The log ended before the target was reached.
    Exhausted,
}

/// What feeding one recorded command did.
struct Fed {
    /// The result disagreed with the log in some way.
    diverged: bool,
    /// Record index of the change applied instead of executing, if any.
    change: Option<usize>,
}

// ── Replayer ────────────────────────────────────────────────────

/// Replays a recorded session against a [`Simulation`] and seeks to any
/// recorded position.
///
/// At most one session is open at a time. The checkpoint store and the
/// desync marks outlive a session and are kept when the next session has
/// the same identity.
///
/// # Example
///
/// ```
/// use retrace_engine::{ReplayConfig, Replayer, SeekStatus};
/// use retrace_test_utils::{record_log, MockSimulation, ScriptedInput};
///
/// let log = record_log("ada", 7, 120);
/// let mut replayer = Replayer::new(MockSimulation::new(7), ScriptedInput::new(), ReplayConfig::default()).unwrap();
///
/// let max = replayer.begin_replay(&log).unwrap();
/// assert_eq!(max.0, 121);
/// assert_eq!(replayer.goto(100, false).unwrap(), SeekStatus::AtGoal);
/// assert_eq!(replayer.goto(0, false).unwrap(), SeekStatus::AtGoal);
/// assert_eq!(replayer.current_position().unwrap().action, max);
/// replayer.end_replay().unwrap();
/// ```
pub struct Replayer<S: Simulation, P: InputProvider> {
    sim: S,
    shim: InterceptionShim<P>,
    store: CheckpointStore,
    tracker: DesyncTracker,
    config: ReplayConfig,
    session: Option<ReplaySession>,
    state: SeekStatus,
    throttle: Throttle,
    stats: ReplayStats,
}

impl<S: Simulation, P: InputProvider> Replayer<S, P> {
    /// Build a replayer around a simulation and the live input provider.
    pub fn new(sim: S, live: P, config: ReplayConfig) -> Result<Self, ReplayError> {
        config.validate()?;
        Ok(Self {
            sim,
            shim: InterceptionShim::new(live),
            store: CheckpointStore::new(),
            tracker: DesyncTracker::new(),
            throttle: Throttle::new(config.advance_interval),
            config,
            session: None,
            state: SeekStatus::Idle,
            stats: ReplayStats::default(),
        })
    }

    // ── Session lifecycle ───────────────────────────────────────

    /// Open `log` for replay and return the position after its last command.
    ///
    /// The simulation must be at the log's starting state unless the store
    /// already holds checkpoints for the same session identity, in which
    /// case it is rewound to the initial checkpoint.
    ///
    /// # Errors
    ///
    /// [`ReplayError::SessionActive`] if a session is already open,
    /// [`ReplayError::Log`] if the log is unreadable.
    pub fn begin_replay(&mut self, log: &[u8]) -> Result<ActionIndex, ReplayError> {
        if self.session.is_some() {
            return Err(ReplayError::SessionActive);
        }
        let log = LogReader::from_bytes(log)?;
        if log.truncated_tail() {
            debug!(valid_len = log.valid_len(), "ignoring partial trailing record");
        }

        let identity = log.session_id().clone();
        let fresh = self.store.bind_session(&identity);
        if fresh {
            self.tracker.reset();
        }
        self.tracker.resize(log.command_count());

        let max = log.max_action();
        let mut session = ReplaySession::new(log);
        match self.store.at_action(ActionIndex::FIRST) {
            Some(id) => {
                restore_checkpoint(&mut self.sim, &mut self.store, &mut session, &mut self.stats, id)
                    .map_err(|source| ReplayError::CheckpointRestore {
                        action: ActionIndex::FIRST,
                        source,
                    })?;
            }
            None => {
                let initial = Checkpoint::new(
                    ActionIndex::FIRST,
                    self.sim.move_index(),
                    CheckpointState::Blob(self.sim.save_state()),
                    0,
                );
                self.store.create_or_replace(initial);
                self.stats.checkpoints_created += 1;
            }
        }

        info!(
            session = %identity,
            commands = session.log.command_count(),
            resumed = !fresh,
            "replay session started"
        );
        self.session = Some(session);
        self.state = SeekStatus::Idle;
        self.throttle.reset();
        Ok(max)
    }

    /// Close the open session, handing the input surface back to the live
    /// provider. Checkpoints are kept for a later session of the same
    /// identity.
    pub fn end_replay(&mut self) -> Result<(), ReplayError> {
        let session = self.session.take().ok_or(ReplayError::NoSession)?;
        if self.shim.is_active() {
            self.sim.recompute_derived();
            self.shim.exit(false);
        }
        self.state = SeekStatus::Idle;
        info!(session = %session.id(), action = %session.current, "replay session ended");
        Ok(())
    }

    // ── Seeking ─────────────────────────────────────────────────

    /// Seek by a signed delta in actions or moves and run to completion.
    ///
    /// The lower bound clamps to the first action (or move zero). Seeking
    /// past the end of the log finishes as [`SeekStatus::Exhausted`].
    pub fn seek(&mut self, delta: i64, by_moves: bool) -> Result<SeekStatus, ReplayError> {
        let session = self.session.as_ref().ok_or(ReplayError::NoSession)?;
        let target = if by_moves {
            Target::Move(self.sim.move_index().offset(delta))
        } else {
            Target::Action(session.current.offset(delta))
        };
        self.aim(target)?;
        self.run()
    }

    /// Seek to an absolute action or move and run to completion.
    /// Position `0` means the end of the log.
    pub fn goto(&mut self, position: u64, by_moves: bool) -> Result<SeekStatus, ReplayError> {
        let session = self.session.as_ref().ok_or(ReplayError::NoSession)?;
        let target = match (position, by_moves) {
            (0, _) => Target::Action(session.log.max_action()),
            (action, false) => Target::Action(ActionIndex(action)),
            (moves, true) => Target::Move(MoveIndex(moves)),
        };
        self.aim(target)?;
        self.run()
    }

    /// Step `count` actions and report whether the position changed.
    pub fn step(&mut self, count: u64, direction: Direction) -> Result<bool, ReplayError> {
        let before = self.current_position().ok_or(ReplayError::NoSession)?;
        if count == 0 {
            return Ok(false);
        }
        let magnitude = i64::try_from(count).unwrap_or(i64::MAX);
        let delta = match direction {
            Direction::Forward => magnitude,
            Direction::Backward => -magnitude,
        };
        self.seek(delta, false)?;
        Ok(self.current_position() != Some(before))
    }

    /// Throttled forward [`step`](Self::step) for key-repeat driven callers.
    pub fn try_advance(&mut self, now: Instant, count: u64) -> Result<Advance, ReplayError> {
        if self.session.is_none() {
            return Err(ReplayError::NoSession);
        }
        if !self.throttle.admit(now) {
            return Ok(Advance::Swallowed);
        }
        Ok(Advance::Stepped(self.step(count, Direction::Forward)?))
    }

    /// Set a new seek target without running it.
    ///
    /// Overwrites any seek in progress; the controller resumes from wherever
    /// it currently is. Drive it with [`poll`](Self::poll) or
    /// [`run`](Self::run).
    pub fn aim(&mut self, target: Target) -> Result<(), ReplayError> {
        let moves = self.sim.move_index();
        let session = self.session.as_mut().ok_or(ReplayError::NoSession)?;
        session.aim(target, moves);
        debug!(target = ?session.target, from = %session.current, direction = ?session.direction, "seek started");
        self.shim.enter();
        self.state = SeekStatus::Seeking;
        Ok(())
    }

    /// Poll until the current seek finishes.
    pub fn run(&mut self) -> Result<SeekStatus, ReplayError> {
        loop {
            match self.poll()? {
                SeekStatus::Seeking => {}
                done => return Ok(done),
            }
        }
    }

    /// Do one unit of seek work and report the resulting state.
    ///
    /// A fatal error aborts the session: the shim is exited silently, live
    /// state is rolled back to the nearest checkpoint at or behind the
    /// current position, and the session is closed.
    pub fn poll(&mut self) -> Result<SeekStatus, ReplayError> {
        if self.session.is_none() {
            return Err(ReplayError::NoSession);
        }
        if self.state != SeekStatus::Seeking {
            return Ok(self.state);
        }
        match self.poll_seeking() {
            Err(err) if err.is_fatal() => Err(self.abort(err)),
            other => other,
        }
    }

    fn poll_seeking(&mut self) -> Result<SeekStatus, ReplayError> {
        let session = self.session.as_mut().ok_or(ReplayError::NoSession)?;
        if !session.jumped {
            session.jumped = true;
            self.jump_if_profitable()?;
        }

        let moves = self.sim.move_index();
        let session = self.session.as_mut().ok_or(ReplayError::NoSession)?;
        let current = session.current;
        let target = session.target;
        match target {
            Target::Action(target) if current == target => {
                return Ok(self.finish(SeekStatus::AtGoal));
            }
            Target::Action(target) if current > target => {
                // Only reachable when the jump was skipped; force it.
                session.jumped = false;
                return Ok(SeekStatus::Seeking);
            }
            Target::Move(target) if moves == target => {
                return Ok(self.finish(SeekStatus::AtGoal));
            }
            Target::Move(target) if moves > target => {
                // One action spanned several moves and stepped over the
                // target: settle on the last action before it.
                debug!(target = %target, reached = %moves, "overshot move target");
                session.aim(Target::Action(current.prev()), moves);
                return Ok(SeekStatus::Seeking);
            }
            _ => {}
        }
        if current >= session.log.max_action() {
            return Ok(self.finish(SeekStatus::Exhausted));
        }

        self.step_once()?;
        self.maybe_checkpoint();
        Ok(SeekStatus::Seeking)
    }

    fn finish(&mut self, status: SeekStatus) -> SeekStatus {
        let current = self
            .session
            .as_ref()
            .map_or(ActionIndex::FIRST, |s| s.current);
        let pruned = self
            .store
            .prune_desync(self.config.desync_checkpoint_budget, current);
        if pruned > 0 {
            self.stats.checkpoints_pruned += pruned as u64;
            debug!(pruned, kept = self.store.desync_count(), "pruned desync checkpoints");
        }
        self.sim.recompute_derived();
        self.shim.exit(false);
        self.state = status;
        info!(action = %current, moves = %self.sim.move_index(), ?status, "seek finished");
        status
    }

    // ── Checkpoint jumps ────────────────────────────────────────

    /// Restore a checkpoint if the target is behind, or far enough ahead
    /// that skipping forward beats stepping.
    fn jump_if_profitable(&mut self) -> Result<(), ReplayError> {
        loop {
            let threshold = self.config.jump_threshold;
            let session = self.session.as_mut().ok_or(ReplayError::NoSession)?;
            let current = session.current;
            let target = session.target_action();
            let backward = target < current;
            if !backward && current.distance_to(target) <= threshold {
                return Ok(());
            }

            let Some((id, landing)) = pick_checkpoint(&self.store, target) else {
                if backward {
                    panic!("checkpoint chain has no entry at or before action {target}");
                }
                return Ok(());
            };
            let (cp_action, from_action) = match self.store.get(id) {
                Some(cp) => (cp.action, cp.from_action),
                None => panic!("checkpoint {id} vanished during a jump"),
            };
            if !backward && from_action <= current {
                return Ok(());
            }
            if landing != target {
                debug!(target = %target, landing = %landing, "target inside a desync gap, clamped");
                session.target = Target::Action(landing);
            }
            if backward && from_action >= current {
                return Ok(());
            }

            match restore_checkpoint(&mut self.sim, &mut self.store, session, &mut self.stats, id) {
                Ok(()) => return Ok(()),
                Err(source) if cp_action == ActionIndex::FIRST => {
                    return Err(ReplayError::CheckpointRestore {
                        action: cp_action,
                        source,
                    });
                }
                Err(source) => {
                    warn!(action = %cp_action, error = %source, "checkpoint restore failed, falling back");
                    self.store.remove(id);
                }
            }
        }
    }

    // ── Forward stepping ────────────────────────────────────────

    fn step_once(&mut self) -> Result<(), ReplayError> {
        let action = self.session.as_ref().ok_or(ReplayError::NoSession)?.current;
        let prefer_change = self.tracker.must_resimulate(action);
        let fed = self.feed(action, prefer_change)?;
        if fed.diverged {
            self.recover(action)
        } else {
            self.tracker.mark_safe(action);
            Ok(())
        }
    }

    /// Feed the command at `action` to the simulation, or apply its
    /// recorded change when `prefer_change` is set and one exists. Consumes
    /// the command's trailing records and validates the result.
    fn feed(&mut self, action: ActionIndex, prefer_change: bool) -> Result<Fed, ReplayError> {
        let Self {
            sim,
            shim,
            stats,
            session,
            ..
        } = self;
        let session = session.as_mut().ok_or(ReplayError::NoSession)?;

        let Some(record) = next_command(sim, session) else {
            panic!("log ended before the command for action {action}");
        };
        if record.action != action {
            panic!(
                "log cursor is at action {} while replay is at {action}",
                record.action
            );
        }

        let change = if prefer_change {
            session.log.change_for(action).map(|(index, _)| index)
        } else {
            None
        };
        let mut diverged = false;
        match change.and_then(|index| session.log.change_at(index)) {
            Some(image) => {
                sim.apply_change(image)
                    .map_err(|source| ReplayError::Simulation { action, source })?;
                stats.changes_applied += 1;
            }
            None => {
                if let Err(mismatch) = session.log.validate_rng(action, sim.rng_checksum()) {
                    debug!(%mismatch, "rng checksum mismatch");
                    diverged = true;
                }
                shim.arm(&record.answers);
                let result = sim.execute(&record.command, &mut *shim);
                stats.commands_executed += 1;
                if let Some(call) = shim.take_invalid() {
                    shim.disarm();
                    return Err(ReplayError::InvalidDuringReplay { call });
                }
                match result {
                    Ok(()) => {}
                    Err(SimulationError::Input(InputError::AnswerMismatch { .. })) => {}
                    Err(SimulationError::Input(InputError::InvalidDuringReplay { call })) => {
                        shim.disarm();
                        return Err(ReplayError::InvalidDuringReplay { call });
                    }
                    Err(source) => {
                        shim.disarm();
                        return Err(ReplayError::Simulation { action, source });
                    }
                }
                if shim.take_mismatch().is_some() || shim.leftover_answers() > 0 {
                    debug!(action = %action, "recorded answers did not fit the prompts");
                    diverged = true;
                }
                shim.disarm();
            }
        }

        skip_trailers(&mut session.log, action);
        session.current = action.next();
        if let Err(mismatch) = session.log.validate(action, sim.state_hash()) {
            debug!(%mismatch, "state checksum mismatch");
            diverged = true;
        }
        Ok(Fed { diverged, change })
    }

    fn maybe_checkpoint(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let at = session.current;
        if !session.in_sync
            || !self.config.is_checkpoint_action(at.0)
            || self.sim.multi_step_in_progress()
            || self.tracker.must_resimulate(at)
            || self.store.at_action(at).is_some()
        {
            return;
        }
        let checkpoint = Checkpoint::new(
            at,
            self.sim.move_index(),
            CheckpointState::Blob(self.sim.save_state()),
            session.log.cursor(),
        );
        self.store.create_or_replace(checkpoint);
        self.stats.checkpoints_created += 1;
        debug!(action = %at, "periodic checkpoint created");
    }

    // ── Desync recovery ─────────────────────────────────────────

    /// Handle a divergence detected while replaying `detected`.
    ///
    /// Marks everything since the last periodic checkpoint, then moves
    /// forward change by change until the state matches the log again or
    /// the seek target is reached, and anchors a desync checkpoint at the
    /// point where sync was regained.
    fn recover(&mut self, detected: ActionIndex) -> Result<(), ReplayError> {
        self.stats.desyncs += 1;
        let since = last_periodic_at_or_before(&self.store, detected);
        if self.tracker.record(since, detected) {
            warn!(action = %detected, since = %since, "replay desync detected");
            self.shim.live_mut().diagnostic(&format!(
                "Replay diverged from the recording at action {detected}; continuing from recorded changes."
            ));
        } else {
            debug!(action = %detected, since = %since, "replay desync detected");
        }

        let session = self.session.as_ref().ok_or(ReplayError::NoSession)?;
        let (to, max) = (session.target_action(), session.log.max_action());

        let mut cur = detected;
        let mut resolved = self.apply_recorded_change(cur)?;
        while resolved.is_none() {
            let at = cur.next();
            if reached_target(at, to, at >= max) {
                break;
            }
            let fed = self.feed(at, true)?;
            self.tracker.mark_crossed(at);
            cur = at;
            if !fed.diverged {
                resolved = Some(match fed.change {
                    Some(index) => CheckpointState::LogOffset(index),
                    None => CheckpointState::Blob(self.sim.save_state()),
                });
            }
        }

        let from_move = self.sim.move_index();
        let session = self.session.as_mut().ok_or(ReplayError::NoSession)?;
        session.in_sync = resolved.is_some();
        let reached = session.current;
        let Some(state) = resolved else {
            debug!(action = %reached, "recovery stopped before regaining sync");
            return Ok(());
        };
        let anchored = self
            .store
            .at_action(detected)
            .and_then(|id| self.store.get(id))
            .is_some_and(|cp| cp.origin == Origin::Periodic);
        if anchored {
            debug!(action = %detected, "periodic checkpoint already anchors the desync");
            return Ok(());
        }
        let moves = session.log.moves_at(detected).unwrap_or_default();
        let checkpoint = Checkpoint::new(detected, moves, state, session.log.cursor())
            .resumed_from(reached, from_move);
        self.store.create_or_replace(checkpoint);
        self.stats.checkpoints_created += 1;
        debug!(action = %detected, from = %reached, "desync checkpoint created");
        Ok(())
    }

    /// Apply the change recorded after `action`, if any, and report the
    /// checkpoint state to anchor on if the result matches the log.
    fn apply_recorded_change(
        &mut self,
        action: ActionIndex,
    ) -> Result<Option<CheckpointState>, ReplayError> {
        let Self {
            sim,
            session,
            stats,
            ..
        } = self;
        let session = session.as_mut().ok_or(ReplayError::NoSession)?;
        let Some((index, image)) = session.log.change_for(action) else {
            return Ok(None);
        };
        sim.apply_change(image)
            .map_err(|source| ReplayError::Simulation { action, source })?;
        stats.changes_applied += 1;
        Ok(session
            .log
            .validate(action, sim.state_hash())
            .is_ok()
            .then_some(CheckpointState::LogOffset(index)))
    }

    // ── Fatal abort ─────────────────────────────────────────────

    fn abort(&mut self, err: ReplayError) -> ReplayError {
        error!(error = %err, "replay session aborted");
        self.shim.exit(true);
        if let Some(mut session) = self.session.take() {
            let mut cursor = self.store.nearest_behind(session.current);
            while let Some(id) = cursor {
                let (usable, prev) = match self.store.get(id) {
                    Some(cp) => (cp.from_action <= session.current, cp.prev()),
                    None => break,
                };
                if usable
                    && restore_checkpoint(&mut self.sim, &mut self.store, &mut session, &mut self.stats, id)
                        .is_ok()
                {
                    debug!(action = %session.current, "rolled back after abort");
                    break;
                }
                cursor = prev;
            }
        }
        self.state = SeekStatus::Idle;
        err
    }

    // ── Accessors ───────────────────────────────────────────────

    /// Current position, if a session is open.
    pub fn current_position(&self) -> Option<Position> {
        self.session.as_ref().map(|s| Position {
            action: s.current,
            moves: self.sim.move_index(),
        })
    }

    /// Position after the last recorded command, if a session is open.
    pub fn max_position(&self) -> Option<Position> {
        self.session.as_ref().map(|s| Position {
            action: s.log.max_action(),
            moves: s.log.final_moves(),
        })
    }

    /// The recorded command at the current position, not yet executed.
    pub fn pending_command(&self) -> Option<&Command> {
        self.session.as_ref()?.pending_command()
    }

    /// Whether a desync has been detected for the current session identity.
    pub fn is_desynced(&self) -> bool {
        self.tracker.is_desynced()
    }

    /// Controller state.
    pub fn state(&self) -> SeekStatus {
        self.state
    }

    /// Cumulative work counters.
    pub fn stats(&self) -> ReplayStats {
        self.stats
    }

    /// The configuration in use.
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// The open session.
    pub fn session(&self) -> Option<&ReplaySession> {
        self.session.as_ref()
    }

    /// The checkpoint chain.
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.store
    }

    /// Desync marks and flags.
    pub fn tracker(&self) -> &DesyncTracker {
        &self.tracker
    }

    /// The simulation being replayed.
    pub fn simulation(&self) -> &S {
        &self.sim
    }

    /// The live input provider.
    pub fn live(&self) -> &P {
        self.shim.live()
    }

    /// Take the replayer apart.
    pub fn into_parts(self) -> (S, P) {
        (self.sim, self.shim.into_live())
    }
}

// ── Helpers ─────────────────────────────────────────────────────

/// The latest checkpoint usable for reaching `target`, and where it lands.
///
/// Walks back from the nearest checkpoint at or before `target`. A
/// checkpoint whose resume point is at or before `target` is used as is. A
/// desync checkpoint whose gap contains `target` is used too, with the
/// landing clamped up to its resume point.
fn pick_checkpoint(
    store: &CheckpointStore,
    target: ActionIndex,
) -> Option<(CheckpointId, ActionIndex)> {
    let mut cursor = store.nearest_behind(target);
    while let Some(id) = cursor {
        let cp = store.get(id)?;
        if cp.from_action <= target {
            return Some((id, target));
        }
        if cp.covers(target) {
            return Some((id, cp.from_action));
        }
        cursor = cp.prev();
    }
    None
}

fn last_periodic_at_or_before(store: &CheckpointStore, action: ActionIndex) -> ActionIndex {
    let mut cursor = store.nearest_behind(action);
    while let Some(id) = cursor {
        let Some(cp) = store.get(id) else {
            break;
        };
        if cp.origin == Origin::Periodic {
            return cp.action;
        }
        cursor = cp.prev();
    }
    ActionIndex::FIRST
}

/// Replace live state with a checkpoint and move the log cursor to its
/// resume point.
fn restore_checkpoint<S: Simulation>(
    sim: &mut S,
    store: &mut CheckpointStore,
    session: &mut ReplaySession,
    stats: &mut ReplayStats,
    id: CheckpointId,
) -> Result<(), SimulationError> {
    let Some(cp) = store.begin_restore(id) else {
        panic!("restore of unlinked checkpoint {id}");
    };
    let (from_action, resume_record, fast) = (cp.from_action, cp.resume_record, cp.state.is_blob());
    let loaded = match &cp.state {
        CheckpointState::Blob(image) => sim.load_state(image),
        CheckpointState::LogOffset(index) => match session.log.change_at(*index) {
            Some(image) => sim.apply_change(image),
            None => Err(SimulationError::CorruptState {
                reason: format!("log record {index} holds no state change"),
            }),
        },
    };
    store.end_restore();
    loaded?;

    sim.recompute_derived();
    session.rewind_to(resume_record);
    session.current = from_action;
    session.in_sync = true;
    if fast {
        stats.fast_restores += 1;
    } else {
        stats.slow_restores += 1;
    }
    debug!(checkpoint = %id, action = %from_action, fast, "checkpoint restored");
    Ok(())
}

/// Consume records up to and including the next command, applying option
/// changes and timestamps on the way.
fn next_command<S: Simulation>(sim: &mut S, session: &mut ReplaySession) -> Option<CommandRecord> {
    loop {
        match session.log.next_record()? {
            LogRecord::Command(record) => return Some(record.clone()),
            LogRecord::OptionChange { name, value } => {
                sim.set_option(name, value);
                session.options.insert(name.clone(), value.clone());
            }
            LogRecord::Timestamp { unix_secs } => session.last_timestamp = Some(*unix_secs),
            LogRecord::ResultChecksum { .. } | LogRecord::StateChange { .. } => {}
        }
    }
}

/// Consume the checksum and change records that follow `action`'s command.
fn skip_trailers(log: &mut LogReader, action: ActionIndex) {
    while let Some(
        LogRecord::ResultChecksum { action: owner, .. } | LogRecord::StateChange { action: owner, .. },
    ) = log.peek()
    {
        if *owner != action {
            break;
        }
        log.next_record();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_core::MoveIndex;
    use retrace_test_utils::{record_log, LogBuilder, MockSimulation, ScriptedInput};

    fn periodic(action: u64) -> Checkpoint {
        Checkpoint::new(ActionIndex(action), MoveIndex(action), CheckpointState::Blob(vec![]), 0)
    }

    fn chain() -> CheckpointStore {
        let mut store = CheckpointStore::new();
        store.create_or_replace(periodic(1));
        store.create_or_replace(periodic(51));
        store.create_or_replace(
            periodic(100).resumed_from(ActionIndex(104), MoveIndex(110)),
        );
        store
    }

    fn replayer(seed: u64) -> Replayer<MockSimulation, ScriptedInput> {
        Replayer::new(MockSimulation::new(seed), ScriptedInput::new(), ReplayConfig::default()).unwrap()
    }

    #[test]
    fn pick_uses_nearest_checkpoint_at_or_behind() {
        let store = chain();
        let (id, landing) = pick_checkpoint(&store, ActionIndex(99)).unwrap();
        assert_eq!(store.get(id).unwrap().action, ActionIndex(51));
        assert_eq!(landing, ActionIndex(99));
    }

    #[test]
    fn pick_clamps_targets_inside_a_desync_gap() {
        let store = chain();
        let (id, landing) = pick_checkpoint(&store, ActionIndex(102)).unwrap();
        assert_eq!(store.get(id).unwrap().action, ActionIndex(100));
        assert_eq!(landing, ActionIndex(104));

        let (id, landing) = pick_checkpoint(&store, ActionIndex(130)).unwrap();
        assert_eq!(store.get(id).unwrap().action, ActionIndex(100));
        assert_eq!(landing, ActionIndex(130));
    }

    #[test]
    fn pick_skips_desync_checkpoint_at_its_own_nominal_action() {
        let store = chain();
        let (id, landing) = pick_checkpoint(&store, ActionIndex(100)).unwrap();
        assert_eq!(store.get(id).unwrap().action, ActionIndex(51));
        assert_eq!(landing, ActionIndex(100));
    }

    #[test]
    fn last_periodic_ignores_desync_checkpoints() {
        let store = chain();
        assert_eq!(last_periodic_at_or_before(&store, ActionIndex(120)), ActionIndex(51));
        assert_eq!(last_periodic_at_or_before(&store, ActionIndex(20)), ActionIndex(1));
        assert_eq!(last_periodic_at_or_before(&CheckpointStore::new(), ActionIndex(9)), ActionIndex::FIRST);
    }

    #[test]
    fn begin_replay_creates_the_initial_checkpoint() {
        let mut r = replayer(3);
        let max = r.begin_replay(&record_log("val", 3, 40)).unwrap();
        assert_eq!(max, ActionIndex(41));
        assert_eq!(r.state(), SeekStatus::Idle);
        assert_eq!(r.checkpoints().len(), 1);
        assert_eq!(r.current_position(), Some(Position::new(1, 0)));
        assert_eq!(r.max_position().unwrap().action, max);
    }

    #[test]
    fn second_begin_is_rejected() {
        let mut r = replayer(3);
        let log = record_log("val", 3, 10);
        r.begin_replay(&log).unwrap();
        assert!(matches!(r.begin_replay(&log), Err(ReplayError::SessionActive)));
    }

    #[test]
    fn operations_need_a_session() {
        let mut r = replayer(3);
        assert!(matches!(r.seek(1, false), Err(ReplayError::NoSession)));
        assert!(matches!(r.poll(), Err(ReplayError::NoSession)));
        assert!(matches!(r.end_replay(), Err(ReplayError::NoSession)));
        assert!(r.current_position().is_none());
        assert!(r.pending_command().is_none());
    }

    #[test]
    fn poll_does_one_command_per_call() {
        let mut r = replayer(8);
        r.begin_replay(&record_log("val", 8, 30)).unwrap();
        r.aim(Target::Action(ActionIndex(4))).unwrap();
        assert_eq!(r.poll().unwrap(), SeekStatus::Seeking);
        assert_eq!(r.simulation().executed(), &[1]);
        assert_eq!(r.poll().unwrap(), SeekStatus::Seeking);
        assert_eq!(r.poll().unwrap(), SeekStatus::Seeking);
        assert_eq!(r.poll().unwrap(), SeekStatus::AtGoal);
        assert_eq!(r.simulation().executed(), &[1, 2, 3]);
        // Finished seeks report their outcome without doing more work.
        assert_eq!(r.poll().unwrap(), SeekStatus::AtGoal);
        assert_eq!(r.stats().commands_executed, 3);
    }

    #[test]
    fn pending_command_is_the_next_recorded_one() {
        let builder = LogBuilder::new("val", 5).actions(20);
        let log = builder.build();
        let reader = retrace_log::LogReader::from_bytes(&log).unwrap();
        let mut r = replayer(5);
        r.begin_replay(&log).unwrap();
        r.goto(6, false).unwrap();
        assert_eq!(r.pending_command(), Some(&reader.command(ActionIndex(6)).unwrap().command));
        r.goto(0, false).unwrap();
        assert!(r.pending_command().is_none());
    }

    #[test]
    fn finished_seek_rebuilds_derived_state_and_refreshes_once() {
        let mut r = replayer(5);
        r.begin_replay(&record_log("val", 5, 20)).unwrap();
        r.goto(12, false).unwrap();
        assert!(r.simulation().derived_fresh());
        assert_eq!(r.live().refreshes(), 1);
        assert!(r.live().messages().is_empty());
    }
}
