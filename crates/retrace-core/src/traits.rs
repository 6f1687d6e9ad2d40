//! Collaborator traits: the simulation being replayed and the input
//! surface it talks to.

use crate::command::{Answer, Command, Query};
use crate::error::{InputError, SimulationError};
use crate::id::MoveIndex;

/// Every interactive request the simulation can make.
///
/// Implemented by the live front end and by the replay shim. Calls fall
/// into four groups that the shim treats differently:
///
/// - display-only: [`show_message`](Self::show_message),
///   [`update_status`](Self::update_status), [`redraw_map`](Self::redraw_map),
///   [`delay`](Self::delay)
/// - answered from the log: [`query`](Self::query)
/// - informational: [`diagnostic`](Self::diagnostic)
/// - no replay meaning: [`request_command`](Self::request_command),
///   [`confirm_save`](Self::confirm_save)
pub trait InputProvider {
    /// Show a message line.
    fn show_message(&mut self, text: &str);

    /// Redraw the status area.
    fn update_status(&mut self);

    /// Redraw the map.
    fn redraw_map(&mut self);

    /// Pause for an animation frame.
    fn delay(&mut self, millis: u32);

    /// Ask the player a question.
    fn query(&mut self, query: &Query) -> Result<Answer, InputError>;

    /// Developer-facing diagnostic text. Never affects the simulation.
    fn diagnostic(&mut self, text: &str);

    /// Ask for the next top-level command.
    fn request_command(&mut self) -> Result<Command, InputError>;

    /// Ask whether to save before quitting.
    fn confirm_save(&mut self) -> Result<bool, InputError>;

    /// Recompute visibility and redraw everything, then flush.
    fn full_refresh(&mut self);
}

/// The deterministic, turn-based simulation being replayed.
///
/// The engine never looks inside state images; it only moves them between
/// the simulation, the checkpoint store, and the log.
pub trait Simulation {
    /// Run one recorded command to completion.
    ///
    /// Every prompt the command raises goes through `input`.
    fn execute(
        &mut self,
        command: &Command,
        input: &mut dyn InputProvider,
    ) -> Result<(), SimulationError>;

    /// Current turn counter.
    fn move_index(&self) -> MoveIndex;

    /// Checksum of the RNG state.
    fn rng_checksum(&self) -> u64;

    /// Hash of the complete simulation state.
    fn state_hash(&self) -> u64;

    /// Whether a multi-turn action (an occupation) is still in progress.
    fn multi_step_in_progress(&self) -> bool;

    /// Serialize the complete state.
    fn save_state(&self) -> Vec<u8>;

    /// Replace the complete state from an image produced by [`save_state`](Self::save_state).
    fn load_state(&mut self, image: &[u8]) -> Result<(), SimulationError>;

    /// Apply one recorded change record.
    ///
    /// Change records come from the log and hold whatever the recorder
    /// wrote after a command; applying one leaves the simulation in the
    /// recorded post-command state.
    fn apply_change(&mut self, change: &[u8]) -> Result<(), SimulationError>;

    /// Apply a recorded option change.
    fn set_option(&mut self, name: &str, value: &str);

    /// Rebuild cached display state (visibility, status, inventory view)
    /// after a wholesale state replacement.
    fn recompute_derived(&mut self);
}
