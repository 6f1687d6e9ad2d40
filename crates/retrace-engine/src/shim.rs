//! The input surface the simulation talks to during replay.
//!
//! [`InterceptionShim`] wraps the live [`InputProvider`]. While inactive it
//! forwards every call. While active it classifies each call:
//!
//! | Call | During replay |
//! |------|---------------|
//! | `show_message`, `update_status`, `redraw_map`, `delay`, `full_refresh` | dropped |
//! | `query` | next canned answer from the command record |
//! | `diagnostic` | passed through to the live provider |
//! | `request_command`, `confirm_save` | `InvalidDuringReplay` |
//!
//! The shim holds no simulation data. What it observes (a missing answer,
//! a mismatched one) is left for the controller to collect after each
//! command.

use std::collections::VecDeque;

use retrace_core::{Answer, Command, InputError, InputProvider, Query};

/// Replay-time wrapper around the live input provider.
///
/// # Examples
///
/// ```
/// use retrace_core::{Answer, InputProvider, Query, QueryKind};
/// use retrace_engine::InterceptionShim;
/// use retrace_test_utils::ScriptedInput;
///
/// let mut shim = InterceptionShim::new(ScriptedInput::new());
/// assert!(shim.enter());
/// assert!(!shim.enter());
///
/// shim.arm(&[Answer::Choice('y')]);
/// shim.show_message("You hear a door open.");
/// let answer = shim.query(&Query::new(QueryKind::Choice, "Really attack?")).unwrap();
/// assert_eq!(answer, Answer::Choice('y'));
///
/// shim.exit(true);
/// assert!(shim.live().messages().is_empty());
/// ```
#[derive(Debug)]
pub struct InterceptionShim<P: InputProvider> {
    live: P,
    active: bool,
    answers: VecDeque<Answer>,
    /// First answer that did not fit its prompt during the current command.
    mismatch: Option<InputError>,
    /// First call with no replay meaning during the current command.
    invalid: Option<String>,
}

impl<P: InputProvider> InterceptionShim<P> {
    /// Wrap `live`, initially inactive.
    pub fn new(live: P) -> Self {
        Self {
            live,
            active: false,
            answers: VecDeque::new(),
            mismatch: None,
            invalid: None,
        }
    }

    /// Start intercepting. Re-entry while active is a no-op.
    ///
    /// Returns whether the shim was switched on by this call.
    pub fn enter(&mut self) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        true
    }

    /// Stop intercepting and hand the surface back to the live provider.
    ///
    /// `silent` skips the full refresh; error paths use it so a failing
    /// display cannot cascade.
    pub fn exit(&mut self, silent: bool) {
        if !self.active {
            return;
        }
        self.active = false;
        self.disarm();
        if !silent {
            self.live.full_refresh();
        }
    }

    /// Whether replay interception is on.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Load the canned answers for the next command.
    pub fn arm(&mut self, answers: &[Answer]) {
        self.answers.clear();
        self.answers.extend(answers.iter().cloned());
        self.mismatch = None;
        self.invalid = None;
    }

    /// Drop any answers and observations left from the last command.
    pub fn disarm(&mut self) {
        self.answers.clear();
        self.mismatch = None;
        self.invalid = None;
    }

    /// Canned answers the last command did not ask for.
    pub fn leftover_answers(&self) -> usize {
        self.answers.len()
    }

    /// The first answer mismatch seen since [`arm`](Self::arm).
    pub fn take_mismatch(&mut self) -> Option<InputError> {
        self.mismatch.take()
    }

    /// The first call with no replay meaning seen since [`arm`](Self::arm).
    pub fn take_invalid(&mut self) -> Option<String> {
        self.invalid.take()
    }

    /// The live provider.
    pub fn live(&self) -> &P {
        &self.live
    }

    /// The live provider, mutably. Bypasses interception.
    pub fn live_mut(&mut self) -> &mut P {
        &mut self.live
    }

    /// Unwrap the live provider.
    pub fn into_live(self) -> P {
        self.live
    }

    fn reject(&mut self, call: &str) -> InputError {
        if self.invalid.is_none() {
            self.invalid = Some(call.to_string());
        }
        InputError::InvalidDuringReplay {
            call: call.to_string(),
        }
    }
}

impl<P: InputProvider> InputProvider for InterceptionShim<P> {
    fn show_message(&mut self, text: &str) {
        if !self.active {
            self.live.show_message(text);
        }
    }

    fn update_status(&mut self) {
        if !self.active {
            self.live.update_status();
        }
    }

    fn redraw_map(&mut self) {
        if !self.active {
            self.live.redraw_map();
        }
    }

    fn delay(&mut self, millis: u32) {
        if !self.active {
            self.live.delay(millis);
        }
    }

    fn query(&mut self, query: &Query) -> Result<Answer, InputError> {
        if !self.active {
            return self.live.query(query);
        }
        let Some(answer) = self.answers.pop_front() else {
            return Err(self.reject("query"));
        };
        if answer.kind() != query.kind {
            let err = InputError::AnswerMismatch {
                recorded: answer.kind(),
                requested: query.kind,
            };
            if self.mismatch.is_none() {
                self.mismatch = Some(err.clone());
            }
            return Err(err);
        }
        Ok(answer)
    }

    fn diagnostic(&mut self, text: &str) {
        self.live.diagnostic(text);
    }

    fn request_command(&mut self) -> Result<Command, InputError> {
        if !self.active {
            return self.live.request_command();
        }
        Err(self.reject("request_command"))
    }

    fn confirm_save(&mut self) -> Result<bool, InputError> {
        if !self.active {
            return self.live.confirm_save();
        }
        Err(self.reject("confirm_save"))
    }

    fn full_refresh(&mut self) {
        if !self.active {
            self.live.full_refresh();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_core::QueryKind;
    use retrace_test_utils::{InputCall, ScriptedInput};

    fn active_shim() -> InterceptionShim<ScriptedInput> {
        let mut shim = InterceptionShim::new(ScriptedInput::new());
        shim.enter();
        shim
    }

    #[test]
    fn inactive_shim_forwards_everything() {
        let mut shim = InterceptionShim::new(ScriptedInput::new().with_answers([Answer::Choice('n')]));
        shim.show_message("hello");
        shim.redraw_map();
        let answer = shim.query(&Query::new(QueryKind::Choice, "?")).unwrap();
        assert_eq!(answer, Answer::Choice('n'));
        let calls = shim.live().calls();
        assert!(matches!(calls[0], InputCall::ShowMessage(ref t) if t == "hello"));
        assert_eq!(calls[1], InputCall::RedrawMap);
    }

    #[test]
    fn display_calls_are_dropped_while_active() {
        let mut shim = active_shim();
        shim.show_message("You see here a scroll.");
        shim.update_status();
        shim.redraw_map();
        shim.delay(50);
        shim.full_refresh();
        assert!(shim.live().calls().is_empty());
    }

    #[test]
    fn diagnostics_pass_through_while_active() {
        let mut shim = active_shim();
        shim.diagnostic("level 3 generated");
        assert_eq!(
            shim.live().calls(),
            &[InputCall::Diagnostic("level 3 generated".into())]
        );
    }

    #[test]
    fn answers_are_served_in_order() {
        let mut shim = active_shim();
        shim.arm(&[Answer::Choice('y'), Answer::Line("Elbereth".into())]);
        let first = shim.query(&Query::new(QueryKind::Choice, "Continue?")).unwrap();
        let second = shim.query(&Query::new(QueryKind::Line, "Engrave what?")).unwrap();
        assert_eq!(first, Answer::Choice('y'));
        assert_eq!(second, Answer::Line("Elbereth".into()));
        assert_eq!(shim.leftover_answers(), 0);
    }

    #[test]
    fn missing_answer_is_invalid_during_replay() {
        let mut shim = active_shim();
        shim.arm(&[]);
        let err = shim.query(&Query::new(QueryKind::Direction, "In what direction?")).unwrap_err();
        assert!(matches!(err, InputError::InvalidDuringReplay { ref call } if call == "query"));
        assert_eq!(shim.take_invalid().as_deref(), Some("query"));
        assert!(shim.take_invalid().is_none());
    }

    #[test]
    fn wrong_answer_kind_is_recorded_as_mismatch() {
        let mut shim = active_shim();
        shim.arm(&[Answer::Choice('y')]);
        let err = shim.query(&Query::new(QueryKind::Menu, "Pick up what?")).unwrap_err();
        assert!(matches!(err, InputError::AnswerMismatch { .. }));
        assert!(shim.take_mismatch().is_some());
    }

    #[test]
    fn commands_and_save_prompts_have_no_replay_meaning() {
        let mut shim = active_shim();
        assert!(shim.request_command().is_err());
        assert!(shim.confirm_save().is_err());
        assert_eq!(shim.take_invalid().as_deref(), Some("request_command"));
    }

    #[test]
    fn exit_refreshes_unless_silent() {
        let mut shim = active_shim();
        shim.exit(false);
        assert_eq!(shim.live().calls(), &[InputCall::FullRefresh]);

        let mut shim = active_shim();
        shim.exit(true);
        assert!(shim.live().calls().is_empty());
        // Exiting twice is harmless.
        shim.exit(false);
        assert!(shim.live().calls().is_empty());
    }

    #[test]
    fn exit_discards_unused_answers() {
        let mut shim = active_shim();
        shim.arm(&[Answer::Choice('y')]);
        shim.exit(true);
        assert_eq!(shim.leftover_answers(), 0);
    }
}
