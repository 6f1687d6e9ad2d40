//! A scripted [`InputProvider`] that logs every call.

use std::collections::VecDeque;

use retrace_core::{Answer, Command, InputError, InputProvider, Query};

/// One call made against a [`ScriptedInput`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputCall {
    ShowMessage(String),
    UpdateStatus,
    RedrawMap,
    Delay(u32),
    Query(Query),
    Diagnostic(String),
    RequestCommand,
    ConfirmSave,
    FullRefresh,
}

/// Live input stand-in.
///
/// Queries are answered from a preloaded queue and fail with
/// [`InputError::Cancelled`] once it runs dry. Every call is appended to
/// [`calls`](ScriptedInput::calls) for later assertions.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    answers: VecDeque<Answer>,
    calls: Vec<InputCall>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue answers for upcoming queries.
    pub fn with_answers(mut self, answers: impl IntoIterator<Item = Answer>) -> Self {
        self.answers.extend(answers);
        self
    }

    /// Every call seen so far, in order.
    pub fn calls(&self) -> &[InputCall] {
        &self.calls
    }

    /// Text of every message shown.
    pub fn messages(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                InputCall::ShowMessage(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Text of every diagnostic received.
    pub fn diagnostics(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                InputCall::Diagnostic(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Number of full refreshes requested.
    pub fn refreshes(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| **c == InputCall::FullRefresh)
            .count()
    }

    /// Forget recorded calls. Queued answers are kept.
    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl InputProvider for ScriptedInput {
    fn show_message(&mut self, text: &str) {
        self.calls.push(InputCall::ShowMessage(text.to_string()));
    }

    fn update_status(&mut self) {
        self.calls.push(InputCall::UpdateStatus);
    }

    fn redraw_map(&mut self) {
        self.calls.push(InputCall::RedrawMap);
    }

    fn delay(&mut self, millis: u32) {
        self.calls.push(InputCall::Delay(millis));
    }

    fn query(&mut self, query: &Query) -> Result<Answer, InputError> {
        self.calls.push(InputCall::Query(query.clone()));
        self.answers.pop_front().ok_or(InputError::Cancelled)
    }

    fn diagnostic(&mut self, text: &str) {
        self.calls.push(InputCall::Diagnostic(text.to_string()));
    }

    fn request_command(&mut self) -> Result<Command, InputError> {
        self.calls.push(InputCall::RequestCommand);
        Err(InputError::Cancelled)
    }

    fn confirm_save(&mut self) -> Result<bool, InputError> {
        self.calls.push(InputCall::ConfirmSave);
        Ok(false)
    }

    fn full_refresh(&mut self) {
        self.calls.push(InputCall::FullRefresh);
    }
}
