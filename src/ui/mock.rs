//! Mock UI implementation for testing.
//!
//! `MockUI` implements the `UserInterface` trait and captures all
//! interactions for later assertion. It can be configured with
//! pre-determined prompt responses.
//!
//! # Example
//!
//! ```
//! use stagehand::ui::{MockUI, UserInterface};
//!
//! let mut ui = MockUI::new();
//! ui.set_prompt_response("DB_URL", "postgres://localhost/app");
//!
//! ui.message("Preparing project");
//! ui.success("Done!");
//!
//! assert!(ui.has_message("Preparing"));
//! assert!(ui.successes().contains(&"Done!".to_string()));
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::error::Result;

use super::{OutputMode, Prompt, PromptResult, PromptType, SpinnerHandle, UserInterface};

/// Mock UI implementation for testing.
///
/// Supports both single responses (via `set_prompt_response`) and queued
/// responses (via `queue_prompt_responses`) for keys asked more than once.
#[derive(Debug, Default)]
pub struct MockUI {
    mode: OutputMode,
    interactive: bool,
    messages: Vec<String>,
    successes: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
    headers: Vec<String>,
    spinners: Vec<String>,
    spinner_finishes: Rc<RefCell<Vec<(SpinnerStatus, String)>>>,
    prompt_responses: HashMap<String, String>,
    prompt_queues: HashMap<String, VecDeque<String>>,
    prompts_shown: Vec<String>,
}

impl MockUI {
    /// Create a new MockUI with Normal output mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new MockUI with a specific output mode.
    pub fn with_mode(mode: OutputMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Set a response for a prompt key.
    pub fn set_prompt_response(&mut self, key: &str, response: &str) {
        self.prompt_responses
            .insert(key.to_string(), response.to_string());
    }

    /// Queue multiple responses for the same prompt key.
    ///
    /// Responses are returned in order. After the queue is exhausted,
    /// falls back to `set_prompt_response` or defaults.
    pub fn queue_prompt_responses(&mut self, key: &str, responses: Vec<&str>) {
        let queue = responses.into_iter().map(|s| s.to_string()).collect();
        self.prompt_queues.insert(key.to_string(), queue);
    }

    /// Set whether this mock behaves as interactive.
    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn successes(&self) -> &[String] {
        &self.successes
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Get all spinner messages that were started.
    pub fn spinners(&self) -> &[String] {
        &self.spinners
    }

    /// How each spinner finished, in order.
    pub fn spinner_finishes(&self) -> Vec<(SpinnerStatus, String)> {
        self.spinner_finishes.borrow().clone()
    }

    /// Get all prompts that were shown (by key).
    pub fn prompts_shown(&self) -> &[String] {
        &self.prompts_shown
    }

    /// Check if a specific message was shown.
    pub fn has_message(&self, msg: &str) -> bool {
        self.messages.iter().any(|m| m.contains(msg))
    }

    /// Check if a specific success was shown.
    pub fn has_success(&self, msg: &str) -> bool {
        self.successes.iter().any(|m| m.contains(msg))
    }

    /// Check if a specific error was shown.
    pub fn has_error(&self, msg: &str) -> bool {
        self.errors.iter().any(|m| m.contains(msg))
    }

    /// Check if a specific warning was shown.
    pub fn has_warning(&self, msg: &str) -> bool {
        self.warnings.iter().any(|m| m.contains(msg))
    }

    fn respond(prompt: &Prompt, response: String) -> PromptResult {
        if matches!(prompt.prompt_type, PromptType::Confirm) {
            PromptResult::Bool(matches!(response.as_str(), "true" | "yes" | "y" | "1"))
        } else {
            PromptResult::String(response)
        }
    }
}

impl UserInterface for MockUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn message(&mut self, msg: &str) {
        self.messages.push(msg.to_string());
    }

    fn success(&mut self, msg: &str) {
        self.successes.push(msg.to_string());
    }

    fn warning(&mut self, msg: &str) {
        self.warnings.push(msg.to_string());
    }

    fn error(&mut self, msg: &str) {
        self.errors.push(msg.to_string());
    }

    fn prompt(&mut self, prompt: &Prompt) -> Result<PromptResult> {
        self.prompts_shown.push(prompt.key.clone());

        if let Some(response) = self
            .prompt_queues
            .get_mut(&prompt.key)
            .and_then(VecDeque::pop_front)
        {
            return Ok(Self::respond(prompt, response));
        }

        let response = self
            .prompt_responses
            .get(&prompt.key)
            .or(prompt.default.as_ref())
            .cloned()
            .unwrap_or_default();
        Ok(Self::respond(prompt, response))
    }

    fn start_spinner(&mut self, message: &str) -> Box<dyn SpinnerHandle> {
        self.spinners.push(message.to_string());
        Box::new(MockSpinner {
            messages: Vec::new(),
            finishes: Rc::clone(&self.spinner_finishes),
        })
    }

    fn show_header(&mut self, title: &str) {
        self.headers.push(title.to_string());
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }
}

/// Status of a mock spinner when finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinnerStatus {
    /// Finished successfully.
    Success,
    /// Finished with error.
    Error,
}

/// Mock spinner that reports how it finished back to its [`MockUI`].
#[derive(Debug)]
pub struct MockSpinner {
    messages: Vec<String>,
    finishes: Rc<RefCell<Vec<(SpinnerStatus, String)>>>,
}

impl MockSpinner {
    /// Get all messages set during spinning.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

impl SpinnerHandle for MockSpinner {
    fn set_message(&mut self, msg: &str) {
        self.messages.push(msg.to_string());
    }

    fn finish_success(&mut self, msg: &str) {
        self.finishes
            .borrow_mut()
            .push((SpinnerStatus::Success, msg.to_string()));
    }

    fn finish_error(&mut self, msg: &str) {
        self.finishes
            .borrow_mut()
            .push((SpinnerStatus::Error, msg.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(key: &str, prompt_type: PromptType, default: Option<&str>) -> Prompt {
        Prompt {
            key: key.to_string(),
            question: "?".to_string(),
            prompt_type,
            default: default.map(String::from),
        }
    }

    #[test]
    fn captures_output() {
        let mut ui = MockUI::new();
        ui.message("hello");
        ui.warning("careful");
        ui.error("broken");
        ui.show_header("demo");
        assert!(ui.has_message("hell"));
        assert!(ui.has_warning("care"));
        assert!(ui.has_error("broke"));
        assert_eq!(ui.headers(), ["demo"]);
    }

    #[test]
    fn queued_responses_come_first() {
        let mut ui = MockUI::new();
        ui.set_prompt_response("FOO", "fixed");
        ui.queue_prompt_responses("FOO", vec!["one", "two"]);
        let p = prompt("FOO", PromptType::Input, None);
        assert_eq!(ui.prompt(&p).unwrap().as_string(), "one");
        assert_eq!(ui.prompt(&p).unwrap().as_string(), "two");
        assert_eq!(ui.prompt(&p).unwrap().as_string(), "fixed");
        assert_eq!(ui.prompts_shown().len(), 3);
    }

    #[test]
    fn falls_back_to_prompt_default() {
        let mut ui = MockUI::new();
        let p = prompt("FOO", PromptType::Input, Some("dflt"));
        assert_eq!(ui.prompt(&p).unwrap().as_string(), "dflt");
    }

    #[test]
    fn confirm_responses_are_bools() {
        let mut ui = MockUI::new();
        ui.set_prompt_response("ok", "yes");
        let p = prompt("ok", PromptType::Confirm, None);
        assert_eq!(ui.prompt(&p).unwrap().as_bool(), Some(true));
    }

    #[test]
    fn spinner_finishes_are_recorded() {
        let mut ui = MockUI::new();
        let mut spinner = ui.start_spinner("Preparing");
        spinner.set_message("Stage 1");
        spinner.finish_error("Failed");
        assert_eq!(ui.spinners(), ["Preparing"]);
        assert_eq!(
            ui.spinner_finishes(),
            vec![(SpinnerStatus::Error, "Failed".to_string())]
        );
    }
}
