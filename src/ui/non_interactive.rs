//! Non-interactive UI for scripts and CI.

use std::collections::HashMap;

use crate::error::{Result, StagehandError};

use super::{OutputMode, Prompt, PromptResult, PromptType, SpinnerHandle, UserInterface};

/// Prefix of environment variables that answer prompts, followed by the
/// upper-cased prompt key.
pub const PROMPT_ENV_PREFIX: &str = "STAGEHAND_PROMPT_";

/// UI implementation for non-interactive mode.
///
/// Prompts are answered from `STAGEHAND_PROMPT_<KEY>` variables, then from
/// the prompt's default; with neither the prompt is an error.
pub struct NonInteractiveUI {
    mode: OutputMode,
    env_overrides: HashMap<String, String>,
}

impl NonInteractiveUI {
    /// Create a new non-interactive UI.
    pub fn new(mode: OutputMode) -> Self {
        let env_overrides: HashMap<String, String> = std::env::vars()
            .filter(|(k, _)| k.starts_with(PROMPT_ENV_PREFIX))
            .collect();

        Self {
            mode,
            env_overrides,
        }
    }

    /// Create with explicit overrides (for testing).
    pub fn with_overrides(mode: OutputMode, overrides: HashMap<String, String>) -> Self {
        Self {
            mode,
            env_overrides: overrides,
        }
    }
}

impl UserInterface for NonInteractiveUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn message(&mut self, msg: &str) {
        if self.mode.shows_status() {
            println!("{}", msg);
        }
    }

    fn success(&mut self, msg: &str) {
        if self.mode.shows_status() {
            println!("✓ {}", msg);
        }
    }

    fn warning(&mut self, msg: &str) {
        if self.mode.shows_status() {
            eprintln!("⚠ {}", msg);
        }
    }

    fn error(&mut self, msg: &str) {
        eprintln!("✗ {}", msg);
    }

    fn prompt(&mut self, prompt: &Prompt) -> Result<PromptResult> {
        let env_key = format!("{}{}", PROMPT_ENV_PREFIX, prompt.key.to_uppercase());
        let answer = self
            .env_overrides
            .get(&env_key)
            .or(prompt.default.as_ref())
            .ok_or_else(|| StagehandError::PromptUnavailable {
                key: prompt.key.clone(),
            })?;

        if matches!(prompt.prompt_type, PromptType::Confirm) {
            let yes = matches!(answer.to_lowercase().as_str(), "true" | "y" | "yes");
            return Ok(PromptResult::Bool(yes));
        }
        Ok(PromptResult::String(answer.clone()))
    }

    fn start_spinner(&mut self, message: &str) -> Box<dyn SpinnerHandle> {
        if self.mode.shows_spinners() {
            println!("  {}", message);
        }
        Box::new(NoopSpinner)
    }

    fn show_header(&mut self, title: &str) {
        if self.mode.shows_status() {
            println!("\n{}\n", title);
        }
    }

    fn is_interactive(&self) -> bool {
        false
    }
}

/// Spinner that prints the final line only.
struct NoopSpinner;

impl SpinnerHandle for NoopSpinner {
    fn set_message(&mut self, _msg: &str) {}

    fn finish_success(&mut self, msg: &str) {
        println!("✓ {}", msg);
    }

    fn finish_error(&mut self, msg: &str) {
        eprintln!("✗ {}", msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(key: &str, default: Option<&str>) -> Prompt {
        Prompt {
            key: key.to_string(),
            question: format!("Value for {}", key),
            prompt_type: PromptType::Input,
            default: default.map(String::from),
        }
    }

    #[test]
    fn env_override_wins_over_default() {
        let overrides =
            HashMap::from([("STAGEHAND_PROMPT_DB_URL".to_string(), "postgres://x".to_string())]);
        let mut ui = NonInteractiveUI::with_overrides(OutputMode::Silent, overrides);
        let result = ui.prompt(&input("db_url", Some("sqlite://"))).unwrap();
        assert_eq!(result.as_string(), "postgres://x");
    }

    #[test]
    fn default_is_used_without_override() {
        let mut ui = NonInteractiveUI::with_overrides(OutputMode::Silent, HashMap::new());
        let result = ui.prompt(&input("DB_URL", Some("sqlite://"))).unwrap();
        assert_eq!(result.as_string(), "sqlite://");
    }

    #[test]
    fn missing_answer_is_an_error() {
        let mut ui = NonInteractiveUI::with_overrides(OutputMode::Silent, HashMap::new());
        let err = ui.prompt(&input("DB_URL", None)).unwrap_err();
        assert!(matches!(err, StagehandError::PromptUnavailable { .. }));
        assert!(err.to_string().contains("DB_URL"));
    }

    #[test]
    fn confirm_answers_parse_as_bool() {
        let overrides = HashMap::from([("STAGEHAND_PROMPT_GO".to_string(), "yes".to_string())]);
        let mut ui = NonInteractiveUI::with_overrides(OutputMode::Silent, overrides);
        let prompt = Prompt {
            prompt_type: PromptType::Confirm,
            ..input("go", None)
        };
        assert_eq!(ui.prompt(&prompt).unwrap().as_bool(), Some(true));
    }

    #[test]
    fn is_never_interactive() {
        let ui = NonInteractiveUI::with_overrides(OutputMode::Normal, HashMap::new());
        assert!(!ui.is_interactive());
    }
}
