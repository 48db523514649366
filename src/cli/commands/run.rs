//! Run command implementation.
//!
//! The `stagehand run` command prepares the project for one of its
//! commands and then runs it with the prepared environment.

use crate::cli::args::RunArgs;
use crate::error::Result;
use crate::prepare::PrepareOptions;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandContext, CommandResult};
use super::display;
use super::prepare::prepare_with_ui;

/// The run command implementation.
pub struct RunCommand {
    ctx: CommandContext,
    args: RunArgs,
}

impl RunCommand {
    /// Create a new run command.
    pub fn new(ctx: CommandContext, args: RunArgs) -> Self {
        Self { ctx, args }
    }
}

impl Command for RunCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let project = self.ctx.load_project()?;

        let options = PrepareOptions {
            mode: self.args.mode,
            env_spec_name: self.args.env_spec.clone(),
            command_name: self.args.command.clone(),
            extra_command_args: self.args.extra_args.clone(),
            ..Default::default()
        };
        let result = prepare_with_ui(
            &project,
            &self.ctx.environ,
            &self.ctx.registry,
            options,
            !self.args.non_interactive,
            ui,
        )?;

        if result.failed() {
            display::show_failure(ui, &result);
            return Ok(CommandResult::failure(1));
        }

        let Some(exec_info) = result.command_exec_info() else {
            ui.error(&format!(
                "No known run command for project {}; try adding a 'commands:' section to {}",
                project.directory().display(),
                project.file_display_name()
            ));
            return Ok(CommandResult::failure(1));
        };

        let status = exec_info.spawn()?.wait()?;
        tracing::debug!("{} exited with {}", exec_info.args.join(" "), status);
        match status.code() {
            Some(0) => Ok(CommandResult::success()),
            Some(code) => Ok(CommandResult::failure(code)),
            None => Ok(CommandResult::failure(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conda::MockCondaManager;
    use crate::download::MockDownloader;
    use crate::environ::Environ;
    use crate::requirements::RequirementsRegistry;
    use crate::ui::MockUI;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(dir: &std::path::Path) -> CommandContext {
        CommandContext {
            project_root: dir.to_path_buf(),
            environ: Environ::from([("PATH".to_string(), "/usr/bin:/bin".to_string())]),
            registry: Arc::new(RequirementsRegistry::new(
                Arc::new(MockCondaManager::new()),
                Arc::new(MockDownloader::new()),
            )),
        }
    }

    #[test]
    fn project_without_commands_cannot_run() {
        let temp = TempDir::new().unwrap();
        let mut ui = MockUI::new();
        let result = RunCommand::new(context(temp.path()), RunArgs::default())
            .execute(&mut ui)
            .unwrap();
        assert_eq!(result.exit_code, 1);
        assert!(ui.has_error("No known run command"));
    }

    #[cfg(unix)]
    #[test]
    fn runs_command_with_prepared_environment() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("stagehand.yml"),
            "variables:\n  GREETING: hello\ncommands:\n  greet:\n    unix: test \"$GREETING\" = hello && test -n \"$CONDA_PREFIX\"\n",
        )
        .unwrap();
        let mut ui = MockUI::new();
        let result = RunCommand::new(context(temp.path()), RunArgs::default())
            .execute(&mut ui)
            .unwrap();
        assert!(result.success, "{:?}", ui.errors());
    }

    #[cfg(unix)]
    #[test]
    fn child_exit_code_is_returned() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("stagehand.yml"),
            "commands:\n  fail:\n    unix: exit 3\n",
        )
        .unwrap();
        let mut ui = MockUI::new();
        let args = RunArgs {
            command: Some("fail".to_string()),
            ..Default::default()
        };
        let result = RunCommand::new(context(temp.path()), args)
            .execute(&mut ui)
            .unwrap();
        assert_eq!(result.exit_code, 3);
    }
}
