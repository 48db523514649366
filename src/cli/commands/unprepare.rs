//! Unprepare command implementation.
//!
//! The `stagehand unprepare` command stops services and removes files and
//! environments that prepare created. Values the user configured are kept.

use std::sync::Arc;

use crate::cli::args::UnprepareArgs;
use crate::error::Result;
use crate::prepare::{prepare_without_interaction, unprepare, PrepareOptions};
use crate::requirements::{ProvideMode, WhitelistEntry};
use crate::status::Status;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandContext, CommandResult};

/// The unprepare command implementation.
pub struct UnprepareCommand {
    ctx: CommandContext,
    args: UnprepareArgs,
}

impl UnprepareCommand {
    /// Create a new unprepare command.
    pub fn new(ctx: CommandContext, args: UnprepareArgs) -> Self {
        Self { ctx, args }
    }

    fn whitelist(&self) -> Option<Vec<WhitelistEntry>> {
        if self.args.only.is_empty() {
            None
        } else {
            Some(
                self.args
                    .only
                    .iter()
                    .map(|name| WhitelistEntry::from(name.as_str()))
                    .collect(),
            )
        }
    }
}

impl Command for UnprepareCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let project = self.ctx.load_project()?;

        // Check mode only looks, so the statuses describe what's there now.
        let checked = prepare_without_interaction(
            &project,
            &self.ctx.environ,
            Arc::clone(&self.ctx.registry),
            PrepareOptions {
                mode: ProvideMode::Check,
                ..Default::default()
            },
        )?;

        let whitelist = self.whitelist();
        let status = unprepare(&project, &self.ctx.registry, &checked, whitelist.as_deref())?;
        if status.is_success() {
            ui.success(status.status_description());
            Ok(CommandResult::success())
        } else {
            for error in status.errors() {
                ui.error(error);
            }
            ui.error(status.status_description());
            Ok(CommandResult::failure(1))
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
    fn removes_project_environment() {
        let temp = TempDir::new().unwrap();
        let env = temp.path().join("envs/default");
        fs::create_dir_all(env.join("conda-meta")).unwrap();

        let mut ui = MockUI::new();
        let result = UnprepareCommand::new(context(temp.path()), UnprepareArgs::default())
            .execute(&mut ui)
            .unwrap();
        assert!(result.success, "{:?}", ui.errors());
        assert!(!env.exists());
    }

    #[test]
    fn whitelist_skips_other_requirements() {
        let temp = TempDir::new().unwrap();
        let env = temp.path().join("envs/default");
        fs::create_dir_all(env.join("conda-meta")).unwrap();

        let mut ui = MockUI::new();
        let args = UnprepareArgs {
            only: vec!["SOMETHING_ELSE".to_string()],
        };
        let result = UnprepareCommand::new(context(temp.path()), args)
            .execute(&mut ui)
            .unwrap();
        assert!(result.success);
        assert!(ui.has_success("Nothing to clean up."));
        assert!(env.exists());
    }
}
