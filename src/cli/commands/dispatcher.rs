//! Command dispatching.
//!
//! This module provides the core command infrastructure:
//! - [`Command`] trait for implementing commands
//! - [`CommandResult`] for uniform result reporting
//! - [`CommandContext`] for what every command shares
//! - [`CommandDispatcher`] for routing CLI subcommands

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::args::{Cli, Commands, PrepareArgs};
use crate::environ::Environ;
use crate::error::Result;
use crate::project::Project;
use crate::requirements::RequirementsRegistry;
use crate::ui::UserInterface;

/// Trait for command implementations.
///
/// Each CLI subcommand implements this trait to provide its execution logic.
pub trait Command {
    /// Execute the command.
    ///
    /// # Arguments
    ///
    /// * `ui` - User interface for displaying output and prompts
    ///
    /// # Returns
    ///
    /// A [`CommandResult`] indicating success/failure and exit code.
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult>;
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub success: bool,

    /// Exit code to use (0 for success, non-zero for failure).
    pub exit_code: i32,
}

impl CommandResult {
    /// Create a successful result.
    pub fn success() -> Self {
        Self {
            success: true,
            exit_code: 0,
        }
    }

    /// Create a failure result.
    pub fn failure(exit_code: i32) -> Self {
        Self {
            success: false,
            exit_code,
        }
    }
}

/// What every command works from: the project directory, the process
/// environment snapshot, and the providers.
#[derive(Clone)]
pub struct CommandContext {
    pub project_root: PathBuf,
    pub environ: Environ,
    pub registry: Arc<RequirementsRegistry>,
}

impl CommandContext {
    /// Load the project in `project_root`.
    pub fn load_project(&self) -> Result<Project> {
        Project::load(&self.project_root)
    }
}

/// Dispatches CLI commands to their implementations.
pub struct CommandDispatcher {
    context: CommandContext,
}

impl CommandDispatcher {
    /// Create a dispatcher using the real package manager and downloader.
    pub fn new(project_root: PathBuf, environ: Environ) -> Self {
        Self::with_registry(project_root, environ, Arc::new(RequirementsRegistry::default()))
    }

    /// Create a dispatcher around a specific provider registry.
    pub fn with_registry(
        project_root: PathBuf,
        environ: Environ,
        registry: Arc<RequirementsRegistry>,
    ) -> Self {
        Self {
            context: CommandContext {
                project_root,
                environ,
                registry,
            },
        }
    }

    /// Get the project root path.
    pub fn project_root(&self) -> &Path {
        &self.context.project_root
    }

    /// Dispatch and execute a command.
    ///
    /// Routes the CLI subcommand to the appropriate command implementation
    /// and executes it.
    pub fn dispatch(&self, cli: &Cli, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let ctx = self.context.clone();
        match &cli.command {
            Some(Commands::Prepare(args)) => {
                super::prepare::PrepareCommand::new(ctx, args.clone()).execute(ui)
            }
            Some(Commands::Run(args)) => super::run::RunCommand::new(ctx, args.clone()).execute(ui),
            Some(Commands::Unprepare(args)) => {
                super::unprepare::UnprepareCommand::new(ctx, args.clone()).execute(ui)
            }
            Some(Commands::Status(args)) => {
                super::status::StatusCommand::new(ctx, args.clone()).execute(ui)
            }
            Some(Commands::Resolve(args)) => {
                super::resolve::ResolveCommand::new(ctx, args.clone()).execute(ui)
            }
            Some(Commands::RemovePackages(args)) => {
                super::remove_packages::RemovePackagesCommand::new(ctx, args.clone()).execute(ui)
            }
            Some(Commands::Completions(args)) => {
                super::completions::CompletionsCommand::new(args.clone()).execute(ui)
            }
            None => super::prepare::PrepareCommand::new(ctx, PrepareArgs::default()).execute(ui),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_result_success() {
        let result = CommandResult::success();
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn command_result_failure() {
        let result = CommandResult::failure(1);
        assert!(!result.success);
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn dispatcher_creation() {
        let dispatcher = CommandDispatcher::new(PathBuf::from("/test"), Environ::new());
        assert_eq!(dispatcher.project_root(), Path::new("/test"));
    }
}
