//! Resolve command implementation.
//!
//! The `stagehand resolve` command prints the exact packages an env spec
//! resolves to.

use crate::cli::args::ResolveArgs;
use crate::error::Result;
use crate::project::ops;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandContext, CommandResult};

/// The resolve command implementation.
pub struct ResolveCommand {
    ctx: CommandContext,
    args: ResolveArgs,
}

impl ResolveCommand {
    /// Create a new resolve command.
    pub fn new(ctx: CommandContext, args: ResolveArgs) -> Self {
        Self { ctx, args }
    }
}

impl Command for ResolveCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let project = self.ctx.load_project()?;
        let conda = self.ctx.registry.conda_manager();

        let mut spinner = ui.start_spinner("Resolving packages");
        match ops::resolve_env_spec(&project, conda.as_ref(), self.args.env_spec.as_deref()) {
            Ok(packages) => {
                spinner.finish_success(&format!("Resolved {} packages", packages.len()));
                for package in &packages {
                    ui.message(package);
                }
                Ok(CommandResult::success())
            }
            Err(e) => {
                spinner.finish_error("Resolve failed");
                ui.error(&e.to_string());
                Ok(CommandResult::failure(1))
            }
        }
    }
}
