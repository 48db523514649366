//! Remove-packages command implementation.

use crate::cli::args::RemovePackagesArgs;
use crate::error::Result;
use crate::project::ops;
use crate::status::Status;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandContext, CommandResult};

/// The remove-packages command implementation.
pub struct RemovePackagesCommand {
    ctx: CommandContext,
    args: RemovePackagesArgs,
}

impl RemovePackagesCommand {
    /// Create a new remove-packages command.
    pub fn new(ctx: CommandContext, args: RemovePackagesArgs) -> Self {
        Self { ctx, args }
    }
}

impl Command for RemovePackagesCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let project = self.ctx.load_project()?;
        let conda = self.ctx.registry.conda_manager();

        let status = ops::remove_packages(
            &project,
            conda.as_ref(),
            &self.args.env_spec,
            &self.args.packages,
        )?;
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
