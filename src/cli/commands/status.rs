//! Status command implementation.
//!
//! The `stagehand status` command checks every requirement without
//! provisioning anything.

use std::sync::Arc;

use crate::cli::args::StatusArgs;
use crate::error::Result;
use crate::prepare::{prepare_without_interaction, PrepareOptions};
use crate::requirements::ProvideMode;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandContext, CommandResult};
use super::display;

/// The status command implementation.
pub struct StatusCommand {
    ctx: CommandContext,
    args: StatusArgs,
}

impl StatusCommand {
    /// Create a new status command.
    pub fn new(ctx: CommandContext, args: StatusArgs) -> Self {
        Self { ctx, args }
    }
}

impl Command for StatusCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let project = self.ctx.load_project()?;
        let result = prepare_without_interaction(
            &project,
            &self.ctx.environ,
            Arc::clone(&self.ctx.registry),
            PrepareOptions {
                mode: ProvideMode::Check,
                env_spec_name: self.args.env_spec.clone(),
                ..Default::default()
            },
        )?;

        let env_spec = result.env_spec_name().unwrap_or("default").to_string();
        ui.show_header(&format!("{} ({})", project.name(), env_spec));

        if result.statuses().is_empty() {
            // failed before anything was checked
            for error in result.errors() {
                ui.error(error);
            }
            return Ok(CommandResult::failure(1));
        }

        display::show_statuses(ui, result.statuses());
        if result.failed() {
            ui.warning("Some requirements are missing; run `stagehand prepare` to set them up.");
            Ok(CommandResult::failure(1))
        } else {
            ui.success("All requirements are met.");
            Ok(CommandResult::success())
        }
    }
}
