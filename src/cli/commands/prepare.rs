//! Prepare command implementation.
//!
//! The `stagehand prepare` command sets the project up so its commands can
//! run. In an interactive terminal it asks for variables that have no
//! value and tries again.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cli::args::PrepareArgs;
use crate::environ::Environ;
use crate::error::Result;
use crate::prepare::{prepare_without_interaction, PrepareOptions, PrepareResult};
use crate::project::Project;
use crate::requirements::{RequirementKind, RequirementStatus, RequirementsRegistry};
use crate::state::LocalStateFile;
use crate::ui::{OutputMode, Prompt, PromptType, UserInterface};

use super::dispatcher::{Command, CommandContext, CommandResult};
use super::display;

/// The prepare command implementation.
pub struct PrepareCommand {
    ctx: CommandContext,
    args: PrepareArgs,
}

impl PrepareCommand {
    /// Create a new prepare command.
    pub fn new(ctx: CommandContext, args: PrepareArgs) -> Self {
        Self { ctx, args }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &PrepareArgs {
        &self.args
    }
}

impl Command for PrepareCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let project = self.ctx.load_project()?;
        ui.show_header(project.name());

        let options = PrepareOptions {
            mode: self.args.mode,
            env_spec_name: self.args.env_spec.clone(),
            command_name: self.args.command.clone(),
            refresh: self.args.refresh,
            ..Default::default()
        };
        let ask = !self.args.non_interactive;
        let result = prepare_with_ui(
            &project,
            &self.ctx.environ,
            &self.ctx.registry,
            options,
            ask,
            ui,
        )?;

        if result.failed() {
            display::show_failure(ui, &result);
            return Ok(CommandResult::failure(1));
        }

        if ui.output_mode() == OutputMode::Verbose {
            display::show_statuses(ui, result.statuses());
        }
        ui.success("The project is ready to run commands.");
        Ok(CommandResult::success())
    }
}

/// Prepare without interaction; when that fails and `ask` is set on an
/// interactive UI, ask for the missing variables and try again.
///
/// Values typed for encrypted variables only live in this invocation's
/// environment; everything else is saved to the local state file.
pub(crate) fn prepare_with_ui(
    project: &Project,
    environ: &Environ,
    registry: &Arc<RequirementsRegistry>,
    options: PrepareOptions,
    ask: bool,
    ui: &mut dyn UserInterface,
) -> Result<PrepareResult> {
    let mut environ = environ.clone();
    loop {
        let mut spinner = ui.start_spinner("Preparing project");
        let result =
            prepare_without_interaction(project, &environ, Arc::clone(registry), options.clone())?;
        if result.failed() {
            spinner.finish_error("Unable to prepare the project.");
        } else {
            spinner.finish_success("Prepared.");
        }

        if result.failed()
            && ask
            && ui.is_interactive()
            && ask_for_missing_variables(project, registry, &result, &mut environ, ui)?
        {
            continue;
        }
        return Ok(result);
    }
}

/// Plain variables the user could type a value for.
fn askable(result: &PrepareResult) -> Vec<&RequirementStatus> {
    result
        .statuses()
        .iter()
        .filter(|s| !s.has_been_provided && s.requirement.kind == RequirementKind::EnvVar)
        .collect()
}

/// Returns whether anything was entered, i.e. whether to prepare again.
fn ask_for_missing_variables(
    project: &Project,
    registry: &RequirementsRegistry,
    result: &PrepareResult,
    environ: &mut Environ,
    ui: &mut dyn UserInterface,
) -> Result<bool> {
    if !project.problems().is_empty() {
        return Ok(false);
    }
    let missing = askable(result);
    if missing.is_empty() {
        return Ok(false);
    }

    ui.message("(Use Ctrl+C to quit.)");
    let mut local_state = LocalStateFile::load_for_directory(project.directory())?;
    let mut overrides = result.overrides().clone();
    let default_env_spec_name = result.env_spec_name().map(str::to_string);
    let mut answered = false;

    for status in missing {
        let requirement = &status.requirement;
        let prompt = Prompt {
            key: requirement.env_var.clone(),
            question: format!("Value for {}", requirement.env_var),
            prompt_type: if requirement.encrypted() {
                PromptType::Password
            } else {
                PromptType::Input
            },
            default: None,
        };
        let reply = ui.prompt(&prompt)?.as_string();
        let reply = reply.trim();
        if reply.is_empty() {
            break;
        }
        answered = true;

        if requirement.encrypted() {
            environ.insert(requirement.env_var.clone(), reply.to_string());
            continue;
        }
        let values = BTreeMap::from([("value".to_string(), reply.to_string())]);
        registry
            .provider(status.provider_kind)
            .set_config_values_as_strings(
                requirement,
                environ,
                &mut local_state,
                default_env_spec_name.as_deref(),
                &mut overrides,
                &values,
            );
    }

    if answered {
        local_state.save()?;
    }
    Ok(answered)
}
