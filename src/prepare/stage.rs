//! Prepare stages: one configure-then-provide pass over a group of
//! requirements.
//!
//! A stage is an explicit state machine. Before [`PrepareStage::execute`]
//! a frontend may [`configure`](PrepareStage::configure) it; executing it
//! yields its [`PrepareResult`] and possibly the next stage. A stage whose
//! group came from splitting the requirement list carries the deferred
//! rest of the list, which becomes the next stage once this one succeeds.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::dependency::sort_statuses;
use super::result::PrepareResult;
use crate::environ::Environ;
use crate::project::ProjectCommand;
use crate::requirements::{
    in_whitelist, ProvideContext, ProvideMode, ProvideResult, Requirement, RequirementStatus,
    RequirementsRegistry, StatusContext, UserConfigOverrides, WhitelistEntry,
};
use crate::state::LocalStateFile;

const DESCRIPTION_OF_ACTION: &str = "Set up project.";

/// Everything a run threads from stage to stage.
#[derive(Clone)]
pub(crate) struct RunContext {
    pub registry: Arc<RequirementsRegistry>,
    pub environ: Environ,
    pub local_state: LocalStateFile,
    pub overrides: UserConfigOverrides,
    pub default_env_spec_name: String,
    pub mode: ProvideMode,
    pub keep_going_until_success: bool,
    pub whitelist: Option<Vec<WhitelistEntry>>,
    pub command: Option<ProjectCommand>,
    pub extra_command_args: Vec<String>,
}

impl RunContext {
    pub fn status_context(&self) -> StatusContext<'_> {
        StatusContext {
            registry: &self.registry,
            environ: &self.environ,
            local_state: &self.local_state,
            default_env_spec_name: Some(self.default_env_spec_name.as_str()),
            overrides: &self.overrides,
        }
    }
}

struct Executed {
    result: PrepareResult,
    statuses_after: Vec<RequirementStatus>,
}

/// Keep every status of `old`, replacing those that were rechecked.
///
/// Statuses are matched by requirement identity; nothing from `rechecked`
/// is added.
pub(crate) fn refresh_status_list(
    old: &[RequirementStatus],
    rechecked: &[RequirementStatus],
) -> Vec<RequirementStatus> {
    old.iter()
        .map(|status| {
            rechecked
                .iter()
                .find(|new| new.is_for(&status.requirement))
                .unwrap_or(status)
                .clone()
        })
        .collect()
}

/// Split sorted statuses before the first one that can't be configured
/// yet. That one and everything after it wait for a later stage.
fn partition_first_group_to_configure(
    run: &RunContext,
    statuses: &[RequirementStatus],
) -> (Vec<RequirementStatus>, Vec<RequirementStatus>) {
    let sorted = sort_statuses(&run.environ, statuses, |status| {
        status.analysis.missing_env_vars_to_configure.clone()
    });

    let split = sorted
        .iter()
        .position(|status| {
            !run.registry
                .provider(status.provider_kind)
                .missing_env_vars_to_configure(&status.requirement, &run.environ, &run.local_state)
                .is_empty()
        })
        .unwrap_or(sorted.len());

    let mut head = sorted;
    let tail = head.split_off(split);
    (head, tail)
}

/// Build the stage for `statuses`, deferring what can't be configured yet.
pub(crate) fn stages_for(
    run: RunContext,
    statuses: Vec<RequirementStatus>,
    all_statuses: Vec<RequirementStatus>,
) -> PrepareStage {
    let (head, tail) = partition_first_group_to_configure(&run, &statuses);
    if head.is_empty() {
        PrepareStage::new(run, tail, all_statuses, None)
    } else if tail.is_empty() {
        PrepareStage::new(run, head, all_statuses, None)
    } else {
        PrepareStage::new(run, head, all_statuses, Some(tail))
    }
}

/// One step of a prepare run.
pub struct PrepareStage {
    run: RunContext,
    /// The group this stage configures and provides.
    statuses: Vec<RequirementStatus>,
    /// Every requirement of the run, as of this stage.
    all_statuses: Vec<RequirementStatus>,
    /// Statuses deferred until this stage succeeds.
    remaining: Option<Vec<RequirementStatus>>,
    executed: Option<Executed>,
}

impl fmt::Debug for PrepareStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .statuses
            .iter()
            .map(|s| s.requirement.env_var.as_str())
            .collect();
        f.debug_struct("PrepareStage")
            .field("statuses", &names)
            .field("deferred", &self.remaining.as_ref().map_or(0, Vec::len))
            .field("executed", &self.executed.is_some())
            .finish()
    }
}

impl PrepareStage {
    fn new(
        run: RunContext,
        statuses: Vec<RequirementStatus>,
        all_statuses: Vec<RequirementStatus>,
        remaining: Option<Vec<RequirementStatus>>,
    ) -> Self {
        Self {
            run,
            statuses,
            all_statuses,
            remaining,
            executed: None,
        }
    }

    /// What executing this stage does.
    pub fn description_of_action(&self) -> &str {
        DESCRIPTION_OF_ACTION
    }

    /// Configuration access for this stage's requirements.
    ///
    /// Changes made here are seen by [`PrepareStage::execute`].
    pub fn configure(&mut self) -> ConfigurePrepareContext<'_> {
        ConfigurePrepareContext {
            registry: &self.run.registry,
            environ: &mut self.run.environ,
            local_state: &mut self.run.local_state,
            default_env_spec_name: &self.run.default_env_spec_name,
            overrides: &mut self.run.overrides,
            statuses: &self.statuses,
        }
    }

    /// Whether this stage has been executed.
    pub fn is_executed(&self) -> bool {
        self.executed.is_some()
    }

    fn executed(&self, what: &str) -> &Executed {
        match &self.executed {
            Some(executed) => executed,
            None => panic!("{} isn't available until after execute()", what),
        }
    }

    /// The stage's result.
    ///
    /// # Panics
    ///
    /// Panics if the stage hasn't been executed.
    pub fn result(&self) -> &PrepareResult {
        &self.executed("result").result
    }

    /// Take the stage's result.
    ///
    /// # Panics
    ///
    /// Panics if the stage hasn't been executed.
    pub fn into_result(self) -> PrepareResult {
        match self.executed {
            Some(executed) => executed.result,
            None => panic!("result isn't available until after execute()"),
        }
    }

    /// Whether the stage failed.
    ///
    /// # Panics
    ///
    /// Panics if the stage hasn't been executed.
    pub fn failed(&self) -> bool {
        self.result().failed()
    }

    /// The latest environment: the result's once executed.
    pub fn environ(&self) -> &Environ {
        match &self.executed {
            Some(executed) => executed.result.environ(),
            None => &self.run.environ,
        }
    }

    pub fn overrides(&self) -> &UserConfigOverrides {
        &self.run.overrides
    }

    /// Status of every known requirement before this stage runs.
    pub fn statuses_before_execute(&self) -> &[RequirementStatus] {
        &self.all_statuses
    }

    /// Status of every known requirement as changed by this stage.
    ///
    /// # Panics
    ///
    /// Panics if the stage hasn't been executed.
    pub fn statuses_after_execute(&self) -> &[RequirementStatus] {
        &self.executed("statuses_after_execute").statuses_after
    }

    /// Provide this stage's requirements and return the next stage.
    ///
    /// `None` means the run is over; check [`PrepareStage::failed`] for
    /// how it ended. In keep-going mode a failed stage is followed by a
    /// fresh attempt at the same group.
    ///
    /// # Panics
    ///
    /// Panics if called twice.
    pub fn execute(&mut self) -> Option<PrepareStage> {
        assert!(
            self.executed.is_none(),
            "execute() called twice on the same stage"
        );

        let run = &mut self.run;
        let sorted = sort_statuses(&run.environ, &self.statuses, |status| {
            status.analysis.missing_env_vars_to_provide.clone()
        });

        // configuration may have happened since these were checked
        let mut rechecked: Vec<RequirementStatus> = {
            let ctx = run.status_context();
            sorted.iter().map(|status| status.recheck(&ctx, None)).collect()
        };

        let mut errors = Vec::new();
        let mut provide_results: Vec<Option<ProvideResult>> = vec![None; rechecked.len()];
        for (slot, status) in provide_results.iter_mut().zip(&rechecked) {
            if !in_whitelist(&status.requirement, run.whitelist.as_deref()) {
                tracing::debug!("{}: not in whitelist, skipping", status.requirement.env_var);
                continue;
            }
            if status.has_been_provided {
                continue;
            }

            tracing::debug!("{}: providing", status.requirement.env_var);
            let provider = run.registry.provider(status.provider_kind);
            let mut ctx = ProvideContext {
                environ: &mut run.environ,
                local_state: &mut run.local_state,
                default_env_spec_name: Some(run.default_env_spec_name.as_str()),
                status,
                mode: run.mode,
                overrides: &mut run.overrides,
            };
            let result = provider.provide(&status.requirement, &mut ctx);
            errors.extend(result.errors.iter().cloned());
            *slot = Some(result);
        }

        if provide_results.iter().any(Option::is_some) {
            let ctx = run.status_context();
            rechecked = rechecked
                .iter()
                .zip(provide_results)
                .map(|(status, result)| status.recheck(&ctx, result))
                .collect();
        }

        let mut failed = false;
        for status in rechecked.iter().filter(|status| !status.has_been_provided) {
            let missing = format!(
                "missing requirement to run this project: {}",
                status.requirement.description()
            );
            tracing::error!("{}", missing);
            errors.push(missing);
            let why_not = format!("  {}", status.status_description);
            tracing::error!("{}", why_not);
            errors.push(why_not);
            failed = true;
        }

        let statuses_after = refresh_status_list(&self.all_statuses, &rechecked);
        let env_spec_name = statuses_after
            .iter()
            .rev()
            .find_map(|status| status.env_spec_name.clone());

        if failed {
            let result = PrepareResult::failure(
                statuses_after.clone(),
                errors,
                run.environ.clone(),
                run.overrides.clone(),
                env_spec_name,
            );
            let next = run.keep_going_until_success.then(|| {
                PrepareStage::new(
                    run.clone(),
                    rechecked,
                    statuses_after.clone(),
                    self.remaining.clone(),
                )
            });
            self.executed = Some(Executed {
                result,
                statuses_after,
            });
            return next;
        }

        let (result, next) = match self.remaining.take() {
            Some(remaining) => {
                let result = PrepareResult::success(
                    statuses_after.clone(),
                    None,
                    run.environ.clone(),
                    run.overrides.clone(),
                    env_spec_name,
                );
                let updated = refresh_status_list(&remaining, &statuses_after);
                let next = stages_for(run.clone(), updated, statuses_after.clone());
                (result, Some(next))
            }
            None => (terminal_result(run, statuses_after.clone(), env_spec_name), None),
        };

        self.executed = Some(Executed {
            result,
            statuses_after,
        });
        next
    }
}

/// The result of the last stage, resolving the command when one was asked for.
fn terminal_result(
    run: &RunContext,
    statuses: Vec<RequirementStatus>,
    env_spec_name: Option<String>,
) -> PrepareResult {
    let exec_info = run
        .command
        .as_ref()
        .map(|command| command.exec_info_for_environment(&run.environ, &run.extra_command_args))
        .transpose();

    match exec_info {
        Ok(command_exec_info) => PrepareResult::success(
            statuses,
            command_exec_info,
            run.environ.clone(),
            run.overrides.clone(),
            env_spec_name,
        ),
        Err(e) => {
            tracing::error!("{}", e);
            PrepareResult::failure(
                statuses,
                vec![e.to_string()],
                run.environ.clone(),
                run.overrides.clone(),
                env_spec_name,
            )
        }
    }
}

/// What a frontend may change before a stage executes.
pub struct ConfigurePrepareContext<'a> {
    registry: &'a RequirementsRegistry,
    pub environ: &'a mut Environ,
    pub local_state: &'a mut LocalStateFile,
    pub default_env_spec_name: &'a str,
    pub overrides: &'a mut UserConfigOverrides,
    /// The statuses the stage will configure and provide.
    pub statuses: &'a [RequirementStatus],
}

impl ConfigurePrepareContext<'_> {
    /// Apply configuration values through the requirement's provider.
    pub fn set_config_values(&mut self, requirement: &Requirement, values: &BTreeMap<String, String>) {
        self.registry
            .provider(requirement.provider_kind())
            .set_config_values_as_strings(
                requirement,
                self.environ,
                self.local_state,
                Some(self.default_env_spec_name),
                self.overrides,
                values,
            );
    }
}
