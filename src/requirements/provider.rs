//! Providers: the strategies that check, configure, provide and tear down
//! the resource behind each kind of requirement.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use super::requirement::{Requirement, StatusContext, UserConfigOverrides};
use super::status::{
    AnalysisExtra, ProvideResult, ProviderAnalysis, ProviderConfig, RequirementStatus, Teardown,
};
use crate::environ::Environ;
use crate::shell::{execute, CommandOptions};
use crate::state::{LocalStateFile, ServiceRunState};
use crate::status::SimpleStatus;

/// The closed set of providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKind {
    EnvVar,
    CondaEnv,
    CondaBootstrapEnv,
    Download,
    Redis,
}

impl ProviderKind {
    /// Every provider kind.
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::EnvVar,
        ProviderKind::CondaEnv,
        ProviderKind::CondaBootstrapEnv,
        ProviderKind::Download,
        ProviderKind::Redis,
    ];
}

/// How much a provide() call may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ProvideMode {
    /// Provision real resources, starting project-scoped services as needed.
    #[default]
    Development,
    /// Provision real resources, but never start throwaway services.
    Production,
    /// Never provision; only report.
    Check,
}

/// What a provider may read and modify while providing one requirement.
pub struct ProvideContext<'a> {
    /// The run's environment; providers set their variable here.
    pub environ: &'a mut Environ,
    pub local_state: &'a mut LocalStateFile,
    pub default_env_spec_name: Option<&'a str>,
    /// The status being provided for.
    pub status: &'a RequirementStatus,
    pub mode: ProvideMode,
    pub overrides: &'a mut UserConfigOverrides,
}

impl ProvideContext<'_> {
    /// Create (if needed) and return the directory for a service's files.
    pub fn ensure_service_directory(&self, relative_name: &str) -> std::io::Result<PathBuf> {
        let path = self.local_state.service_directory(relative_name);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Run `f` on a service's run state, saving the state if `f` changes it.
    pub fn transform_service_run_state<T>(
        &mut self,
        service_name: &str,
        f: impl FnOnce(&mut ServiceRunState) -> T,
    ) -> T {
        let old_state = self.local_state.service_run_state(service_name);
        let mut state = old_state.clone();
        let result = f(&mut state);
        if state != old_state {
            self.local_state.set_service_run_state(service_name, &state);
            if let Err(e) = self.local_state.save() {
                tracing::error!(
                    "Failed to save {}: {}",
                    self.local_state.filename().display(),
                    e
                );
            }
        }
        result
    }
}

/// Strategy for one kind of requirement.
///
/// Providers hold no per-run state; everything a run needs is passed in.
/// Expected failures are reported in the returned values, never panics.
pub trait Provider: Send + Sync {
    /// Which provider this is.
    fn kind(&self) -> ProviderKind;

    /// Variables that must be resolved before `requirement` can be configured.
    fn missing_env_vars_to_configure(
        &self,
        requirement: &Requirement,
        environ: &Environ,
        local_state: &LocalStateFile,
    ) -> BTreeSet<String>;

    /// Variables that must be resolved before `requirement` can be provided.
    fn missing_env_vars_to_provide(
        &self,
        requirement: &Requirement,
        environ: &Environ,
        local_state: &LocalStateFile,
    ) -> BTreeSet<String> {
        self.missing_env_vars_to_configure(requirement, environ, local_state)
    }

    /// Where the requirement's value comes from right now.
    fn read_config(&self, requirement: &Requirement, ctx: &StatusContext<'_>) -> ProviderConfig;

    /// Apply configuration chosen by a user, as strings keyed by field
    /// (`source`, `value`, `env_name`, `lower_port`, `upper_port`).
    ///
    /// Unknown keys are ignored.
    fn set_config_values_as_strings(
        &self,
        _requirement: &Requirement,
        _environ: &mut Environ,
        _local_state: &mut LocalStateFile,
        _default_env_spec_name: Option<&str>,
        _overrides: &mut UserConfigOverrides,
        _values: &BTreeMap<String, String>,
    ) {
    }

    /// Gather config and dependency information. Read-only.
    fn analyze(&self, requirement: &Requirement, ctx: &StatusContext<'_>) -> ProviderAnalysis {
        ProviderAnalysis {
            config: self.read_config(requirement, ctx),
            missing_env_vars_to_configure: self.missing_env_vars_to_configure(
                requirement,
                ctx.environ,
                ctx.local_state,
            ),
            missing_env_vars_to_provide: self.missing_env_vars_to_provide(
                requirement,
                ctx.environ,
                ctx.local_state,
            ),
            extra: AnalysisExtra::None,
        }
    }

    /// Whether the requirement holds, with a description.
    fn status(
        &self,
        requirement: &Requirement,
        ctx: &StatusContext<'_>,
        _analysis: &ProviderAnalysis,
    ) -> (bool, String) {
        requirement.environ_status(ctx.environ)
    }

    /// Create the resource and set the variable in `ctx.environ`.
    fn provide(&self, requirement: &Requirement, ctx: &mut ProvideContext<'_>) -> ProvideResult;

    /// Tear down what provide() created. Not an error if nothing was created.
    fn unprovide(
        &self,
        requirement: &Requirement,
        environ: &Environ,
        local_state: &mut LocalStateFile,
        overrides: &UserConfigOverrides,
        status: Option<&RequirementStatus>,
    ) -> Teardown;
}

/// Run a service's recorded shutdown commands and forget its run state.
pub fn shutdown_service_run_state(local_state: &mut LocalStateFile, service_name: &str) -> Teardown {
    let run_states = local_state.all_service_run_states();
    let Some(state) = run_states.get(service_name).filter(|s| !s.is_empty()) else {
        return Teardown::NothingToDo(SimpleStatus::success(format!(
            "Nothing to do to shut down {}.",
            service_name
        )));
    };

    let mut errors = Vec::new();
    for command in &state.shutdown_commands {
        let code = match execute(command, &CommandOptions::captured()) {
            Ok(result) if result.success => continue,
            Ok(result) => result.exit_code.unwrap_or(-1),
            Err(e) => {
                tracing::debug!("{}", e);
                -1
            }
        };
        errors.push(format!(
            "Shutting down {}, command {:?} failed with code {}.",
            service_name, command, code
        ));
    }

    local_state.set_service_run_state(service_name, &ServiceRunState::default());
    if let Err(e) = local_state.save() {
        errors.push(e.to_string());
    }

    if errors.is_empty() {
        Teardown::Done(SimpleStatus::success(format!(
            "Successfully shut down {}.",
            service_name
        )))
    } else {
        for error in &errors {
            tracing::error!("{}", error);
        }
        Teardown::Failed(SimpleStatus::failure(
            format!("Shutdown commands failed for {}.", service_name),
            errors,
        ))
    }
}

/// Delete a service's directory, and the parent `services/` directory if
/// that leaves it empty. Failures are ignored.
pub fn delete_service_directory(local_state: &LocalStateFile, relative_name: &str) {
    let path = local_state.service_directory(relative_name);
    let _ = fs::remove_dir_all(&path);
    if let Some(parent) = path.parent() {
        // only succeeds when empty
        let _ = fs::remove_dir(parent);
    }
}
