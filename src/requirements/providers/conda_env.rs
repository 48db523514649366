//! The package environment provider.
//!
//! Chooses a prefix (project-scoped under `envs/<spec>`, or the environment
//! the caller had active when `inherit_environment` is set), makes it match
//! its spec through the [`CondaManager`], then activates it in the run's
//! environment.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::env_var::{apply_variable_config_values, provide_variable, read_variable_config};
use crate::conda::{CondaManager, EnvSpec, BOOTSTRAP_ENV_NAME};
use crate::environ::{self, Environ};
use crate::requirements::provider::{ProvideContext, ProvideMode, Provider, ProviderKind};
use crate::requirements::requirement::{Requirement, StatusContext, UserConfigOverrides};
use crate::requirements::status::{
    ConfigSource, ProvideResult, ProviderAnalysis, ProviderConfig, RequirementStatus, Teardown,
};
use crate::state::LocalStateFile;
use crate::status::SimpleStatus;

const INHERIT_ENVIRONMENT: &str = "inherit_environment";

/// Delete a project-scoped environment directory.
///
/// Environments outside `project_dir` are left alone.
pub fn remove_env_path(env_path: &Path, project_dir: &Path) -> Teardown {
    if !env_path.is_dir() {
        let name = env_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Teardown::NothingToDo(SimpleStatus::success(format!(
            "Nothing to clean up for environment '{}'.",
            name
        )));
    }

    if env_path == project_dir || !env_path.starts_with(project_dir) {
        return Teardown::NothingToDo(SimpleStatus::success(format!(
            "Current environment is not in {}, no need to delete it.",
            project_dir.display()
        )));
    }

    match fs::remove_dir_all(env_path) {
        Ok(()) => Teardown::Done(SimpleStatus::success(format!(
            "Deleted environment files in {}.",
            env_path.display()
        ))),
        Err(e) => {
            let problem = format!(
                "Failed to remove environment files in {}: {}.",
                env_path.display(),
                e
            );
            Teardown::Failed(SimpleStatus::failure(problem.clone(), vec![problem]))
        }
    }
}

fn project_dir(environ: &Environ) -> PathBuf {
    PathBuf::from(environ.get(environ::PROJECT_DIR).map(String::as_str).unwrap_or("."))
}

/// Provides a package environment; one instance serves the regular
/// environment and another the bootstrap environment.
pub struct CondaEnvProvider {
    conda: Arc<dyn CondaManager>,
    bootstrap: bool,
}

impl CondaEnvProvider {
    /// Provider for the project's package environment.
    pub fn new(conda: Arc<dyn CondaManager>) -> Self {
        Self {
            conda,
            bootstrap: false,
        }
    }

    /// Provider for the bootstrap environment.
    pub fn bootstrap(conda: Arc<dyn CondaManager>) -> Self {
        Self {
            conda,
            bootstrap: true,
        }
    }

    fn env_specs<'r>(&self, requirement: &'r Requirement) -> Option<&'r BTreeMap<String, EnvSpec>> {
        requirement.env_specs()
    }

    fn spec_matching_path<'r>(
        &self,
        requirement: &'r Requirement,
        project_dir: &Path,
        path: &Path,
    ) -> Option<&'r EnvSpec> {
        self.env_specs(requirement)?
            .values()
            .find(|spec| spec.path(project_dir) == path)
    }

    fn config_for(
        &self,
        requirement: &Requirement,
        environ: &Environ,
        local_state: &LocalStateFile,
        default_env_spec_name: Option<&str>,
        overrides: &UserConfigOverrides,
    ) -> ProviderConfig {
        let project_dir = project_dir(environ);

        if let Some(name) = &overrides.env_spec_name {
            let value = self
                .env_specs(requirement)
                .and_then(|specs| specs.get(name))
                .map(|spec| spec.path(&project_dir).to_string_lossy().into_owned());
            return ProviderConfig {
                value,
                env_name: Some(name.clone()),
                ..ProviderConfig::new(ConfigSource::Project)
            };
        }

        let mut config = read_variable_config(requirement, environ, local_state);

        if config.source == ConfigSource::Unset {
            config.source = ConfigSource::Project;
        }

        let inherit = local_state
            .get_bool(&[INHERIT_ENVIRONMENT])
            .unwrap_or(false);
        if let (true, Some(inherited)) = (inherit, &overrides.inherited_env) {
            config.source = ConfigSource::Inherited;
            config.value = Some(inherited.clone());
        }

        if config.source == ConfigSource::Environ {
            // the only way CONDA_PREFIX reaches the run's environment is from
            // an earlier provide, which always picks a project-scoped prefix
            config.source = ConfigSource::Project;
        }

        config.value = config
            .value
            .map(|v| environ::normalize(Path::new(&v)).to_string_lossy().into_owned());

        config.env_name = default_env_spec_name.map(String::from);

        match &config.value {
            Some(value) => {
                if let Some(spec) =
                    self.spec_matching_path(requirement, &project_dir, Path::new(value))
                {
                    config.env_name = Some(spec.name.clone());
                    if config.source == ConfigSource::Variables {
                        config.source = ConfigSource::Project;
                    }
                }
            }
            None if config.source == ConfigSource::Project => {
                config.value = config
                    .env_name
                    .as_ref()
                    .and_then(|name| self.env_specs(requirement)?.get(name))
                    .map(|spec| spec.path(&project_dir).to_string_lossy().into_owned());
            }
            None => {}
        }

        config
    }
}

impl Provider for CondaEnvProvider {
    fn kind(&self) -> ProviderKind {
        if self.bootstrap {
            ProviderKind::CondaBootstrapEnv
        } else {
            ProviderKind::CondaEnv
        }
    }

    fn missing_env_vars_to_configure(
        &self,
        _requirement: &Requirement,
        _environ: &Environ,
        _local_state: &LocalStateFile,
    ) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn read_config(&self, requirement: &Requirement, ctx: &StatusContext<'_>) -> ProviderConfig {
        self.config_for(
            requirement,
            ctx.environ,
            ctx.local_state,
            ctx.default_env_spec_name,
            ctx.overrides,
        )
    }

    fn set_config_values_as_strings(
        &self,
        requirement: &Requirement,
        environ: &mut Environ,
        local_state: &mut LocalStateFile,
        _default_env_spec_name: Option<&str>,
        overrides: &mut UserConfigOverrides,
        values: &BTreeMap<String, String>,
    ) {
        apply_variable_config_values(requirement, local_state, values);

        // a stale override would keep winning over the new choice
        overrides.env_spec_name = None;

        let Some(source) = values.get("source") else {
            return;
        };

        if source == ConfigSource::Inherited.as_str() {
            local_state.set_value(&[INHERIT_ENVIRONMENT], true);
            local_state.unset_value(&["variables", &requirement.env_var]);
        } else if local_state.get_value(&[INHERIT_ENVIRONMENT]).is_some() {
            local_state.set_value(&[INHERIT_ENVIRONMENT], false);
        }

        if source == ConfigSource::Project.as_str() {
            let project_dir = project_dir(environ);
            let chosen = values
                .get("env_name")
                .and_then(|name| self.env_specs(requirement)?.get(name));
            if let Some(spec) = chosen {
                let prefix = spec.path(&project_dir).to_string_lossy().into_owned();
                local_state.set_value(&["variables", &requirement.env_var], prefix);
            }
        }
    }

    fn status(
        &self,
        requirement: &Requirement,
        ctx: &StatusContext<'_>,
        analysis: &ProviderAnalysis,
    ) -> (bool, String) {
        let config = &analysis.config;
        let (prefix, env_name) = if self.bootstrap {
            (
                project_dir(ctx.environ).join("envs").join(BOOTSTRAP_ENV_NAME),
                Some(BOOTSTRAP_ENV_NAME.to_string()),
            )
        } else {
            let Some(value) = &config.value else {
                return (false, format!("{} is not set.", requirement.env_var));
            };
            (PathBuf::from(value), config.env_name.clone())
        };

        if let Some(name) = env_name {
            let Some(spec) = self.env_specs(requirement).and_then(|specs| specs.get(&name))
            else {
                return (false, format!("Environment spec '{}' is not defined.", name));
            };
            match self.conda.find_environment_deviations(&prefix, spec) {
                Ok(deviations) if !deviations.ok() => return (false, deviations.summary),
                Ok(_) => {}
                Err(e) => return (false, e.to_string()),
            }
        }

        if ctx.environ.contains_key(&requirement.env_var) {
            (true, format!("Using Conda environment {}.", prefix.display()))
        } else {
            (false, format!("{} is not set.", requirement.env_var))
        }
    }

    fn provide(&self, requirement: &Requirement, ctx: &mut ProvideContext<'_>) -> ProvideResult {
        let status = ctx.status;
        let config = &status.analysis.config;
        let inherited = config.source == ConfigSource::Inherited;

        if inherited {
            if let Some(value) = &config.value {
                ctx.environ.insert(requirement.env_var.clone(), value.clone());
            }
        }

        provide_variable(requirement, ctx);
        let result = ProvideResult::empty();

        let project_dir = project_dir(ctx.environ);
        let env_name = config
            .env_name
            .clone()
            .or_else(|| ctx.default_env_spec_name.map(String::from));

        let prefix = if env_name.as_deref() == Some(BOOTSTRAP_ENV_NAME) {
            Some(project_dir.join("envs").join(BOOTSTRAP_ENV_NAME))
        } else if inherited {
            ctx.environ.get(&requirement.env_var).map(PathBuf::from)
        } else {
            None
        };

        let mut spec = env_name
            .as_ref()
            .and_then(|name| self.env_specs(requirement)?.get(name));
        let Some(prefix) = prefix.or_else(|| spec.map(|s| s.path(&project_dir))) else {
            let message = format!(
                "Environment spec '{}' is not defined.",
                env_name.unwrap_or_default()
            );
            return result.copy_with_additions(vec![message], vec![]);
        };

        if let Some(matching) = self.spec_matching_path(requirement, &project_dir, &prefix) {
            spec = Some(matching);
        }

        if ctx.mode != ProvideMode::Check {
            let Some(spec) = spec else {
                let message = format!("No environment spec for {}.", prefix.display());
                return result.copy_with_additions(vec![message], vec![]);
            };

            tracing::debug!("Updating environment at {}", prefix.display());
            let fixed = self
                .conda
                .find_environment_deviations(&prefix, spec)
                .and_then(|deviations| {
                    if deviations.ok() {
                        tracing::debug!("Environment at {} is up to date", prefix.display());
                        return Ok(());
                    }
                    self.conda
                        .fix_environment_deviations(&prefix, spec, Some(&deviations), !inherited)
                });
            if let Err(e) = fixed {
                return result.copy_with_additions(vec![e.to_string()], vec![]);
            }
        }

        environ::set_prefix(ctx.environ, &prefix, &requirement.env_var);
        let path = ctx.environ.get(environ::PATH).cloned().unwrap_or_default();
        ctx.environ.insert(
            environ::PATH.to_string(),
            environ::set_conda_env_in_path(&path, &prefix),
        );

        result
    }

    fn unprovide(
        &self,
        requirement: &Requirement,
        environ: &Environ,
        local_state: &mut LocalStateFile,
        overrides: &UserConfigOverrides,
        status: Option<&RequirementStatus>,
    ) -> Teardown {
        let value = match status {
            Some(status) => status.analysis.config.value.clone(),
            None => {
                self.config_for(requirement, environ, local_state, Some("default"), overrides)
                    .value
            }
        };
        let Some(env_path) = value else {
            return Teardown::NothingToDo(SimpleStatus::success(format!(
                "Nothing to clean up for {}.",
                requirement.env_var
            )));
        };
        remove_env_path(Path::new(&env_path), &project_dir(environ))
    }
}
