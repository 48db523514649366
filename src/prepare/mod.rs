//! Preparing a project: turning its requirements into a runnable environment.
//!
//! A run checks every requirement, orders them by the variables they wait
//! on, and provides them in stages. Each stage is driven explicitly by the
//! caller (see [`PrepareStage`]); [`prepare_without_interaction`] drives
//! the whole chain.
//!
//! The caller's environment is copied once at the start. Everything a run
//! changes lands in that copy and is reported through [`PrepareResult`].
//!
//! # Modules
//!
//! - [`dependency`] - Ordering requirements by what they wait on
//! - [`result`] - The outcome of a run
//! - [`stage`] - The stage state machine
//! - [`unprepare`] - Teardown

pub mod dependency;
pub mod result;
pub mod stage;
mod unprepare;

pub use result::{PrepareOutcome, PrepareResult};
pub use stage::{ConfigurePrepareContext, PrepareStage};
pub use unprepare::unprepare;

use std::sync::Arc;

use crate::environ::{self, Environ};
use crate::error::{Result, StagehandError};
use crate::project::{ops, Project, ProjectCommand};
use crate::requirements::{
    remove_env_path, ProvideMode, RequirementsRegistry, UserConfigOverrides, WhitelistEntry,
};
use crate::state::LocalStateFile;
use crate::status::Status;
use stage::RunContext;

/// Knobs for a prepare run.
#[derive(Debug, Clone, Default)]
pub struct PrepareOptions {
    pub mode: ProvideMode,

    /// After a failed stage, hand back a fresh attempt instead of stopping.
    pub keep_going_until_success: bool,

    /// Only provide requirements matching one of these entries.
    pub whitelist: Option<Vec<WhitelistEntry>>,

    /// Env spec to require instead of the command's or project's default.
    pub env_spec_name: Option<String>,

    /// Command to prepare for; `None` or `"default"` is the default command.
    pub command_name: Option<String>,

    /// A command not declared in the project, used instead of `command_name`.
    pub command: Option<ProjectCommand>,

    /// Extra arguments appended to the command.
    pub extra_command_args: Vec<String>,

    /// Delete the env spec's project-scoped environment first.
    pub refresh: bool,
}

/// Copy `environ` for a run: set `PROJECT_DIR`, and move any active
/// package environment out of the way, remembering it as inherited.
fn prepare_environ_and_overrides(
    project: &Project,
    environ: &Environ,
    env_spec_name: Option<String>,
) -> Result<(Environ, UserConfigOverrides)> {
    if !environ.contains_key(environ::PATH) {
        return Err(StagehandError::MissingEnvironmentVariable {
            name: environ::PATH.to_string(),
        });
    }

    let mut environ_copy = environ.clone();
    environ_copy.insert(
        environ::PROJECT_DIR.to_string(),
        project.directory().display().to_string(),
    );

    let inherited_env = environ::get_prefix(&environ_copy);
    environ::delete_prefix_variables(&mut environ_copy);

    Ok((
        environ_copy,
        UserConfigOverrides {
            env_spec_name,
            inherited_env,
        },
    ))
}

/// The command a run prepares for, or an error naming the valid choices.
fn resolve_command(project: &Project, options: &PrepareOptions) -> Result<Option<ProjectCommand>> {
    if let Some(command) = &options.command {
        return Ok(Some(command.clone()));
    }
    match options.command_name.as_deref() {
        None | Some("default") => Ok(project.default_command().cloned()),
        Some(name) => match project.command_for_name(Some(name)) {
            Some(command) => Ok(Some(command.clone())),
            None => Err(StagehandError::UnknownCommand {
                name: name.to_string(),
                filename: project.file_display_name(),
                found: ops::sorted_names(project.commands().iter().map(|c| &c.name)),
            }),
        },
    }
}

/// Everything that must hold before any requirement is looked at.
fn check_prerequisites(project: &Project, options: &PrepareOptions) -> Result<Option<ProjectCommand>> {
    if !project.problems().is_empty() {
        return Err(StagehandError::ProjectProblems {
            problems: project.problems().to_vec(),
        });
    }
    if let Some(name) = &options.env_spec_name {
        ops::env_spec(project, name)?;
    }
    resolve_command(project, options)
}

/// The env spec a run that failed early would have used.
fn would_have_used_env_spec(project: &Project, options: &PrepareOptions) -> String {
    options.env_spec_name.clone().unwrap_or_else(|| {
        let command = resolve_command(project, options).ok().flatten();
        project.default_env_spec_name_for_command(command.as_ref())
    })
}

/// Error lines for a prerequisite failure.
fn prerequisite_errors(error: &StagehandError) -> Vec<String> {
    match error {
        StagehandError::ProjectProblems { problems } => problems
            .iter()
            .cloned()
            .chain(std::iter::once(error.to_string()))
            .collect(),
        other => vec![other.to_string()],
    }
}

fn first_stage(
    project: &Project,
    environ_copy: Environ,
    overrides: UserConfigOverrides,
    registry: Arc<RequirementsRegistry>,
    command: Option<ProjectCommand>,
    options: PrepareOptions,
) -> Result<PrepareStage> {
    let directory = project.directory();
    let local_state = LocalStateFile::load_for_directory(directory)?;
    let default_env_spec_name = project.default_env_spec_name_for_command(command.as_ref());

    if options.refresh {
        let name = overrides
            .env_spec_name
            .as_deref()
            .unwrap_or(&default_env_spec_name);
        let spec = ops::env_spec(project, name)?;
        let removed = remove_env_path(&spec.path(directory), directory);
        if removed.failed() {
            for error in removed.status().errors() {
                tracing::error!("{}", error);
            }
        } else {
            tracing::info!("{}", removed.status().status_description());
        }
    }

    let run = RunContext {
        registry,
        environ: environ_copy,
        local_state,
        overrides,
        default_env_spec_name,
        mode: options.mode,
        keep_going_until_success: options.keep_going_until_success,
        whitelist: options.whitelist,
        command,
        extra_command_args: options.extra_command_args,
    };

    let statuses: Vec<_> = {
        let ctx = run.status_context();
        project
            .requirements(run.overrides.env_spec_name.as_deref())
            .iter()
            .map(|requirement| requirement.check_status(&ctx, None))
            .collect()
    };

    Ok(stage::stages_for(run, statuses.clone(), statuses))
}

/// Get the first stage of a run without doing anything yet.
///
/// Executing each stage may return a new stage, or `None` when the run is
/// over. Stages install packages, download files and start services.
///
/// Project problems, an unknown env spec and an unknown command are
/// errors here; so is an `environ` without `PATH`.
pub fn prepare_in_stages(
    project: &Project,
    environ: &Environ,
    registry: Arc<RequirementsRegistry>,
    options: PrepareOptions,
) -> Result<PrepareStage> {
    let (environ_copy, overrides) =
        prepare_environ_and_overrides(project, environ, options.env_spec_name.clone())?;
    let command = check_prerequisites(project, &options)?;
    first_stage(project, environ_copy, overrides, registry, command, options)
}

/// Prepare a project to run one of its commands, without asking anything.
///
/// Never modifies `environ`. Project problems and bad names come back as
/// a failed result; the only errors are an `environ` without `PATH` and
/// an unreadable local state file.
pub fn prepare_without_interaction(
    project: &Project,
    environ: &Environ,
    registry: Arc<RequirementsRegistry>,
    options: PrepareOptions,
) -> Result<PrepareResult> {
    let (environ_copy, overrides) =
        prepare_environ_and_overrides(project, environ, options.env_spec_name.clone())?;

    let command = match check_prerequisites(project, &options) {
        Ok(command) => command,
        Err(error) => {
            let errors = prerequisite_errors(&error);
            for line in &errors {
                tracing::error!("{}", line);
            }
            return Ok(PrepareResult::failure(
                Vec::new(),
                errors,
                environ_copy,
                overrides,
                Some(would_have_used_env_spec(project, &options)),
            ));
        }
    };

    let options = PrepareOptions {
        keep_going_until_success: false,
        ..options
    };
    let stage = first_stage(project, environ_copy, overrides, registry, command, options)?;
    Ok(prepare_execute_without_interaction(stage))
}

/// Execute stages until one fails or the chain ends.
pub fn prepare_execute_without_interaction(mut stage: PrepareStage) -> PrepareResult {
    loop {
        let next = stage.execute();
        match next {
            Some(next) if !stage.failed() => stage = next,
            _ => return stage.into_result(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conda::MockCondaManager;
    use crate::download::MockDownloader;
    use std::fs;
    use tempfile::TempDir;

    fn registry() -> Arc<RequirementsRegistry> {
        Arc::new(RequirementsRegistry::new(
            Arc::new(MockCondaManager::new()),
            Arc::new(MockDownloader::new()),
        ))
    }

    fn project(yaml: &str) -> (TempDir, Project) {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("stagehand.yml"), yaml).unwrap();
        let project = Project::load(temp.path()).unwrap();
        (temp, project)
    }

    fn base_environ() -> Environ {
        Environ::from([("PATH".to_string(), "/usr/bin:/bin".to_string())])
    }

    #[test]
    fn path_is_required() {
        let (_temp, project) = project("");
        let result = prepare_without_interaction(
            &project,
            &Environ::new(),
            registry(),
            PrepareOptions::default(),
        );
        assert!(matches!(
            result,
            Err(StagehandError::MissingEnvironmentVariable { .. })
        ));
    }

    #[test]
    fn active_environment_becomes_inherited() {
        let (_temp, project) = project("");
        let mut environ = base_environ();
        environ.insert("CONDA_PREFIX".into(), "/opt/env".into());
        let (copy, overrides) = prepare_environ_and_overrides(&project, &environ, None).unwrap();
        assert!(!copy.contains_key("CONDA_PREFIX"));
        assert_eq!(overrides.inherited_env.as_deref(), Some("/opt/env"));
        assert_eq!(copy["PROJECT_DIR"], project.directory().display().to_string());
    }

    #[test]
    fn project_problems_fail_with_summary_last() {
        let (_temp, project) = project("variables:\n  CONDA_ENV_PATH: x\n");
        let result = prepare_without_interaction(
            &project,
            &base_environ(),
            registry(),
            PrepareOptions::default(),
        )
        .unwrap();
        assert!(result.failed());
        assert!(result.statuses().is_empty());
        assert_eq!(result.errors().last().unwrap(), "Unable to load the project.");
        assert_eq!(result.errors().len(), 2);
        assert_eq!(result.env_spec_name(), Some("default"));
    }

    #[test]
    fn unknown_env_spec_fails() {
        let (_temp, project) = project("env_specs:\n  b: {}\n  a: {}\n");
        let result = prepare_without_interaction(
            &project,
            &base_environ(),
            registry(),
            PrepareOptions {
                env_spec_name: Some("c".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            result.errors(),
            ["Environment name 'c' is not in stagehand.yml, these names were found: a, b"]
        );
        assert_eq!(result.env_spec_name(), Some("c"));
    }

    #[test]
    fn unknown_command_fails() {
        let (_temp, project) = project("commands:\n  serve: {unix: a}\n  build: {unix: b}\n");
        let result = prepare_without_interaction(
            &project,
            &base_environ(),
            registry(),
            PrepareOptions {
                command_name: Some("test".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            result.errors(),
            ["Command name 'test' is not in stagehand.yml, these names were found: build, serve"]
        );
    }

    #[test]
    fn prepare_in_stages_reports_prerequisites_as_errors() {
        let (_temp, project) = project("commands:\n  serve: {unix: a}\n");
        let result = prepare_in_stages(
            &project,
            &base_environ(),
            registry(),
            PrepareOptions {
                command_name: Some("nope".into()),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(StagehandError::UnknownCommand { .. })));
    }

    #[test]
    fn default_command_name_maps_to_default_command() {
        let (_temp, project) = project("commands:\n  serve: {unix: echo hi}\n");
        let result = prepare_without_interaction(
            &project,
            &base_environ(),
            registry(),
            PrepareOptions {
                command_name: Some("default".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!result.failed(), "{:?}", result.errors());
        let exec = result.command_exec_info().unwrap();
        assert!(exec.shell);
        assert_eq!(exec.args.last().unwrap(), "echo hi");
    }

    #[test]
    fn refresh_removes_project_environment() {
        let (temp, project) = project("");
        let env = temp.path().join("envs/default");
        fs::create_dir_all(env.join("conda-meta")).unwrap();
        fs::write(env.join("marker"), "x").unwrap();

        let result = prepare_without_interaction(
            &project,
            &base_environ(),
            registry(),
            PrepareOptions {
                refresh: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!result.failed());
        assert!(env.join("conda-meta").is_dir());
        assert!(!env.join("marker").exists());
    }

    #[test]
    fn keep_going_is_off_without_interaction() {
        let (_temp, project) = project("variables: [FOO]\n");
        let result = prepare_without_interaction(
            &project,
            &base_environ(),
            registry(),
            PrepareOptions {
                keep_going_until_success: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(result.failed());
    }
}
