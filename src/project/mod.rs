//! Projects: a directory with a `stagehand.yml` describing what it needs.
//!
//! Loading never fails because of what the file says. Structural trouble
//! is collected into [`Project::problems`], and a project with problems
//! refuses to prepare.
//!
//! # Modules
//!
//! - [`command`] - Declared commands and their exec info
//! - [`ops`] - Package operations on a project's environments

pub mod command;
mod file;
pub mod ops;

pub use command::{CommandExecInfo, ProjectCommand};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::conda::{EnvSpec, BOOTSTRAP_ENV_NAME};
use crate::error::{Result, StagehandError};
use crate::requirements::Requirement;

/// Project file names, in lookup order.
pub const PROJECT_FILENAMES: [&str; 2] = ["stagehand.yml", "stagehand.yaml"];

/// Name of the env spec a project gets when it declares none.
pub const DEFAULT_ENV_SPEC_NAME: &str = "default";

/// A loaded project.
///
/// Requirements are built once at load time, so every call to
/// [`Project::requirements`] hands out the same `Arc`s.
#[derive(Debug, Clone)]
pub struct Project {
    directory: PathBuf,
    filename: PathBuf,
    name: String,
    problems: Vec<String>,
    env_specs: BTreeMap<String, EnvSpec>,
    env_spec_order: Vec<String>,
    commands: Vec<ProjectCommand>,
    conda_env: Arc<Requirement>,
    bootstrap_env: Arc<Requirement>,
    requirements: Vec<Arc<Requirement>>,
}

impl Project {
    /// Load the project in `directory`.
    ///
    /// A directory without a project file is an empty project. A file
    /// that isn't valid YAML is a problem, not an error.
    pub fn load(directory: &Path) -> Result<Self> {
        if !directory.is_dir() {
            return Err(StagehandError::ProjectNotFound {
                path: directory.to_path_buf(),
            });
        }

        let filename = PROJECT_FILENAMES
            .iter()
            .map(|name| directory.join(name))
            .find(|path| path.exists())
            .unwrap_or_else(|| directory.join(PROJECT_FILENAMES[0]));
        let display_name = filename
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut syntax_problems = Vec::new();
        let document = if filename.exists() {
            let content = fs::read_to_string(&filename)?;
            match serde_yaml::from_str::<serde_yaml::Value>(&content) {
                Ok(document) => document,
                Err(e) => {
                    syntax_problems.push(format!("{}: {}", display_name, e));
                    serde_yaml::Value::Null
                }
            }
        } else {
            tracing::debug!("No project file in {}", directory.display());
            serde_yaml::Value::Null
        };

        let parsed = file::parse(&document, &display_name);
        let mut project = Self::from_parsed(directory, filename, parsed);
        project.problems.splice(0..0, syntax_problems);
        Ok(project)
    }

    fn from_parsed(directory: &Path, filename: PathBuf, parsed: file::ParsedProject) -> Self {
        let file::ParsedProject {
            name,
            variables,
            downloads,
            services,
            mut env_specs,
            commands,
            mut problems,
        } = parsed;

        if env_specs.is_empty() {
            env_specs.push(EnvSpec::new(DEFAULT_ENV_SPEC_NAME));
        }
        let env_spec_order: Vec<String> = env_specs.iter().map(|spec| spec.name.clone()).collect();
        let env_specs: BTreeMap<String, EnvSpec> = env_specs
            .into_iter()
            .map(|spec| (spec.name.clone(), spec))
            .collect();

        let file_display = filename
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for command in &commands {
            if let Some(env_spec) = &command.env_spec {
                if !env_specs.contains_key(env_spec) {
                    problems.push(format!(
                        "{}: command '{}' has env_spec '{}' which is not in the env_specs section",
                        file_display, command.name, env_spec
                    ));
                }
            }
        }

        let name = name.unwrap_or_else(|| {
            directory
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        let requirements = variables
            .into_iter()
            .chain(downloads)
            .chain(services)
            .map(Arc::new)
            .collect();

        Self {
            directory: directory.to_path_buf(),
            filename,
            name,
            problems,
            conda_env: Arc::new(Requirement::conda_env(env_specs.clone())),
            bootstrap_env: Arc::new(Requirement::conda_bootstrap_env(env_specs.clone())),
            env_specs,
            env_spec_order,
            commands,
            requirements,
        }
    }

    /// The project directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The project file path (which may not exist).
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// The project file's name without its directory.
    pub fn file_display_name(&self) -> String {
        self.filename
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Everything wrong with the project file. Must be empty to prepare.
    pub fn problems(&self) -> &[String] {
        &self.problems
    }

    /// Env specs by name.
    pub fn env_specs(&self) -> &BTreeMap<String, EnvSpec> {
        &self.env_specs
    }

    /// Env spec names in declaration order.
    pub fn env_spec_names(&self) -> &[String] {
        &self.env_spec_order
    }

    /// The first declared env spec.
    pub fn default_env_spec_name(&self) -> &str {
        self.env_spec_order
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_ENV_SPEC_NAME)
    }

    /// Commands in declaration order.
    pub fn commands(&self) -> &[ProjectCommand] {
        &self.commands
    }

    /// The command named `default`, else the first declared one.
    pub fn default_command(&self) -> Option<&ProjectCommand> {
        self.commands
            .iter()
            .find(|command| command.name == "default")
            .or_else(|| self.commands.first())
    }

    /// Look up a command; `None` asks for the default command.
    pub fn command_for_name(&self, name: Option<&str>) -> Option<&ProjectCommand> {
        match name {
            None => self.default_command(),
            Some(name) => self.commands.iter().find(|command| command.name == name),
        }
    }

    /// The env spec a command runs in: its own, else the project default.
    pub fn default_env_spec_name_for_command(&self, command: Option<&ProjectCommand>) -> String {
        command
            .and_then(|command| command.env_spec.clone())
            .unwrap_or_else(|| self.default_env_spec_name().to_string())
    }

    /// Requirements for running in `env_spec_name`.
    ///
    /// The package environment comes first, then variables, downloads and
    /// services in file order. The bootstrap env spec only needs its own
    /// package environment.
    pub fn requirements(&self, env_spec_name: Option<&str>) -> Vec<Arc<Requirement>> {
        if env_spec_name == Some(BOOTSTRAP_ENV_NAME) {
            return vec![Arc::clone(&self.bootstrap_env)];
        }
        std::iter::once(Arc::clone(&self.conda_env))
            .chain(self.requirements.iter().cloned())
            .collect()
    }

    /// Look up a declared requirement by variable name.
    pub fn find_requirement(&self, env_var: &str) -> Option<Arc<Requirement>> {
        std::iter::once(&self.conda_env)
            .chain(&self.requirements)
            .find(|requirement| requirement.env_var == env_var)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirements::RequirementClass;
    use tempfile::TempDir;

    fn project_with(yaml: &str) -> (TempDir, Project) {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("stagehand.yml"), yaml).unwrap();
        let project = Project::load(temp.path()).unwrap();
        (temp, project)
    }

    #[test]
    fn missing_directory_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = Project::load(&temp.path().join("nope"));
        assert!(matches!(result, Err(StagehandError::ProjectNotFound { .. })));
    }

    #[test]
    fn missing_file_is_an_empty_project() {
        let temp = TempDir::new().unwrap();
        let project = Project::load(temp.path()).unwrap();
        assert!(project.problems().is_empty());
        assert_eq!(project.default_env_spec_name(), "default");
        assert_eq!(project.env_spec_names(), ["default"]);
        assert!(project.commands().is_empty());
        assert_eq!(
            project.name(),
            temp.path().file_name().unwrap().to_str().unwrap()
        );

        let requirements = project.requirements(None);
        assert_eq!(requirements.len(), 1);
        assert!(requirements[0].is_a(RequirementClass::CondaEnv));
    }

    #[test]
    fn yaml_alternative_extension() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("stagehand.yaml"), "name: alt\n").unwrap();
        let project = Project::load(temp.path()).unwrap();
        assert_eq!(project.name(), "alt");
        assert!(project.filename().ends_with("stagehand.yaml"));
    }

    #[test]
    fn syntax_error_is_a_problem() {
        let (_temp, project) = project_with("variables: [FOO\n");
        assert_eq!(project.problems().len(), 1);
        assert!(project.problems()[0].starts_with("stagehand.yml: "));
    }

    #[test]
    fn requirements_order_and_identity() {
        let (_temp, project) = project_with(
            "services:\n  REDIS_URL: redis\ndownloads:\n  DATA: http://x/data.csv\nvariables: [FOO]\n",
        );
        let first = project.requirements(None);
        let names: Vec<_> = first.iter().map(|r| r.env_var.as_str()).collect();
        assert_eq!(names, vec!["CONDA_PREFIX", "FOO", "DATA", "REDIS_URL"]);

        let second = project.requirements(None);
        for (a, b) in first.iter().zip(&second) {
            assert!(Arc::ptr_eq(a, b));
        }
    }

    #[test]
    fn bootstrap_env_spec_needs_only_bootstrap_env() {
        let (_temp, project) = project_with("variables: [FOO]\n");
        let requirements = project.requirements(Some("bootstrap-env"));
        assert_eq!(requirements.len(), 1);
        assert!(requirements[0].is_a(RequirementClass::CondaBootstrapEnv));
    }

    #[test]
    fn first_env_spec_is_default() {
        let (_temp, project) = project_with("env_specs:\n  py3: {}\n  py2: {}\n");
        assert_eq!(project.default_env_spec_name(), "py3");
        assert_eq!(project.env_spec_names(), ["py3", "py2"]);
    }

    #[test]
    fn default_command_prefers_name_default() {
        let (_temp, project) = project_with(
            "commands:\n  first: {unix: a}\n  default: {unix: b}\n",
        );
        assert_eq!(project.default_command().unwrap().name, "default");
        assert_eq!(project.command_for_name(Some("first")).unwrap().name, "first");
        assert!(project.command_for_name(Some("nope")).is_none());

        let (_temp, project) = project_with("commands:\n  first: {unix: a}\n  second: {unix: b}\n");
        assert_eq!(project.command_for_name(None).unwrap().name, "first");
    }

    #[test]
    fn command_env_spec_must_exist() {
        let (_temp, project) = project_with(
            "env_specs:\n  py3: {}\ncommands:\n  run: {unix: a, env_spec: py2}\n",
        );
        assert_eq!(
            project.problems(),
            ["stagehand.yml: command 'run' has env_spec 'py2' which is not in the env_specs section"]
        );
    }

    #[test]
    fn env_spec_for_command() {
        let (_temp, project) = project_with(
            "env_specs:\n  a: {}\n  b: {}\ncommands:\n  x: {unix: x, env_spec: b}\n  y: {unix: y}\n",
        );
        assert_eq!(project.default_env_spec_name_for_command(project.command_for_name(Some("x"))), "b");
        assert_eq!(project.default_env_spec_name_for_command(project.command_for_name(Some("y"))), "a");
        assert_eq!(project.default_env_spec_name_for_command(None), "a");
    }
}
