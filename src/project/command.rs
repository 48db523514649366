//! Project commands and the exec info a prepared environment resolves them to.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use crate::environ::{self, Environ};
use crate::error::{Result, StagehandError};
use crate::shell::shell_argv;

/// A command declared in the project file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectCommand {
    /// Command name, the key in the `commands` section.
    #[serde(skip)]
    pub name: String,

    /// Shell command line.
    #[serde(default)]
    pub unix: Option<String>,

    /// Argv to exec directly.
    #[serde(default)]
    pub args: Option<Vec<String>>,

    /// Environment spec this command runs in by default.
    #[serde(default)]
    pub env_spec: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Variables added to the command's environment when not already set.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Everything needed to launch a prepared command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExecInfo {
    /// Working directory (the project directory).
    pub cwd: PathBuf,

    /// Argv. With `shell` set, this is `sh -c <line>`.
    pub args: Vec<String>,

    /// Whether the command line goes through a shell.
    pub shell: bool,

    /// The complete environment for the child.
    pub env: Environ,
}

impl CommandExecInfo {
    /// Start the command. The child sees exactly [`CommandExecInfo::env`].
    pub fn spawn(&self) -> Result<Child> {
        let (program, rest) = self
            .args
            .split_first()
            .ok_or_else(|| StagehandError::CommandNotRunnable {
                message: "Command has no arguments".to_string(),
            })?;

        tracing::debug!("$ {}", self.args.join(" "));
        Command::new(program)
            .args(rest)
            .current_dir(&self.cwd)
            .env_clear()
            .envs(&self.env)
            .spawn()
            .map_err(|e| StagehandError::CommandNotRunnable {
                message: format!("Failed to execute '{}': {}", program, e),
            })
    }
}

fn quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\"'\"'"))
    }
}

impl ProjectCommand {
    /// A command running `line` through the shell.
    pub fn shell(name: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unix: Some(line.into()),
            args: None,
            env_spec: None,
            description: None,
            variables: BTreeMap::new(),
        }
    }

    /// A command exec'ing `args` directly.
    pub fn argv(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            unix: None,
            args: Some(args),
            env_spec: None,
            description: None,
            variables: BTreeMap::new(),
        }
    }

    /// Helpful string showing what the command is.
    pub fn description(&self) -> String {
        self.description
            .clone()
            .or_else(|| self.unix.clone())
            .or_else(|| self.args.as_ref().map(|args| args.join(" ")))
            .unwrap_or_default()
    }

    fn args_and_shell(&self, extra_args: &[String]) -> Option<(Vec<String>, bool)> {
        if let Some(args) = &self.args {
            let mut args = args.clone();
            args.extend(extra_args.iter().cloned());
            return Some((args, false));
        }
        let line = self.unix.as_ref()?;
        let line = extra_args
            .iter()
            .fold(line.clone(), |line, arg| format!("{} {}", line, quote(arg)));
        Some((shell_argv(&line), true))
    }

    /// Resolve this command against a prepared environment.
    ///
    /// `environ` must contain `CONDA_PREFIX`, `PATH` and `PROJECT_DIR`.
    /// Without a shell, `argv[0]` is looked up on `PROJECT_DIR:PATH` and
    /// replaced by its absolute path when found.
    pub fn exec_info_for_environment(
        &self,
        environ: &Environ,
        extra_args: &[String],
    ) -> Result<CommandExecInfo> {
        for name in [environ::CONDA_PREFIX, environ::PATH, environ::PROJECT_DIR] {
            if !environ.contains_key(name) {
                return Err(StagehandError::CommandNotRunnable {
                    message: format!("To get a runnable command for the app, {} must be set.", name),
                });
            }
        }

        let (mut args, shell) =
            self.args_and_shell(extra_args)
                .ok_or_else(|| StagehandError::CommandNotRunnable {
                    message: format!("Command '{}' has nothing to run", self.name),
                })?;
        if args.is_empty() {
            return Err(StagehandError::CommandNotRunnable {
                message: format!("Command '{}' has an empty argument list", self.name),
            });
        }

        let project_dir = &environ[environ::PROJECT_DIR];
        if !shell {
            let search = format!("{}:{}", project_dir, environ[environ::PATH]);
            if let Some(found) = environ::split_path(&search)
                .into_iter()
                .map(|dir| dir.join(&args[0]))
                .find(|candidate| candidate.exists())
            {
                args[0] = absolute(&found).display().to_string();
            }
        }

        let mut env = environ.clone();
        for (name, value) in &self.variables {
            env.entry(name.clone()).or_insert_with(|| value.clone());
        }

        Ok(CommandExecInfo {
            cwd: PathBuf::from(project_dir),
            args,
            shell,
            env,
        })
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        environ::normalize(path)
    } else {
        environ::normalize(&std::env::current_dir().unwrap_or_default().join(path))
    }
}
