//! Subprocess execution.
//!
//! Commands are run from an argv list. When [`CommandOptions::env`] is set
//! the child sees exactly that environment and nothing inherited, so a
//! prepared [`Environ`] reaches subprocesses without touching the
//! process-global environment.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::environ::Environ;
use crate::error::{Result, StagehandError};

/// Result of executing a command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code (None if killed by signal).
    pub exit_code: Option<i32>,

    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,

    /// Execution duration.
    pub duration: Duration,

    /// Whether command succeeded (exit code 0).
    pub success: bool,
}

/// Options for command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Working directory.
    pub cwd: Option<PathBuf>,

    /// Complete environment for the child (None = inherit).
    pub env: Option<Environ>,

    /// Capture stdout (if false, inherits from parent).
    pub capture_stdout: bool,

    /// Capture stderr (if false, inherits from parent).
    pub capture_stderr: bool,
}

impl CommandOptions {
    /// Options that capture both output streams.
    pub fn captured() -> Self {
        Self {
            capture_stdout: true,
            capture_stderr: true,
            ..Default::default()
        }
    }
}

/// Display form of an argv list, for logs and error messages.
pub fn display_argv(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                format!("'{}'", arg)
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Execute a command given as an argv list.
///
/// A non-zero exit is reported in the result, not as an error; only a
/// failure to start the process is an error.
pub fn execute(argv: &[String], options: &CommandOptions) -> Result<CommandResult> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| StagehandError::CommandNotRunnable {
            message: "Cannot execute an empty command.".to_string(),
        })?;

    tracing::debug!("Executing {}", display_argv(argv));
    let start = Instant::now();

    let mut cmd = Command::new(program);
    cmd.args(args);

    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }

    if let Some(env) = &options.env {
        cmd.env_clear();
        cmd.envs(env);
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(if options.capture_stdout {
        Stdio::piped()
    } else {
        Stdio::inherit()
    });
    cmd.stderr(if options.capture_stderr {
        Stdio::piped()
    } else {
        Stdio::inherit()
    });

    let output = cmd.output().map_err(|e| StagehandError::CommandFailed {
        command: format!("{}: {}", display_argv(argv), e),
        code: None,
    })?;

    let result = CommandResult {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration: start.elapsed(),
        success: output.status.success(),
    };

    if !result.success {
        tracing::debug!(
            "{} exited with {:?}: {}",
            display_argv(argv),
            result.exit_code,
            result.stderr.trim()
        );
    }

    Ok(result)
}

/// Execute a command line through `/bin/sh -c`.
pub fn execute_shell(command_line: &str, options: &CommandOptions) -> Result<CommandResult> {
    let argv = shell_argv(command_line);
    execute(&argv, options)
}

/// The argv that runs `command_line` through the platform shell.
pub fn shell_argv(command_line: &str) -> Vec<String> {
    if cfg!(target_os = "windows") {
        vec!["cmd.exe".into(), "/C".into(), command_line.into()]
    } else {
        vec!["/bin/sh".into(), "-c".into(), command_line.into()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    #[cfg(unix)]
    fn execute_successful_command() {
        let result = execute(&argv(&["echo", "hello"]), &CommandOptions::captured()).unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    #[cfg(unix)]
    fn execute_failing_command() {
        let result = execute_shell("exit 3", &CommandOptions::captured()).unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
    }

    #[test]
    #[cfg(unix)]
    fn execute_with_explicit_env_does_not_inherit() {
        let mut env = Environ::new();
        env.insert("ONLY_THIS".into(), "yes".into());
        let options = CommandOptions {
            env: Some(env),
            ..CommandOptions::captured()
        };

        let result = execute_shell("echo \"$ONLY_THIS:$HOME\"", &options).unwrap();
        assert_eq!(result.stdout.trim(), "yes:");
    }

    #[test]
    #[cfg(unix)]
    fn execute_with_cwd() {
        let temp = tempfile::TempDir::new().unwrap();
        let options = CommandOptions {
            cwd: Some(temp.path().to_path_buf()),
            ..CommandOptions::captured()
        };
        let result = execute(&argv(&["pwd"]), &options).unwrap();
        let reported = std::fs::canonicalize(result.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(temp.path()).unwrap());
    }

    #[test]
    fn execute_empty_argv_is_error() {
        let err = execute(&[], &CommandOptions::captured()).unwrap_err();
        assert!(matches!(err, StagehandError::CommandNotRunnable { .. }));
    }

    #[test]
    fn execute_missing_program_is_error() {
        let err = execute(
            &argv(&["definitely-not-a-real-program-xyz"]),
            &CommandOptions::captured(),
        )
        .unwrap_err();
        assert!(matches!(err, StagehandError::CommandFailed { .. }));
    }

    #[test]
    fn display_argv_quotes_spaces() {
        assert_eq!(display_argv(&argv(&["a", "b c"])), "a 'b c'");
    }
}
