//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::requirements::ProvideMode;

/// Stagehand - Get a project's packages, downloads and services ready to run.
#[derive(Debug, Parser)]
#[command(name = "stagehand")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project directory (overrides current directory)
    #[arg(short, long, global = true)]
    pub directory: Option<PathBuf>,

    /// Show every requirement, not only the failing ones
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Set up the project so its commands can run (default if no command specified)
    Prepare(PrepareArgs),

    /// Prepare, then run one of the project's commands
    Run(RunArgs),

    /// Tear down what prepare set up
    Unprepare(UnprepareArgs),

    /// Check each requirement without changing anything
    Status(StatusArgs),

    /// Resolve an env spec's packages to exact versions
    Resolve(ResolveArgs),

    /// Remove packages from an env spec's environment
    RemovePackages(RemovePackagesArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the `prepare` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct PrepareArgs {
    /// What prepare may do: provision for development or production, or only check
    #[arg(long, value_enum, default_value_t = ProvideMode::Development)]
    pub mode: ProvideMode,

    /// Env spec to prepare instead of the project's default
    #[arg(long, value_name = "NAME")]
    pub env_spec: Option<String>,

    /// Prepare for this command (default command if omitted)
    #[arg(long, value_name = "NAME")]
    pub command: Option<String>,

    /// Delete and rebuild the environment first
    #[arg(long)]
    pub refresh: bool,

    /// Never ask for missing values
    #[arg(long)]
    pub non_interactive: bool,
}

/// Arguments for the `run` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RunArgs {
    /// Command to run (default command if omitted)
    pub command: Option<String>,

    /// What prepare may do before running
    #[arg(long, value_enum, default_value_t = ProvideMode::Development)]
    pub mode: ProvideMode,

    /// Env spec to run in instead of the command's default
    #[arg(long, value_name = "NAME")]
    pub env_spec: Option<String>,

    /// Never ask for missing values
    #[arg(long)]
    pub non_interactive: bool,

    /// Extra arguments passed to the command
    #[arg(last = true)]
    pub extra_args: Vec<String>,
}

/// Arguments for the `unprepare` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct UnprepareArgs {
    /// Only tear down the requirement for this variable (repeatable)
    #[arg(long, value_name = "VAR")]
    pub only: Vec<String>,
}

/// Arguments for the `status` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct StatusArgs {
    /// Env spec to check instead of the project's default
    #[arg(long, value_name = "NAME")]
    pub env_spec: Option<String>,
}

/// Arguments for the `resolve` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ResolveArgs {
    /// Env spec to resolve (project default if omitted)
    #[arg(long, value_name = "NAME")]
    pub env_spec: Option<String>,
}

/// Arguments for the `remove-packages` command.
#[derive(Debug, Clone, clap::Args)]
pub struct RemovePackagesArgs {
    /// Env spec whose environment to change
    #[arg(long, value_name = "NAME")]
    pub env_spec: String,

    /// Packages to remove
    #[arg(required = true)]
    pub packages: Vec<String>,
}

/// Arguments for the `completions` command.
#[derive(Debug, Clone, clap::Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn prepare_parses_mode_and_flags() {
        let cli = Cli::parse_from([
            "stagehand",
            "-d",
            "/tmp/proj",
            "prepare",
            "--mode",
            "check",
            "--env-spec",
            "py",
            "--refresh",
        ]);
        assert_eq!(cli.directory, Some(PathBuf::from("/tmp/proj")));
        match cli.command {
            Some(Commands::Prepare(args)) => {
                assert_eq!(args.mode, ProvideMode::Check);
                assert_eq!(args.env_spec.as_deref(), Some("py"));
                assert!(args.refresh);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn run_collects_trailing_arguments() {
        let cli = Cli::parse_from(["stagehand", "run", "serve", "--", "--port", "8080"]);
        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.command.as_deref(), Some("serve"));
                assert_eq!(args.extra_args, ["--port", "8080"]);
                assert_eq!(args.mode, ProvideMode::Development);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn unprepare_only_is_repeatable() {
        let cli = Cli::parse_from(["stagehand", "unprepare", "--only", "A", "--only", "B"]);
        match cli.command {
            Some(Commands::Unprepare(args)) => assert_eq!(args.only, ["A", "B"]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn remove_packages_requires_packages() {
        let result =
            Cli::try_parse_from(["stagehand", "remove-packages", "--env-spec", "default"]);
        assert!(result.is_err());
    }
}
