//! Command-line interface for Stagehand.
//!
//! This module provides the CLI argument parsing using clap's derive macros
//! and command implementations.
//!
//! # Architecture
//!
//! - [`args`] - Argument definitions using clap derive macros
//! - [`commands`] - Command implementations

pub mod args;
pub mod commands;

pub use args::{
    Cli, Commands, CompletionsArgs, PrepareArgs, RemovePackagesArgs, ResolveArgs, RunArgs,
    StatusArgs, UnprepareArgs,
};
pub use commands::{Command, CommandContext, CommandDispatcher, CommandResult};
