//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait, which provides a uniform
//! interface for executing commands and reporting results.
//!
//! # Architecture
//!
//! Commands are dispatched via [`CommandDispatcher`], which routes CLI
//! subcommands to their implementations. This allows:
//! - Single binary with subcommands (`stagehand prepare`, `stagehand run`)
//! - One environment snapshot shared by every command
//! - Consistent global flag handling

pub mod completions;
pub mod dispatcher;
pub mod display;
pub mod prepare;
pub mod remove_packages;
pub mod resolve;
pub mod run;
pub mod status;
pub mod unprepare;

pub use dispatcher::{Command, CommandContext, CommandDispatcher, CommandResult};
