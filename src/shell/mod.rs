//! Subprocess execution.

pub mod command;

pub use command::{
    display_argv, execute, execute_shell, shell_argv, CommandOptions, CommandResult,
};
