//! Error types for Stagehand operations.
//!
//! This module defines [`StagehandError`], the primary error type used
//! throughout the crate, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Expected domain failures (network errors, checksum mismatches, missing
//!   packages) are never errors: providers report them through
//!   `ProvideResult::errors` so the engine can keep going
//! - Use `StagehandError` for conditions a caller must handle before or
//!   outside a prepare run
//! - Use `anyhow::Error` (via `StagehandError::Other`) for unexpected errors

use std::path::PathBuf;
use thiserror::Error;

use crate::conda::CondaManagerError;
use crate::download::DownloadError;

/// Core error type for Stagehand operations.
#[derive(Debug, Error)]
pub enum StagehandError {
    /// Project file not found at expected location.
    #[error("Project file not found in {path}")]
    ProjectNotFound { path: PathBuf },

    /// Failed to parse a YAML file (project file or local state).
    #[error("Failed to parse {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    /// Failed to serialize a YAML file.
    #[error("Failed to write {path}: {message}")]
    SerializeError { path: PathBuf, message: String },

    /// The project file loaded but has problems that prevent preparing it.
    #[error("Unable to load the project.")]
    ProjectProblems { problems: Vec<String> },

    /// The caller asked for an environment spec the project doesn't declare.
    #[error("Environment name '{name}' is not in {filename}, these names were found: {found}")]
    UnknownEnvSpec {
        name: String,
        filename: String,
        found: String,
    },

    /// The caller asked for a command the project doesn't declare.
    #[error("Command name '{name}' is not in {filename}, these names were found: {found}")]
    UnknownCommand {
        name: String,
        filename: String,
        found: String,
    },

    /// A variable the engine requires at entry is absent.
    #[error("Environment variable {name} must be set")]
    MissingEnvironmentVariable { name: String },

    /// A command can't be turned into something runnable.
    #[error("{message}")]
    CommandNotRunnable { message: String },

    /// A subprocess could not be started.
    #[error("Command failed with exit code {code:?}: {command}")]
    CommandFailed { command: String, code: Option<i32> },

    /// A value was needed but there's no one to ask.
    #[error("Cannot prompt for '{key}' in non-interactive mode (no default value)")]
    PromptUnavailable { key: String },

    /// Requirements declared dependencies that form a cycle.
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// Requirements can't be ordered for another reason (unknown or duplicate keys).
    #[error("Requirements cannot be ordered: {message}")]
    UnorderableRequirements { message: String },

    /// The package manager failed.
    #[error(transparent)]
    CondaManager(#[from] CondaManagerError),

    /// A download failed.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Stagehand operations.
pub type Result<T> = std::result::Result<T, StagehandError>;
