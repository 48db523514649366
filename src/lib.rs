//! Stagehand - Staged preparation of project environments.
//!
//! A project declares what it needs to run: a package environment,
//! variables, downloaded files and services. Stagehand checks each of
//! these requirements, provides the ones that are missing in dependency
//! order, and hands back the environment a command should run with.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`conda`] - The package manager boundary and env specs
//! - [`download`] - The downloader boundary and checksums
//! - [`environ`] - The owned environment mapping a run works on
//! - [`error`] - Error types and result aliases
//! - [`network`] - Socket probes for services
//! - [`prepare`] - The staged prepare engine and teardown
//! - [`project`] - Loading the project file and project operations
//! - [`requirements`] - Requirements, providers and status snapshots
//! - [`shell`] - Subprocess execution
//! - [`state`] - The local state file
//! - [`status`] - The uniform status type
//! - [`ui`] - Prompts, spinners, and terminal output
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use stagehand::conda::MockCondaManager;
//! use stagehand::download::MockDownloader;
//! use stagehand::environ::Environ;
//! use stagehand::prepare::{prepare_without_interaction, PrepareOptions};
//! use stagehand::project::Project;
//! use stagehand::requirements::RequirementsRegistry;
//!
//! let dir = tempfile::TempDir::new().unwrap();
//! std::fs::write(dir.path().join("stagehand.yml"), "variables:\n  GREETING: hello\n").unwrap();
//!
//! let project = Project::load(dir.path()).unwrap();
//! let registry = Arc::new(RequirementsRegistry::new(
//!     Arc::new(MockCondaManager::new()),
//!     Arc::new(MockDownloader::new()),
//! ));
//! let environ = Environ::from([("PATH".to_string(), "/usr/bin".to_string())]);
//!
//! let result =
//!     prepare_without_interaction(&project, &environ, registry, PrepareOptions::default()).unwrap();
//! assert!(!result.failed());
//! assert_eq!(result.environ()["GREETING"], "hello");
//! ```

pub mod cli;
pub mod conda;
pub mod download;
pub mod environ;
pub mod error;
pub mod network;
pub mod prepare;
pub mod project;
pub mod requirements;
pub mod shell;
pub mod state;
pub mod status;
pub mod ui;

pub use error::{Result, StagehandError};
