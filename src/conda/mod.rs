//! The package-manager boundary.
//!
//! Providers reach the package manager only through the [`CondaManager`]
//! trait. [`DefaultCondaManager`] drives the `conda` command line;
//! [`MockCondaManager`] stands in for it in tests.

pub mod default_manager;
pub mod env_spec;
pub mod mock;

pub use default_manager::DefaultCondaManager;
pub use env_spec::{EnvSpec, PackageSpec, BOOTSTRAP_ENV_NAME};
pub use mock::MockCondaManager;

use std::path::Path;
use thiserror::Error;

/// A package manager operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CondaManagerError {
    message: String,
}

impl CondaManagerError {
    /// Create an error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// How an environment on disk differs from its spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondaEnvironmentDeviations {
    /// One-line summary ("OK" when nothing deviates).
    pub summary: String,

    /// Conda packages not installed.
    pub missing_packages: Vec<String>,

    /// Conda packages installed at a version the spec doesn't allow.
    pub wrong_version_packages: Vec<String>,

    /// Pip packages not installed.
    pub missing_pip_packages: Vec<String>,

    /// The environment is unusable as it stands (e.g. doesn't exist).
    pub broken: bool,
}

impl CondaEnvironmentDeviations {
    /// Deviations for an environment that matches its spec.
    pub fn none() -> Self {
        Self {
            summary: "OK".to_string(),
            missing_packages: Vec::new(),
            wrong_version_packages: Vec::new(),
            missing_pip_packages: Vec::new(),
            broken: false,
        }
    }

    /// Check whether the environment matches its spec.
    pub fn ok(&self) -> bool {
        self.missing_packages.is_empty()
            && self.wrong_version_packages.is_empty()
            && self.missing_pip_packages.is_empty()
            && !self.broken
    }
}

/// Capability to inspect and modify package environments.
pub trait CondaManager: Send + Sync {
    /// Resolve specs to a fully pinned list (`name=version=build`).
    fn resolve_dependencies(
        &self,
        package_specs: &[String],
        channels: &[String],
    ) -> Result<Vec<String>, CondaManagerError>;

    /// Compare the environment at `prefix` with `spec`. Read-only.
    fn find_environment_deviations(
        &self,
        prefix: &Path,
        spec: &EnvSpec,
    ) -> Result<CondaEnvironmentDeviations, CondaManagerError>;

    /// Make the environment at `prefix` match `spec`.
    ///
    /// Creates the environment when it doesn't exist and `create` is set;
    /// otherwise a missing environment is an error.
    fn fix_environment_deviations(
        &self,
        prefix: &Path,
        spec: &EnvSpec,
        deviations: Option<&CondaEnvironmentDeviations>,
        create: bool,
    ) -> Result<(), CondaManagerError>;

    /// Remove packages from the environment at `prefix`.
    fn remove_packages(&self, prefix: &Path, packages: &[String])
        -> Result<(), CondaManagerError>;
}
