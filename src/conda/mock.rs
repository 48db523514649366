//! Mock package manager for testing.
//!
//! `MockCondaManager` treats a prefix containing `conda-meta/` as a
//! complete environment and "creates" environments by making that
//! directory. Every call is recorded for later assertion.
//!
//! # Example
//!
//! ```
//! use stagehand::conda::{CondaManager, EnvSpec, MockCondaManager};
//!
//! let temp = tempfile::TempDir::new().unwrap();
//! let prefix = temp.path().join("envs/default");
//! let conda = MockCondaManager::new();
//! let spec = EnvSpec::new("default");
//!
//! assert!(!conda.find_environment_deviations(&prefix, &spec).unwrap().ok());
//! conda.fix_environment_deviations(&prefix, &spec, None, true).unwrap();
//! assert!(conda.find_environment_deviations(&prefix, &spec).unwrap().ok());
//! ```

use std::path::Path;
use std::sync::Mutex;

use super::{CondaEnvironmentDeviations, CondaManager, CondaManagerError, EnvSpec};

/// Mock package manager implementation for testing.
#[derive(Debug, Default)]
pub struct MockCondaManager {
    fix_error: Option<String>,
    resolved: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl MockCondaManager {
    /// A manager whose operations all succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager that can never fix an environment.
    pub fn failing_fix(message: impl Into<String>) -> Self {
        Self {
            fix_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Set what `resolve_dependencies` returns.
    pub fn with_resolved(mut self, resolved: Vec<String>) -> Self {
        self.resolved = resolved;
        self
    }

    /// Every call made so far, as `"<operation> <prefix>"` lines.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// How many times `fix_environment_deviations` was called.
    pub fn fix_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with("fix "))
            .count()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl CondaManager for MockCondaManager {
    fn resolve_dependencies(
        &self,
        package_specs: &[String],
        _channels: &[String],
    ) -> Result<Vec<String>, CondaManagerError> {
        self.record(format!("resolve {}", package_specs.join(" ")));
        Ok(self.resolved.clone())
    }

    fn find_environment_deviations(
        &self,
        prefix: &Path,
        spec: &EnvSpec,
    ) -> Result<CondaEnvironmentDeviations, CondaManagerError> {
        self.record(format!("find {}", prefix.display()));
        if prefix.join("conda-meta").is_dir() {
            Ok(CondaEnvironmentDeviations::none())
        } else {
            Ok(CondaEnvironmentDeviations {
                summary: format!(
                    "'{}' doesn't look like it contains a Conda environment yet.",
                    prefix.display()
                ),
                missing_packages: spec.conda_package_names().into_iter().collect(),
                wrong_version_packages: Vec::new(),
                missing_pip_packages: spec.pip_package_names().into_iter().collect(),
                broken: true,
            })
        }
    }

    fn fix_environment_deviations(
        &self,
        prefix: &Path,
        _spec: &EnvSpec,
        _deviations: Option<&CondaEnvironmentDeviations>,
        create: bool,
    ) -> Result<(), CondaManagerError> {
        self.record(format!("fix {}", prefix.display()));
        if let Some(message) = &self.fix_error {
            return Err(CondaManagerError::new(message.clone()));
        }
        let meta = prefix.join("conda-meta");
        if !meta.is_dir() && !create {
            return Err(CondaManagerError::new(format!(
                "Conda environment at {} does not exist",
                prefix.display()
            )));
        }
        std::fs::create_dir_all(&meta).map_err(|e| {
            CondaManagerError::new(format!(
                "Failed to create environment at {}: {}",
                prefix.display(),
                e
            ))
        })
    }

    fn remove_packages(
        &self,
        prefix: &Path,
        packages: &[String],
    ) -> Result<(), CondaManagerError> {
        self.record(format!("remove {} {}", prefix.display(), packages.join(" ")));
        Ok(())
    }
}
