//! Status snapshots, provider analyses and provisioning results.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use super::provider::ProviderKind;
use super::requirement::{Requirement, StatusContext};
use crate::status::{SimpleStatus, Status};

/// Where a requirement's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSource {
    /// Nothing supplies a value.
    Unset,
    /// The declared default.
    Default,
    /// Already present in the environment.
    Environ,
    /// A local state override under `variables`.
    Variables,
    /// A project-scoped resource (e.g. the environment under `envs/`).
    Project,
    /// The package environment active when the run started.
    Inherited,
    /// A file the provider downloads.
    Download,
    /// A service found anywhere: system default first, then project scoped.
    FindAll,
    /// A project-scoped service the provider starts.
    FindProject,
    /// The system default service.
    FindSystem,
}

impl ConfigSource {
    /// The name used in configuration values.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Default => "default",
            Self::Environ => "environ",
            Self::Variables => "variables",
            Self::Project => "project",
            Self::Inherited => "inherited",
            Self::Download => "download",
            Self::FindAll => "find_all",
            Self::FindProject => "find_project",
            Self::FindSystem => "find_system",
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider's reading of how a requirement is currently configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub source: ConfigSource,

    /// The configured value, if any.
    pub value: Option<String>,

    /// Environment spec in use (package environments only).
    pub env_name: Option<String>,

    /// Port range for project-scoped services.
    pub lower_port: Option<u16>,
    pub upper_port: Option<u16>,
}

impl ProviderConfig {
    /// A config with only a source.
    pub fn new(source: ConfigSource) -> Self {
        Self {
            source,
            value: None,
            env_name: None,
            lower_port: None,
            upper_port: None,
        }
    }

    /// Set the value.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Provider-specific findings kept with an analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisExtra {
    None,
    Download {
        /// A previously downloaded file already in the project.
        existing_filename: Option<PathBuf>,
    },
    Redis {
        /// A project-scoped server we started earlier that still answers.
        existing_scoped_instance_url: Option<String>,
        /// Whether the system default server answers.
        default_system_exists: bool,
    },
}

/// Everything a provider learned about a requirement while checking it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAnalysis {
    pub config: ProviderConfig,

    /// Variables that must be resolved before this one can be configured.
    pub missing_env_vars_to_configure: BTreeSet<String>,

    /// Variables that must be resolved before this one can be provided.
    pub missing_env_vars_to_provide: BTreeSet<String>,

    pub extra: AnalysisExtra,
}

/// Outcome of one provisioning attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvideResult {
    pub errors: Vec<String>,
    pub logs: Vec<String>,
}

impl ProvideResult {
    /// A result with nothing to report.
    pub fn empty() -> Self {
        Self::default()
    }

    /// This result plus more errors and logs.
    pub fn copy_with_additions(&self, errors: Vec<String>, logs: Vec<String>) -> Self {
        let mut result = self.clone();
        result.errors.extend(errors);
        result.logs.extend(logs);
        result
    }

    /// Whether provisioning reported no errors.
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Outcome of tearing down one requirement's resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// Resources were torn down.
    Done(SimpleStatus),
    /// There was nothing to tear down.
    NothingToDo(SimpleStatus),
    /// Teardown failed.
    Failed(SimpleStatus),
}

impl Teardown {
    /// The underlying status.
    pub fn status(&self) -> &SimpleStatus {
        match self {
            Self::Done(s) | Self::NothingToDo(s) | Self::Failed(s) => s,
        }
    }

    /// Take the underlying status.
    pub fn into_status(self) -> SimpleStatus {
        match self {
            Self::Done(s) | Self::NothingToDo(s) | Self::Failed(s) => s,
        }
    }

    /// Whether teardown failed.
    pub fn failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Immutable snapshot of whether a requirement currently holds.
#[derive(Debug, Clone)]
pub struct RequirementStatus {
    /// The requirement; identity is stable across rechecks.
    pub requirement: Arc<Requirement>,

    pub has_been_provided: bool,

    pub status_description: String,

    pub provider_kind: ProviderKind,

    pub analysis: ProviderAnalysis,

    /// Result of the last provide() for this requirement, if any.
    pub latest_provide_result: Option<ProvideResult>,

    /// Environment spec the requirement resolved to (package environments only).
    pub env_spec_name: Option<String>,
}

impl RequirementStatus {
    /// A fresh snapshot of the same requirement.
    ///
    /// With no new provide result the previous one is carried over.
    pub fn recheck(
        &self,
        ctx: &StatusContext<'_>,
        latest_provide_result: Option<ProvideResult>,
    ) -> RequirementStatus {
        let latest = latest_provide_result.or_else(|| self.latest_provide_result.clone());
        self.requirement.check_status(ctx, latest)
    }

    /// Whether this snapshot is of `requirement` (by identity).
    pub fn is_for(&self, requirement: &Arc<Requirement>) -> bool {
        Arc::ptr_eq(&self.requirement, requirement)
    }
}

impl Status for RequirementStatus {
    fn is_success(&self) -> bool {
        self.has_been_provided
    }

    fn status_description(&self) -> &str {
        &self.status_description
    }

    fn logs(&self) -> &[String] {
        self.latest_provide_result
            .as_ref()
            .map(|r| r.logs.as_slice())
            .unwrap_or(&[])
    }

    fn errors(&self) -> &[String] {
        self.latest_provide_result
            .as_ref()
            .map(|r| r.errors.as_slice())
            .unwrap_or(&[])
    }
}
