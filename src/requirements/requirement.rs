//! Requirements: declared conditions on the environment a project runs in.
//!
//! Every requirement governs one environment variable. The variable being
//! set (and the resource behind it being usable) is what "provided" means.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use super::provider::ProviderKind;
use super::registry::RequirementsRegistry;
use super::status::{ProvideResult, RequirementStatus};
use crate::conda::EnvSpec;
use crate::download::HashAlgorithm;
use crate::environ::{self, Environ};
use crate::network;
use crate::state::LocalStateFile;

/// Variable suffixes that make a requirement encrypted by default.
const SECRET_SUFFIXES: [&str; 3] = ["_PASSWORD", "_SECRET_KEY", "_SECRET"];

/// Variable naming the bootstrap package environment.
pub const BOOTSTRAP_ENV_PREFIX: &str = "BOOTSTRAP_ENV_PREFIX";

/// Options declared alongside a requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementOptions {
    /// Value used when nothing else supplies one.
    pub default: Option<String>,

    /// Human description, replacing the generated one.
    pub description: Option<String>,

    /// Keep the value out of descriptions and local state.
    pub encrypted: Option<bool>,
}

/// Kinds of service a requirement can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    Redis,
}

impl ServiceType {
    /// Look up a service type by its project file name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "redis" => Some(Self::Redis),
            _ => None,
        }
    }

    /// Project file name of the service type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
        }
    }
}

/// Where a download comes from and how to verify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSpec {
    pub url: String,

    /// File name relative to the project directory.
    pub filename: String,

    /// Expected checksum, lowercase hex.
    pub hash: Option<(HashAlgorithm, String)>,
}

/// The variant-specific part of a requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequirementKind {
    /// A plain variable the user must set.
    EnvVar,

    /// A package environment built from one of the named specs.
    CondaEnv { env_specs: BTreeMap<String, EnvSpec> },

    /// The project-scoped environment used to bootstrap the tool itself.
    CondaBootstrapEnv { env_specs: BTreeMap<String, EnvSpec> },

    /// A file fetched from a URL.
    Download(DownloadSpec),

    /// A running service located by URL.
    Service(ServiceType),
}

/// Class tags for matching requirements by variant.
///
/// Classes form a small hierarchy: every class is an [`RequirementClass::EnvVar`],
/// the bootstrap environment is a [`RequirementClass::CondaEnv`], and Redis is a
/// [`RequirementClass::Service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequirementClass {
    EnvVar,
    CondaEnv,
    CondaBootstrapEnv,
    Download,
    Service,
    Redis,
}

impl RequirementClass {
    /// Check whether this class is `other` or one of its subclasses.
    pub fn is_a(self, other: RequirementClass) -> bool {
        self == other
            || other == RequirementClass::EnvVar
            || matches!(
                (self, other),
                (RequirementClass::CondaBootstrapEnv, RequirementClass::CondaEnv)
                    | (RequirementClass::Redis, RequirementClass::Service)
            )
    }
}

/// A declared requirement. Immutable once constructed; shared as `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// The variable this requirement governs.
    pub env_var: String,

    pub options: RequirementOptions,

    pub kind: RequirementKind,
}

/// Everything a status check reads. Nothing in it is modified.
#[derive(Clone, Copy)]
pub struct StatusContext<'a> {
    pub registry: &'a RequirementsRegistry,
    pub environ: &'a Environ,
    pub local_state: &'a LocalStateFile,
    pub default_env_spec_name: Option<&'a str>,
    pub overrides: &'a UserConfigOverrides,
}

/// User-forced choices threaded through a prepare run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserConfigOverrides {
    /// Environment spec chosen explicitly by the caller.
    pub env_spec_name: Option<String>,

    /// Package environment that was active when the run started.
    pub inherited_env: Option<String>,
}

impl Requirement {
    /// A plain variable requirement.
    pub fn env_var(name: impl Into<String>, options: RequirementOptions) -> Self {
        Self {
            env_var: name.into(),
            options,
            kind: RequirementKind::EnvVar,
        }
    }

    /// The package environment requirement (`CONDA_PREFIX`).
    pub fn conda_env(env_specs: BTreeMap<String, EnvSpec>) -> Self {
        Self {
            env_var: environ::CONDA_PREFIX.to_string(),
            options: RequirementOptions::default(),
            kind: RequirementKind::CondaEnv { env_specs },
        }
    }

    /// The bootstrap package environment requirement.
    pub fn conda_bootstrap_env(env_specs: BTreeMap<String, EnvSpec>) -> Self {
        Self {
            env_var: BOOTSTRAP_ENV_PREFIX.to_string(),
            options: RequirementOptions::default(),
            kind: RequirementKind::CondaBootstrapEnv { env_specs },
        }
    }

    /// A download requirement.
    pub fn download(
        name: impl Into<String>,
        spec: DownloadSpec,
        options: RequirementOptions,
    ) -> Self {
        Self {
            env_var: name.into(),
            options,
            kind: RequirementKind::Download(spec),
        }
    }

    /// A service requirement.
    pub fn service(
        name: impl Into<String>,
        service_type: ServiceType,
        options: RequirementOptions,
    ) -> Self {
        Self {
            env_var: name.into(),
            options,
            kind: RequirementKind::Service(service_type),
        }
    }

    /// The most specific class of this requirement.
    pub fn class(&self) -> RequirementClass {
        match &self.kind {
            RequirementKind::EnvVar => RequirementClass::EnvVar,
            RequirementKind::CondaEnv { .. } => RequirementClass::CondaEnv,
            RequirementKind::CondaBootstrapEnv { .. } => RequirementClass::CondaBootstrapEnv,
            RequirementKind::Download(_) => RequirementClass::Download,
            RequirementKind::Service(ServiceType::Redis) => RequirementClass::Redis,
        }
    }

    /// Check whether this requirement belongs to `class`.
    pub fn is_a(&self, class: RequirementClass) -> bool {
        self.class().is_a(class)
    }

    /// The provider responsible for this requirement.
    pub fn provider_kind(&self) -> ProviderKind {
        match &self.kind {
            RequirementKind::EnvVar => ProviderKind::EnvVar,
            RequirementKind::CondaEnv { .. } => ProviderKind::CondaEnv,
            RequirementKind::CondaBootstrapEnv { .. } => ProviderKind::CondaBootstrapEnv,
            RequirementKind::Download(_) => ProviderKind::Download,
            RequirementKind::Service(ServiceType::Redis) => ProviderKind::Redis,
        }
    }

    /// Short human name.
    pub fn title(&self) -> String {
        match &self.kind {
            RequirementKind::CondaEnv { .. } | RequirementKind::CondaBootstrapEnv { .. } => {
                "A Conda environment".to_string()
            }
            _ => self.env_var.clone(),
        }
    }

    /// About one sentence describing what the requirement needs.
    pub fn description(&self) -> String {
        let generated = match &self.kind {
            RequirementKind::EnvVar => format!("{} environment variable must be set.", self.env_var),
            RequirementKind::CondaEnv { .. } | RequirementKind::CondaBootstrapEnv { .. } => {
                return "The project needs a Conda environment containing all required packages."
                    .to_string()
            }
            RequirementKind::Download(_) => {
                format!("A downloaded file which is referenced by {}.", self.env_var)
            }
            RequirementKind::Service(ServiceType::Redis) => format!(
                "A running Redis server, located by a redis: URL set as {}.",
                self.env_var
            ),
        };
        self.options.description.clone().unwrap_or(generated)
    }

    /// Whether the value must stay out of descriptions.
    pub fn encrypted(&self) -> bool {
        self.options.encrypted.unwrap_or_else(|| {
            SECRET_SUFFIXES
                .iter()
                .any(|suffix| self.env_var.ends_with(suffix))
        })
    }

    /// The environment specs of a package environment requirement.
    pub fn env_specs(&self) -> Option<&BTreeMap<String, EnvSpec>> {
        match &self.kind {
            RequirementKind::CondaEnv { env_specs }
            | RequirementKind::CondaBootstrapEnv { env_specs } => Some(env_specs),
            _ => None,
        }
    }

    /// The download spec of a download requirement.
    pub fn download_spec(&self) -> Option<&DownloadSpec> {
        match &self.kind {
            RequirementKind::Download(spec) => Some(spec),
            _ => None,
        }
    }

    /// The variable's value in `environ`, treating the empty string as unset.
    pub fn value_in<'a>(&self, environ: &'a Environ) -> Option<&'a str> {
        environ::non_empty(environ, &self.env_var)
    }

    pub(crate) fn unset_message(&self) -> String {
        format!("Environment variable {} is not set.", self.env_var)
    }

    fn set_message(&self, value: &str) -> String {
        if self.encrypted() {
            format!("Environment variable {} is set.", self.env_var)
        } else {
            format!("Environment variable {} set to '{}'", self.env_var, value)
        }
    }

    /// Whether the requirement holds in `environ`, with a description.
    ///
    /// Covers every kind whose status depends only on the environment;
    /// package environments are judged by their provider instead.
    pub fn environ_status(&self, environ: &Environ) -> (bool, String) {
        let Some(value) = self.value_in(environ) else {
            return (false, self.unset_message());
        };
        match &self.kind {
            RequirementKind::Download(_) => {
                if Path::new(value).exists() {
                    (true, format!("File downloaded to {}", value))
                } else {
                    (false, format!("File not found: {}", value))
                }
            }
            RequirementKind::Service(ServiceType::Redis) => self.redis_status(value),
            _ => (true, self.set_message(value)),
        }
    }

    fn redis_status(&self, url: &str) -> (bool, String) {
        let Some(parsed) = parse_redis_url(url) else {
            return (
                false,
                format!(
                    "{} value '{}' does not have 'redis:' scheme.",
                    self.env_var, url
                ),
            );
        };
        if network::can_connect_to_socket(&parsed.0, parsed.1) {
            (true, format!("Using Redis server at {}", url))
        } else {
            (false, format!("Cannot connect to Redis at {}.", url))
        }
    }

    /// Build a fresh status snapshot.
    ///
    /// Reads the environment and local state and may inspect resources
    /// (list packages, probe sockets); never provisions anything.
    pub fn check_status(
        self: &Arc<Self>,
        ctx: &StatusContext<'_>,
        latest_provide_result: Option<ProvideResult>,
    ) -> RequirementStatus {
        let provider = ctx.registry.provider(self.provider_kind());
        let analysis = provider.analyze(self, ctx);
        let (has_been_provided, status_description) = provider.status(self, ctx, &analysis);
        let env_spec_name = analysis.config.env_name.clone();

        tracing::debug!(
            "{}: provided={} ({})",
            self.env_var,
            has_been_provided,
            status_description
        );

        RequirementStatus {
            requirement: Arc::clone(self),
            has_been_provided,
            status_description,
            provider_kind: provider.kind(),
            analysis,
            latest_provide_result,
            env_spec_name,
        }
    }
}

static REDIS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^redis://(?:[^@/]*@)?(\[[^\]]*\]|[^:/?#\[\]]*)(?::(\d+))?(?:[/?#].*)?$").unwrap()
});

/// Host and port of a `redis:` URL (default port 6379).
pub(crate) fn parse_redis_url(url: &str) -> Option<(String, u16)> {
    let captures = REDIS_URL.captures(url)?;
    let host = captures
        .get(1)
        .map(|m| m.as_str().trim_start_matches('[').trim_end_matches(']'))
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost")
        .to_string();
    let port = match captures.get(2) {
        Some(port) => port.as_str().parse().ok()?,
        None => 6379,
    };
    Some((host, port))
}
