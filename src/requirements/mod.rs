//! Requirements, their providers, and status snapshots.
//!
//! A [`Requirement`] declares that an environment variable must be set and
//! backed by a usable resource. Its [`Provider`] knows how to check,
//! configure, provide and tear down that resource. Checking produces an
//! immutable [`RequirementStatus`]; rechecking produces a new one.
//!
//! # Modules
//!
//! - [`requirement`] - Requirement descriptors and the status context
//! - [`provider`] - The provider trait and provide context
//! - [`providers`] - Built-in providers
//! - [`registry`] - Provider lookup by kind
//! - [`status`] - Status snapshots, analyses and provide results
//! - [`whitelist`] - Filtering provide and unprovide calls

pub mod provider;
pub mod providers;
pub mod registry;
pub mod requirement;
pub mod status;
pub mod whitelist;

pub use provider::{ProvideContext, ProvideMode, Provider, ProviderKind};
pub use providers::{
    remove_env_path, CondaEnvProvider, DownloadProvider, EnvVarProvider, RedisProvider,
};
pub use registry::RequirementsRegistry;
pub use requirement::{
    DownloadSpec, Requirement, RequirementClass, RequirementKind, RequirementOptions, ServiceType,
    StatusContext, UserConfigOverrides, BOOTSTRAP_ENV_PREFIX,
};
pub use status::{
    AnalysisExtra, ConfigSource, ProvideResult, ProviderAnalysis, ProviderConfig,
    RequirementStatus, Teardown,
};
pub use whitelist::{in_whitelist, WhitelistEntry};
