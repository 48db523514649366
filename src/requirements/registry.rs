//! The provider registry.
//!
//! Each [`ProviderKind`] maps to exactly one provider instance, built once
//! when the registry is created. The package manager and downloader are
//! injected here so a whole prepare run can be pointed at fakes.

use std::sync::Arc;

use super::provider::{Provider, ProviderKind};
use super::providers::{CondaEnvProvider, DownloadProvider, EnvVarProvider, RedisProvider};
use crate::conda::{CondaManager, DefaultCondaManager};
use crate::download::{Downloader, HttpDownloader};

/// Looks up the provider for a requirement.
pub struct RequirementsRegistry {
    env_var: EnvVarProvider,
    conda_env: CondaEnvProvider,
    conda_bootstrap_env: CondaEnvProvider,
    download: DownloadProvider,
    redis: RedisProvider,
    conda: Arc<dyn CondaManager>,
}

impl RequirementsRegistry {
    /// Build a registry around the given package manager and downloader.
    pub fn new(conda: Arc<dyn CondaManager>, downloader: Arc<dyn Downloader>) -> Self {
        Self {
            env_var: EnvVarProvider,
            conda_env: CondaEnvProvider::new(Arc::clone(&conda)),
            conda_bootstrap_env: CondaEnvProvider::bootstrap(Arc::clone(&conda)),
            download: DownloadProvider::new(downloader),
            redis: RedisProvider,
            conda,
        }
    }

    /// The provider for `kind`.
    pub fn provider(&self, kind: ProviderKind) -> &dyn Provider {
        match kind {
            ProviderKind::EnvVar => &self.env_var,
            ProviderKind::CondaEnv => &self.conda_env,
            ProviderKind::CondaBootstrapEnv => &self.conda_bootstrap_env,
            ProviderKind::Download => &self.download,
            ProviderKind::Redis => &self.redis,
        }
    }

    /// The package manager the providers use.
    pub fn conda_manager(&self) -> &Arc<dyn CondaManager> {
        &self.conda
    }
}

impl Default for RequirementsRegistry {
    fn default() -> Self {
        Self::new(
            Arc::new(DefaultCondaManager::default()),
            Arc::new(HttpDownloader::default()),
        )
    }
}
