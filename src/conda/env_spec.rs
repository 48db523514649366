//! Environment specs: the named package sets a project can run in.

use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Name of the environment used to bootstrap the tool itself.
pub const BOOTSTRAP_ENV_NAME: &str = "bootstrap-env";

/// A named set of packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSpec {
    /// Spec name, also the directory name under `envs/`.
    pub name: String,

    /// Human description.
    pub description: Option<String>,

    /// Channels to install from, in priority order.
    pub channels: Vec<String>,

    /// Conda package specs, e.g. `numpy=1.26=py311_0` or `requests`.
    pub conda_packages: Vec<String>,

    /// Pip package specs.
    pub pip_packages: Vec<String>,
}

impl EnvSpec {
    /// Create an empty spec.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            channels: Vec::new(),
            conda_packages: Vec::new(),
            pip_packages: Vec::new(),
        }
    }

    /// Set the conda packages.
    pub fn with_conda_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conda_packages = packages.into_iter().map(Into::into).collect();
        self
    }

    /// Set the pip packages.
    pub fn with_pip_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pip_packages = packages.into_iter().map(Into::into).collect();
        self
    }

    /// Set the channels.
    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Where the project-scoped environment for this spec lives.
    pub fn path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join("envs").join(&self.name)
    }

    /// Description, falling back to the name.
    pub fn description_or_name(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.name)
    }

    /// Names of the conda packages.
    pub fn conda_package_names(&self) -> BTreeSet<String> {
        self.conda_packages
            .iter()
            .filter_map(|spec| PackageSpec::parse(spec))
            .map(|spec| spec.name)
            .collect()
    }

    /// Names of the pip packages.
    pub fn pip_package_names(&self) -> BTreeSet<String> {
        self.pip_packages
            .iter()
            .filter_map(|spec| PackageSpec::parse(spec))
            .map(|spec| spec.name)
            .collect()
    }

    /// The declared conda specs for the given package names.
    pub fn specs_for_conda_package_names(&self, names: &[String]) -> Vec<String> {
        specs_for_names(&self.conda_packages, names)
    }

    /// The declared pip specs for the given package names.
    pub fn specs_for_pip_package_names(&self, names: &[String]) -> Vec<String> {
        specs_for_names(&self.pip_packages, names)
    }
}

fn specs_for_names(specs: &[String], names: &[String]) -> Vec<String> {
    specs
        .iter()
        .filter(|spec| {
            PackageSpec::parse(spec)
                .map(|parsed| names.contains(&parsed.name))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// A parsed package spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Package name.
    pub name: String,

    /// Version when the spec pins one exactly (`name=1.0=build` or `name==1.0`).
    pub exact_version: Option<String>,

    /// Build string when the spec pins one.
    pub exact_build: Option<String>,
}

static SPEC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[^:\s]+::)?([A-Za-z0-9_.\-]+)\s*(.*)$").unwrap());

impl PackageSpec {
    /// Parse a conda or pip spec. Returns None if there is no package name.
    pub fn parse(spec: &str) -> Option<Self> {
        let captures = SPEC_PATTERN.captures(spec.trim())?;
        let name = captures.get(1)?.as_str().to_string();
        let constraint = captures.get(2).map(|m| m.as_str().trim()).unwrap_or("");

        let (exact_version, exact_build) = if let Some(version) = constraint.strip_prefix("==") {
            (Some(version.trim().to_string()), None)
        } else if let Some(rest) = constraint.strip_prefix('=') {
            let mut pieces = rest.splitn(2, '=');
            let version = pieces.next().unwrap_or("");
            match pieces.next() {
                Some(build) if !version.contains(['*', '|', ',']) => {
                    (Some(version.to_string()), Some(build.to_string()))
                }
                _ => (None, None),
            }
        } else {
            (None, None)
        };

        Some(Self {
            name,
            exact_version,
            exact_build,
        })
    }
}
