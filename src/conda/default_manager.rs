//! [`CondaManager`] implementation that drives the `conda` command line.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{CondaEnvironmentDeviations, CondaManager, CondaManagerError, EnvSpec, PackageSpec};
use crate::shell::{display_argv, execute, CommandOptions, CommandResult};

/// One row of `conda list --json`.
#[derive(Debug, Deserialize)]
struct InstalledPackage {
    name: String,
    version: String,
    #[serde(default)]
    build_string: String,
}

/// One row of `pip list --format=json`.
#[derive(Debug, Deserialize)]
struct PipPackage {
    name: String,
}

/// Drives `conda` (and the environment's own `pip`) as subprocesses.
#[derive(Debug, Clone)]
pub struct DefaultCondaManager {
    conda: PathBuf,
}

impl Default for DefaultCondaManager {
    fn default() -> Self {
        Self::new("conda")
    }
}

impl DefaultCondaManager {
    /// Use the given `conda` executable.
    pub fn new(conda: impl Into<PathBuf>) -> Self {
        Self {
            conda: conda.into(),
        }
    }

    fn conda_argv(&self, args: &[&str]) -> Vec<String> {
        let mut argv = vec![self.conda.to_string_lossy().into_owned()];
        argv.extend(args.iter().map(|s| s.to_string()));
        argv
    }

    fn run(&self, argv: Vec<String>) -> Result<CommandResult, CondaManagerError> {
        let result = execute(&argv, &CommandOptions::captured())
            .map_err(|e| CondaManagerError::new(e.to_string()))?;
        if result.success {
            Ok(result)
        } else {
            Err(CondaManagerError::new(format!(
                "{} failed with code {}: {}",
                display_argv(&argv),
                result
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "(signal)".to_string()),
                result.stderr.trim()
            )))
        }
    }

    fn installed(&self, prefix: &Path) -> Result<BTreeMap<String, InstalledPackage>, CondaManagerError> {
        let prefix_arg = prefix.to_string_lossy();
        let result = self
            .run(self.conda_argv(&["list", "--json", "--prefix", &prefix_arg]))
            .map_err(|e| {
                CondaManagerError::new(format!(
                    "Conda failed while listing installed packages in {}: {}",
                    prefix.display(),
                    e
                ))
            })?;

        let packages: Vec<InstalledPackage> = serde_json::from_str(&result.stdout).map_err(|e| {
            CondaManagerError::new(format!(
                "Conda failed while listing installed packages in {}: bad JSON: {}",
                prefix.display(),
                e
            ))
        })?;

        Ok(packages.into_iter().map(|p| (p.name.clone(), p)).collect())
    }

    fn pip_installed(&self, prefix: &Path) -> Result<Vec<String>, CondaManagerError> {
        let argv = vec![
            python_in(prefix),
            "-m".to_string(),
            "pip".to_string(),
            "list".to_string(),
            "--format=json".to_string(),
        ];
        let result = self.run(argv).map_err(|e| {
            CondaManagerError::new(format!(
                "pip failed while listing installed packages in {}: {}",
                prefix.display(),
                e
            ))
        })?;
        let packages: Vec<PipPackage> = serde_json::from_str(&result.stdout)
            .map_err(|e| CondaManagerError::new(format!("pip list returned bad JSON: {}", e)))?;
        Ok(packages.into_iter().map(|p| p.name.to_lowercase()).collect())
    }

    fn channel_args(channels: &[String]) -> Vec<String> {
        channels
            .iter()
            .flat_map(|c| ["--channel".to_string(), c.clone()])
            .collect()
    }
}

fn python_in(prefix: &Path) -> String {
    prefix.join("bin").join("python").to_string_lossy().into_owned()
}

fn is_conda_environment(prefix: &Path) -> bool {
    prefix.join("conda-meta").is_dir()
}

impl CondaManager for DefaultCondaManager {
    fn resolve_dependencies(
        &self,
        package_specs: &[String],
        channels: &[String],
    ) -> Result<Vec<String>, CondaManagerError> {
        let scratch = std::env::temp_dir().join(format!("stagehand-resolve-{}", std::process::id()));
        let scratch_arg = scratch.to_string_lossy().into_owned();

        let mut argv = self.conda_argv(&["create", "--dry-run", "--json", "--yes", "--prefix"]);
        argv.push(scratch_arg);
        argv.extend(Self::channel_args(channels));
        argv.extend(package_specs.iter().cloned());

        let result = self
            .run(argv)
            .map_err(|e| CondaManagerError::new(format!("Error resolving dependencies: {}", e)))?;

        let parsed: serde_json::Value = serde_json::from_str(&result.stdout)
            .map_err(|e| CondaManagerError::new(format!("conda returned bad JSON: {}", e)))?;

        let links = parsed
            .pointer("/actions/LINK")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut locked: Vec<String> = links
            .iter()
            .filter_map(|link| {
                let name = link.get("name")?.as_str()?;
                let version = link.get("version")?.as_str()?;
                let build = link
                    .get("build_string")
                    .or_else(|| link.get("build"))
                    .and_then(|b| b.as_str())
                    .unwrap_or("");
                Some(format!("{}={}={}", name, version, build))
            })
            .collect();
        locked.sort();
        Ok(locked)
    }

    fn find_environment_deviations(
        &self,
        prefix: &Path,
        spec: &EnvSpec,
    ) -> Result<CondaEnvironmentDeviations, CondaManagerError> {
        if !is_conda_environment(prefix) {
            return Ok(CondaEnvironmentDeviations {
                summary: format!(
                    "'{}' doesn't look like it contains a Conda environment yet.",
                    prefix.display()
                ),
                missing_packages: spec.conda_package_names().into_iter().collect(),
                wrong_version_packages: Vec::new(),
                missing_pip_packages: spec.pip_package_names().into_iter().collect(),
                broken: true,
            });
        }

        let installed = self.installed(prefix)?;
        let mut missing = Vec::new();
        let mut wrong_version = Vec::new();

        for spec_string in &spec.conda_packages {
            let Some(parsed) = PackageSpec::parse(spec_string) else {
                continue;
            };
            match installed.get(&parsed.name) {
                None => missing.push(parsed.name),
                Some(package) => {
                    let bad_version = parsed
                        .exact_version
                        .as_ref()
                        .is_some_and(|v| *v != package.version);
                    let bad_build = parsed
                        .exact_build
                        .as_ref()
                        .is_some_and(|b| *b != package.build_string);
                    if bad_version || bad_build {
                        wrong_version.push(parsed.name);
                    }
                }
            }
        }
        missing.sort();
        wrong_version.sort();

        let pip_names = spec.pip_package_names();
        let missing_pip: Vec<String> = if pip_names.is_empty() {
            Vec::new()
        } else {
            let installed_pip = self.pip_installed(prefix)?;
            pip_names
                .into_iter()
                .filter(|name| !installed_pip.contains(&name.to_lowercase()))
                .collect()
        };

        let all_missing = missing
            .iter()
            .chain(missing_pip.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let all_wrong = wrong_version.join(", ");

        let summary = match (all_missing.is_empty(), all_wrong.is_empty()) {
            (false, false) => format!(
                "Conda environment is missing packages: {} and has wrong versions of: {}",
                all_missing, all_wrong
            ),
            (false, true) => format!("Conda environment is missing packages: {}", all_missing),
            (true, false) => format!("Conda environment has wrong versions of: {}", all_wrong),
            (true, true) => "OK".to_string(),
        };

        Ok(CondaEnvironmentDeviations {
            summary,
            missing_packages: missing,
            wrong_version_packages: wrong_version,
            missing_pip_packages: missing_pip,
            broken: false,
        })
    }

    fn fix_environment_deviations(
        &self,
        prefix: &Path,
        spec: &EnvSpec,
        deviations: Option<&CondaEnvironmentDeviations>,
        create: bool,
    ) -> Result<(), CondaManagerError> {
        let found;
        let deviations = match deviations {
            Some(d) => d,
            None => {
                found = self.find_environment_deviations(prefix, spec)?;
                &found
            }
        };
        let prefix_arg = prefix.to_string_lossy().into_owned();

        if is_conda_environment(prefix) {
            let mut to_update: Vec<String> = deviations
                .missing_packages
                .iter()
                .chain(deviations.wrong_version_packages.iter())
                .cloned()
                .collect();
            to_update.sort();
            to_update.dedup();
            if !to_update.is_empty() {
                let specs = spec.specs_for_conda_package_names(&to_update);
                let mut argv = self.conda_argv(&["install", "--yes", "--prefix", &prefix_arg]);
                argv.extend(Self::channel_args(&spec.channels));
                argv.extend(specs.iter().cloned());
                self.run(argv).map_err(|e| {
                    CondaManagerError::new(format!(
                        "Failed to install packages: {}: {}",
                        specs.join(", "),
                        e
                    ))
                })?;
            }
        } else if create {
            let mut packages = spec.conda_packages.clone();
            // conda refuses to create an empty environment
            if packages.is_empty() {
                packages.push("python".to_string());
            }
            let mut argv = self.conda_argv(&["create", "--yes", "--prefix", &prefix_arg]);
            argv.extend(Self::channel_args(&spec.channels));
            argv.extend(packages);
            self.run(argv).map_err(|e| {
                CondaManagerError::new(format!(
                    "Failed to create environment at {}: {}",
                    prefix.display(),
                    e
                ))
            })?;
        } else {
            return Err(CondaManagerError::new(format!(
                "Conda environment at {} does not exist",
                prefix.display()
            )));
        }

        if !deviations.missing_pip_packages.is_empty() {
            let specs = spec.specs_for_pip_package_names(&deviations.missing_pip_packages);
            let mut argv = vec![
                python_in(prefix),
                "-m".to_string(),
                "pip".to_string(),
                "install".to_string(),
            ];
            argv.extend(specs);
            self.run(argv).map_err(|e| {
                CondaManagerError::new(format!(
                    "Failed to install missing pip packages: {}: {}",
                    deviations.missing_pip_packages.join(", "),
                    e
                ))
            })?;
        }

        Ok(())
    }

    fn remove_packages(
        &self,
        prefix: &Path,
        packages: &[String],
    ) -> Result<(), CondaManagerError> {
        let prefix_arg = prefix.to_string_lossy().into_owned();
        let mut argv = self.conda_argv(&["remove", "--yes", "--prefix", &prefix_arg]);
        argv.extend(packages.iter().cloned());
        self.run(argv).map(|_| ()).map_err(|e| {
            CondaManagerError::new(format!(
                "Failed to remove packages from {}: {}",
                prefix.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_environment_is_broken_with_all_packages_missing() {
        let temp = TempDir::new().unwrap();
        let manager = DefaultCondaManager::new("conda-not-needed");
        let spec = EnvSpec::new("default")
            .with_conda_packages(["numpy", "pandas=2"])
            .with_pip_packages(["flask"]);

        let deviations = manager
            .find_environment_deviations(&temp.path().join("envs/default"), &spec)
            .unwrap();

        assert!(deviations.broken);
        assert!(!deviations.ok());
        assert_eq!(deviations.missing_packages, vec!["numpy", "pandas"]);
        assert_eq!(deviations.missing_pip_packages, vec!["flask"]);
        assert!(deviations.summary.contains("doesn't look like it contains a Conda environment"));
    }

    #[test]
    fn fix_without_create_fails_for_missing_environment() {
        let temp = TempDir::new().unwrap();
        let manager = DefaultCondaManager::new("conda-not-needed");
        let spec = EnvSpec::new("default");

        let err = manager
            .fix_environment_deviations(&temp.path().join("nope"), &spec, None, false)
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn missing_conda_binary_reports_listing_failure() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("conda-meta")).unwrap();
        let manager = DefaultCondaManager::new("definitely-not-conda-xyz");

        let err = manager
            .find_environment_deviations(temp.path(), &EnvSpec::new("default"))
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Conda failed while listing installed packages"));
    }

    #[test]
    fn channel_args_interleave_flag() {
        let args = DefaultCondaManager::channel_args(&["conda-forge".into(), "defaults".into()]);
        assert_eq!(
            args,
            vec!["--channel", "conda-forge", "--channel", "defaults"]
        );
    }
}
