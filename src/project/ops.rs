//! Package operations on a project's environments.

use crate::conda::{CondaManager, EnvSpec};
use crate::error::{Result, StagehandError};
use crate::status::SimpleStatus;

use super::Project;

/// Look up an env spec, reporting the names that do exist when it's missing.
pub fn env_spec<'p>(project: &'p Project, name: &str) -> Result<&'p EnvSpec> {
    project
        .env_specs()
        .get(name)
        .ok_or_else(|| StagehandError::UnknownEnvSpec {
            name: name.to_string(),
            filename: project.file_display_name(),
            found: sorted_names(project.env_specs().keys()),
        })
}

pub(crate) fn sorted_names<'a>(names: impl Iterator<Item = &'a String>) -> String {
    let mut names: Vec<&str> = names.map(String::as_str).collect();
    names.sort_unstable();
    names.join(", ")
}

/// Resolve an env spec's packages to a fully pinned list.
///
/// `None` resolves the project's default env spec.
pub fn resolve_env_spec(
    project: &Project,
    conda: &dyn CondaManager,
    env_spec_name: Option<&str>,
) -> Result<Vec<String>> {
    let spec = env_spec(project, env_spec_name.unwrap_or(project.default_env_spec_name()))?;
    tracing::info!("Resolving packages for env spec {}", spec.name);
    Ok(conda.resolve_dependencies(&spec.conda_packages, &spec.channels)?)
}

/// Remove packages from the project-scoped environment of an env spec.
///
/// Package manager failures come back as a failed status.
pub fn remove_packages(
    project: &Project,
    conda: &dyn CondaManager,
    env_spec_name: &str,
    packages: &[String],
) -> Result<SimpleStatus> {
    let spec = env_spec(project, env_spec_name)?;
    let prefix = spec.path(project.directory());
    if !prefix.exists() {
        return Ok(SimpleStatus::success(format!(
            "Environment {} has not been created, nothing to remove.",
            spec.name
        )));
    }

    match conda.remove_packages(&prefix, packages) {
        Ok(()) => Ok(SimpleStatus::success(format!(
            "Removed packages from {}: {}",
            spec.name,
            packages.join(" ")
        ))),
        Err(e) => {
            tracing::error!("{}", e);
            Ok(SimpleStatus::failure(
                format!("Failed to remove packages from {}.", spec.name),
                vec![e.to_string()],
            ))
        }
    }
}
