//! The provider for plain variables, and the variable handling every other
//! provider builds on.
//!
//! Value precedence when providing: a local state override, then a value
//! already in the environment (so `FOO=bar stagehand run` works), then the
//! declared default.

use std::collections::{BTreeMap, BTreeSet};

use crate::environ::{self, Environ};
use crate::requirements::provider::{ProvideContext, Provider, ProviderKind};
use crate::requirements::requirement::{Requirement, StatusContext, UserConfigOverrides};
use crate::requirements::status::{
    ConfigSource, ProvideResult, ProviderConfig, RequirementStatus, Teardown,
};
use crate::state::LocalStateFile;
use crate::status::SimpleStatus;

const VARIABLES: &str = "variables";
const DISABLED_VARIABLES: &str = "disabled_variables";

/// Variables a requirement waits on: the package environment prefix, until one is set.
pub(crate) fn missing_env_prefix(environ: &Environ) -> BTreeSet<String> {
    if environ.contains_key(environ::CONDA_PREFIX) {
        BTreeSet::new()
    } else {
        BTreeSet::from([environ::CONDA_PREFIX.to_string()])
    }
}

/// Read where a variable's value comes from.
pub(crate) fn read_variable_config(
    requirement: &Requirement,
    environ: &Environ,
    local_state: &LocalStateFile,
) -> ProviderConfig {
    let name = requirement.env_var.as_str();
    let local = local_state.get_string(&[VARIABLES, name]);
    let disabled = local_state.get_string(&[DISABLED_VARIABLES, name]);
    let was_disabled = local.is_none() && disabled.is_some();
    let value = local.or(disabled);

    let (source, value) = if value.is_some() && !was_disabled {
        (ConfigSource::Variables, value)
    } else if let Some(current) = environ.get(name) {
        (ConfigSource::Environ, Some(current.clone()))
    } else if requirement.options.default.is_some() {
        (ConfigSource::Default, value)
    } else {
        (ConfigSource::Unset, value)
    };

    ProviderConfig {
        value,
        ..ProviderConfig::new(source)
    }
}

/// Store a user-chosen value in local state.
///
/// With `source` other than `variables` the value is kept under
/// `disabled_variables` so it is remembered but unused. An empty value
/// removes both.
pub(crate) fn apply_variable_config_values(
    requirement: &Requirement,
    local_state: &mut LocalStateFile,
    values: &BTreeMap<String, String>,
) {
    let name = requirement.env_var.as_str();
    let override_path = [VARIABLES, name];
    let disabled_path = [DISABLED_VARIABLES, name];

    if requirement.encrypted() {
        if values.contains_key("value") {
            tracing::warn!(
                "{} is encrypted and won't be saved to {}; set it in the environment instead",
                name,
                local_state.filename().display()
            );
        }
        return;
    }

    let overriding = values
        .get("source")
        .map(|s| s == ConfigSource::Variables.as_str())
        .unwrap_or(true);

    let existing = local_state
        .get_string(&override_path)
        .or_else(|| local_state.get_string(&disabled_path));
    let Some(value) = values.get("value").cloned().or(existing) else {
        return;
    };

    if value.is_empty() {
        local_state.unset_value(&override_path);
        local_state.unset_value(&disabled_path);
    } else if overriding {
        local_state.set_value(&override_path, value);
        local_state.unset_value(&disabled_path);
    } else {
        local_state.set_value(&disabled_path, value);
        local_state.unset_value(&override_path);
    }
}

/// Set the variable from local state or its default, unless the environment already has it.
pub(crate) fn provide_variable(requirement: &Requirement, ctx: &mut ProvideContext<'_>) {
    let name = &requirement.env_var;
    if let Some(value) = ctx.local_state.get_string(&[VARIABLES, name]) {
        ctx.environ.insert(name.clone(), value);
    } else if ctx.environ.contains_key(name) {
        // the caller's value wins over the default
    } else if let Some(default) = &requirement.options.default {
        ctx.environ.insert(name.clone(), default.clone());
    }
}

/// Provides a variable the user sets by hand.
#[derive(Debug, Default)]
pub struct EnvVarProvider;

impl Provider for EnvVarProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::EnvVar
    }

    fn missing_env_vars_to_configure(
        &self,
        _requirement: &Requirement,
        environ: &Environ,
        _local_state: &LocalStateFile,
    ) -> BTreeSet<String> {
        missing_env_prefix(environ)
    }

    fn read_config(&self, requirement: &Requirement, ctx: &StatusContext<'_>) -> ProviderConfig {
        read_variable_config(requirement, ctx.environ, ctx.local_state)
    }

    fn set_config_values_as_strings(
        &self,
        requirement: &Requirement,
        _environ: &mut Environ,
        local_state: &mut LocalStateFile,
        _default_env_spec_name: Option<&str>,
        _overrides: &mut UserConfigOverrides,
        values: &BTreeMap<String, String>,
    ) {
        apply_variable_config_values(requirement, local_state, values);
    }

    fn provide(&self, requirement: &Requirement, ctx: &mut ProvideContext<'_>) -> ProvideResult {
        provide_variable(requirement, ctx);
        ProvideResult::empty()
    }

    fn unprovide(
        &self,
        requirement: &Requirement,
        _environ: &Environ,
        _local_state: &mut LocalStateFile,
        _overrides: &UserConfigOverrides,
        _status: Option<&RequirementStatus>,
    ) -> Teardown {
        Teardown::NothingToDo(SimpleStatus::success(format!(
            "Nothing to clean up for {}.",
            requirement.env_var
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirements::provider::ProvideMode;
    use crate::requirements::registry::RequirementsRegistry;
    use crate::requirements::requirement::RequirementOptions;
    use crate::status::Status;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn foo(default: Option<&str>) -> Arc<Requirement> {
        Arc::new(Requirement::env_var(
            "FOO",
            RequirementOptions {
                default: default.map(String::from),
                ..Default::default()
            },
        ))
    }

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn provide(
        requirement: &Arc<Requirement>,
        environ: &mut Environ,
        local_state: &mut LocalStateFile,
    ) -> ProvideResult {
        let registry = RequirementsRegistry::default();
        let mut overrides = UserConfigOverrides::default();
        let status = requirement.check_status(
            &StatusContext {
                registry: &registry,
                environ,
                local_state,
                default_env_spec_name: None,
                overrides: &overrides,
            },
            None,
        );
        let mut ctx = ProvideContext {
            environ,
            local_state,
            default_env_spec_name: None,
            status: &status,
            mode: ProvideMode::Development,
            overrides: &mut overrides,
        };
        EnvVarProvider.provide(requirement, &mut ctx)
    }

    #[test]
    fn missing_prefix_until_conda_prefix_set() {
        let mut environ = Environ::new();
        assert_eq!(
            missing_env_prefix(&environ),
            BTreeSet::from(["CONDA_PREFIX".to_string()])
        );
        environ.insert("CONDA_PREFIX".into(), "/env".into());
        assert!(missing_env_prefix(&environ).is_empty());
    }

    #[test]
    fn config_sources_in_precedence_order() {
        let temp = TempDir::new().unwrap();
        let mut state = LocalStateFile::load_for_directory(temp.path()).unwrap();
        let mut environ = Environ::new();

        assert_eq!(
            read_variable_config(&foo(None), &environ, &state).source,
            ConfigSource::Unset
        );
        assert_eq!(
            read_variable_config(&foo(Some("d")), &environ, &state).source,
            ConfigSource::Default
        );

        environ.insert("FOO".into(), "from-env".into());
        let config = read_variable_config(&foo(Some("d")), &environ, &state);
        assert_eq!(config.source, ConfigSource::Environ);
        assert_eq!(config.value.as_deref(), Some("from-env"));

        state.set_value(&["variables", "FOO"], "local");
        let config = read_variable_config(&foo(None), &environ, &state);
        assert_eq!(config.source, ConfigSource::Variables);
        assert_eq!(config.value.as_deref(), Some("local"));
    }

    #[test]
    fn disabled_value_is_remembered_but_unused() {
        let temp = TempDir::new().unwrap();
        let mut state = LocalStateFile::load_for_directory(temp.path()).unwrap();
        apply_variable_config_values(
            &foo(None),
            &mut state,
            &values(&[("source", "environ"), ("value", "kept")]),
        );

        let config = read_variable_config(&foo(None), &Environ::new(), &state);
        assert_eq!(config.source, ConfigSource::Unset);
        assert_eq!(config.value.as_deref(), Some("kept"));
    }

    #[test]
    fn empty_value_unsets_everything() {
        let temp = TempDir::new().unwrap();
        let mut state = LocalStateFile::load_for_directory(temp.path()).unwrap();
        apply_variable_config_values(&foo(None), &mut state, &values(&[("value", "x")]));
        assert_eq!(state.get_string(&["variables", "FOO"]).as_deref(), Some("x"));

        apply_variable_config_values(&foo(None), &mut state, &values(&[("value", "")]));
        assert!(state.get_value(&["variables", "FOO"]).is_none());
        assert!(state.get_value(&["disabled_variables", "FOO"]).is_none());
    }

    #[test]
    fn encrypted_values_are_not_saved() {
        let temp = TempDir::new().unwrap();
        let mut state = LocalStateFile::load_for_directory(temp.path()).unwrap();
        let secret = Requirement::env_var("DB_PASSWORD", RequirementOptions::default());
        apply_variable_config_values(&secret, &mut state, &values(&[("value", "hunter2")]));
        assert!(state.get_value(&["variables", "DB_PASSWORD"]).is_none());
    }

    #[test]
    fn provide_prefers_local_then_environ_then_default() {
        let temp = TempDir::new().unwrap();
        let mut state = LocalStateFile::load_for_directory(temp.path()).unwrap();

        let mut environ = Environ::new();
        provide(&foo(Some("d")), &mut environ, &mut state);
        assert_eq!(environ.get("FOO").map(String::as_str), Some("d"));

        let mut environ = Environ::from([("FOO".to_string(), "env".to_string())]);
        provide(&foo(Some("d")), &mut environ, &mut state);
        assert_eq!(environ.get("FOO").map(String::as_str), Some("env"));

        state.set_value(&["variables", "FOO"], "local");
        provide(&foo(Some("d")), &mut environ, &mut state);
        assert_eq!(environ.get("FOO").map(String::as_str), Some("local"));
    }

    #[test]
    fn provide_without_value_leaves_unset() {
        let temp = TempDir::new().unwrap();
        let mut state = LocalStateFile::load_for_directory(temp.path()).unwrap();
        let mut environ = Environ::new();
        let result = provide(&foo(None), &mut environ, &mut state);
        assert!(result.succeeded());
        assert!(!environ.contains_key("FOO"));
    }

    #[test]
    fn unprovide_is_nothing_to_do() {
        let temp = TempDir::new().unwrap();
        let mut state = LocalStateFile::load_for_directory(temp.path()).unwrap();
        let teardown = EnvVarProvider.unprovide(
            &foo(None),
            &Environ::new(),
            &mut state,
            &UserConfigOverrides::default(),
            None,
        );
        assert!(matches!(teardown, Teardown::NothingToDo(_)));
        assert_eq!(
            teardown.status().status_description(),
            "Nothing to clean up for FOO."
        );
    }
}
