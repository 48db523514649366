//! The project-local state file (`stagehand-local.yml`).
//!
//! Holds user choices that shouldn't be committed with the project:
//! variable overrides, whether to inherit the caller's package
//! environment, service options, and service run states. Values are
//! addressed by key path, e.g. `["variables", "FOO"]`.

use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::ServiceRunState;
use crate::error::{Result, StagehandError};

const SERVICE_RUN_STATES: &str = "service_run_states";

/// Local state backed by a YAML file.
#[derive(Debug, Clone)]
pub struct LocalStateFile {
    path: PathBuf,
    root: Value,
}

impl LocalStateFile {
    /// File name looked up in the project directory and its ancestors.
    pub const FILENAME: &'static str = "stagehand-local.yml";

    /// Load the state file governing `directory`.
    ///
    /// Scans `directory` and its ancestors for an existing state file. When
    /// none exists, returns an empty state that will be saved into
    /// `directory`.
    pub fn load_for_directory(directory: &Path) -> Result<Self> {
        for dir in directory.ancestors() {
            let candidate = dir.join(Self::FILENAME);
            if candidate.is_file() {
                tracing::debug!("Using local state {}", candidate.display());
                return Self::load(&candidate);
            }
        }
        Ok(Self::empty(directory.join(Self::FILENAME)))
    }

    /// Load a state file from an explicit path (empty if it doesn't exist).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::empty(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let root: Value = if content.trim().is_empty() {
            Value::Mapping(Mapping::new())
        } else {
            serde_yaml::from_str(&content).map_err(|e| StagehandError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };

        if !matches!(root, Value::Mapping(_)) {
            return Err(StagehandError::ParseError {
                path: path.to_path_buf(),
                message: "top level must be a mapping".to_string(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            root,
        })
    }

    /// An empty state that will be written to `path` on save.
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            root: Value::Mapping(Mapping::new()),
        }
    }

    /// Path of the backing file.
    pub fn filename(&self) -> &Path {
        &self.path
    }

    /// Directory where a service keeps its files: `services/<name>` beside the state file.
    pub fn service_directory(&self, relative_name: &str) -> PathBuf {
        self.path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("services")
            .join(relative_name)
    }

    /// Get the value at a key path.
    pub fn get_value(&self, path: &[&str]) -> Option<&Value> {
        let mut current = &self.root;
        for key in path {
            current = current.as_mapping()?.get(*key)?;
        }
        Some(current)
    }

    /// Get a scalar value at a key path as a string.
    pub fn get_string(&self, path: &[&str]) -> Option<String> {
        match self.get_value(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Get a boolean value at a key path.
    pub fn get_bool(&self, path: &[&str]) -> Option<bool> {
        self.get_value(path)?.as_bool()
    }

    /// Set the value at a key path, creating intermediate mappings.
    pub fn set_value(&mut self, path: &[&str], value: impl Into<Value>) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };

        let mut current = &mut self.root;
        for key in parents {
            if !matches!(current, Value::Mapping(_)) {
                *current = Value::Mapping(Mapping::new());
            }
            let Value::Mapping(map) = current else {
                unreachable!()
            };
            current = map
                .entry(Value::from(*key))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
        }

        if !matches!(current, Value::Mapping(_)) {
            *current = Value::Mapping(Mapping::new());
        }
        if let Value::Mapping(map) = current {
            map.insert(Value::from(*last), value.into());
        }
    }

    /// Remove the value at a key path. Returns whether anything was removed.
    pub fn unset_value(&mut self, path: &[&str]) -> bool {
        let Some((last, parents)) = path.split_last() else {
            return false;
        };

        let mut current = &mut self.root;
        for key in parents {
            match current.as_mapping_mut().and_then(|m| m.get_mut(*key)) {
                Some(next) => current = next,
                None => return false,
            }
        }

        current
            .as_mapping_mut()
            .map(|m| m.remove(*last).is_some())
            .unwrap_or(false)
    }

    /// Run state recorded for a service (empty if none).
    pub fn service_run_state(&self, name: &str) -> ServiceRunState {
        self.get_value(&[SERVICE_RUN_STATES, name])
            .and_then(|value| serde_yaml::from_value(value.clone()).ok())
            .unwrap_or_default()
    }

    /// Every recorded service run state, by service name.
    pub fn all_service_run_states(&self) -> BTreeMap<String, ServiceRunState> {
        let Some(Value::Mapping(map)) = self.get_value(&[SERVICE_RUN_STATES]) else {
            return BTreeMap::new();
        };
        map.iter()
            .filter_map(|(key, value)| {
                let name = key.as_str()?.to_string();
                let state = serde_yaml::from_value(value.clone()).ok()?;
                Some((name, state))
            })
            .collect()
    }

    /// Record the run state for a service.
    pub fn set_service_run_state(&mut self, name: &str, state: &ServiceRunState) {
        let value = serde_yaml::to_value(state).unwrap_or(Value::Mapping(Mapping::new()));
        self.set_value(&[SERVICE_RUN_STATES, name], value);
    }

    /// Save to disk using atomic write.
    ///
    /// Writes to a temp file then renames it over the target, so the state
    /// file is never partially written.
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content =
            serde_yaml::to_string(&self.root).map_err(|e| StagehandError::SerializeError {
                path: self.path.clone(),
                message: e.to_string(),
            })?;

        let temp_path = self.path.with_extension("yml.tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }
}
