//! The owned environment mapping a prepare run works on.
//!
//! The engine never reads or writes the process environment. Callers
//! snapshot it once with [`from_process`] and pass the mapping in; every
//! change a prepare run makes lands in its own copy.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Environment variables, name to value.
pub type Environ = BTreeMap<String, String>;

/// Variable holding the active package environment prefix.
pub const CONDA_PREFIX: &str = "CONDA_PREFIX";

/// Legacy spelling of [`CONDA_PREFIX`].
pub const CONDA_ENV_PATH: &str = "CONDA_ENV_PATH";

/// Name (or prefix) of the active package environment.
pub const CONDA_DEFAULT_ENV: &str = "CONDA_DEFAULT_ENV";

/// Directory of the project being prepared; always injected by the engine.
pub const PROJECT_DIR: &str = "PROJECT_DIR";

/// Executable search path; must be present at entry.
pub const PATH: &str = "PATH";

#[cfg(unix)]
const PATH_SEPARATOR: char = ':';
#[cfg(not(unix))]
const PATH_SEPARATOR: char = ';';

/// Snapshot the current process environment.
pub fn from_process() -> Environ {
    std::env::vars().collect()
}

/// Look up a variable, treating the empty string as unset.
pub fn non_empty<'a>(environ: &'a Environ, name: &str) -> Option<&'a str> {
    environ
        .get(name)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

/// The package environment prefix active in `environ`, if any.
pub fn get_prefix(environ: &Environ) -> Option<String> {
    [CONDA_PREFIX, CONDA_ENV_PATH, CONDA_DEFAULT_ENV]
        .iter()
        .find_map(|name| non_empty(environ, name))
        .map(String::from)
}

/// Remove every variable that marks a package environment as active.
pub fn delete_prefix_variables(environ: &mut Environ) {
    for name in [CONDA_PREFIX, CONDA_ENV_PATH, CONDA_DEFAULT_ENV] {
        environ.remove(name);
    }
}

/// Mark `prefix` as the active package environment through `varname`.
pub fn set_prefix(environ: &mut Environ, prefix: &Path, varname: &str) {
    let prefix = normalize(prefix).to_string_lossy().into_owned();
    environ.insert(varname.to_string(), prefix.clone());
    if varname != CONDA_DEFAULT_ENV {
        environ.insert(CONDA_DEFAULT_ENV.to_string(), prefix);
    }
}

/// Put `prefix`'s bin directory first on `path`.
///
/// Bin directories of other package environments (a `bin` whose parent
/// contains `conda-meta`) are dropped so only one environment is active.
pub fn set_conda_env_in_path(path: &str, prefix: &Path) -> String {
    let bin = prefix.join("bin").to_string_lossy().into_owned();
    let mut elements = vec![bin];
    elements.extend(
        path.split(PATH_SEPARATOR)
            .filter(|element| !element.is_empty() && !is_conda_bindir(element))
            .map(String::from),
    );
    elements.join(&PATH_SEPARATOR.to_string())
}

fn is_conda_bindir(element: &str) -> bool {
    let trimmed = element.trim_end_matches('/');
    if !trimmed.ends_with("/bin") {
        return false;
    }
    Path::new(trimmed)
        .parent()
        .map(|parent| parent.join("conda-meta").is_dir())
        .unwrap_or(false)
}

/// Split a search path into its directories.
pub fn split_path(path: &str) -> Vec<PathBuf> {
    path.split(PATH_SEPARATOR)
        .filter(|element| !element.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Join directories into a search path.
pub fn join_path<I, S>(elements: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    elements
        .into_iter()
        .map(|element| element.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(&PATH_SEPARATOR.to_string())
}

/// Copy added or changed variables from `src` into `dest`.
///
/// Never removes anything from `dest`.
pub fn update_environ(dest: &mut Environ, src: &Environ) {
    for (key, value) in src {
        if dest.get(key) != Some(value) {
            dest.insert(key.clone(), value.clone());
        }
    }
}

/// Lexically normalize a path: drop `.` and fold `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
