//! Parsing the sections of `stagehand.yml`.
//!
//! Sections are walked by hand from a `serde_yaml::Value` so that every
//! structurally unusable entry becomes a problem line instead of aborting
//! the whole load. Mappings keep file order.

use serde_yaml::{Mapping, Value};

use super::command::ProjectCommand;
use crate::conda::EnvSpec;
use crate::download::HashAlgorithm;
use crate::environ;
use crate::requirements::{DownloadSpec, Requirement, RequirementOptions, ServiceType};

/// Everything read from a project file.
#[derive(Debug, Default)]
pub(crate) struct ParsedProject {
    pub name: Option<String>,
    pub variables: Vec<Requirement>,
    pub downloads: Vec<Requirement>,
    pub services: Vec<Requirement>,
    pub env_specs: Vec<EnvSpec>,
    pub commands: Vec<ProjectCommand>,
    pub problems: Vec<String>,
}

/// Parse a loaded document. `filename` is used in problem lines.
pub(crate) fn parse(root: &Value, filename: &str) -> ParsedProject {
    let mut parsed = ParsedProject::default();
    let root = match root {
        Value::Mapping(m) => m.clone(),
        Value::Null => Mapping::new(),
        other => {
            parsed.problems.push(format!(
                "{}: top level should be a dictionary, not {}",
                filename,
                describe(other)
            ));
            return parsed;
        }
    };

    parsed.name = parse_name(&root, filename, &mut parsed.problems);
    parse_variables(root.get("variables"), &mut parsed);
    parse_downloads(root.get("downloads"), filename, &mut parsed);
    parse_services(root.get("services"), filename, &mut parsed);
    parse_env_specs(root.get("env_specs"), filename, &mut parsed);
    parse_commands(root.get("commands"), filename, &mut parsed);
    parsed
}

fn describe(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| format!("{:?}", value))
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_name(root: &Mapping, filename: &str, problems: &mut Vec<String>) -> Option<String> {
    match root.get("name")? {
        Value::String(name) if name.trim().is_empty() => {
            problems.push(format!("{}: name: field is an empty or all-whitespace string.", filename));
            None
        }
        Value::String(name) => Some(name.clone()),
        other => {
            problems.push(format!(
                "{}: name: field should have a string value not {}",
                filename,
                describe(other)
            ));
            None
        }
    }
}

fn reserved(name: &str, problems: &mut Vec<String>) -> bool {
    if name == environ::CONDA_DEFAULT_ENV || name == environ::CONDA_ENV_PATH {
        problems.push(format!(
            "Environment variable {} is reserved for Conda's use, so it can't appear in the variables section.",
            name
        ));
        true
    } else {
        false
    }
}

fn parse_variable_options(name: &str, value: &Value, problems: &mut Vec<String>) -> Option<RequirementOptions> {
    let mut options = RequirementOptions::default();
    let raw_default = match value {
        Value::Null => return Some(options),
        Value::Mapping(m) => {
            options.description = m.get("description").and_then(Value::as_str).map(String::from);
            options.encrypted = m.get("encrypted").and_then(Value::as_bool);
            m.get("default").cloned().unwrap_or(Value::Null)
        }
        other => other.clone(),
    };

    match raw_default {
        Value::Null => {}
        other => match scalar_string(&other) {
            Some(default) => options.default = Some(default),
            None => {
                problems.push(format!(
                    "default value for variable {} must be null, a string, or a number, not {}.",
                    name,
                    describe(&other)
                ));
                return None;
            }
        },
    }
    Some(options)
}

fn parse_variables(section: Option<&Value>, parsed: &mut ParsedProject) {
    match section {
        None | Some(Value::Null) => {}
        Some(Value::Mapping(variables)) => {
            for (key, value) in variables {
                let Some(name) = key.as_str() else {
                    parsed.problems.push(format!(
                        "variables section should contain environment variable names, {} is not a string",
                        describe(key)
                    ));
                    continue;
                };
                if reserved(name, &mut parsed.problems) {
                    continue;
                }
                if name.trim().is_empty() {
                    parsed.problems.push(format!(
                        "Variable name cannot be empty string, found: '{}' as name",
                        name
                    ));
                    continue;
                }
                if let Some(options) = parse_variable_options(name, value, &mut parsed.problems) {
                    parsed.variables.push(Requirement::env_var(name, options));
                }
            }
        }
        Some(Value::Sequence(items)) => {
            for item in items {
                match item.as_str() {
                    Some(name) if name.trim().is_empty() => parsed.problems.push(format!(
                        "Variable name cannot be empty string, found: '{}' as name",
                        name
                    )),
                    Some(name) if reserved(name, &mut parsed.problems) => {}
                    Some(name) => parsed
                        .variables
                        .push(Requirement::env_var(name, RequirementOptions::default())),
                    None => parsed.problems.push(format!(
                        "variables section should contain environment variable names, {} is not a string",
                        describe(item)
                    )),
                }
            }
        }
        Some(other) => parsed.problems.push(format!(
            "variables section contains wrong value type {}, should be dict or list of requirements",
            describe(other)
        )),
    }
}

/// Last path segment of a URL, ignoring query and fragment.
fn url_basename(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => without_query,
    };
    path.rsplit('/').next().unwrap_or("")
}

fn parse_download(name: &str, item: &Value, problems: &mut Vec<String>) -> Option<Requirement> {
    let mut options = RequirementOptions::default();
    let mut filename = None;
    let mut hash = None;

    let url = match item {
        Value::String(url) => Some(url.clone()),
        Value::Mapping(m) => {
            let Some(url) = m.get("url") else {
                problems.push(format!("Download item {} doesn't contain a 'url' field.", name));
                return None;
            };

            match m.get("description") {
                None => {}
                Some(Value::String(d)) => options.description = Some(d.clone()),
                Some(_) => {
                    problems.push(format!(
                        "'description' field for download item {} is not a string",
                        name
                    ));
                    return None;
                }
            }

            for algorithm in HashAlgorithm::ALL {
                let Some(value) = m.get(algorithm.key()) else {
                    continue;
                };
                if let Some((previous, _)) = &hash {
                    problems.push(format!(
                        "Multiple checksums for download {}: {} and {}.",
                        name, previous, algorithm
                    ));
                    return None;
                }
                match value.as_str() {
                    Some(digest) => hash = Some((algorithm, digest.to_ascii_lowercase())),
                    None => {
                        problems.push(format!(
                            "Checksum value for {} should be a string not {}.",
                            name,
                            describe(value)
                        ));
                        return None;
                    }
                }
            }

            filename = m.get("filename").and_then(Value::as_str).map(String::from);
            url.as_str().map(String::from)
        }
        _ => None,
    };

    let Some(url) = url else {
        problems.push(format!(
            "Download name {} should be followed by a URL string or a dictionary describing the download.",
            name
        ));
        return None;
    };
    if url.is_empty() {
        problems.push(format!("Download item {} has an empty 'url' field.", name));
        return None;
    }

    let filename = filename.unwrap_or_else(|| match url_basename(&url) {
        "" => name.to_string(),
        base => base.to_string(),
    });

    Some(Requirement::download(
        name,
        DownloadSpec {
            url,
            filename,
            hash,
        },
        options,
    ))
}

fn parse_downloads(section: Option<&Value>, filename: &str, parsed: &mut ParsedProject) {
    let downloads = match section {
        None | Some(Value::Null) => return,
        Some(Value::Mapping(m)) => m,
        Some(other) => {
            parsed.problems.push(format!(
                "{}: 'downloads:' section should be a dictionary, found {}",
                filename,
                describe(other)
            ));
            return;
        }
    };
    for (key, item) in downloads {
        let name = key.as_str().unwrap_or("");
        if name.trim().is_empty() {
            parsed.problems.push(format!(
                "Download name cannot be empty string, found: '{}' as name",
                name
            ));
            continue;
        }
        if let Some(requirement) = parse_download(name, item, &mut parsed.problems) {
            parsed.downloads.push(requirement);
        }
    }
}

fn parse_service(name: &str, item: &Value, problems: &mut Vec<String>) -> Option<Requirement> {
    let mut options = RequirementOptions::default();
    let type_name = match item {
        Value::String(t) => t.clone(),
        Value::Mapping(m) => {
            let Some(t) = m.get("type").and_then(Value::as_str) else {
                problems.push(format!("Service {} doesn't contain a 'type' field.", name));
                return None;
            };
            options.default = m.get("default").and_then(scalar_string);
            options.description = m.get("description").and_then(Value::as_str).map(String::from);
            t.to_string()
        }
        _ => {
            problems.push(format!(
                "Service {} should have a service type string or a dictionary as its value.",
                name
            ));
            return None;
        }
    };

    match ServiceType::from_name(&type_name) {
        Some(service_type) => Some(Requirement::service(name, service_type, options)),
        None => {
            problems.push(format!("Service {} has an unknown type '{}'.", name, type_name));
            None
        }
    }
}

fn parse_services(section: Option<&Value>, filename: &str, parsed: &mut ParsedProject) {
    let services = match section {
        None | Some(Value::Null) => return,
        Some(Value::Mapping(m)) => m,
        Some(other) => {
            parsed.problems.push(format!(
                "{}: 'services:' section should be a dictionary from environment variable to service type, found {}",
                filename,
                describe(other)
            ));
            return;
        }
    };
    for (key, item) in services {
        let name = key.as_str().unwrap_or("");
        if name.trim().is_empty() {
            parsed.problems.push(format!(
                "Service name cannot be empty string, found: '{}' as name",
                name
            ));
            continue;
        }
        if let Some(requirement) = parse_service(name, item, &mut parsed.problems) {
            parsed.services.push(requirement);
        }
    }
}

fn string_list(spec: &Mapping, key: &str, what: &str, filename: &str, problems: &mut Vec<String>) -> Vec<String> {
    let items = match spec.get(key) {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Sequence(items)) => items,
        Some(other) => {
            problems.push(format!(
                "{}: {}: value should be a list of {}s, not '{}'",
                filename,
                key,
                what,
                describe(other)
            ));
            return Vec::new();
        }
    };
    items
        .iter()
        .filter_map(|item| match scalar_string(item) {
            Some(s) => Some(s.trim().to_string()),
            None => {
                problems.push(format!(
                    "{}: {}: value should be a {} (as a string) not '{}'",
                    filename,
                    key,
                    what,
                    describe(item)
                ));
                None
            }
        })
        .collect()
}

fn parse_env_specs(section: Option<&Value>, filename: &str, parsed: &mut ParsedProject) {
    let specs = match section {
        None | Some(Value::Null) => return,
        Some(Value::Mapping(m)) => m,
        Some(other) => {
            parsed.problems.push(format!(
                "{}: env_specs should be a dictionary from environment name to environment attributes, not {}",
                filename,
                describe(other)
            ));
            return;
        }
    };

    for (key, attrs) in specs {
        let name = key.as_str().unwrap_or("");
        if name.trim().is_empty() {
            parsed.problems.push(format!(
                "Environment spec name cannot be empty string, found: '{}' as name",
                name
            ));
            continue;
        }
        let attrs = match attrs {
            Value::Mapping(m) => m.clone(),
            Value::Null => Mapping::new(),
            other => {
                parsed.problems.push(format!(
                    "{}: env spec '{}' should be a dictionary of attributes not {}",
                    filename,
                    name,
                    describe(other)
                ));
                continue;
            }
        };

        let problems = &mut parsed.problems;
        let mut spec = EnvSpec::new(name)
            .with_conda_packages(string_list(&attrs, "packages", "package name", filename, problems))
            .with_channels(string_list(&attrs, "channels", "channel name", filename, problems))
            .with_pip_packages(string_list(&attrs, "pip", "pip package name", filename, problems));
        spec.description = attrs.get("description").and_then(Value::as_str).map(String::from);
        parsed.env_specs.push(spec);
    }
}

fn parse_commands(section: Option<&Value>, filename: &str, parsed: &mut ParsedProject) {
    let commands = match section {
        None | Some(Value::Null) => return,
        Some(Value::Mapping(m)) => m,
        Some(other) => {
            parsed.problems.push(format!(
                "{}: 'commands:' section should be a dictionary from command names to attributes, not {}",
                filename,
                describe(other)
            ));
            return;
        }
    };

    for (key, attrs) in commands {
        let name = key.as_str().unwrap_or("");
        if name.trim().is_empty() {
            parsed.problems.push(format!(
                "Command variable name cannot be empty string, found: '{}' as name",
                name
            ));
            continue;
        }
        if !attrs.is_mapping() {
            parsed.problems.push(format!(
                "{}: command name '{}' should be followed by a dictionary of attributes not {}",
                filename,
                name,
                describe(attrs)
            ));
            continue;
        }

        let mut command: ProjectCommand = match serde_yaml::from_value(attrs.clone()) {
            Ok(command) => command,
            Err(e) => {
                parsed
                    .problems
                    .push(format!("{}: command '{}': {}", filename, name, e));
                continue;
            }
        };
        command.name = name.to_string();

        match (&command.unix, &command.args) {
            (None, None) => parsed.problems.push(format!(
                "{}: command '{}' does not have a command line in it",
                filename, name
            )),
            (Some(_), Some(_)) => parsed.problems.push(format!(
                "{}: command '{}' has conflicting statements, 'unix' and 'args' can't both be set",
                filename, name
            )),
            _ => parsed.commands.push(command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(yaml: &str) -> ParsedProject {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        parse(&value, "stagehand.yml")
    }

    #[test]
    fn empty_document_has_no_problems() {
        let parsed = parse_str("");
        assert!(parsed.problems.is_empty());
        assert!(parsed.variables.is_empty());
    }

    #[test]
    fn variables_as_list_and_mapping() {
        let parsed = parse_str("variables: [FOO, BAR]");
        let names: Vec<_> = parsed.variables.iter().map(|r| r.env_var.as_str()).collect();
        assert_eq!(names, vec!["FOO", "BAR"]);

        let parsed = parse_str(
            "variables:\n  FOO: 42\n  BAR: {default: x, description: The bar, encrypted: true}\n  BAZ: null\n",
        );
        assert!(parsed.problems.is_empty());
        assert_eq!(parsed.variables[0].options.default.as_deref(), Some("42"));
        assert_eq!(parsed.variables[1].options.description.as_deref(), Some("The bar"));
        assert_eq!(parsed.variables[1].options.encrypted, Some(true));
        assert_eq!(parsed.variables[2].options, RequirementOptions::default());
    }

    #[test]
    fn reserved_and_bad_defaults_are_problems() {
        let parsed = parse_str("variables:\n  CONDA_ENV_PATH: x\n  FOO: [1, 2]\n");
        assert!(parsed.variables.is_empty());
        assert_eq!(parsed.problems.len(), 2);
        assert!(parsed.problems[0].contains("reserved for Conda's use"));
        assert!(parsed.problems[1].starts_with("default value for variable FOO"));
    }

    #[test]
    fn download_filename_comes_from_url() {
        let parsed = parse_str(
            "downloads:\n  DATA: http://x/path/data.csv?token=1\n  OTHER:\n    url: http://x/\n    md5: ABC\n",
        );
        assert!(parsed.problems.is_empty());
        let data = parsed.downloads[0].download_spec().unwrap();
        assert_eq!(data.filename, "data.csv");
        let other = parsed.downloads[1].download_spec().unwrap();
        assert_eq!(other.filename, "OTHER");
        assert_eq!(other.hash, Some((HashAlgorithm::Md5, "abc".to_string())));
    }

    #[test]
    fn download_problems() {
        let parsed = parse_str(
            "downloads:\n  A: {filename: a}\n  B: {url: ''}\n  C: {url: http://x/c, md5: a, sha256: b}\n  D: 3\n",
        );
        assert!(parsed.downloads.is_empty());
        assert_eq!(
            parsed.problems,
            vec![
                "Download item A doesn't contain a 'url' field.",
                "Download item B has an empty 'url' field.",
                "Multiple checksums for download C: md5 and sha256.",
                "Download name D should be followed by a URL string or a dictionary describing the download.",
            ]
        );
    }

    #[test]
    fn services_by_type_name() {
        let parsed = parse_str("services:\n  REDIS_URL: redis\n  OTHER: {type: postgres}\n");
        assert_eq!(parsed.services.len(), 1);
        assert_eq!(parsed.problems, vec!["Service OTHER has an unknown type 'postgres'."]);
    }

    #[test]
    fn env_specs_keep_file_order() {
        let parsed = parse_str(
            "env_specs:\n  py3:\n    packages: [python=3.11, numpy]\n    channels: [conda-forge]\n  default: {}\n",
        );
        assert!(parsed.problems.is_empty());
        assert_eq!(parsed.env_specs[0].name, "py3");
        assert_eq!(parsed.env_specs[0].conda_packages, vec!["python=3.11", "numpy"]);
        assert_eq!(parsed.env_specs[1].name, "default");
    }

    #[test]
    fn commands_need_exactly_one_command_line() {
        let parsed = parse_str(
            "commands:\n  serve: {unix: python app.py, env_spec: py3}\n  empty: {description: nothing}\n  both: {unix: a, args: [b]}\n",
        );
        assert_eq!(parsed.commands.len(), 1);
        assert_eq!(parsed.commands[0].name, "serve");
        assert_eq!(parsed.commands[0].env_spec.as_deref(), Some("py3"));
        assert_eq!(parsed.problems.len(), 2);
    }

    #[test]
    fn unknown_command_attribute_is_a_problem() {
        let parsed = parse_str("commands:\n  serve: {unix: a, notebook: b.ipynb}\n");
        assert!(parsed.commands.is_empty());
        assert!(parsed.problems[0].starts_with("stagehand.yml: command 'serve':"));
    }
}
