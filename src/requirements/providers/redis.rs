//! The Redis provider.
//!
//! Finds the system default server on localhost:6379, or starts a
//! project-scoped `redis-server` on the first free port of a configured
//! range. A server it starts is recorded in the service run state so
//! unprepare can shut it down again.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use super::env_var::{
    apply_variable_config_values, missing_env_prefix, provide_variable, read_variable_config,
};
use crate::environ::Environ;
use crate::network;
use crate::requirements::provider::{
    delete_service_directory, shutdown_service_run_state, ProvideContext, ProvideMode, Provider,
    ProviderKind,
};
use crate::requirements::requirement::{Requirement, StatusContext, UserConfigOverrides};
use crate::requirements::status::{
    AnalysisExtra, ConfigSource, ProvideResult, ProviderAnalysis, ProviderConfig,
    RequirementStatus, Teardown,
};
use crate::shell::{execute, CommandOptions};
use crate::state::{LocalStateFile, ServiceRunState};

const SYSTEM_HOST: &str = "localhost";
const SYSTEM_PORT: u16 = 6379;
const DEFAULT_LOWER_PORT: u16 = 6380;
const DEFAULT_UPPER_PORT: u16 = 6449;
const START_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn system_url() -> String {
    format!("redis://{}:{}", SYSTEM_HOST, SYSTEM_PORT)
}

fn local_url(port: u16) -> String {
    format!("redis://localhost:{}", port)
}

/// Parse `"LOWER-UPPER"`. Both ends must be positive and in order.
fn parse_port_range(s: &str) -> Option<(u16, u16)> {
    let (lower, upper) = s.split_once('-')?;
    let lower: u16 = lower.trim().parse().ok()?;
    let upper: u16 = upper.trim().parse().ok()?;
    (lower > 0 && upper > 0 && lower <= upper).then_some((lower, upper))
}

/// Provides a Redis server URL.
#[derive(Debug, Default)]
pub struct RedisProvider;

impl RedisProvider {
    fn section<'a>(requirement: &'a Requirement, key: &'a str) -> [&'a str; 3] {
        ["service_options", requirement.env_var.as_str(), key]
    }

    fn config_from(requirement: &Requirement, environ: &Environ, local_state: &LocalStateFile) -> ProviderConfig {
        let mut config = read_variable_config(requirement, environ, local_state);

        if config.source == ConfigSource::Unset {
            let scope = local_state
                .get_string(&Self::section(requirement, "scope"))
                .unwrap_or_else(|| "all".to_string());
            config.source = match scope.as_str() {
                "project" => ConfigSource::FindProject,
                "system" => ConfigSource::FindSystem,
                _ => ConfigSource::FindAll,
            };
        }

        let default_range = format!("{}-{}", DEFAULT_LOWER_PORT, DEFAULT_UPPER_PORT);
        let range = local_state
            .get_string(&Self::section(requirement, "port_range"))
            .unwrap_or_else(|| default_range.clone());
        let (lower, upper) = parse_port_range(&range).unwrap_or_else(|| {
            tracing::warn!("Invalid port_range '{}', should be like '{}'", range, default_range);
            (DEFAULT_LOWER_PORT, DEFAULT_UPPER_PORT)
        });
        config.lower_port = Some(lower);
        config.upper_port = Some(upper);
        config
    }

    fn provide_system(status: &RequirementStatus) -> Option<String> {
        match status.analysis.extra {
            AnalysisExtra::Redis {
                default_system_exists: true,
                ..
            } => {
                tracing::info!("Found system default Redis at {}", system_url());
                Some(system_url())
            }
            _ => None,
        }
    }

    fn provide_project(
        requirement: &Requirement,
        ctx: &mut ProvideContext<'_>,
        errors: &mut Vec<String>,
    ) -> Option<String> {
        let status = ctx.status;
        let existing = match &status.analysis.extra {
            AnalysisExtra::Redis {
                existing_scoped_instance_url,
                ..
            } => existing_scoped_instance_url.clone(),
            _ => None,
        };
        let lower = status.analysis.config.lower_port.unwrap_or(DEFAULT_LOWER_PORT);
        let upper = status.analysis.config.upper_port.unwrap_or(DEFAULT_UPPER_PORT);
        let workdir = ctx.local_state.service_directory(&requirement.env_var);
        let environ = ctx.environ.clone();

        ctx.transform_service_run_state(&requirement.env_var, |run_state| {
            if let Some(url) = existing {
                tracing::info!("Using redis-server we started previously at {}", url);
                return Some(url);
            }
            run_state.clear();

            match start_redis_server(&workdir, lower, upper, &environ) {
                Ok(port) => {
                    run_state.port = Some(port);
                    // --port is silently ignored by redis-cli; only -p works
                    run_state.shutdown_commands = vec![vec![
                        "redis-cli".to_string(),
                        "-p".to_string(),
                        port.to_string(),
                        "shutdown".to_string(),
                    ]];
                    run_state.started_at = Some(chrono::Utc::now());
                    Some(local_url(port))
                }
                Err(error) => {
                    tracing::error!("{}", error);
                    errors.push(error);
                    None
                }
            }
        })
    }
}

/// Start a daemonized redis-server on the first free port in
/// `lower..=upper` and wait for it to listen.
fn start_redis_server(workdir: &Path, lower: u16, upper: u16, environ: &Environ) -> Result<u16, String> {
    fs::create_dir_all(workdir)
        .map_err(|e| format!("Could not create {}: {}", workdir.display(), e))?;
    let pidfile = workdir.join("redis.pid");
    let logfile = workdir.join("redis.log");

    let Some(port) = (lower..=upper).find(|&port| !network::can_connect_to_socket("localhost", port))
    else {
        return Err(format!(
            "All ports from {} to {} were in use, could not start redis-server on one of them.",
            lower, upper
        ));
    };

    // an old log would confuse the failure report
    let _ = fs::remove_file(&logfile);

    let command = vec![
        "redis-server".to_string(),
        "--pidfile".to_string(),
        pidfile.display().to_string(),
        "--logfile".to_string(),
        logfile.display().to_string(),
        "--daemonize".to_string(),
        "yes".to_string(),
        "--port".to_string(),
        port.to_string(),
    ];
    tracing::info!("Starting {:?}", command);

    let options = CommandOptions {
        env: Some(environ.clone()),
        capture_stderr: true,
        ..Default::default()
    };
    let result = execute(&command, &options)
        .map_err(|e| format!("Error executing redis-server: {}", e))?;

    if result.success {
        let started = Instant::now();
        let mut port_ready = false;
        let mut pidfile_ready = false;
        while started.elapsed() < START_TIMEOUT && !(port_ready && pidfile_ready) {
            thread::sleep(POLL_INTERVAL);
            port_ready = port_ready || network::can_connect_to_socket("localhost", port);
            pidfile_ready = pidfile_ready || pidfile.exists();
        }
        if port_ready {
            return Ok(port);
        }
        tracing::info!(
            "redis-server started successfully, but we timed out trying to connect to it on port {}",
            port
        );
    }

    for line in result.stderr.lines().filter(|line| !line.is_empty()) {
        tracing::info!("{}", line);
    }
    match fs::read_to_string(&logfile) {
        Ok(log) => log.lines().for_each(|line| tracing::info!("{}", line)),
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            tracing::info!("Failed to read {}: {}", logfile.display(), e)
        }
        Err(_) => {}
    }

    Err(format!(
        "redis-server process failed or timed out, exited with code {}",
        result.exit_code.unwrap_or(-1)
    ))
}

impl Provider for RedisProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Redis
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
        Self::config_from(requirement, ctx.environ, ctx.local_state)
    }

    fn set_config_values_as_strings(
        &self,
        requirement: &Requirement,
        environ: &mut Environ,
        local_state: &mut LocalStateFile,
        _default_env_spec_name: Option<&str>,
        _overrides: &mut UserConfigOverrides,
        values: &BTreeMap<String, String>,
    ) {
        let config = Self::config_from(requirement, environ, local_state);
        let lower = values
            .get("lower_port")
            .cloned()
            .or(config.lower_port.map(|p| p.to_string()))
            .unwrap_or_default();
        let upper = values
            .get("upper_port")
            .cloned()
            .or(config.upper_port.map(|p| p.to_string()))
            .unwrap_or_default();
        let range = format!("{}-{}", lower, upper);
        if parse_port_range(&range).is_none() {
            tracing::warn!(
                "Port range {} for {} is invalid; the default {}-{} will be used",
                range,
                requirement.env_var,
                DEFAULT_LOWER_PORT,
                DEFAULT_UPPER_PORT
            );
        }
        local_state.set_value(&Self::section(requirement, "port_range"), range);

        if let Some(source) = values.get("source") {
            let scope = match source.as_str() {
                "find_all" => Some("all"),
                "find_project" => Some("project"),
                "find_system" => Some("system"),
                _ => None,
            };
            if let Some(scope) = scope {
                local_state.set_value(&Self::section(requirement, "scope"), scope);
            }
            if source != ConfigSource::Environ.as_str() {
                environ.remove(&requirement.env_var);
            }
        }

        apply_variable_config_values(requirement, local_state, values);
    }

    fn analyze(&self, requirement: &Requirement, ctx: &StatusContext<'_>) -> ProviderAnalysis {
        let run_state: ServiceRunState = ctx.local_state.service_run_state(&requirement.env_var);
        let existing_scoped_instance_url = run_state
            .port
            .filter(|&port| network::can_connect_to_socket("localhost", port))
            .map(local_url);

        ProviderAnalysis {
            config: self.read_config(requirement, ctx),
            missing_env_vars_to_configure: missing_env_prefix(ctx.environ),
            missing_env_vars_to_provide: missing_env_prefix(ctx.environ),
            extra: AnalysisExtra::Redis {
                existing_scoped_instance_url,
                default_system_exists: network::can_connect_to_socket(SYSTEM_HOST, SYSTEM_PORT),
            },
        }
    }

    fn provide(&self, requirement: &Requirement, ctx: &mut ProvideContext<'_>) -> ProvideResult {
        let status = ctx.status;
        let source = status.analysis.config.source;

        provide_variable(requirement, ctx);
        let mut url = ctx.environ.get(&requirement.env_var).cloned();
        let mut errors = Vec::new();

        let mut system_failed = false;
        if url.is_none() && matches!(source, ConfigSource::FindSystem | ConfigSource::FindAll) {
            url = Self::provide_system(status);
            system_failed = url.is_none();
        }

        // throwaway servers only in development
        if url.is_none()
            && matches!(source, ConfigSource::FindProject | ConfigSource::FindAll)
            && ctx.mode == ProvideMode::Development
        {
            url = Self::provide_project(requirement, ctx, &mut errors);
        }

        match url {
            Some(url) => {
                ctx.environ.insert(requirement.env_var.clone(), url);
            }
            None if system_failed => {
                errors.push("Could not connect to system default Redis.".to_string());
            }
            None => {}
        }

        ProvideResult::empty().copy_with_additions(errors, vec![])
    }

    fn unprovide(
        &self,
        requirement: &Requirement,
        _environ: &Environ,
        local_state: &mut LocalStateFile,
        _overrides: &UserConfigOverrides,
        _status: Option<&RequirementStatus>,
    ) -> Teardown {
        let teardown = shutdown_service_run_state(local_state, &requirement.env_var);
        delete_service_directory(local_state, &requirement.env_var);
        teardown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conda::MockCondaManager;
    use crate::download::MockDownloader;
    use crate::requirements::registry::RequirementsRegistry;
    use crate::requirements::requirement::{RequirementOptions, ServiceType};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn redis() -> Arc<Requirement> {
        Arc::new(Requirement::service(
            "REDIS_URL",
            ServiceType::Redis,
            RequirementOptions::default(),
        ))
    }

    fn registry() -> RequirementsRegistry {
        RequirementsRegistry::new(
            Arc::new(MockCondaManager::new()),
            Arc::new(MockDownloader::new()),
        )
    }

    fn config(local_state: &LocalStateFile, environ: &Environ) -> ProviderConfig {
        RedisProvider::config_from(&redis(), environ, local_state)
    }

    #[test]
    fn parses_port_ranges() {
        assert_eq!(parse_port_range("7000-7010"), Some((7000, 7010)));
        assert_eq!(parse_port_range(" 7000 - 7000 "), Some((7000, 7000)));
        assert_eq!(parse_port_range("7010-7000"), None);
        assert_eq!(parse_port_range("0-10"), None);
        assert_eq!(parse_port_range("7000"), None);
        assert_eq!(parse_port_range("a-b"), None);
    }

    #[test]
    fn default_config_finds_anywhere() {
        let temp = TempDir::new().unwrap();
        let state = LocalStateFile::load_for_directory(temp.path()).unwrap();
        let config = config(&state, &Environ::new());
        assert_eq!(config.source, ConfigSource::FindAll);
        assert_eq!(config.lower_port, Some(6380));
        assert_eq!(config.upper_port, Some(6449));
    }

    #[test]
    fn invalid_port_range_falls_back_to_default() {
        let temp = TempDir::new().unwrap();
        let mut state = LocalStateFile::load_for_directory(temp.path()).unwrap();
        state.set_value(&["service_options", "REDIS_URL", "port_range"], "nope");
        let config = config(&state, &Environ::new());
        assert_eq!((config.lower_port, config.upper_port), (Some(6380), Some(6449)));
    }

    #[test]
    fn set_config_stores_scope_and_range() {
        let temp = TempDir::new().unwrap();
        let mut state = LocalStateFile::load_for_directory(temp.path()).unwrap();
        let mut environ = Environ::from([("REDIS_URL".to_string(), "redis://x".to_string())]);
        let values = BTreeMap::from([
            ("source".to_string(), "find_project".to_string()),
            ("lower_port".to_string(), "7000".to_string()),
            ("upper_port".to_string(), "7010".to_string()),
        ]);

        RedisProvider.set_config_values_as_strings(
            &redis(),
            &mut environ,
            &mut state,
            None,
            &mut UserConfigOverrides::default(),
            &values,
        );

        assert!(!environ.contains_key("REDIS_URL"));
        let config = config(&state, &environ);
        assert_eq!(config.source, ConfigSource::FindProject);
        assert_eq!((config.lower_port, config.upper_port), (Some(7000), Some(7010)));
    }

    #[test]
    fn set_config_with_inverted_range_falls_back_to_default() {
        let temp = TempDir::new().unwrap();
        let mut state = LocalStateFile::load_for_directory(temp.path()).unwrap();
        let mut environ = Environ::new();
        let values = BTreeMap::from([("lower_port".to_string(), "7000".to_string())]);

        RedisProvider.set_config_values_as_strings(
            &redis(),
            &mut environ,
            &mut state,
            None,
            &mut UserConfigOverrides::default(),
            &values,
        );

        assert_eq!(
            state.get_string(&["service_options", "REDIS_URL", "port_range"]).as_deref(),
            Some("7000-6449")
        );
        let config = config(&state, &environ);
        assert_eq!((config.lower_port, config.upper_port), (Some(6380), Some(6449)));
    }

    #[test]
    fn environ_value_is_kept_without_starting_anything() {
        let temp = TempDir::new().unwrap();
        let mut state = LocalStateFile::load_for_directory(temp.path()).unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("redis://127.0.0.1:{}", listener.local_addr().unwrap().port());
        let mut environ = Environ::from([
            ("REDIS_URL".to_string(), url.clone()),
            ("CONDA_PREFIX".to_string(), "/env".to_string()),
        ]);
        let registry = registry();
        let req = redis();
        let status = req.check_status(
            &StatusContext {
                registry: &registry,
                environ: &environ,
                local_state: &state,
                default_env_spec_name: None,
                overrides: &UserConfigOverrides::default(),
            },
            None,
        );
        assert!(status.has_been_provided);

        let mut overrides = UserConfigOverrides::default();
        let mut ctx = ProvideContext {
            environ: &mut environ,
            local_state: &mut state,
            default_env_spec_name: None,
            status: &status,
            mode: ProvideMode::Development,
            overrides: &mut overrides,
        };
        let result = RedisProvider.provide(&req, &mut ctx);
        assert!(result.succeeded());
        assert_eq!(environ.get("REDIS_URL"), Some(&url));
        assert!(state.service_run_state("REDIS_URL").is_empty());
    }

    #[test]
    fn check_mode_with_project_scope_does_nothing() {
        let temp = TempDir::new().unwrap();
        let mut state = LocalStateFile::load_for_directory(temp.path()).unwrap();
        state.set_value(&["service_options", "REDIS_URL", "scope"], "project");
        let mut environ = Environ::from([("CONDA_PREFIX".to_string(), "/env".to_string())]);
        let registry = registry();
        let req = redis();
        let status = req.check_status(
            &StatusContext {
                registry: &registry,
                environ: &environ,
                local_state: &state,
                default_env_spec_name: None,
                overrides: &UserConfigOverrides::default(),
            },
            None,
        );

        let mut overrides = UserConfigOverrides::default();
        let mut ctx = ProvideContext {
            environ: &mut environ,
            local_state: &mut state,
            default_env_spec_name: None,
            status: &status,
            mode: ProvideMode::Check,
            overrides: &mut overrides,
        };
        let result = RedisProvider.provide(&req, &mut ctx);
        assert!(result.succeeded());
        assert!(!environ.contains_key("REDIS_URL"));
    }

    #[test]
    fn all_ports_in_use_is_reported() {
        let temp = TempDir::new().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let err = start_redis_server(temp.path(), port, port, &Environ::new()).unwrap_err();
        assert_eq!(
            err,
            format!(
                "All ports from {} to {} were in use, could not start redis-server on one of them.",
                port, port
            )
        );
    }

    #[test]
    fn unprovide_without_server_is_nothing_to_do() {
        let temp = TempDir::new().unwrap();
        let mut state = LocalStateFile::load_for_directory(temp.path()).unwrap();
        let teardown = RedisProvider.unprovide(
            &redis(),
            &Environ::new(),
            &mut state,
            &UserConfigOverrides::default(),
            None,
        );
        assert!(matches!(teardown, Teardown::NothingToDo(_)));
    }
}
