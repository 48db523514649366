//! The download provider.
//!
//! Fetches a file into the project directory, verifying its checksum while
//! it streams to `<file>.part`, and points the requirement's variable at
//! the finished file.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::env_var::{
    apply_variable_config_values, missing_env_prefix, provide_variable, read_variable_config,
};
use crate::download::{DownloadError, Downloader, HashingWriter};
use crate::environ::{self, Environ};
use crate::requirements::provider::{ProvideContext, ProvideMode, Provider, ProviderKind};
use crate::requirements::requirement::{
    DownloadSpec, Requirement, StatusContext, UserConfigOverrides,
};
use crate::requirements::status::{
    AnalysisExtra, ConfigSource, ProvideResult, ProviderAnalysis, ProviderConfig,
    RequirementStatus, Teardown,
};
use crate::state::LocalStateFile;
use crate::status::SimpleStatus;

/// Downloads files declared in the project.
pub struct DownloadProvider {
    downloader: Arc<dyn Downloader>,
}

/// Where a download lives: `filename` under the absolute `PROJECT_DIR`.
fn target_path(environ: &Environ, spec: &DownloadSpec) -> Option<PathBuf> {
    let project_dir = Path::new(environ.get(environ::PROJECT_DIR)?);
    project_dir
        .is_absolute()
        .then(|| environ::normalize(&project_dir.join(&spec.filename)))
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

impl DownloadProvider {
    /// Provider fetching through `downloader`.
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self { downloader }
    }

    /// Fetch `spec` to `path`. Returns the error lines on failure.
    fn download(&self, spec: &DownloadSpec, path: &Path) -> Result<(), Vec<String>> {
        let partial = part_path(path);
        let outcome = self.download_to(spec, &partial);
        let renamed = outcome.and_then(|()| {
            fs::rename(&partial, path)
                .map_err(|e| format!("Error downloading {}: {}", spec.url, e))
        });
        if let Err(error) = renamed {
            let _ = fs::remove_file(&partial);
            return Err(vec![error]);
        }
        Ok(())
    }

    fn download_to(&self, spec: &DownloadSpec, partial: &Path) -> Result<(), String> {
        let io_error = |e: std::io::Error| format!("Error downloading {}: {}", spec.url, e);

        if let Some(parent) = partial.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let file = File::create(partial).map_err(io_error)?;
        let mut writer = HashingWriter::new(
            BufWriter::new(file),
            spec.hash.as_ref().map(|(algorithm, _)| *algorithm),
        );

        tracing::info!("Downloading {} to {}", spec.url, partial.display());
        self.downloader
            .fetch(&spec.url, &mut writer)
            .map_err(|e: DownloadError| e.to_string())?;

        let (buffered, calculated) = writer.finish();
        buffered
            .into_inner()
            .map_err(|e| io_error(e.into_error()))?
            .sync_all()
            .map_err(io_error)?;

        if let (Some((_, expected)), Some(calculated)) = (&spec.hash, calculated) {
            if !expected.eq_ignore_ascii_case(&calculated) {
                return Err(format!(
                    "Error downloading {}: mismatched hashes. Expected: {}, calculated: {}",
                    spec.url, expected, calculated
                ));
            }
        }
        Ok(())
    }
}

impl Provider for DownloadProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Download
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
        let mut config = read_variable_config(requirement, ctx.environ, ctx.local_state);
        if matches!(config.source, ConfigSource::Unset | ConfigSource::Default) {
            config.source = ConfigSource::Download;
        }
        config
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
        apply_variable_config_values(requirement, local_state, values);
        if values
            .get("source")
            .is_some_and(|source| source != ConfigSource::Environ.as_str())
        {
            environ.remove(&requirement.env_var);
        }
    }

    fn analyze(&self, requirement: &Requirement, ctx: &StatusContext<'_>) -> ProviderAnalysis {
        let existing_filename = requirement
            .download_spec()
            .and_then(|spec| target_path(ctx.environ, spec))
            .filter(|path| path.exists());
        ProviderAnalysis {
            config: self.read_config(requirement, ctx),
            missing_env_vars_to_configure: missing_env_prefix(ctx.environ),
            missing_env_vars_to_provide: missing_env_prefix(ctx.environ),
            extra: AnalysisExtra::Download { existing_filename },
        }
    }

    fn provide(&self, requirement: &Requirement, ctx: &mut ProvideContext<'_>) -> ProvideResult {
        provide_variable(requirement, ctx);
        let result = ProvideResult::empty();

        if ctx.mode == ProvideMode::Check {
            return result;
        }

        let Some(spec) = requirement.download_spec() else {
            return result;
        };
        let status = ctx.status;
        let from_download = status.analysis.config.source == ConfigSource::Download;
        if ctx.environ.contains_key(&requirement.env_var) && !from_download {
            return result;
        }

        if let AnalysisExtra::Download {
            existing_filename: Some(existing),
        } = &status.analysis.extra
        {
            let message = format!("Previously downloaded file located at {}", existing.display());
            tracing::info!("{}", message);
            ctx.environ.insert(
                requirement.env_var.clone(),
                existing.to_string_lossy().into_owned(),
            );
            return result.copy_with_additions(vec![], vec![message]);
        }

        let Some(path) = target_path(ctx.environ, spec) else {
            let message = format!(
                "{} must be an absolute path to download {}.",
                environ::PROJECT_DIR,
                spec.url
            );
            tracing::error!("{}", message);
            return result.copy_with_additions(vec![message], vec![]);
        };
        match self.download(spec, &path) {
            Ok(()) => {
                ctx.environ.insert(
                    requirement.env_var.clone(),
                    path.to_string_lossy().into_owned(),
                );
                result.copy_with_additions(
                    vec![],
                    vec![format!("Downloaded {} to {}", spec.url, path.display())],
                )
            }
            Err(errors) => {
                for error in &errors {
                    tracing::error!("{}", error);
                }
                result.copy_with_additions(errors, vec![])
            }
        }
    }

    fn unprovide(
        &self,
        requirement: &Requirement,
        environ: &Environ,
        _local_state: &mut LocalStateFile,
        _overrides: &UserConfigOverrides,
        _status: Option<&RequirementStatus>,
    ) -> Teardown {
        let Some(path) = requirement
            .download_spec()
            .and_then(|spec| target_path(environ, spec))
        else {
            return Teardown::NothingToDo(SimpleStatus::success(format!(
                "Nothing to clean up for {}.",
                requirement.env_var
            )));
        };

        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else if path.is_file() {
            fs::remove_file(&path)
        } else {
            return Teardown::NothingToDo(SimpleStatus::success(format!(
                "No need to remove {} which wasn't downloaded.",
                path.display()
            )));
        };

        match removed {
            Ok(()) => Teardown::Done(SimpleStatus::success(format!(
                "Removed downloaded file {}.",
                path.display()
            ))),
            Err(e) => {
                let problem = format!("Failed to remove {}: {}.", path.display(), e);
                Teardown::Failed(SimpleStatus::failure(problem.clone(), vec![problem]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conda::MockCondaManager;
    use crate::download::hash::digest_hex;
    use crate::download::{HashAlgorithm, MockDownloader};
    use crate::requirements::registry::RequirementsRegistry;
    use crate::requirements::requirement::RequirementOptions;
    use crate::status::Status;
    use tempfile::TempDir;

    const URL: &str = "http://x/data.csv";

    fn requirement(hash: Option<(HashAlgorithm, String)>) -> Arc<Requirement> {
        Arc::new(Requirement::download(
            "DATA",
            DownloadSpec {
                url: URL.into(),
                filename: "data.csv".into(),
                hash,
            },
            RequirementOptions::default(),
        ))
    }

    struct Fixture {
        temp: TempDir,
        environ: Environ,
        local_state: LocalStateFile,
        downloader: Arc<MockDownloader>,
        registry: RequirementsRegistry,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let environ = Environ::from([
            ("PROJECT_DIR".to_string(), temp.path().display().to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("CONDA_PREFIX".to_string(), "/env".to_string()),
        ]);
        let local_state = LocalStateFile::load_for_directory(temp.path()).unwrap();
        let downloader = Arc::new(MockDownloader::new());
        let registry = RequirementsRegistry::new(Arc::new(MockCondaManager::new()), downloader.clone());
        Fixture {
            temp,
            environ,
            local_state,
            downloader,
            registry,
        }
    }

    impl Fixture {
        fn status(&self, requirement: &Arc<Requirement>) -> RequirementStatus {
            requirement.check_status(
                &StatusContext {
                    registry: &self.registry,
                    environ: &self.environ,
                    local_state: &self.local_state,
                    default_env_spec_name: None,
                    overrides: &UserConfigOverrides::default(),
                },
                None,
            )
        }

        fn provide(&mut self, requirement: &Arc<Requirement>, mode: ProvideMode) -> ProvideResult {
            let status = self.status(requirement);
            let mut overrides = UserConfigOverrides::default();
            let mut ctx = ProvideContext {
                environ: &mut self.environ,
                local_state: &mut self.local_state,
                default_env_spec_name: None,
                status: &status,
                mode,
                overrides: &mut overrides,
            };
            self.registry
                .provider(ProviderKind::Download)
                .provide(requirement, &mut ctx)
        }
    }

    #[test]
    fn unset_source_becomes_download() {
        let f = fixture();
        let status = f.status(&requirement(None));
        assert_eq!(status.analysis.config.source, ConfigSource::Download);
        assert_eq!(status.status_description, "Environment variable DATA is not set.");
    }

    #[test]
    fn download_with_matching_hash_sets_variable() {
        let mut f = fixture();
        f.downloader.respond(URL, "a,b\n");
        let req = requirement(Some((HashAlgorithm::Md5, digest_hex(HashAlgorithm::Md5, b"a,b\n"))));

        let result = f.provide(&req, ProvideMode::Development);
        assert!(result.succeeded(), "{:?}", result.errors);

        let file = f.temp.path().join("data.csv");
        assert_eq!(fs::read_to_string(&file).unwrap(), "a,b\n");
        assert_eq!(f.environ.get("DATA").map(String::as_str), file.to_str());
        assert!(!f.temp.path().join("data.csv.part").exists());
        assert!(f.status(&req).has_been_provided);
    }

    #[test]
    fn mismatched_hash_fails_and_leaves_nothing() {
        let mut f = fixture();
        f.downloader.respond(URL, "a,b\n");
        let req = requirement(Some((HashAlgorithm::Md5, "0".repeat(32))));

        let result = f.provide(&req, ProvideMode::Development);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("mismatched hashes"));
        assert!(!f.environ.contains_key("DATA"));
        assert!(!f.temp.path().join("data.csv").exists());
        assert!(!f.temp.path().join("data.csv.part").exists());
    }

    #[test]
    fn http_error_reports_response_code() {
        let mut f = fixture();
        f.downloader.respond_status(URL, 500);
        let result = f.provide(&requirement(None), ProvideMode::Development);
        assert_eq!(
            result.errors,
            vec!["Error downloading http://x/data.csv: response code 500"]
        );
    }

    #[test]
    fn existing_file_is_reused() {
        let mut f = fixture();
        fs::write(f.temp.path().join("data.csv"), "old").unwrap();

        let result = f.provide(&requirement(None), ProvideMode::Development);
        assert!(result.succeeded());
        assert!(result.logs[0].starts_with("Previously downloaded file located at"));
        assert!(f.downloader.requests().is_empty());
        assert!(f.environ.contains_key("DATA"));
    }

    #[test]
    fn check_mode_never_downloads() {
        let mut f = fixture();
        f.downloader.respond(URL, "a,b\n");
        f.provide(&requirement(None), ProvideMode::Check);
        assert!(f.downloader.requests().is_empty());
        assert!(!f.environ.contains_key("DATA"));
    }

    #[test]
    fn relative_project_dir_is_never_resolved_against_cwd() {
        let mut f = fixture();
        f.downloader.respond(URL, "a,b\n");
        f.environ.insert("PROJECT_DIR".into(), "relative/dir".into());
        let result = f.provide(&requirement(None), ProvideMode::Development);
        assert_eq!(
            result.errors,
            vec![format!("PROJECT_DIR must be an absolute path to download {}.", URL)]
        );
        assert!(f.downloader.requests().is_empty());
        assert!(!f.environ.contains_key("DATA"));
    }

    #[test]
    fn waits_for_package_environment() {
        let mut f = fixture();
        f.environ.remove("CONDA_PREFIX");
        let status = f.status(&requirement(None));
        assert!(status
            .analysis
            .missing_env_vars_to_configure
            .contains("CONDA_PREFIX"));
    }

    #[test]
    fn unprovide_removes_file_once() {
        let mut f = fixture();
        fs::write(f.temp.path().join("data.csv"), "a").unwrap();
        let provider = f.registry.provider(ProviderKind::Download);
        let req = requirement(None);

        let teardown = provider.unprovide(
            &req,
            &f.environ,
            &mut f.local_state,
            &UserConfigOverrides::default(),
            None,
        );
        assert!(matches!(teardown, Teardown::Done(_)));
        assert!(teardown
            .status()
            .status_description()
            .starts_with("Removed downloaded file"));

        let teardown = provider.unprovide(
            &req,
            &f.environ,
            &mut f.local_state,
            &UserConfigOverrides::default(),
            None,
        );
        assert!(matches!(teardown, Teardown::NothingToDo(_)));
    }
}
