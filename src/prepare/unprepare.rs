//! Tearing down what a prepare run set up.

use crate::error::Result;
use crate::project::Project;
use crate::requirements::{in_whitelist, RequirementsRegistry, Teardown, WhitelistEntry};
use crate::state::LocalStateFile;
use crate::status::{SimpleStatus, Status};

use super::result::PrepareResult;

/// Clean up project-scoped resources allocated by a prepare run.
///
/// User configuration choices are kept. Services shared with other
/// projects (a system Redis, an inherited environment) are left running.
/// With a whitelist only the matching requirements are torn down.
pub fn unprepare(
    project: &Project,
    registry: &RequirementsRegistry,
    result: &PrepareResult,
    whitelist: Option<&[WhitelistEntry]>,
) -> Result<SimpleStatus> {
    if !project.problems().is_empty() {
        for problem in project.problems() {
            tracing::error!("{}", problem);
        }
        return Ok(SimpleStatus::failure(
            "Unable to load the project.",
            project.problems().to_vec(),
        ));
    }

    let mut local_state = LocalStateFile::load_for_directory(project.directory())?;

    let mut done = Vec::new();
    let mut failed = Vec::new();
    let mut nothing_to_do = Vec::new();
    for status in result.statuses() {
        let requirement = &status.requirement;
        if !in_whitelist(requirement, whitelist) {
            continue;
        }

        let teardown = registry.provider(status.provider_kind).unprovide(
            requirement,
            result.environ(),
            &mut local_state,
            result.overrides(),
            Some(status),
        );
        tracing::debug!(
            "{}: {}",
            requirement.env_var,
            teardown.status().status_description()
        );
        match teardown {
            Teardown::Done(s) => done.push(s),
            Teardown::NothingToDo(s) => nothing_to_do.push(s),
            Teardown::Failed(s) => failed.push((requirement.env_var.as_str(), s)),
        }
    }

    // a filtered teardown of one requirement keeps that requirement's own message
    if whitelist.is_some() && done.is_empty() && failed.is_empty() && nothing_to_do.len() == 1 {
        return Ok(nothing_to_do.remove(0));
    }

    Ok(summarize(done, failed))
}

fn summarize(
    mut done: Vec<SimpleStatus>,
    mut failed: Vec<(&str, SimpleStatus)>,
) -> SimpleStatus {
    match failed.len() {
        0 => match done.len() {
            0 => SimpleStatus::success("Nothing to clean up."),
            1 => done.remove(0),
            _ => {
                for status in &done {
                    tracing::info!("{}", status.status_description());
                }
                SimpleStatus::success("Success.")
            }
        },
        1 => {
            let (_, status) = failed.remove(0);
            for error in status.errors() {
                tracing::error!("{}", error);
            }
            status
        }
        _ => {
            let errors: Vec<String> = failed
                .iter()
                .flat_map(|(_, status)| {
                    status
                        .errors()
                        .iter()
                        .cloned()
                        .chain(std::iter::once(status.status_description().to_string()))
                })
                .collect();
            for error in &errors {
                tracing::error!("{}", error);
            }
            let mut names: Vec<&str> = failed.iter().map(|(name, _)| *name).collect();
            names.sort_unstable();
            SimpleStatus::failure(format!("Failed to clean up {}.", names.join(", ")), errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_done_is_nothing_to_clean_up() {
        let status = summarize(vec![], vec![]);
        assert!(status.is_success());
        assert_eq!(status.status_description(), "Nothing to clean up.");
    }

    #[test]
    fn single_teardown_is_returned_as_is() {
        let status = summarize(vec![SimpleStatus::success("Removed downloaded file data.csv.")], vec![]);
        assert_eq!(status.status_description(), "Removed downloaded file data.csv.");
    }

    #[test]
    fn several_teardowns_summarize_as_success() {
        let status = summarize(
            vec![SimpleStatus::success("a"), SimpleStatus::success("b")],
            vec![],
        );
        assert!(status.is_success());
        assert_eq!(status.status_description(), "Success.");
    }

    #[test]
    fn single_failure_wins_over_successes() {
        let status = summarize(
            vec![SimpleStatus::success("a")],
            vec![("REDIS_URL", SimpleStatus::failure("Shutdown failed.", vec!["boom".into()]))],
        );
        assert!(!status.is_success());
        assert_eq!(status.status_description(), "Shutdown failed.");
        assert_eq!(status.errors(), ["boom"]);
    }

    #[test]
    fn several_failures_name_sorted_variables() {
        let status = summarize(
            vec![],
            vec![
                ("ZED", SimpleStatus::failure("Zed failed.", vec!["z1".into()])),
                ("ALPHA", SimpleStatus::failure("Alpha failed.", vec![])),
            ],
        );
        assert!(!status.is_success());
        assert_eq!(status.status_description(), "Failed to clean up ALPHA, ZED.");
        assert_eq!(status.errors(), ["z1", "Zed failed.", "Alpha failed."]);
    }
}
