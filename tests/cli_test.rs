//! Integration tests for the command-line interface.
// The cargo_bin function is marked deprecated in favor of cargo_bin! macro,
// but both work correctly. Suppressing until assert_cmd stabilizes the new API.
#![allow(deprecated)]

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn setup_project(config: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("stagehand.yml"), config).unwrap();
    temp
}

fn stagehand() -> Command {
    let mut cmd = Command::new(cargo_bin("stagehand"));
    cmd.env_remove("CONDA_PREFIX")
        .env_remove("CONDA_DEFAULT_ENV")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn cli_shows_help() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = stagehand();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("downloads and services"))
        .stdout(predicate::str::contains("unprepare"));
    Ok(())
}

#[test]
fn cli_shows_version() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = stagehand();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn cli_status_reports_missing_environment() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project("name: demo\n");
    let mut cmd = stagehand();
    cmd.arg("-d").arg(temp.path()).arg("status");
    cmd.assert()
        .code(1)
        .stdout(predicate::str::contains("demo (default)"))
        .stderr(predicate::str::contains("stagehand prepare"));
    assert!(!temp.path().join("envs").exists());
    Ok(())
}

#[test]
fn cli_status_lists_project_problems() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project("variables:\n  CONDA_ENV_PATH: x\n");
    let mut cmd = stagehand();
    cmd.arg("-d").arg(temp.path()).arg("status");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Unable to load the project."));
    Ok(())
}

#[test]
fn cli_unprepare_with_nothing_prepared() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let mut cmd = stagehand();
    cmd.current_dir(temp.path());
    cmd.arg("unprepare");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Nothing to clean up."));
    Ok(())
}

#[test]
fn cli_unprepare_removes_project_environment() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project("");
    fs::create_dir_all(temp.path().join("envs/default/conda-meta"))?;
    let mut cmd = stagehand();
    cmd.arg("-d").arg(temp.path()).arg("unprepare");
    cmd.assert().success();
    assert!(!temp.path().join("envs/default").exists());
    Ok(())
}

#[test]
fn cli_remove_packages_unknown_env_spec_fails() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project("");
    let mut cmd = stagehand();
    cmd.arg("-d").arg(temp.path());
    cmd.args(["remove-packages", "--env-spec", "nope", "numpy"]);
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Environment name 'nope'"));
    Ok(())
}

#[test]
fn cli_missing_directory_fails() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let mut cmd = stagehand();
    cmd.arg("-d").arg(temp.path().join("missing")).arg("status");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
    Ok(())
}

#[test]
fn cli_completions_generate_script() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = stagehand();
    cmd.args(["completions", "bash"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("stagehand"));
    Ok(())
}

#[test]
fn cli_debug_flag_accepted() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let mut cmd = stagehand();
    cmd.current_dir(temp.path());
    cmd.args(["--debug", "unprepare"]);
    cmd.assert().success();
    Ok(())
}

#[test]
fn cli_invalid_command_fails() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = stagehand();
    cmd.arg("invalid-command");
    cmd.assert().failure().code(2);
    Ok(())
}
