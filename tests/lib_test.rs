//! Library integration tests.

use stagehand::StagehandError;

#[test]
fn error_types_are_public() {
    let err = StagehandError::UnknownCommand {
        name: "serve".into(),
        filename: "stagehand.yml".into(),
        found: "default".into(),
    };
    assert!(err.to_string().contains("serve"));
}

#[test]
fn result_type_alias_is_public() {
    fn test_fn() -> stagehand::Result<()> {
        Ok(())
    }
    assert!(test_fn().is_ok());
}

#[test]
fn cli_types_are_public() {
    use stagehand::cli::{Cli, Commands};
    use stagehand::requirements::ProvideMode;
    use clap::Parser;

    let cli = Cli::parse_from(["stagehand", "prepare", "--mode", "production"]);
    if let Some(Commands::Prepare(args)) = cli.command {
        assert_eq!(args.mode, ProvideMode::Production);
    } else {
        panic!("Expected Prepare command");
    }
}

#[test]
fn simple_status_is_public() {
    use stagehand::status::{SimpleStatus, Status};

    let status = SimpleStatus::failure("Failed.", vec!["boom".into()]);
    assert!(!status.is_success());
    assert_eq!(status.errors(), ["boom"]);
}
