use std::error::Error;
use std::path::PathBuf;

use clap::Parser;

use dacapo::cli::{CliArgs, LogLevel};
use dacapo::config::default_config_path;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn config_defaults_to_the_working_directory_file() -> TestResult {
    let args = CliArgs::try_parse_from(["dacapo"])?;

    assert_eq!(args.config, default_config_path());
    assert!(!args.once);
    assert!(args.log_level.is_none());
    Ok(())
}

#[test]
fn explicit_flags_are_parsed() -> TestResult {
    let args = CliArgs::try_parse_from([
        "dacapo",
        "--config",
        "demos/Dacapo.toml",
        "--once",
        "--instance",
        "alpha",
        "--log-level",
        "debug",
    ])?;

    assert_eq!(args.config, PathBuf::from("demos/Dacapo.toml"));
    assert!(args.once);
    assert_eq!(args.instance.as_deref(), Some("alpha"));
    assert_eq!(args.log_level, Some(LogLevel::Debug));
    Ok(())
}

#[test]
fn instance_requires_once() {
    assert!(CliArgs::try_parse_from(["dacapo", "--instance", "alpha"]).is_err());
}
