//! Configuration layering: file, environment, command line
use clap::Parser;
use mockall::predicate::eq;

use xvalid::cli::{Cli, OutputFormat, VerbosityLevel};
use xvalid::config::{Config, ConfigManager};

use crate::common::mocks::MockEnv;
use crate::common::test_helpers::TestFiles;

fn quiet_env() -> MockEnv {
    let mut env = MockEnv::new();
    env.expect_get().returning(|_| None);
    env
}

#[tokio::test]
async fn test_cli_flags_override_config_file() {
    let files = TestFiles::new();
    let config_path = files.write(
        "xvalid.toml",
        r#"
[validation]
max_depth = 100
fail_fast = true

[output]
format = "summary"
"#,
    );

    let cli = Cli::try_parse_from([
        "xvalid",
        "--config",
        config_path.to_str().unwrap(),
        "--format",
        "json",
        "doc.xml",
    ])
    .unwrap();

    let config = ConfigManager::load_config_with(&cli, &quiet_env())
        .await
        .unwrap();

    assert_eq!(config.output.format, OutputFormat::Json);
    assert_eq!(config.validation.max_depth, 100);
    assert!(config.validation.fail_fast);
}

#[test]
fn test_environment_is_consulted_by_name() {
    let mut env = MockEnv::new();
    env.expect_get()
        .with(eq("XVALID_TRACE"))
        .returning(|_| Some("true".to_string()));
    env.expect_get().returning(|_| None);

    let config = ConfigManager::apply_environment_overrides_with(&env, Config::default()).unwrap();

    assert!(config.validation.trace);
    assert_eq!(config.verbosity(), VerbosityLevel::Debug);
}

#[test]
fn test_quiet_flag_wins_over_configured_verbose() {
    let mut config = Config::default();
    config.output.verbose = true;

    let cli = Cli::try_parse_from(["xvalid", "-q", "doc.xml"]).unwrap();
    let merged = ConfigManager::merge_with_cli(config, &cli);

    assert!(merged.output.quiet);
    assert!(!merged.output.verbose);
    assert!(ConfigManager::validate_config(&merged).is_ok());
}

#[test]
fn test_config_round_trips_through_toml() {
    let mut config = Config::default();
    config.files.include_patterns = vec!["**/*.cmdi".to_string()];
    config.output.timestamps = true;

    let text = toml::to_string(&config).unwrap();
    let parsed: Config = toml::from_str(&text).unwrap();
    assert_eq!(parsed, config);
}
