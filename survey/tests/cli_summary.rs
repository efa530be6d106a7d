//! CLI tests for `survey init`, `survey summary`, `survey compile`, and
//! `survey street` setup failures.
//!
//! Spawns the survey binary against a temp config and data directory and
//! checks output and exit codes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use survey::core::types::{Likelihood, StreetTarget};
use survey::exit_codes;
use survey::io::config::{SurveyConfig, write_config};
use survey::io::result_store::ResultStore;
use survey::test_support::{elm_target, processed};

const UNSET_KEY_ENV: &str = "SURVEY_TEST_UNSET_MAPS_KEY";

fn write_test_config(root: &Path) -> PathBuf {
    let mut config = SurveyConfig {
        data_dir: root.join("data"),
        ..SurveyConfig::default()
    };
    config.google.api_key_env = UNSET_KEY_ENV.to_string();
    let path = root.join("survey.toml");
    write_config(&path, &config).expect("write config");
    path
}

fn survey(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_survey"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove(UNSET_KEY_ENV)
        .output()
        .expect("run survey")
}

const ELM: [&str; 4] = ["--street", "Elm St", "--suburb", "Springfield"];

#[test]
fn summary_prints_counts_as_json() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = write_test_config(temp.path());
    let store = ResultStore::new(temp.path().join("data"));
    for (address, likelihood) in [
        ("1 Elm St, Springfield", Likelihood::High),
        ("2 Elm St, Springfield", Likelihood::High),
        ("3 Elm St, Springfield", Likelihood::Unknown),
    ] {
        store
            .append(&elm_target(), processed(address, likelihood))
            .expect("seed");
    }

    let mut args = vec!["summary"];
    args.extend(ELM);
    args.push("--json");
    let output = survey(&config, &args);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let counts: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("summary json");
    assert_eq!(counts["high"], 2);
    assert_eq!(counts["unknown"], 1);
    assert_eq!(counts["low"], 0);
}

#[test]
fn summary_of_unsurveyed_street_is_empty() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = write_test_config(temp.path());

    let mut args = vec!["summary"];
    args.extend(ELM);
    let output = survey(&config, &args);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Elm St, Springfield"));
    assert!(stdout.contains("total:   0"));
}

#[test]
fn corrupt_store_exits_with_store_corrupt_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = write_test_config(temp.path());
    let paths = ResultStore::new(temp.path().join("data")).paths(&elm_target());
    fs::create_dir_all(&paths.dir).expect("street dir");
    fs::write(&paths.results_path, "{ not json").expect("write corrupt store");

    let mut args = vec!["summary"];
    args.extend(ELM);
    let output = survey(&config, &args);

    assert_eq!(output.status.code(), Some(exit_codes::STORE_CORRUPT));
    assert!(String::from_utf8_lossy(&output.stderr).contains("corrupt"));
}

#[test]
fn compile_totals_every_street_as_json() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = write_test_config(temp.path());
    let store = ResultStore::new(temp.path().join("data"));
    let oak = StreetTarget::new("Oak Rd", "Springfield");
    for (target, address, likelihood) in [
        (elm_target(), "1 Elm St, Springfield", Likelihood::High),
        (elm_target(), "2 Elm St, Springfield", Likelihood::Medium),
        (oak.clone(), "5 Oak Rd, Springfield", Likelihood::High),
        (oak, "7 Oak Rd, Springfield", Likelihood::Unknown),
    ] {
        store
            .append(&target, processed(address, likelihood))
            .expect("seed");
    }

    let output = survey(&config, &["compile", "--json"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let compiled: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("compile json");
    assert_eq!(compiled["streets"][0]["label"], "Elm St, Springfield");
    assert_eq!(compiled["streets"][1]["label"], "Oak Rd, Springfield");
    assert_eq!(compiled["streets"][1]["counts"]["unknown"], 1);
    assert_eq!(compiled["overall"]["high"], 2);
    assert_eq!(compiled["overall"]["medium"], 1);
    assert_eq!(compiled["overall"]["unknown"], 1);

    let output = survey(&config, &["compile"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("All streets (2)"));
    assert!(stdout.contains("medium or high: 3 (100.0% of classified)"));
}

#[test]
fn compile_fails_on_a_corrupt_street() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = write_test_config(temp.path());
    let store = ResultStore::new(temp.path().join("data"));
    store
        .append(&elm_target(), processed("1 Elm St, Springfield", Likelihood::Low))
        .expect("seed");
    let oak = store.paths(&StreetTarget::new("Oak Rd", "Springfield"));
    fs::create_dir_all(&oak.dir).expect("street dir");
    fs::write(&oak.results_path, "{ not json").expect("write corrupt store");

    let output = survey(&config, &["compile"]);

    assert_eq!(output.status.code(), Some(exit_codes::STORE_CORRUPT));
    assert!(String::from_utf8_lossy(&output.stderr).contains("corrupt"));
}

#[test]
fn street_without_api_key_fails_before_touching_the_store() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = write_test_config(temp.path());

    let mut args = vec!["street"];
    args.extend(ELM);
    let output = survey(&config, &args);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains(UNSET_KEY_ENV));
    assert!(!temp.path().join("data").exists());
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = temp.path().join("survey.toml");

    let output = survey(&config, &["init"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let written = fs::read_to_string(&config).expect("config written");
    let parsed: SurveyConfig = toml::from_str(&written).expect("parse config");
    assert_eq!(parsed, SurveyConfig::default());

    let output = survey(&config, &["init"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));

    let output = survey(&config, &["init", "--force"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
}
