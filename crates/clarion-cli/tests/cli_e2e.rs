//! End-to-end tests of the `clarion` binary with a scripted provider.

#![cfg_attr(
    test,
    allow(
        clippy::tests_outside_test_module,
        clippy::missing_panics_doc,
        clippy::unwrap_used,
        clippy::indexing_slicing,
        reason = "Test file allows"
    )
)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const MANIFEST: &str = r#"
name = "travel"

[[tools]]
name = "book_flight"
description = "Book a flight between two airports"

[[tools.arguments]]
name = "travel_from"
domain = { kind = "finite", values = ["SFO", "LAX", "JFK", "ORD", "SEA", "BOS", "DEN", "ATL", "MIA", "DFW"], importance = 0.8 }

[[tools.arguments]]
name = "travel_to"
domain = { kind = "finite", values = ["SFO", "LAX", "JFK", "ORD", "SEA", "BOS", "DEN", "ATL", "MIA", "DFW"], importance = 0.8 }
"#;

const CLARIFYING_CONFIG: &str = r#"
[llm]
provider = "mock"

[llm.mock_responses]
"TASK: reason" = [
    '{"reasoning": "need a destination", "tool_calls": [{"tool_name": "book_flight", "arguments": {"travel_from": "SFO", "travel_to": "<UNK>"}}]}',
    '{"reasoning": "book it", "tool_calls": [{"tool_name": "book_flight", "arguments": {"travel_from": "SFO", "travel_to": "<UNK>"}}]}',
    '{"reasoning": "done", "tool_calls": [{"tool_name": "provide_final_answer", "arguments": {"answer": "Booked SFO to LAX"}}]}',
]
"TASK: generate_questions" = [
    '{"questions": [{"question": "Where would you like to fly to?", "target_args": [["book_flight", "travel_to"]]}]}',
]
"TASK: interpret_answer" = [
    '{"updated_tool_calls": [{"tool_name": "book_flight", "arguments": {"travel_to": "LAX"}}]}',
]
"#;

const ANSWERING_CONFIG: &str = r#"
[llm]
provider = "mock"

[llm.mock_responses]
"TASK: reason" = [
    '{"reasoning": "greet", "tool_calls": [{"tool_name": "provide_final_answer", "arguments": {"answer": "Hi there"}}]}',
]
"#;

const LOOPING_CONFIG: &str = r#"
[llm]
provider = "mock"

[llm.mock_responses]
"TASK: reason" = [
    '{"reasoning": "again", "tool_calls": [{"tool_name": "book_flight", "arguments": {"travel_from": "SFO", "travel_to": "JFK"}}]}',
]
"#;

/// Writes the manifest and config into `dir`, returning their paths.
fn setup(dir: &TempDir, config: &str) -> (PathBuf, PathBuf) {
    let manifest = dir.path().join("travel.toml");
    let config_path = dir.path().join("config.toml");
    fs::write(&manifest, MANIFEST).unwrap();
    fs::write(&config_path, config).unwrap();
    (config_path, manifest)
}

fn clarion(config: &Path, manifest: &Path) -> Command {
    let mut cmd = Command::cargo_bin("clarion").unwrap();
    cmd.env_remove("RUST_LOG")
        .arg("--config")
        .arg(config)
        .arg("--manifest")
        .arg(manifest)
        .arg("--log-stderr");
    cmd
}

#[test]
fn test_single_request_with_clarification() {
    let dir = TempDir::new().unwrap();
    let (config, manifest) = setup(&dir, CLARIFYING_CONFIG);
    let transcript = dir.path().join("transcript.json");

    clarion(&config, &manifest)
        .arg("--request")
        .arg("Book me a flight from San Francisco")
        .arg("--transcript")
        .arg(&transcript)
        .write_stdin("Los Angeles\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Where would you like to fly to?"))
        .stdout(predicate::str::contains("Booked SFO to LAX"));

    let written: Value = serde_json::from_str(&fs::read_to_string(&transcript).unwrap()).unwrap();
    assert_eq!(written["tree"].as_array().unwrap().len(), 1);
    assert_eq!(written["tree"][0]["turns"].as_array().unwrap().len(), 2);
    assert_eq!(
        written["legacy"]["selected_questions"].as_array().unwrap().len(),
        1
    );
    assert_eq!(written["legacy"]["executed_calls"][0]["tool_name"], "book_flight");
    assert_eq!(written["audit"].as_array().unwrap().len(), 1);
    assert_eq!(written["audit"][0]["selected"], true);
    assert_eq!(written["metrics"]["turn_count"], 2);
    assert_eq!(written["metrics"]["question_count"], 1);
}

#[test]
fn test_input_ending_during_question() {
    let dir = TempDir::new().unwrap();
    let (config, manifest) = setup(&dir, CLARIFYING_CONFIG);

    clarion(&config, &manifest)
        .arg("--request")
        .arg("Book me a flight")
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("Where would you like to fly to?"))
        .stdout(predicate::str::contains("Booked").not());
}

#[test]
fn test_interactive_loop_until_exit() {
    let dir = TempDir::new().unwrap();
    let (config, manifest) = setup(&dir, ANSWERING_CONFIG);

    clarion(&config, &manifest)
        .write_stdin("hello\n\nexit\nnever read\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Hi there").count(1));
}

#[test]
fn test_max_steps_flag() {
    let dir = TempDir::new().unwrap();
    let (config, manifest) = setup(&dir, LOOPING_CONFIG);

    clarion(&config, &manifest)
        .arg("--request")
        .arg("Book SFO to JFK")
        .arg("--max-steps")
        .arg("2")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Reached the step limit before a final answer.",
        ));
}

#[test]
fn test_missing_manifest_fails() {
    let dir = TempDir::new().unwrap();
    let (config, _) = setup(&dir, ANSWERING_CONFIG);

    clarion(&config, &dir.path().join("absent.toml"))
        .arg("--request")
        .arg("hello")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load manifest"));
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let (config, manifest) = setup(&dir, "[question]\ncertainty_threshold = 2.0\n");

    clarion(&config, &manifest)
        .arg("--request")
        .arg("hello")
        .assert()
        .failure()
        .stderr(predicate::str::contains("certainty_threshold"));
}

#[test]
fn test_context_must_be_object() {
    let dir = TempDir::new().unwrap();
    let (config, manifest) = setup(&dir, ANSWERING_CONFIG);
    let context = dir.path().join("context.json");
    fs::write(&context, "[1, 2, 3]").unwrap();

    clarion(&config, &manifest)
        .arg("--context")
        .arg(&context)
        .arg("--request")
        .arg("hello")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Context must be a JSON object"));
}

#[test]
fn test_logs_to_configured_file() {
    let dir = TempDir::new().unwrap();
    let log_file = dir.path().join("logs").join("clarion.log");
    let config_text = format!(
        "{ANSWERING_CONFIG}\n[logging]\nfilter = \"clarion=debug\"\nlog_file = {:?}\n",
        log_file.display().to_string()
    );
    let (config, manifest) = setup(&dir, &config_text);

    let mut cmd = Command::cargo_bin("clarion").unwrap();
    cmd.env_remove("RUST_LOG")
        .arg("--config")
        .arg(&config)
        .arg("--manifest")
        .arg(&manifest)
        .arg("--request")
        .arg("hello")
        .assert()
        .success();

    let logged = fs::read_to_string(&log_file).unwrap();
    assert!(logged.contains("Final answer"));
}
