//! End-to-end tests for the `midimap` binary.
//!
//! Every test gets its own profile document and config directory, so the
//! user's real settings are never read.

#[path = "common/mod.rs"]
mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

use common::fixtures::Workspace;
use common::init_test_logging;

fn midimap(ws: &Workspace) -> Command {
    let mut cmd = Command::cargo_bin("midimap").expect("binary built");
    cmd.env("MIDIMAP_PROFILES", ws.profiles_path())
        .env("XDG_CONFIG_HOME", ws.path())
        .env("NO_COLOR", "1")
        .env("RUST_LOG", "off")
        .env_remove("MIDIMAP_CONFIG")
        .env_remove("MIDIMAP_FORMAT");
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("run midimap");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let text = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(text.trim()).unwrap_or_else(|_| panic!("Failed to parse JSON:\n{text}"))
}

// ===== Discovery =====

#[test]
fn test_quick_start_text() {
    init_test_logging();
    let ws = Workspace::empty();
    midimap(&ws)
        .assert()
        .success()
        .stdout(predicate::str::contains("QUICK START"))
        .stdout(predicate::str::contains("midimap listen"));
}

#[test]
fn test_quick_start_json() {
    init_test_logging();
    let ws = Workspace::empty();
    let json = stdout_json(midimap(&ws).arg("--json"));
    assert_eq!(json["tool"], "midimap");
    assert_eq!(json["actions"].as_array().map(Vec::len), Some(5));
}

#[test]
fn test_version() {
    init_test_logging();
    let ws = Workspace::empty();
    let output = midimap(&ws).arg("version").output().unwrap();
    assert!(output.status.success());
    let version = regex::Regex::new(r"^midimap \d+\.\d+\.\d+").unwrap();
    assert!(version.is_match(&String::from_utf8_lossy(&output.stdout)));

    let json = stdout_json(midimap(&ws).args(["version", "--format", "json-compact"]));
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["features"].is_array());
}

#[test]
fn test_completions() {
    init_test_logging();
    let ws = Workspace::empty();
    midimap(&ws)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("midimap"));
}

#[test]
fn test_devices_json_is_array() {
    init_test_logging();
    let ws = Workspace::empty();
    let output = midimap(&ws).args(["devices", "--json"]).output().unwrap();
    // Hosts without a MIDI stack may fail to enumerate; both shapes are JSON.
    let text = if output.status.success() {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        String::from_utf8_lossy(&output.stderr).into_owned()
    };
    let json: Value = serde_json::from_str(text.trim()).unwrap();
    assert!(json.is_array() || json["error"] == true);
}

// ===== Profiles =====

#[test]
fn test_profiles_creates_document() {
    init_test_logging();
    let ws = Workspace::empty();
    midimap(&ws)
        .arg("profiles")
        .assert()
        .success()
        .stdout(predicate::str::contains("default"))
        .stderr(predicate::str::contains("created"));
    assert!(ws.profiles_path().exists());
}

#[test]
fn test_profiles_json_in_order() {
    init_test_logging();
    let ws = Workspace::sample();
    let json = stdout_json(midimap(&ws).args(["profiles", "--json"]));
    let names: Vec<_> = json["profiles"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["default", "chrome", "code"]);
    assert_eq!(json["profiles"][1]["bindings"], 2);
}

#[test]
fn test_profile_add_show_remove() {
    init_test_logging();
    let ws = Workspace::empty();
    midimap(&ws)
        .args(["profile", "add", "gimp", "--window-match", "GNU Image"])
        .assert()
        .success();
    midimap(&ws)
        .args(["profile", "add", "gimp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    let json = stdout_json(midimap(&ws).args(["profile", "show", "gimp", "--json"]));
    assert_eq!(json["window_match"], "GNU Image");

    midimap(&ws)
        .args(["profile", "match", "gimp", "gimp"])
        .assert()
        .success();
    assert_eq!(ws.document_json()["gimp"]["window_match"], "gimp");

    midimap(&ws)
        .args(["profile", "remove", "gimp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));
    midimap(&ws)
        .args(["profile", "remove", "gimp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not present"));
    midimap(&ws)
        .args(["profile", "remove", "default"])
        .assert()
        .failure();
}

#[test]
fn test_profile_from_executable() {
    init_test_logging();
    let ws = Workspace::empty();
    midimap(&ws)
        .args([
            "profile",
            "add",
            "--from-exe",
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        ])
        .assert()
        .success();

    let doc = ws.document_json();
    assert_eq!(doc["chrome"]["window_match"], "chrome");
    assert!(doc["chrome"]["file_path"].as_str().unwrap().ends_with("chrome.exe"));
}

#[test]
fn test_show_missing_profile_suggests_listing() {
    init_test_logging();
    let ws = Workspace::empty();
    midimap(&ws)
        .args(["profile", "show", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Profile not found: nope"))
        .stderr(predicate::str::contains("midimap profiles"));
}

// ===== Bindings =====

#[test]
fn test_bind_and_unbind() {
    init_test_logging();
    let ws = Workspace::empty();
    midimap(&ws)
        .args(["bind", "default", "key", "36", "run-command", "echo hi"])
        .assert()
        .success();
    let doc = ws.document_json();
    assert_eq!(doc["default"]["KEY"]["36"]["action"], "1");
    assert_eq!(doc["default"]["KEY"]["36"]["params"]["command"], "echo hi");

    midimap(&ws)
        .args(["unbind", "default", "key", "36"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));
    assert!(ws.document_json()["default"]["KEY"].get("36").is_none());
}

#[test]
fn test_bind_cc_with_wire_number() {
    init_test_logging();
    let ws = Workspace::empty();
    midimap(&ws)
        .args(["bind", "mixer", "cc", "2", "keyboard-shortcut", "ctrl+up", "--cc", "7"])
        .assert()
        .success();
    assert_eq!(
        ws.document_json()["mixer"]["CONTROL_CHANGE"]["2"]["params"]["cc_control_id"],
        "7"
    );

    midimap(&ws)
        .args(["bind", "mixer", "key", "2", "none", "--cc", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--cc"));
}

#[test]
fn test_bind_cc_reports_moved_wire_number() {
    init_test_logging();
    let ws = Workspace::sample();
    midimap(&ws)
        .args(["bind", "chrome", "cc", "4", "run-command", "volume down", "--cc", "74"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cc 74 moved from slot 1"));

    let doc = ws.document_json();
    assert!(doc["chrome"]["CONTROL_CHANGE"]["1"]["params"].get("cc_control_id").is_none());
    assert_eq!(doc["chrome"]["CONTROL_CHANGE"]["4"]["params"]["cc_control_id"], "74");
}

#[test]
fn test_bind_without_value_warns() {
    init_test_logging();
    let ws = Workspace::empty();
    midimap(&ws)
        .args(["bind", "default", "key", "50", "run-script"])
        .assert()
        .success()
        .stderr(predicate::str::contains("no value"));
}

#[test]
fn test_bind_rejects_bad_input() {
    init_test_logging();
    let ws = Workspace::empty();
    midimap(&ws)
        .args(["bind", "default", "key", "200", "none"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid control id"));
    midimap(&ws)
        .args(["bind", "default", "pitchwheel", "2", "none"])
        .assert()
        .failure();
    midimap(&ws)
        .args(["bind", "default", "key", "20", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown action"));
}

// ===== Resolution =====

#[test]
fn test_resolve_window() {
    init_test_logging();
    let ws = Workspace::sample();
    midimap(&ws)
        .args(["resolve", "New Tab - Google Chrome"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("chrome"));
    midimap(&ws)
        .arg("resolve")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("default"));
}

#[test]
fn test_resolve_with_lookup_json() {
    init_test_logging();
    let ws = Workspace::sample();
    let json = stdout_json(midimap(&ws).args([
        "resolve", "chrome", "--control", "cc", "--id", "74", "--json",
    ]));
    assert_eq!(json["profile"], "chrome");
    assert_eq!(json["binding"]["params"]["command"], "volume up");

    let json = stdout_json(midimap(&ws).args([
        "resolve", "chrome", "--control", "key", "--id", "1", "--json",
    ]));
    assert!(json["binding"].is_null());
}

// ===== Settings and errors =====

#[test]
fn test_explicit_settings_file() {
    init_test_logging();
    let ws = Workspace::empty();
    let settings = ws.write("conf/settings.yaml", "profiles_path: maps/profiles.json\n");

    let mut cmd = midimap(&ws);
    cmd.env_remove("MIDIMAP_PROFILES")
        .args(["--config"])
        .arg(&settings)
        .args(["bind", "default", "key", "1", "print-message", "hi"]);
    cmd.assert().success();
    assert!(ws.path().join("conf/maps/profiles.json").exists());
}

#[test]
fn test_missing_settings_file_json_error() {
    init_test_logging();
    let ws = Workspace::empty();
    let output = midimap(&ws)
        .args(["--json", "--config", "/nonexistent/settings.toml", "profiles"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let json: Value = serde_json::from_str(String::from_utf8_lossy(&output.stderr).trim()).unwrap();
    assert_eq!(json["error"], true);
    assert_eq!(json["recoverable"], true);
}

#[test]
fn test_listen_unknown_device_fails() {
    init_test_logging();
    let ws = Workspace::sample();
    midimap(&ws)
        .args(["listen", "Definitely Not A Device", "--once-for", "1"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}
