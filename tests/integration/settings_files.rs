//! Integration tests for settings discovery and parsing.
//!
//! Tests that touch the environment hold an env lock for their duration.

use std::path::PathBuf;

use midimap::config::{load_settings, Settings};
use midimap::error::MapError;

use crate::common::env::EnvGuard;
use crate::common::fixtures::Workspace;
use crate::common::init_test_logging;

#[cfg(target_os = "linux")]
#[test]
fn test_default_location_is_optional() {
    init_test_logging();
    let ws = Workspace::empty();
    let config_home = ws.path().to_string_lossy().into_owned();
    let _env = EnvGuard::set("XDG_CONFIG_HOME", &config_home);

    assert_eq!(Settings::load(None).unwrap(), Settings::default());
}

#[cfg(target_os = "linux")]
#[test]
fn test_default_location_is_read() {
    init_test_logging();
    let ws = Workspace::empty();
    ws.write("midimap/settings.toml", "script_interpreter = \"pypy\"\n");
    let config_home = ws.path().to_string_lossy().into_owned();
    let _env = EnvGuard::set("XDG_CONFIG_HOME", &config_home);

    let settings = Settings::load(None).unwrap();
    assert_eq!(settings.script_interpreter, "pypy");
}

#[cfg(unix)]
#[test]
fn test_home_relative_profiles_path() {
    init_test_logging();
    let ws = Workspace::empty();
    let path = ws.write("settings.yaml", "profiles_path: ~/maps/profiles.json\n");
    let home = ws.path().join("home");
    let home_str = home.to_string_lossy().into_owned();
    let _env = EnvGuard::set("HOME", &home_str);

    let settings = load_settings(&path).unwrap();
    assert_eq!(settings.profiles_path, home.join("maps/profiles.json"));
}

#[test]
fn test_absolute_profiles_path_is_kept() {
    init_test_logging();
    let ws = Workspace::empty();
    let target = ws.path().join("elsewhere").join("p.json");
    let path = ws.write(
        "settings.toml",
        &format!("profiles_path = {:?}\n", target.to_string_lossy()),
    );

    let settings = load_settings(&path).unwrap();
    assert_eq!(settings.profiles_path, target);
}

#[test]
fn test_unknown_extension() {
    init_test_logging();
    let ws = Workspace::empty();
    let path = ws.write("settings.ini", "shell = sh\n");
    assert!(matches!(load_settings(&path), Err(MapError::ConfigParse(_))));
}

#[test]
fn test_invalid_settings_are_rejected() {
    init_test_logging();
    let ws = Workspace::empty();
    let path = ws.write("settings.yaml", "script_interpreter: \"  \"\n");
    let err = load_settings(&path).unwrap_err();
    assert!(matches!(err, MapError::ConfigInvalid(_)));
}

#[test]
fn test_full_settings_file() {
    init_test_logging();
    let ws = Workspace::empty();
    let path = ws.write(
        "settings.toml",
        r#"
profiles_path = "profiles.json"
shell = ["bash", "-lc"]
script_interpreter = "python3"
stop_timeout_ms = 500
poll_interval_ms = 20
max_in_flight = 16
"#,
    );

    let settings = load_settings(&path).unwrap();
    assert_eq!(settings.shell, vec!["bash", "-lc"]);
    assert_eq!(settings.stop_timeout().as_millis(), 500);
    assert_eq!(settings.max_in_flight, Some(16));
    assert_eq!(
        settings.profiles_path.file_name().map(PathBuf::from),
        Some(PathBuf::from("profiles.json"))
    );
    assert!(settings.profiles_path.is_absolute());
}
