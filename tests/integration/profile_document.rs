//! Integration tests for the profile document.
//!
//! Tests verify loading, repair, durable edits and window resolution
//! against real files in a temporary directory.

use midimap::action::{ActionKind, Binding};
use midimap::error::MapError;
use midimap::midi::ControlType;
use midimap::profile::{resolve, LoadStatus, ProfileDocument};

use crate::common::fixtures::Workspace;
use crate::common::init_test_logging;

fn document(ws: &Workspace) -> ProfileDocument {
    ProfileDocument::new(ws.profiles_path())
}

// ===== Loading =====

#[test]
fn test_missing_document_is_created_with_defaults() {
    init_test_logging();
    let ws = Workspace::empty();
    let doc = document(&ws);

    let (store, status) = doc.load_with_status().unwrap();
    assert_eq!(status, LoadStatus::Created);
    assert!(ws.profiles_path().exists());

    let names: Vec<_> = store.names().collect();
    assert_eq!(names, vec!["default"]);
    let binding = store
        .get_binding("default", ControlType::Key, "69")
        .unwrap();
    assert_eq!(binding.action, ActionKind::RunCommand);
    assert_eq!(binding.value(), Some("start notepad"));
}

#[test]
fn test_sample_document_keeps_order() {
    init_test_logging();
    let ws = Workspace::sample();
    let (store, status) = document(&ws).load_with_status().unwrap();

    assert_eq!(status, LoadStatus::Loaded);
    let names: Vec<_> = store.names().collect();
    assert_eq!(names, vec!["default", "chrome", "code"]);
}

#[test]
fn test_corrupt_document_is_replaced() {
    init_test_logging();
    let ws = Workspace::with_document("{ this is not json");
    let (store, status) = document(&ws).load_with_status().unwrap();

    assert!(matches!(status, LoadStatus::Repaired { .. }));
    assert_eq!(store.len(), 1);
    // The replacement is valid on the next read
    let json = ws.document_json();
    assert!(json.get("default").is_some());
}

#[test]
fn test_document_without_default_gains_one() {
    init_test_logging();
    let ws = Workspace::with_document(r#"{"gimp": {"window_match": "gimp"}}"#);
    let (store, status) = document(&ws).load_with_status().unwrap();

    assert_eq!(status, LoadStatus::DefaultAdded);
    assert!(store.contains("default"));
    assert!(store.contains("gimp"));
    assert!(ws.document_json().get("default").is_some());
}

#[test]
fn test_unknown_action_code_drops_only_that_binding() {
    init_test_logging();
    let ws = Workspace::with_document(
        r#"{
          "default": {
            "window_match": "",
            "KEY": {
              "10": { "action": "9", "params": {} },
              "11": { "action": 4, "params": { "message": "still here" } }
            }
          }
        }"#,
    );
    let store = document(&ws).load().unwrap();

    assert!(store.get_binding("default", ControlType::Key, "10").is_none());
    let kept = store.get_binding("default", ControlType::Key, "11").unwrap();
    assert_eq!(kept.value(), Some("still here"));
}

#[test]
fn test_legacy_keys_table_is_read() {
    init_test_logging();
    let ws = Workspace::with_document(
        r#"{"default": {"KEYS": {"36": {"action": "1", "params": {"command": "ls"}}}}}"#,
    );
    let store = document(&ws).load().unwrap();
    assert_eq!(
        store
            .get_binding("default", ControlType::Key, "36")
            .and_then(Binding::value),
        Some("ls")
    );
}

// ===== Edits =====

#[test]
fn test_set_binding_is_durable() {
    init_test_logging();
    let ws = Workspace::empty();
    let doc = document(&ws);

    doc.set_binding(
        "default",
        ControlType::PitchWheel,
        "1",
        Binding::for_action(ActionKind::PrintMessage, "bend"),
    )
    .unwrap();

    // A second handle on the same file sees the edit
    let other = document(&ws);
    let binding = other
        .get_binding("default", ControlType::PitchWheel, "1")
        .unwrap()
        .unwrap();
    assert_eq!(binding.value(), Some("bend"));

    let json = ws.document_json();
    assert_eq!(json["default"]["PITCHWHEEL"]["1"]["action"], "4");
    assert_eq!(json["default"]["PITCHWHEEL"]["1"]["params"]["message"], "bend");
}

#[test]
fn test_set_binding_creates_profile() {
    init_test_logging();
    let ws = Workspace::empty();
    let doc = document(&ws);

    doc.set_binding("obs", ControlType::Key, "40", Binding::command("obs --startrecording"))
        .unwrap();

    let store = doc.load().unwrap();
    let obs = store.profile("obs").unwrap();
    assert_eq!(obs.binding_count(), 1);
    // Created on demand with an empty match: never selected by a window
    assert_eq!(resolve(&store, Some("obs")).name, "default");
}

#[test]
fn test_cc_wire_number_moves_to_newest_slot() {
    init_test_logging();
    let ws = Workspace::sample();
    let doc = document(&ws);

    let moved_from = doc
        .set_binding(
            "chrome",
            ControlType::ControlChange,
            "4",
            Binding::command("volume down").with_cc_wire_id(74),
        )
        .unwrap();
    assert_eq!(moved_from.as_deref(), Some("1"));

    let json = ws.document_json();
    assert!(json["chrome"]["CONTROL_CHANGE"]["1"]["params"].get("cc_control_id").is_none());
    assert_eq!(json["chrome"]["CONTROL_CHANGE"]["4"]["params"]["cc_control_id"], "74");

    let store = doc.load().unwrap();
    let chrome = store.profile("chrome").unwrap();
    let bound = chrome.lookup(ControlType::ControlChange, "74").unwrap();
    assert_eq!(bound.value(), Some("volume down"));
    assert_eq!(chrome.cc_slot_for_wire(74), Some("4"));

    // Binding the same slot again reports no move.
    let again = doc
        .set_binding(
            "chrome",
            ControlType::ControlChange,
            "4",
            Binding::command("volume down").with_cc_wire_id(74),
        )
        .unwrap();
    assert_eq!(again, None);
}

#[test]
fn test_set_binding_rejects_bad_ids() {
    init_test_logging();
    let ws = Workspace::empty();
    let doc = document(&ws);

    for (control, id) in [
        (ControlType::Key, "128"),
        (ControlType::Key, "abc"),
        (ControlType::ControlChange, "-1"),
        (ControlType::PitchWheel, "2"),
    ] {
        let err = doc
            .set_binding("default", control, id, Binding::command("x"))
            .unwrap_err();
        assert!(
            matches!(err, MapError::InvalidControlId { .. }),
            "{control} {id} gave {err:?}"
        );
    }
}

#[test]
fn test_clear_binding() {
    init_test_logging();
    let ws = Workspace::sample();
    let doc = document(&ws);

    let removed = doc.clear_binding("chrome", ControlType::Key, "69").unwrap();
    assert_eq!(removed.map(|b| b.action), Some(ActionKind::KeyboardShortcut));
    assert!(doc.clear_binding("chrome", ControlType::Key, "69").unwrap().is_none());
    assert!(matches!(
        doc.clear_binding("nope", ControlType::Key, "1"),
        Err(MapError::ProfileNotFound { .. })
    ));
}

#[test]
fn test_profile_lifecycle() {
    init_test_logging();
    let ws = Workspace::sample();
    let doc = document(&ws);

    doc.add_profile("gimp", "GNU Image").unwrap();
    assert!(matches!(
        doc.add_profile("gimp", "gimp"),
        Err(MapError::DuplicateProfile { .. })
    ));

    doc.set_window_match("gimp", "gimp").unwrap();
    let store = doc.load().unwrap();
    assert_eq!(store.profile("gimp").unwrap().window_match, "gimp");
    assert_eq!(store.names().last(), Some("gimp"));

    assert!(doc.remove_profile("gimp").unwrap());
    assert!(!doc.remove_profile("gimp").unwrap());
    assert!(matches!(
        doc.remove_profile("default"),
        Err(MapError::ConfigInvalid(_))
    ));
    assert!(matches!(
        doc.set_window_match("gimp", "x"),
        Err(MapError::ProfileNotFound { .. })
    ));
}

// ===== Resolution =====

#[test]
fn test_resolve_by_window() {
    init_test_logging();
    let ws = Workspace::sample();
    let store = document(&ws).load().unwrap();

    assert_eq!(resolve(&store, Some("New Tab - Google Chrome")).name, "chrome");
    assert_eq!(resolve(&store, Some("GOOGLE CHROME")).name, "chrome");
    assert_eq!(resolve(&store, Some("main.rs - visual studio code")).name, "code");
    assert_eq!(resolve(&store, Some("Terminal")).name, "default");
    assert_eq!(resolve(&store, None).name, "default");
}

#[test]
fn test_first_match_wins() {
    init_test_logging();
    let ws = Workspace::with_document(
        r#"{
          "default": {"window_match": ""},
          "browser": {"window_match": "o"},
          "chrome": {"window_match": "chrome"}
        }"#,
    );
    let store = document(&ws).load().unwrap();
    assert_eq!(resolve(&store, Some("chrome")).name, "browser");
}

#[test]
fn test_cc_lookup_uses_wire_number() {
    init_test_logging();
    let ws = Workspace::sample();
    let store = document(&ws).load().unwrap();
    let chrome = store.profile("chrome").unwrap();

    let bound = chrome.lookup(ControlType::ControlChange, "74").unwrap();
    assert_eq!(bound.value(), Some("volume up"));
    // The slot key no longer answers once a wire number is recorded
    assert!(chrome.lookup(ControlType::ControlChange, "1").is_none());
}
