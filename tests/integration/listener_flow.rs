//! Integration tests for the listener against the mock backend.
//!
//! Each test wires a real profile document, a settable window and the
//! recording fakes into an [`Engine`], then drives it with scripted input.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use midimap::action::{ActionKind, Binding};
use midimap::config::Settings;
use midimap::device::mock::MockBackend;
use midimap::device::ConnectionOptions;
use midimap::dispatch::recording::{RecordingKeyboard, RecordingSpawner};
use midimap::dispatch::{DispatchOutcome, Dispatcher};
use midimap::error::MapError;
use midimap::listener::{Engine, Handled, Listener, ListenerEvent, ListenerState};
use midimap::midi::ControlType;
use midimap::profile::{ProfileDocument, ProfileResolver};
use midimap::window::FixedWindow;

use crate::common::fixtures::Workspace;
use crate::common::init_test_logging;

const PORT: &str = "Launchkey Mini MIDI 1";

struct Rig {
    ws: Workspace,
    backend: Arc<MockBackend>,
    spawner: Arc<RecordingSpawner>,
    keyboard: Arc<RecordingKeyboard>,
    window: Arc<FixedWindow>,
    listener: Listener,
    events: Receiver<ListenerEvent>,
}

impl Rig {
    fn new(ws: Workspace) -> Self {
        Self::with_options(ws, ConnectionOptions::default())
    }

    fn with_options(ws: Workspace, options: ConnectionOptions) -> Self {
        init_test_logging();
        let settings = Settings {
            profiles_path: ws.profiles_path(),
            shell: vec!["sh".to_string(), "-c".to_string()],
            script_interpreter: "python3".to_string(),
            poll_interval_ms: 5,
            ..Settings::default()
        };
        let backend = Arc::new(MockBackend::with_ports(&[PORT]));
        let spawner = Arc::new(RecordingSpawner::new());
        let keyboard = Arc::new(RecordingKeyboard::new());
        let window = Arc::new(FixedWindow::new(Some("Terminal")));
        let engine = Arc::new(Engine::new(
            Arc::new(ProfileDocument::new(ws.profiles_path())),
            ProfileResolver::new(window.clone()),
            Dispatcher::new(&settings, spawner.clone(), keyboard.clone()),
        ));
        let (tx, events) = mpsc::channel();
        let listener = Listener::new(backend.clone(), engine, &settings)
            .with_events(tx)
            .with_connection_options(options);
        Self {
            ws,
            backend,
            spawner,
            keyboard,
            window,
            listener,
            events,
        }
    }

    /// Next `Dispatched` event, skipping the others.
    fn next_dispatch(&self) -> Handled {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(left) {
                Ok(ListenerEvent::Dispatched { handled, .. }) => return handled,
                Ok(_) => {}
                Err(e) => panic!("no dispatch event: {e}"),
            }
        }
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// ===== Dispatch =====

#[test]
fn test_focus_changes_select_profiles() {
    let mut rig = Rig::new(Workspace::sample());
    rig.listener.start(PORT).unwrap();

    rig.backend.send_note_on(69, 100);
    let handled = rig.next_dispatch();
    assert_eq!(handled.profile, "default");
    assert_eq!(handled.window.as_deref(), Some("Terminal"));

    rig.window.focus(Some("New Tab - Google Chrome"));
    rig.backend.send_note_on(69, 100);
    let handled = rig.next_dispatch();
    assert_eq!(handled.profile, "chrome");
    assert_eq!(
        handled.outcome,
        DispatchOutcome::Injected {
            shortcut: "ctrl+t".to_string()
        }
    );

    rig.window.focus(Some("lib.rs - Visual Studio Code"));
    rig.backend.send_pitch_wheel(0x2000);
    let handled = rig.next_dispatch();
    assert_eq!(handled.profile, "code");
    assert_eq!(handled.control_type, ControlType::PitchWheel);

    rig.listener.stop().unwrap();
    assert_eq!(rig.spawner.commands(), vec!["start notepad", "scripts/bend.py"]);
    assert_eq!(rig.spawner.requests()[1].program, "python3");
    assert_eq!(rig.keyboard.sent(), vec!["ctrl+t"]);
}

#[test]
fn test_control_change_by_wire_number() {
    let mut rig = Rig::new(Workspace::sample());
    rig.window.focus(Some("chrome"));
    rig.listener.start(PORT).unwrap();

    rig.backend.send_control_change(74, 12);
    assert!(matches!(
        rig.next_dispatch().outcome,
        DispatchOutcome::Spawned { kind: ActionKind::RunCommand, .. }
    ));

    rig.backend.send_control_change(1, 12);
    let handled = rig.next_dispatch();
    assert_eq!(handled.control_id, "1");
    assert_eq!(handled.outcome, DispatchOutcome::Unbound);

    rig.listener.stop().unwrap();
    assert_eq!(rig.spawner.commands(), vec!["volume up"]);
}

#[test]
fn test_failures_do_not_stop_the_run() {
    let mut rig = Rig::new(Workspace::sample());
    let doc = ProfileDocument::new(rig.ws.profiles_path());
    doc.set_binding(
        "default",
        ControlType::Key,
        "40",
        Binding::for_action(ActionKind::KeyboardShortcut, "hyper+q"),
    )
    .unwrap();
    doc.set_binding("default", ControlType::Key, "41", Binding::new(ActionKind::RunCommand))
        .unwrap();
    rig.listener.start(PORT).unwrap();

    rig.backend.send_note_on(40, 100);
    assert!(rig.next_dispatch().outcome.is_failure());
    rig.backend.send_note_on(41, 100);
    assert!(rig.next_dispatch().outcome.is_failure());

    rig.spawner.fail_with("sh: not found");
    rig.backend.send_note_on(69, 100);
    assert!(rig.next_dispatch().outcome.is_failure());

    assert_eq!(rig.listener.state(), ListenerState::Running);
    rig.backend.send_note_on(60, 100);
    assert_eq!(
        rig.next_dispatch().outcome,
        DispatchOutcome::Printed {
            message: "hello from default".to_string()
        }
    );
}

#[test]
fn test_edits_apply_to_the_next_message() {
    let mut rig = Rig::new(Workspace::sample());
    rig.listener.start(PORT).unwrap();

    rig.backend.send_note_on(50, 100);
    assert_eq!(rig.next_dispatch().outcome, DispatchOutcome::Unbound);

    ProfileDocument::new(rig.ws.profiles_path())
        .set_binding("default", ControlType::Key, "50", Binding::command("make"))
        .unwrap();
    rig.backend.send_note_on(50, 100);
    assert!(matches!(
        rig.next_dispatch().outcome,
        DispatchOutcome::Spawned { ref command, .. } if command.ends_with("make")
    ));
}

#[test]
fn test_corrupt_document_repaired_mid_run() {
    let mut rig = Rig::new(Workspace::sample());
    rig.listener.start(PORT).unwrap();

    rig.ws.write("profiles.json", "garbage");
    rig.backend.send_note_on(69, 100);
    let handled = rig.next_dispatch();
    assert_eq!(handled.profile, "default");
    assert!(rig.ws.document_json().get("default").is_some());
}

// ===== Lifecycle =====

#[test]
fn test_replug_and_restart() {
    let mut rig = Rig::new(Workspace::sample());
    rig.listener.start(PORT).unwrap();

    rig.backend.unplug(PORT);
    assert!(rig.listener.wait(Some(Duration::from_secs(5))));
    assert_eq!(rig.listener.state(), ListenerState::Stopped);

    assert!(matches!(
        rig.listener.start(PORT),
        Err(MapError::DeviceUnavailable { .. })
    ));

    rig.backend.plug(PORT);
    rig.listener.start(PORT).unwrap();
    rig.backend.send_note_on(69, 100);
    assert!(wait_for(|| rig.spawner.count() == 1));
    assert_eq!(rig.backend.live_connections(), 1);

    let errors = rig
        .events
        .try_iter()
        .filter(|e| matches!(e, ListenerEvent::Error { .. }))
        .count();
    assert_eq!(errors, 1, "losing the port is reported once");
}

#[test]
fn test_transient_open_errors_are_retried() {
    let options = ConnectionOptions {
        max_retries: 3,
        retry_delay: Duration::from_millis(1),
        ..ConnectionOptions::default()
    };
    let mut rig = Rig::with_options(Workspace::sample(), options);
    rig.backend.inject_open_error(MapError::Midi("port busy".to_string()));
    rig.backend.inject_open_error(MapError::Midi("port busy".to_string()));

    rig.listener.start(PORT).unwrap();
    assert_eq!(rig.backend.open_count(), 3);
    assert_eq!(rig.listener.state(), ListenerState::Running);
    rig.listener.stop().unwrap();
}

#[test]
fn test_fatal_open_error_is_not_retried() {
    let mut rig = Rig::new(Workspace::sample());
    rig.backend
        .inject_open_error(MapError::ListenerFailed("driver refused".to_string()));

    assert!(matches!(
        rig.listener.start(PORT),
        Err(MapError::ListenerFailed(_))
    ));
    assert_eq!(rig.backend.open_count(), 1);
    assert_eq!(rig.listener.state(), ListenerState::Stopped);
    assert!(rig.listener.device().is_none());
}

#[test]
fn test_events_serialize_as_json_lines() {
    let mut rig = Rig::new(Workspace::sample());
    rig.listener.start(PORT).unwrap();
    rig.backend.send_note_on(69, 100);
    let _ = rig.next_dispatch();
    rig.listener.stop().unwrap();

    let started = ListenerEvent::Started {
        device: PORT.to_string(),
        at: chrono::Utc::now(),
    };
    let json = serde_json::to_value(&started).unwrap();
    assert_eq!(json["event"], "started");
    assert_eq!(json["device"], PORT);

    let handled = Handled {
        window: Some("Terminal".to_string()),
        profile: "default".to_string(),
        control_type: ControlType::Key,
        control_id: "69".to_string(),
        outcome: DispatchOutcome::Unbound,
    };
    let json = serde_json::to_value(ListenerEvent::Dispatched {
        handled,
        at: chrono::Utc::now(),
    })
    .unwrap();
    assert_eq!(json["event"], "dispatched");
    assert_eq!(json["control_type"], "KEY");
    assert_eq!(json["outcome"], "unbound");
}
