//! Listener loop: consume MIDI input and dispatch bound actions.
//!
//! A [`Listener`] owns at most one background thread reading one input
//! port. Each message goes through [`Engine::handle`]:
//!
//! 1. classify the raw bytes
//! 2. for triggering messages, reload the profile document
//! 3. resolve the profile for the current foreground window
//! 4. look up the binding and dispatch it
//!
//! Failures at any step are reported for that message only. Stopping is
//! cooperative: the thread checks a flag between messages and at least every
//! `poll_interval`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::Settings;
use crate::device::{ensure_available, open_with_retry, ConnectionOptions, MidiBackend};
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::{MapError, Result};
use crate::midi::{classify, ControlType, MidiMessage};
use crate::profile::{ProfileDocument, ProfileResolver};

/// Lifecycle of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Something the listener observed, for display by a front end.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ListenerEvent {
    Started {
        device: String,
        at: DateTime<Utc>,
    },
    /// Every received message, triggering or not.
    Message {
        message: String,
        at: DateTime<Utc>,
    },
    Dispatched {
        #[serde(flatten)]
        handled: Handled,
        at: DateTime<Utc>,
    },
    Error {
        error: String,
        at: DateTime<Utc>,
    },
    Stopped {
        device: String,
        at: DateTime<Utc>,
    },
}

/// Result of handling one triggering message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Handled {
    pub window: Option<String>,
    pub profile: String,
    pub control_type: ControlType,
    pub control_id: String,
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
}

/// The per-message pipeline, shared with the listener thread.
pub struct Engine {
    document: Arc<ProfileDocument>,
    resolver: ProfileResolver,
    dispatcher: Dispatcher,
}

impl Engine {
    pub fn new(
        document: Arc<ProfileDocument>,
        resolver: ProfileResolver,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            document,
            resolver,
            dispatcher,
        }
    }

    pub fn document(&self) -> &ProfileDocument {
        &self.document
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle one raw message.
    ///
    /// `Ok(None)` for messages that do not trigger (releases, clock, ...).
    ///
    /// # Errors
    ///
    /// Only when the profile document cannot be read or repaired. Dispatch
    /// failures are reported in the returned outcome.
    pub fn handle(&self, bytes: &[u8]) -> Result<Option<Handled>> {
        self.handle_message(&MidiMessage::from_bytes(bytes))
    }

    /// Handle an already decoded message. See [`handle`](Self::handle).
    pub fn handle_message(&self, message: &MidiMessage) -> Result<Option<Handled>> {
        let classified = classify(message);
        let Some(control_type) = classified.control_type.filter(|_| classified.should_trigger)
        else {
            trace!(%message, "Not a trigger");
            return Ok(None);
        };

        // Snapshot read: edits saved since the last message are visible.
        let store = self.document.load()?;
        let (window, profile) = self.resolver.resolve_with_window(&store);
        let binding = profile.lookup(control_type, &classified.control_id);
        debug!(
            window = ?window,
            profile = %profile.name,
            control = %control_type,
            id = %classified.control_id,
            bound = binding.is_some(),
            "Handling trigger"
        );

        let outcome = self.dispatcher.dispatch(binding);
        Ok(Some(Handled {
            window,
            profile: profile.name.clone(),
            control_type,
            control_id: classified.control_id,
            outcome,
        }))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Run {
    device: String,
    state: Arc<Mutex<ListenerState>>,
    stop: Arc<AtomicBool>,
    done: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Marks the run finished however the thread exits.
///
/// Each run owns its state cell, so a late exit never touches a newer run.
struct ExitGuard {
    state: Arc<Mutex<ListenerState>>,
    done: SyncSender<()>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        *lock(&self.state) = ListenerState::Stopped;
        let _ = self.done.try_send(());
    }
}

/// Starts and stops the background consumer.
///
/// Starting while running stops the previous run first, so at most one
/// consumer exists at a time. A run that misses the stop timeout is kept
/// until it has exited; starting again before then fails.
pub struct Listener {
    backend: Arc<dyn MidiBackend>,
    engine: Arc<Engine>,
    events: Option<Sender<ListenerEvent>>,
    run: Option<Run>,
    poll_interval: Duration,
    stop_timeout: Duration,
    connection: ConnectionOptions,
}

impl Listener {
    pub fn new(backend: Arc<dyn MidiBackend>, engine: Arc<Engine>, settings: &Settings) -> Self {
        Self {
            backend,
            engine,
            events: None,
            run: None,
            poll_interval: settings.poll_interval(),
            stop_timeout: settings.stop_timeout(),
            connection: ConnectionOptions::default(),
        }
    }

    /// Report observations to `events`.
    pub fn with_events(mut self, events: Sender<ListenerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection = options;
        self
    }

    pub fn state(&self) -> ListenerState {
        self.run
            .as_ref()
            .map_or(ListenerState::Stopped, |run| *lock(&run.state))
    }

    /// Device of the current run, if any.
    pub fn device(&self) -> Option<&str> {
        self.run.as_ref().map(|r| r.device.as_str())
    }

    /// Begin consuming `device` on a background thread.
    ///
    /// Returns once the port is open and the listener is `Running`.
    ///
    /// # Errors
    ///
    /// `DeviceUnavailable` if the device is not enumerated; `Midi` or
    /// `ListenerFailed` if it cannot be opened, or if a previous run is
    /// still shutting down.
    #[instrument(skip(self))]
    pub fn start(&mut self, device: &str) -> Result<()> {
        if self.run.is_some() {
            info!(previous = ?self.device(), "Listener already running, restarting");
            self.stop()?;
        }

        ensure_available(self.backend.as_ref(), device)?;

        let state = Arc::new(Mutex::new(ListenerState::Starting));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);
        let (done_tx, done_rx) = mpsc::sync_channel::<()>(1);

        let worker = Worker {
            device: device.to_string(),
            backend: Arc::clone(&self.backend),
            engine: Arc::clone(&self.engine),
            events: self.events.clone(),
            stop: Arc::clone(&stop),
            poll_interval: self.poll_interval,
            connection: self.connection.clone(),
        };
        let guard = ExitGuard {
            state: Arc::clone(&state),
            done: done_tx,
        };
        let thread_state = Arc::clone(&state);

        let handle = thread::Builder::new()
            .name("midimap-listener".to_string())
            .spawn(move || {
                let _guard = guard;
                worker.run(&thread_state, &ready_tx);
            })
            .map_err(|e| MapError::ListenerFailed(format!("could not start thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.run = Some(Run {
                    device: device.to_string(),
                    state,
                    stop,
                    done: done_rx,
                    handle,
                });
                info!(device, "Listener running");
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(MapError::ListenerFailed(
                    "listener thread exited during startup".to_string(),
                ))
            }
        }
    }

    /// Stop the current run. A no-op when already stopped.
    ///
    /// # Errors
    ///
    /// `ListenerFailed` if the thread does not finish within the stop
    /// timeout. It has been told to stop and exits at its next check; the
    /// run stays `Stopping` until a later `stop` or `wait` sees it end.
    pub fn stop(&mut self) -> Result<()> {
        let Some(run) = self.run.take() else {
            trace!("Listener already stopped");
            return Ok(());
        };

        {
            let mut state = lock(&run.state);
            if *state != ListenerState::Stopped {
                *state = ListenerState::Stopping;
            }
        }
        run.stop.store(true, Ordering::SeqCst);
        debug!(device = %run.device, "Stopping listener");

        match run.done.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if run.handle.join().is_err() {
                    warn!(device = %run.device, "Listener thread panicked");
                }
                info!(device = %run.device, "Listener stopped");
                Ok(())
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    device = %run.device,
                    timeout_ms = self.stop_timeout.as_millis(),
                    "Listener did not stop in time"
                );
                let err = MapError::ListenerFailed(format!(
                    "listener on '{}' did not stop within {}ms",
                    run.device,
                    self.stop_timeout.as_millis()
                ));
                self.run = Some(run);
                Err(err)
            }
        }
    }

    /// Block until the current run ends on its own, or `timeout` passes.
    ///
    /// Returns true if the run ended.
    pub fn wait(&mut self, timeout: Option<Duration>) -> bool {
        let Some(run) = self.run.as_ref() else {
            return true;
        };
        let ended = match timeout {
            Some(t) => !matches!(run.done.recv_timeout(t), Err(mpsc::RecvTimeoutError::Timeout)),
            None => {
                let _ = run.done.recv();
                true
            }
        };
        if ended {
            if let Some(run) = self.run.take() {
                let _ = run.handle.join();
            }
        }
        ended
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "Listener dropped while running");
        }
    }
}

struct Worker {
    device: String,
    backend: Arc<dyn MidiBackend>,
    engine: Arc<Engine>,
    events: Option<Sender<ListenerEvent>>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
    connection: ConnectionOptions,
}

impl Worker {
    fn emit(&self, event: ListenerEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn run(&self, state: &Mutex<ListenerState>, ready: &SyncSender<Result<()>>) {
        let stream = match open_with_retry(self.backend.as_ref(), &self.device, &self.connection) {
            Ok(stream) => stream,
            Err(err) => {
                let _ = ready.send(Err(err));
                return;
            }
        };
        *lock(state) = ListenerState::Running;
        let _ = ready.send(Ok(()));
        self.emit(ListenerEvent::Started {
            device: self.device.clone(),
            at: Utc::now(),
        });

        while !self.stop.load(Ordering::SeqCst) {
            match stream.recv_timeout(self.poll_interval) {
                Ok(None) => {}
                Ok(Some(raw)) => self.handle(&raw.bytes),
                Err(err) => {
                    error!(device = %self.device, error = %err, "Input lost");
                    self.emit(ListenerEvent::Error {
                        error: err.to_string(),
                        at: Utc::now(),
                    });
                    break;
                }
            }
        }

        drop(stream);
        self.emit(ListenerEvent::Stopped {
            device: self.device.clone(),
            at: Utc::now(),
        });
    }

    fn handle(&self, bytes: &[u8]) {
        let message = MidiMessage::from_bytes(bytes);
        trace!(%message, "Received");
        self.emit(ListenerEvent::Message {
            message: message.to_string(),
            at: Utc::now(),
        });

        match self.engine.handle_message(&message) {
            Ok(Some(handled)) => self.emit(ListenerEvent::Dispatched {
                handled,
                at: Utc::now(),
            }),
            Ok(None) => {}
            Err(err) => {
                error!(error = %err, "Message dropped");
                self.emit(ListenerEvent::Error {
                    error: err.to_string(),
                    at: Utc::now(),
                });
            }
        }
    }
}
