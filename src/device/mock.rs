//! Mock MIDI backend for testing without hardware.
//!
//! Records every backend call and lets tests feed raw messages into open
//! ports.
//!
//! # Example
//!
//! ```rust,ignore
//! use midimap::device::mock::{MockBackend, Operation};
//! use midimap::device::MidiBackend;
//!
//! let backend = MockBackend::with_ports(&["Launchkey MK3"]);
//! let stream = backend.open("Launchkey MK3").unwrap();
//! backend.send_note_on(69, 100);
//!
//! backend.assert_contains(&Operation::Open { name: "Launchkey MK3".into() });
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use super::info::{PortInfo, RawMessage};
use super::{InputStream, MidiBackend};
use crate::error::{MapError, Result};

/// Recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    ListInputs,
    Open { name: String },
    Close { name: String },
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Shared {
    operation_log: Mutex<Vec<Operation>>,
    live: AtomicUsize,
}

impl Shared {
    fn record_op(&self, op: Operation) {
        trace!(?op, "Recording operation");
        lock(&self.operation_log).push(op);
    }
}

/// Held by an open stream; closing is recorded on drop.
struct MockConnection {
    name: String,
    shared: Arc<Shared>,
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
        self.shared.record_op(Operation::Close {
            name: std::mem::take(&mut self.name),
        });
    }
}

/// Scripted MIDI backend.
pub struct MockBackend {
    ports: Mutex<Vec<String>>,
    pending: Mutex<VecDeque<RawMessage>>,
    senders: Mutex<Vec<Sender<RawMessage>>>,
    open_errors: Mutex<VecDeque<MapError>>,
    list_error: Mutex<Option<MapError>>,
    opens: AtomicUsize,
    shared: Arc<Shared>,
}

impl MockBackend {
    /// Backend with no ports.
    pub fn new() -> Self {
        Self {
            ports: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            senders: Mutex::new(Vec::new()),
            open_errors: Mutex::new(VecDeque::new()),
            list_error: Mutex::new(None),
            opens: AtomicUsize::new(0),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Backend exposing the given port names.
    pub fn with_ports(names: &[&str]) -> Self {
        let backend = Self::new();
        *lock(&backend.ports) = names.iter().map(|n| (*n).to_string()).collect();
        debug!(?names, "Creating mock backend");
        backend
    }

    // === Configuration ===

    /// Make a port appear.
    pub fn plug(&self, name: &str) {
        lock(&self.ports).push(name.to_string());
    }

    /// Remove a port and disconnect every open stream.
    pub fn unplug(&self, name: &str) {
        lock(&self.ports).retain(|n| n != name);
        lock(&self.senders).clear();
    }

    /// Fail the next `open` with `error`. Errors queue up.
    pub fn inject_open_error(&self, error: MapError) {
        lock(&self.open_errors).push_back(error);
    }

    /// Fail the next `list_inputs` with `error`.
    pub fn inject_list_error(&self, error: MapError) {
        *lock(&self.list_error) = Some(error);
    }

    // === Input Simulation ===

    /// Queue raw bytes. Delivered to every open stream, or to the next
    /// stream opened if none is open.
    pub fn send(&self, bytes: &[u8]) {
        let msg = RawMessage::new(bytes);
        let mut senders = lock(&self.senders);
        senders.retain(|tx| tx.send(msg.clone()).is_ok());
        if senders.is_empty() {
            lock(&self.pending).push_back(msg);
        }
    }

    /// Note-on on channel 1.
    pub fn send_note_on(&self, note: u8, velocity: u8) {
        self.send(&[0x90, note, velocity]);
    }

    /// Note-off on channel 1.
    pub fn send_note_off(&self, note: u8) {
        self.send(&[0x80, note, 0]);
    }

    /// Control change on channel 1.
    pub fn send_control_change(&self, controller: u8, value: u8) {
        self.send(&[0xB0, controller, value]);
    }

    /// Pitch wheel on channel 1 from a 14-bit value.
    pub fn send_pitch_wheel(&self, value: u16) {
        let value = value.min(0x3FFF);
        self.send(&[0xE0, (value & 0x7F) as u8, (value >> 7) as u8]);
    }

    // === Assertions ===

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        lock(&self.shared.operation_log).clone()
    }

    /// Number of open attempts on known ports, failed ones included.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Streams currently open.
    pub fn live_connections(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Assert a specific operation was performed at least once.
    ///
    /// # Panics
    ///
    /// Panics if the operation was not found.
    pub fn assert_contains(&self, expected: &Operation) {
        let ops = self.operations();
        assert!(
            ops.contains(expected),
            "Expected operation {expected:?} not found in: {ops:#?}",
        );
    }

    /// Assert the exact operation sequence, ignoring `ListInputs`.
    ///
    /// # Panics
    ///
    /// Panics if the operations don't match.
    pub fn assert_connections(&self, expected: &[Operation]) {
        let actual: Vec<_> = self
            .operations()
            .into_iter()
            .filter(|op| *op != Operation::ListInputs)
            .collect();
        assert_eq!(
            actual, expected,
            "Operation mismatch.\nExpected: {expected:#?}\nActual: {actual:#?}",
        );
    }

    /// Clear the operation log for fresh assertions.
    pub fn clear_operations(&self) {
        lock(&self.shared.operation_log).clear();
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiBackend for MockBackend {
    fn list_inputs(&self) -> Result<Vec<PortInfo>> {
        self.shared.record_op(Operation::ListInputs);
        if let Some(error) = lock(&self.list_error).take() {
            return Err(error);
        }
        Ok(lock(&self.ports)
            .iter()
            .enumerate()
            .map(|(index, name)| PortInfo {
                index,
                name: name.clone(),
            })
            .collect())
    }

    fn open(&self, name: &str) -> Result<InputStream> {
        if !lock(&self.ports).iter().any(|n| n == name) {
            return Err(MapError::DeviceUnavailable {
                device: name.to_string(),
            });
        }
        // Count attempts, failed ones included.
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.open_errors).pop_front() {
            return Err(error);
        }

        self.shared.record_op(Operation::Open {
            name: name.to_string(),
        });
        let (tx, rx) = mpsc::channel();
        for msg in lock(&self.pending).drain(..) {
            let _ = tx.send(msg);
        }
        lock(&self.senders).push(tx);
        self.shared.live.fetch_add(1, Ordering::SeqCst);

        let connection = MockConnection {
            name: name.to_string(),
            shared: Arc::clone(&self.shared),
        };
        Ok(InputStream::new(rx, Some(Box::new(connection))))
    }
}
