//! MIDI input abstraction.
//!
//! [`MidiBackend`] hides the transport so the listener can run against real
//! ports ([`SystemMidi`]) or a scripted [`mock::MockBackend`] in tests.

mod info;
pub mod mock;
mod real;

pub use info::{ConnectionOptions, PortInfo, RawMessage};
pub use real::SystemMidi;

use std::any::Any;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use crate::error::{MapError, Result};

/// Source of MIDI input ports.
///
/// # Implementation Notes
///
/// - `open` is called on the listener thread; the returned stream never
///   leaves it, so connection handles need not be `Send`
/// - Port names are matched exactly
pub trait MidiBackend: Send + Sync {
    /// Currently available input ports.
    fn list_inputs(&self) -> Result<Vec<PortInfo>>;

    /// Names of the currently available input ports.
    fn input_names(&self) -> Result<Vec<String>> {
        Ok(self.list_inputs()?.into_iter().map(|p| p.name).collect())
    }

    /// Open a port by name.
    ///
    /// # Errors
    ///
    /// `DeviceUnavailable` if no port has that name, `Midi` if the
    /// transport refuses the connection.
    fn open(&self, name: &str) -> Result<InputStream>;
}

/// Messages from an open port.
///
/// Dropping the stream closes the connection.
pub struct InputStream {
    receiver: Receiver<RawMessage>,
    _connection: Option<Box<dyn Any>>,
}

impl InputStream {
    /// Stream fed by `receiver`. `connection` is kept alive until drop.
    pub fn new(receiver: Receiver<RawMessage>, connection: Option<Box<dyn Any>>) -> Self {
        Self {
            receiver,
            _connection: connection,
        }
    }

    /// Wait up to `timeout` for the next message.
    ///
    /// `Ok(None)` on timeout; an error once the sender side is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<RawMessage>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(MapError::Midi("input port disconnected".to_string()))
            }
        }
    }
}

/// Check that `name` is among the enumerated inputs.
pub fn ensure_available(backend: &dyn MidiBackend, name: &str) -> Result<()> {
    let names = backend.input_names()?;
    trace!(?names, "Enumerated MIDI inputs");
    if names.iter().any(|n| n == name) {
        Ok(())
    } else {
        Err(MapError::DeviceUnavailable {
            device: name.to_string(),
        })
    }
}

/// Open a port, retrying transport failures with backoff.
///
/// A port that is not enumerated fails immediately.
pub fn open_with_retry(
    backend: &dyn MidiBackend,
    name: &str,
    opts: &ConnectionOptions,
) -> Result<InputStream> {
    let max_retries = opts.max_retries.max(1);
    let mut delay = opts.retry_delay;

    for attempt in 1..=max_retries {
        debug!(attempt, max_retries, device = %name, "Opening MIDI input");
        match backend.open(name) {
            Ok(stream) => {
                info!(attempt, device = %name, "MIDI input connected");
                return Ok(stream);
            }
            Err(err @ MapError::Midi(_)) if attempt < max_retries => {
                warn!(
                    attempt,
                    max_retries,
                    error = %err,
                    delay_ms = delay.as_millis(),
                    "Connection failed, retrying"
                );
                std::thread::sleep(delay);
                delay = opts.next_delay(delay);
            }
            Err(err) => {
                error!(attempt, max_retries, error = %err, "Connection failed");
                return Err(err);
            }
        }
    }

    Err(MapError::DeviceUnavailable {
        device: name.to_string(),
    })
}
