//! MIDI input through the operating system.
//!
//! With the `midi` feature this wraps `midir`; without it the backend
//! reports no ports.

#[cfg(feature = "midi")]
use std::sync::mpsc;

use tracing::debug;

use super::info::PortInfo;
#[cfg(feature = "midi")]
use super::info::RawMessage;
use super::{InputStream, MidiBackend};
use crate::error::{MapError, Result};

#[cfg(feature = "midi")]
const CLIENT_NAME: &str = "midimap";

/// System MIDI backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMidi;

#[cfg(feature = "midi")]
impl MidiBackend for SystemMidi {
    fn list_inputs(&self) -> Result<Vec<PortInfo>> {
        let midi_in =
            midir::MidiInput::new(CLIENT_NAME).map_err(|e| MapError::Midi(e.to_string()))?;
        let ports = midi_in
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                midi_in
                    .port_name(port)
                    .ok()
                    .map(|name| PortInfo { index, name })
            })
            .collect::<Vec<_>>();
        debug!(count = ports.len(), "Listed MIDI inputs");
        Ok(ports)
    }

    fn open(&self, name: &str) -> Result<InputStream> {
        let midi_in =
            midir::MidiInput::new(CLIENT_NAME).map_err(|e| MapError::Midi(e.to_string()))?;
        let port = midi_in
            .ports()
            .into_iter()
            .find(|p| midi_in.port_name(p).is_ok_and(|n| n == name))
            .ok_or_else(|| MapError::DeviceUnavailable {
                device: name.to_string(),
            })?;

        let (tx, rx) = mpsc::channel();
        let connection = midi_in
            .connect(
                &port,
                "midimap-input",
                move |timestamp, message, _| {
                    let _ = tx.send(RawMessage::new(message).with_timestamp(timestamp));
                },
                (),
            )
            .map_err(|e| MapError::Midi(e.to_string()))?;

        debug!(device = %name, "Opened MIDI input");
        Ok(InputStream::new(rx, Some(Box::new(connection))))
    }
}

#[cfg(not(feature = "midi"))]
impl MidiBackend for SystemMidi {
    fn list_inputs(&self) -> Result<Vec<PortInfo>> {
        debug!("Built without MIDI support, no inputs");
        Ok(Vec::new())
    }

    fn open(&self, name: &str) -> Result<InputStream> {
        Err(MapError::DeviceUnavailable {
            device: name.to_string(),
        })
    }
}
