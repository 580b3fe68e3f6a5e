//! midimap library - Window-aware MIDI controller mapping.
//!
//! This library exposes the engine behind the `midimap` CLI for use in tests
//! and other front ends.
//!
//! # Modules
//!
//! - `action`: Action kinds and bindings
//! - `midi`: Message decoding and trigger classification
//! - `profile`: Profile store, durable document and window resolution
//! - `dispatch`: Running bindings as processes, keystrokes or messages
//! - `listener`: Background consumer of a MIDI input
//! - `device`: MIDI input backends (midir and a mock)
//! - `window`: Foreground window providers
//! - `config`: Settings file handling
//! - `error`: Error types with user-recoverable hints
#![forbid(unsafe_code)]

pub mod action;
pub mod cli;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod logging;
pub mod midi;
pub mod profile;
pub mod window;
