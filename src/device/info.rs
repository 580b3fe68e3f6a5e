//! MIDI input port information and connection options.

use std::time::Duration;

use serde::Serialize;

/// A MIDI input port as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Position in the backend's enumeration
    pub index: usize,
    /// Port name, used to select the device
    pub name: String,
}

/// Raw MIDI message received from a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawMessage {
    /// Backend timestamp in microseconds (0 when the backend has none)
    pub timestamp_us: u64,
    /// Status byte followed by data bytes
    pub bytes: Vec<u8>,
}

impl RawMessage {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp_us: 0,
            bytes: bytes.into(),
        }
    }

    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }
}

/// Retry options for opening an input port.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Maximum number of connection attempts (default: 3).
    pub max_retries: u32,
    /// Initial delay between retries (default: 200ms).
    pub retry_delay: Duration,
    /// Exponential backoff factor (default: 1.5).
    pub backoff_factor: f32,
    /// Maximum delay cap (default: 2000ms).
    pub max_delay: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
            backoff_factor: 1.5,
            max_delay: Duration::from_millis(2000),
        }
    }
}

impl ConnectionOptions {
    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    /// Delay to use after `delay`, capped at `max_delay`.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let next = (delay.as_secs_f32() * self.backoff_factor).min(self.max_delay.as_secs_f32());
        Duration::from_secs_f32(next)
    }
}
