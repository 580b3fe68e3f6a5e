//! Recording side-effect fakes for tests.
//!
//! Both fakes remember every request and can be told to fail, so dispatch
//! can be checked without starting processes or touching the keyboard.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::keys::{KeyCombo, KeystrokeInjector};
use super::process::{ProcessSpawner, SpawnRequest};
use crate::error::{MapError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Spawner that records requests instead of running them.
#[derive(Debug, Default)]
pub struct RecordingSpawner {
    requests: Mutex<Vec<SpawnRequest>>,
    failure: Mutex<Option<String>>,
}

impl RecordingSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every spawn with an I/O error carrying `reason`.
    pub fn fail_with(&self, reason: &str) {
        *lock(&self.failure) = Some(reason.to_string());
    }

    pub fn requests(&self) -> Vec<SpawnRequest> {
        lock(&self.requests).clone()
    }

    pub fn count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Last argument of every request; the command or script path.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.requests)
            .iter()
            .filter_map(|r| r.args.last().cloned())
            .collect()
    }
}

impl ProcessSpawner for RecordingSpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<Option<u32>> {
        if let Some(reason) = lock(&self.failure).clone() {
            return Err(MapError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                reason,
            )));
        }
        lock(&self.requests).push(request.clone());
        Ok(None)
    }
}

/// Injector that records combos instead of pressing them.
#[derive(Debug, Default)]
pub struct RecordingKeyboard {
    sent: Mutex<Vec<KeyCombo>>,
    failure: Mutex<Option<String>>,
}

impl RecordingKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, reason: &str) {
        *lock(&self.failure) = Some(reason.to_string());
    }

    /// Sent combos rendered as text, e.g. `ctrl+shift+t`.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).iter().map(ToString::to_string).collect()
    }
}

impl KeystrokeInjector for RecordingKeyboard {
    fn send(&self, combo: &KeyCombo) -> Result<()> {
        if let Some(reason) = lock(&self.failure).clone() {
            return Err(MapError::Other(reason));
        }
        lock(&self.sent).push(combo.clone());
        Ok(())
    }
}
