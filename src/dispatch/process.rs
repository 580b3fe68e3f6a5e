//! Detached process spawning for command and script bindings.

use std::fmt;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{MapError, Result};

/// Program and arguments to launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
}

impl SpawnRequest {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Run `command` through a shell given as program plus leading args.
    pub fn shell(shell: &[String], command: &str) -> Result<Self> {
        let (program, lead) = shell
            .split_first()
            .ok_or_else(|| MapError::ConfigInvalid("shell must name a program".to_string()))?;
        let mut args = lead.to_vec();
        args.push(command.to_string());
        Ok(Self::new(program.clone(), args))
    }
}

impl fmt::Display for SpawnRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Starts processes without waiting for them.
pub trait ProcessSpawner: Send + Sync {
    /// Start the process and return its pid when known.
    fn spawn(&self, request: &SpawnRequest) -> Result<Option<u32>>;

    /// Spawned processes that have not exited yet.
    fn in_flight(&self) -> usize {
        0
    }
}

/// Spawner backed by `std::process`.
///
/// Each child gets a reaper thread that waits for it, so exited children
/// do not linger as zombies and `in_flight` stays accurate.
#[derive(Debug, Clone, Default)]
pub struct SystemSpawner {
    running: Arc<AtomicUsize>,
    max_in_flight: Option<usize>,
}

impl SystemSpawner {
    pub fn new(max_in_flight: Option<usize>) -> Self {
        Self {
            running: Arc::new(AtomicUsize::new(0)),
            max_in_flight,
        }
    }
}

impl ProcessSpawner for SystemSpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<Option<u32>> {
        if let Some(max) = self.max_in_flight {
            let running = self.running.load(Ordering::SeqCst);
            if running >= max {
                return Err(MapError::Other(format!(
                    "{running} spawned processes still running (limit {max})"
                )));
            }
        }

        let mut child = Command::new(&request.program)
            .args(&request.args)
            .stdin(Stdio::null())
            .spawn()?;
        let pid = child.id();
        self.running.fetch_add(1, Ordering::SeqCst);
        debug!(pid, command = %request, "Spawned process");

        let running = Arc::clone(&self.running);
        let reaper = thread::Builder::new()
            .name(format!("midimap-reap-{pid}"))
            .spawn(move || {
                match child.wait() {
                    Ok(status) if status.success() => debug!(pid, "Process exited"),
                    Ok(status) => warn!(pid, %status, "Process exited with failure"),
                    Err(e) => warn!(pid, error = %e, "Failed to wait for process"),
                }
                running.fetch_sub(1, Ordering::SeqCst);
            });
        if let Err(e) = reaper {
            self.running.fetch_sub(1, Ordering::SeqCst);
            warn!(pid, error = %e, "Could not start reaper thread; process left unsupervised");
        }

        Ok(Some(pid))
    }

    fn in_flight(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}
