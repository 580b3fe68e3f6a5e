//! Action dispatch: turn a binding into its side effect.
//!
//! The [`Dispatcher`] owns the only failure boundary between bindings and
//! the outside world. [`Dispatcher::execute`] classifies failures as
//! `MissingActionParameter` or `ActionExecutionFailed`;
//! [`Dispatcher::dispatch`] additionally reports them and never returns an
//! error, so a bad binding cannot stop the listener.
//!
//! Side effects are fire-and-forget: spawned commands run detached and are
//! not awaited.

mod keys;
mod process;
pub mod recording;

pub use keys::{parse_shortcut, Key, KeyCombo, KeystrokeInjector, Modifier, SystemKeyboard};
pub use process::{ProcessSpawner, SpawnRequest, SystemSpawner};

use std::sync::Arc;

use serde::{Serialize, Serializer};
use tracing::{debug, error, info, warn};

use crate::action::{ActionKind, Binding, DEFAULT_MESSAGE};
use crate::config::Settings;
use crate::error::{MapError, Result};
use crate::logging::MESSAGE_TARGET;

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// No binding for the control.
    Unbound,
    /// Bound to `ActionKind::None`.
    Ignored,
    /// A command or script was started.
    Spawned {
        #[serde(serialize_with = "kind_name")]
        kind: ActionKind,
        command: String,
        pid: Option<u32>,
    },
    /// A shortcut was injected.
    Injected { shortcut: String },
    /// A message was emitted.
    Printed { message: String },
    /// The action failed; already reported.
    Failed {
        #[serde(serialize_with = "kind_name")]
        kind: ActionKind,
        error: String,
    },
}

impl DispatchOutcome {
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Short human description, e.g. `spawned sh -c ls`.
    pub fn summary(&self) -> String {
        match self {
            Self::Unbound => "unbound".to_string(),
            Self::Ignored => "no action".to_string(),
            Self::Spawned { command, .. } => format!("spawned {command}"),
            Self::Injected { shortcut } => format!("sent {shortcut}"),
            Self::Printed { message } => format!("printed \"{message}\""),
            Self::Failed { kind, error } => format!("{kind} failed: {error}"),
        }
    }
}

fn kind_name<S: Serializer>(kind: &ActionKind, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(kind.name())
}

/// Executes bindings through injected side-effect capabilities.
#[derive(Clone)]
pub struct Dispatcher {
    spawner: Arc<dyn ProcessSpawner>,
    keyboard: Arc<dyn KeystrokeInjector>,
    shell: Vec<String>,
    interpreter: String,
}

impl Dispatcher {
    pub fn new(
        settings: &Settings,
        spawner: Arc<dyn ProcessSpawner>,
        keyboard: Arc<dyn KeystrokeInjector>,
    ) -> Self {
        Self {
            spawner,
            keyboard,
            shell: settings.shell.clone(),
            interpreter: settings.script_interpreter.clone(),
        }
    }

    /// Dispatcher that spawns real processes and injects real keystrokes.
    pub fn system(settings: &Settings) -> Self {
        Self::new(
            settings,
            Arc::new(SystemSpawner::new(settings.max_in_flight)),
            Arc::new(SystemKeyboard),
        )
    }

    /// Spawned processes still running.
    pub fn in_flight(&self) -> usize {
        self.spawner.in_flight()
    }

    /// Run a binding, reporting any failure instead of returning it.
    pub fn dispatch(&self, binding: Option<&Binding>) -> DispatchOutcome {
        let Some(binding) = binding else {
            debug!("Control is unbound");
            return DispatchOutcome::Unbound;
        };

        match self.execute(binding) {
            Ok(outcome) => outcome,
            Err(err) => {
                if err.is_user_recoverable() {
                    warn!(action = %binding.action, error = %err, "Binding not dispatched");
                } else {
                    error!(action = %binding.action, error = %err, "Action failed");
                }
                DispatchOutcome::Failed {
                    kind: binding.action,
                    error: err.to_string(),
                }
            }
        }
    }

    /// Run a binding and return classified failures.
    ///
    /// # Errors
    ///
    /// `MissingActionParameter` when the action's value is blank;
    /// `ActionExecutionFailed` when spawning or injecting fails.
    pub fn execute(&self, binding: &Binding) -> Result<DispatchOutcome> {
        let kind = binding.action;
        match kind {
            ActionKind::None => {
                debug!("Binding has no action");
                Ok(DispatchOutcome::Ignored)
            }
            ActionKind::RunCommand => {
                let command = required(binding)?;
                let request = SpawnRequest::shell(&self.shell, command)
                    .map_err(|e| failed(kind, &e))?;
                self.spawn(kind, &request)
            }
            ActionKind::RunScript => {
                let script = required(binding)?;
                let request = SpawnRequest::new(self.interpreter.clone(), [script]);
                self.spawn(kind, &request)
            }
            ActionKind::KeyboardShortcut => {
                let shortcut = required(binding)?;
                let combos = parse_shortcut(shortcut).map_err(|e| failed(kind, &e))?;
                for combo in &combos {
                    self.keyboard.send(combo).map_err(|e| failed(kind, &e))?;
                }
                info!(shortcut = %shortcut, "Sent keyboard shortcut");
                Ok(DispatchOutcome::Injected {
                    shortcut: shortcut.to_string(),
                })
            }
            ActionKind::PrintMessage => {
                let message = binding.value().unwrap_or(DEFAULT_MESSAGE);
                info!(target: MESSAGE_TARGET, "{message}");
                Ok(DispatchOutcome::Printed {
                    message: message.to_string(),
                })
            }
        }
    }

    fn spawn(&self, kind: ActionKind, request: &SpawnRequest) -> Result<DispatchOutcome> {
        let pid = self.spawner.spawn(request).map_err(|e| failed(kind, &e))?;
        info!(action = %kind, command = %request, pid = ?pid, "Started process");
        Ok(DispatchOutcome::Spawned {
            kind,
            command: request.to_string(),
            pid,
        })
    }
}

fn required(binding: &Binding) -> Result<&str> {
    binding.value().ok_or_else(|| MapError::MissingActionParameter {
        kind: binding.action,
        param: binding.action.param_key().unwrap_or("value"),
    })
}

fn failed(kind: ActionKind, cause: &MapError) -> MapError {
    let cause = match cause {
        MapError::Io(e) => e.to_string(),
        other => other.to_string(),
    };
    MapError::ActionExecutionFailed { kind, cause }
}
