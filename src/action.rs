//! Action taxonomy: what a bound control does when it fires.
//!
//! An [`ActionKind`] is persisted as its ordinal rendered as a string
//! (`"0"`..`"4"`). Unknown codes are rejected when a document is parsed, so
//! the dispatcher only ever sees the closed set below.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{MapError, Result};

/// Reserved parameter holding the wire-level CC number of a control-change binding.
pub const CC_CONTROL_ID: &str = "cc_control_id";

/// Text emitted by a `PrintMessage` binding without a `message` parameter.
pub const DEFAULT_MESSAGE: &str = "No message provided.";

/// Kinds of action a control can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActionKind {
    /// No binding configured. A valid state, not an error.
    #[default]
    None,
    /// Run a shell command.
    RunCommand,
    /// Inject a key combination such as `ctrl+shift+t`.
    KeyboardShortcut,
    /// Run a script through the configured interpreter.
    RunScript,
    /// Emit a message on the log.
    PrintMessage,
}

impl ActionKind {
    /// All kinds in ordinal order.
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::RunCommand,
        Self::KeyboardShortcut,
        Self::RunScript,
        Self::PrintMessage,
    ];

    /// Persisted ordinal.
    pub const fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::RunCommand => 1,
            Self::KeyboardShortcut => 2,
            Self::RunScript => 3,
            Self::PrintMessage => 4,
        }
    }

    /// Parse a persisted action code.
    ///
    /// Surrounding whitespace is ignored; anything outside `0..=4` is
    /// [`MapError::UnknownAction`].
    pub fn from_code(code: &str) -> Result<Self> {
        let parsed = code.trim().parse::<u8>().ok();
        Self::ALL
            .into_iter()
            .find(|kind| Some(kind.code()) == parsed)
            .ok_or_else(|| MapError::UnknownAction {
                code: code.to_string(),
            })
    }

    /// Parameter key the action reads its value from.
    pub const fn param_key(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::RunCommand => Some("command"),
            Self::KeyboardShortcut => Some("shortcut"),
            Self::RunScript => Some("script"),
            Self::PrintMessage => Some("message"),
        }
    }

    /// Snake-case name used in logs and on the command line.
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::RunCommand => "run_command",
            Self::KeyboardShortcut => "keyboard_shortcut",
            Self::RunScript => "run_script",
            Self::PrintMessage => "print_message",
        }
    }

    /// Parse a snake-case name or a numeric code.
    pub fn parse(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == lowered)
            .map_or_else(|| Self::from_code(s), Ok)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ActionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code().to_string())
    }
}

impl<'de> Deserialize<'de> for ActionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Older documents store the ordinal as a bare number.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawCode {
            Text(String),
            Number(u64),
        }

        let raw = match RawCode::deserialize(deserializer)? {
            RawCode::Text(s) => s,
            RawCode::Number(n) => n.to_string(),
        };
        Self::from_code(&raw).map_err(serde::de::Error::custom)
    }
}

/// One configured mapping from a control to an action.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Binding {
    /// What to do.
    pub action: ActionKind,
    /// Action-specific parameters.
    #[serde(default, rename = "params", deserialize_with = "deserialize_params")]
    pub parameters: BTreeMap<String, String>,
}

impl Binding {
    /// Create a binding with no parameters.
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            parameters: BTreeMap::new(),
        }
    }

    /// Create a binding whose value is stored under the action's parameter key.
    pub fn for_action(action: ActionKind, value: impl Into<String>) -> Self {
        let mut binding = Self::new(action);
        if let Some(key) = action.param_key() {
            binding.parameters.insert(key.to_string(), value.into());
        }
        binding
    }

    /// Shorthand for a `RunCommand` binding.
    pub fn command(command: impl Into<String>) -> Self {
        Self::for_action(ActionKind::RunCommand, command)
    }

    /// Add or replace a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Record the wire-level CC number the binding was captured against.
    pub fn with_cc_wire_id(self, wire: u8) -> Self {
        self.with_param(CC_CONTROL_ID, wire.to_string())
    }

    /// The action's value, if present and non-blank.
    pub fn value(&self) -> Option<&str> {
        let key = self.action.param_key()?;
        self.parameters
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Wire CC number recorded by [`Binding::with_cc_wire_id`].
    pub fn cc_wire_id(&self) -> Option<u8> {
        self.parameters
            .get(CC_CONTROL_ID)
            .and_then(|v| v.trim().parse().ok())
    }
}

/// Accept numbers and booleans as parameter values; documents written by
/// hand often carry `"cc_control_id": 7` instead of `"7"`.
fn deserialize_params<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(Ok((key, s))),
            serde_json::Value::Number(n) => Some(Ok((key, n.to_string()))),
            serde_json::Value::Bool(b) => Some(Ok((key, b.to_string()))),
            other => Some(Err(serde::de::Error::custom(format!(
                "parameter '{key}' must be a scalar, got {other}"
            )))),
        })
        .collect()
}
