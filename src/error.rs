//! Error types for profile, dispatch and listener operations.

use thiserror::Error;

use crate::action::ActionKind;

/// Primary error type for midimap operations.
#[derive(Error, Debug)]
pub enum MapError {
    // Profile errors
    #[error("Profile not found: {name}")]
    ProfileNotFound { name: String },

    #[error("Profile already exists: {name}")]
    DuplicateProfile { name: String },

    #[error("Profile document {path} is corrupt: {reason}")]
    DocumentCorrupt { path: String, reason: String },

    #[error("Invalid control id '{id}' for {control}")]
    InvalidControlId { control: String, id: String },

    // Device errors
    #[error("MIDI input device unavailable: {device}")]
    DeviceUnavailable { device: String },

    #[error("MIDI backend error: {0}")]
    Midi(String),

    #[error("Listener failed: {0}")]
    ListenerFailed(String),

    // Action errors
    #[error("Unknown action code '{code}'")]
    UnknownAction { code: String },

    #[error("{kind} binding is missing its '{param}' parameter")]
    MissingActionParameter { kind: ActionKind, param: &'static str },

    #[error("{kind} failed: {cause}")]
    ActionExecutionFailed { kind: ActionKind, cause: String },

    // Configuration errors
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl MapError {
    /// Returns true if the error is recoverable by the user.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ProfileNotFound { .. }
                | Self::DuplicateProfile { .. }
                | Self::InvalidControlId { .. }
                | Self::DeviceUnavailable { .. }
                | Self::UnknownAction { .. }
                | Self::MissingActionParameter { .. }
                | Self::ConfigNotFound { .. }
        )
    }

    /// Returns a suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ProfileNotFound { .. } => Some("Run: midimap profiles"),
            Self::DuplicateProfile { .. } => Some("Pick another name or remove the existing profile"),
            Self::DeviceUnavailable { .. } => Some("Run: midimap devices"),
            Self::MissingActionParameter { .. } => Some("Rebind the control with a value"),
            Self::UnknownAction { .. } => Some("Valid action codes are 0-4"),
            Self::InvalidControlId { .. } => Some("Control ids are MIDI numbers 0-127; the pitch wheel uses 1"),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using MapError.
pub type Result<T> = std::result::Result<T, MapError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| MapError::Other(format!("{}: {e}", f().into())))
    }
}
