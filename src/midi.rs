//! MIDI message decoding and classification.
//!
//! Raw bytes from the transport are decoded into a [`MidiMessage`], then
//! [`classify`] decides which control fired and whether it should trigger
//! an action lookup. Release events never trigger.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MapError;

/// Control id used for the pitch wheel; a device has a single wheel.
pub const PITCH_WHEEL_ID: &str = "1";

/// Physical input class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ControlType {
    /// A key or pad (note messages).
    #[serde(rename = "KEY")]
    Key,
    /// A knob or fader (control-change messages).
    #[serde(rename = "CONTROL_CHANGE")]
    ControlChange,
    /// The pitch wheel.
    #[serde(rename = "PITCHWHEEL")]
    PitchWheel,
}

impl ControlType {
    /// All control types in persisted order.
    pub const ALL: [Self; 3] = [Self::Key, Self::ControlChange, Self::PitchWheel];

    /// Name used as the table key in the profile document.
    pub const fn document_key(self) -> &'static str {
        match self {
            Self::Key => "KEY",
            Self::ControlChange => "CONTROL_CHANGE",
            Self::PitchWheel => "PITCHWHEEL",
        }
    }

    /// Check that a control id is well formed for this type.
    ///
    /// Keys and CC slots are MIDI data bytes (0-127); the pitch wheel only
    /// has id `"1"`.
    pub fn validate_id(self, id: &str) -> Result<(), MapError> {
        let ok = match self {
            Self::Key | Self::ControlChange => id.parse::<u8>().is_ok_and(|n| n < 128),
            Self::PitchWheel => id == PITCH_WHEEL_ID,
        };
        if ok {
            Ok(())
        } else {
            Err(MapError::InvalidControlId {
                control: self.to_string(),
                id: id.to_string(),
            })
        }
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Key => "key",
            Self::ControlChange => "cc",
            Self::PitchWheel => "pitchwheel",
        })
    }
}

impl FromStr for ControlType {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "key" | "note" => Ok(Self::Key),
            "cc" | "control_change" => Ok(Self::ControlChange),
            "pitchwheel" | "pitch_wheel" | "pw" => Ok(Self::PitchWheel),
            other => Err(MapError::ConfigInvalid(format!(
                "Unknown control type '{other}': expected key, cc or pitchwheel"
            ))),
        }
    }
}

/// A decoded channel-voice message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// Bend value centered at 0 (-8192..=8191).
    PitchWheel { channel: u8, value: i16 },
    ProgramChange { channel: u8, program: u8 },
    Aftertouch { channel: u8, pressure: u8 },
    PolyAftertouch { channel: u8, note: u8, pressure: u8 },
    /// System messages and anything too short to decode.
    Other { status: u8 },
}

impl MidiMessage {
    /// Decode raw transport bytes.
    ///
    /// Unlike the usual convention, a note-on with velocity 0 stays a
    /// `NoteOn` here; [`classify`] treats it as a release.
    pub fn from_bytes(data: &[u8]) -> Self {
        let Some(&status) = data.first() else {
            return Self::Other { status: 0 };
        };
        let channel = status & 0x0F;
        let data1 = data.get(1).map(|b| b & 0x7F);
        let data2 = data.get(2).map(|b| b & 0x7F);

        match (status & 0xF0, data1, data2) {
            (0x80, Some(note), Some(velocity)) => Self::NoteOff {
                channel,
                note,
                velocity,
            },
            (0x90, Some(note), Some(velocity)) => Self::NoteOn {
                channel,
                note,
                velocity,
            },
            (0xA0, Some(note), Some(pressure)) => Self::PolyAftertouch {
                channel,
                note,
                pressure,
            },
            (0xB0, Some(controller), Some(value)) => Self::ControlChange {
                channel,
                controller,
                value,
            },
            (0xC0, Some(program), _) => Self::ProgramChange { channel, program },
            (0xD0, Some(pressure), _) => Self::Aftertouch { channel, pressure },
            (0xE0, Some(lsb), Some(msb)) => Self::PitchWheel {
                channel,
                value: ((i16::from(msb) << 7) | i16::from(lsb)) - 8192,
            },
            _ => Self::Other { status },
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoteOn { channel, note, velocity } => {
                write!(f, "note_on channel={channel} note={note} velocity={velocity}")
            }
            Self::NoteOff { channel, note, velocity } => {
                write!(f, "note_off channel={channel} note={note} velocity={velocity}")
            }
            Self::ControlChange { channel, controller, value } => {
                write!(f, "control_change channel={channel} control={controller} value={value}")
            }
            Self::PitchWheel { channel, value } => {
                write!(f, "pitchwheel channel={channel} pitch={value}")
            }
            Self::ProgramChange { channel, program } => {
                write!(f, "program_change channel={channel} program={program}")
            }
            Self::Aftertouch { channel, pressure } => {
                write!(f, "aftertouch channel={channel} value={pressure}")
            }
            Self::PolyAftertouch { channel, note, pressure } => {
                write!(f, "polytouch channel={channel} note={note} value={pressure}")
            }
            Self::Other { status } => write!(f, "other status=0x{status:02X}"),
        }
    }
}

/// Result of classifying a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classified {
    pub control_type: Option<ControlType>,
    pub control_id: String,
    pub should_trigger: bool,
}

impl Classified {
    fn trigger(control_type: ControlType, control_id: impl Into<String>) -> Self {
        Self {
            control_type: Some(control_type),
            control_id: control_id.into(),
            should_trigger: true,
        }
    }

    fn release(control_type: ControlType, control_id: impl Into<String>) -> Self {
        Self {
            control_type: Some(control_type),
            control_id: control_id.into(),
            should_trigger: false,
        }
    }

    fn ignored() -> Self {
        Self {
            control_type: None,
            control_id: String::new(),
            should_trigger: false,
        }
    }
}

/// Map a message to the control that produced it.
pub fn classify(message: &MidiMessage) -> Classified {
    match *message {
        MidiMessage::NoteOn { note, velocity, .. } if velocity > 0 => {
            Classified::trigger(ControlType::Key, note.to_string())
        }
        MidiMessage::NoteOn { note, .. } | MidiMessage::NoteOff { note, .. } => {
            Classified::release(ControlType::Key, note.to_string())
        }
        MidiMessage::ControlChange { controller, .. } => {
            Classified::trigger(ControlType::ControlChange, controller.to_string())
        }
        MidiMessage::PitchWheel { .. } => Classified::trigger(ControlType::PitchWheel, PITCH_WHEEL_ID),
        MidiMessage::ProgramChange { .. }
        | MidiMessage::Aftertouch { .. }
        | MidiMessage::PolyAftertouch { .. }
        | MidiMessage::Other { .. } => Classified::ignored(),
    }
}

/// Decode and classify raw bytes in one step.
pub fn classify_bytes(data: &[u8]) -> Classified {
    classify(&MidiMessage::from_bytes(data))
}
