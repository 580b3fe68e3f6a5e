//! CLI argument definitions and command dispatch.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::action::ActionKind;
use crate::midi::ControlType;

/// midimap - Window-aware MIDI controller mapper.
///
/// Binds keys, knobs, faders and the pitch wheel of a MIDI controller to
/// shell commands, keyboard shortcuts, scripts and messages. The active
/// profile follows the focused window.
#[derive(Parser, Debug)]
#[command(name = "midimap", version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)] // CLI flags naturally use multiple bools
pub struct Cli {
    /// Output format (text for humans, json for scripts)
    #[arg(
        long,
        short = 'f',
        default_value = "text",
        global = true,
        env = "MIDIMAP_FORMAT"
    )]
    pub format: OutputFormat,

    /// Equivalent to --format=json
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Settings file (YAML or TOML)
    #[arg(long, short = 'c', global = true, env = "MIDIMAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Profile document, overriding the settings file
    #[arg(long, short = 'p', global = true, env = "MIDIMAP_PROFILES")]
    pub profiles: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text with optional color
    #[default]
    Text,
    /// Pretty JSON
    Json,
    /// Compact JSON (single line)
    JsonCompact,
}

impl Cli {
    /// Returns true if output should be JSON.
    pub const fn use_json(&self) -> bool {
        self.json || matches!(self.format, OutputFormat::Json | OutputFormat::JsonCompact)
    }

    /// Returns true if output should be compact JSON.
    pub const fn use_compact_json(&self) -> bool {
        matches!(self.format, OutputFormat::JsonCompact)
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    // === Devices ===
    /// List MIDI input devices
    Devices(DevicesArgs),

    /// Listen to a device and dispatch bound actions
    Listen(ListenArgs),

    // === Profiles ===
    /// List profiles in match order
    Profiles,

    /// Add, remove or inspect a profile
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Bind a control to an action
    Bind(BindArgs),

    /// Remove a control's binding
    Unbind(UnbindArgs),

    /// Show which profile a window title selects
    Resolve(ResolveArgs),

    // === Utilities ===
    /// Show version and build information
    Version,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// === Argument Structs ===

#[derive(Parser, Debug)]
pub struct DevicesArgs {
    /// Show port indices
    #[arg(long, short = 'l')]
    pub long: bool,
}

#[derive(Parser, Debug)]
pub struct ListenArgs {
    /// Input device name, as shown by `midimap devices`
    pub device: String,

    /// Stop after this many seconds (default: run until the device goes away)
    #[arg(long, value_name = "SECS")]
    pub once_for: Option<u64>,

    /// Pretend this window is focused instead of asking the system
    #[arg(long, short = 'w')]
    pub window: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// Add a profile
    Add(ProfileAddArgs),

    /// Remove a profile (succeeds if absent)
    Remove(ProfileNameArgs),

    /// Show a profile's bindings
    Show(ProfileNameArgs),

    /// Change the window match of a profile
    Match(ProfileMatchArgs),
}

/// Arguments for adding a profile.
///
/// # Examples
///
/// ```bash
/// # Match windows whose title contains "code"
/// midimap profile add vscode --window-match code
///
/// # Derive the match from an executable
/// midimap profile add --from-exe "C:/Program Files/Google/Chrome/Application/chrome.exe"
/// ```
#[derive(Parser, Debug)]
pub struct ProfileAddArgs {
    /// Profile name (defaults to the app name with --from-exe)
    #[arg(required_unless_present = "from_exe")]
    pub name: Option<String>,

    /// Case-insensitive substring of the window title (defaults to the name)
    #[arg(long, short = 'm')]
    pub window_match: Option<String>,

    /// Executable whose base name becomes the window match
    #[arg(long, value_name = "PATH", conflicts_with = "window_match")]
    pub from_exe: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ProfileNameArgs {
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct ProfileMatchArgs {
    pub name: String,
    pub window_match: String,
}

/// Arguments for binding a control.
///
/// # Examples
///
/// ```bash
/// midimap bind default key 69 run-command "start notepad"
/// midimap bind chrome cc 3 keyboard-shortcut ctrl+t --cc 74
/// midimap bind default pitchwheel 1 print-message "bend!"
/// ```
#[derive(Parser, Debug)]
pub struct BindArgs {
    /// Profile name (created if missing)
    pub profile: String,

    /// Control type: key, cc or pitchwheel
    pub control: ControlType,

    /// Control id: note number, CC slot, or 1 for the pitch wheel
    pub id: String,

    /// Action name (none, run-command, keyboard-shortcut, run-script, print-message) or code 0-4
    #[arg(value_parser = parse_action)]
    pub action: ActionKind,

    /// Command, shortcut, script path or message
    pub value: Option<String>,

    /// Wire CC number the slot listens to (control changes only)
    #[arg(long, value_name = "CC", value_parser = clap::value_parser!(u8).range(0..=127))]
    pub cc: Option<u8>,
}

#[derive(Parser, Debug)]
pub struct UnbindArgs {
    pub profile: String,
    pub control: ControlType,
    pub id: String,
}

#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Window title or app name; omit for "no focused window"
    pub window: Option<String>,

    /// Also look up this control in the resolved profile
    #[arg(long, requires = "id")]
    pub control: Option<ControlType>,

    /// Control id for --control (wire CC number for control changes)
    #[arg(long, requires = "control")]
    pub id: Option<String>,
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

fn parse_action(s: &str) -> Result<ActionKind, String> {
    ActionKind::parse(s).map_err(|e| e.to_string())
}
