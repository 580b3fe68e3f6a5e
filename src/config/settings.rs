//! Engine settings loaded from YAML or TOML.
//!
//! ```toml
//! profiles_path = "~/midimap/profiles.json"
//! script_interpreter = "python3"
//! shell = ["bash", "-c"]
//! stop_timeout_ms = 2000
//! poll_interval_ms = 50
//! max_in_flight = 8
//! ```
//!
//! Every field is optional. A missing settings file at the default location
//! means defaults; a missing file given explicitly is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};

use super::path::{default_settings_path, expand_home, PathResolver};
use crate::error::{MapError, Result};
use crate::profile::DEFAULT_DOCUMENT;

/// Settings file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format (.yaml, .yml).
    Yaml,
    /// TOML format (.toml).
    Toml,
}

impl ConfigFormat {
    /// Detect format from file extension.
    ///
    /// Returns `None` if the extension is not recognized.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        trace!(extension = %ext, "Detecting settings format from extension");
        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Profile document. Relative paths in a settings file are resolved
    /// against the file's directory; the built-in default is relative to
    /// the working directory.
    pub profiles_path: PathBuf,
    /// Program and leading arguments used to run `RunCommand` bindings.
    pub shell: Vec<String>,
    /// Program used to run `RunScript` bindings.
    pub script_interpreter: String,
    /// How long `stop` waits for the listener thread.
    pub stop_timeout_ms: u64,
    /// How often an idle listener checks for a stop request.
    pub poll_interval_ms: u64,
    /// Upper bound on spawned processes still running. `None` = unbounded.
    pub max_in_flight: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profiles_path: PathBuf::from(DEFAULT_DOCUMENT),
            shell: default_shell(),
            script_interpreter: "python".to_string(),
            stop_timeout_ms: 2000,
            poll_interval_ms: 50,
            max_in_flight: None,
        }
    }
}

fn default_shell() -> Vec<String> {
    if cfg!(windows) {
        vec!["cmd".to_string(), "/C".to_string()]
    } else {
        vec!["sh".to_string(), "-c".to_string()]
    }
}

impl Settings {
    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.shell.first().is_none_or(|s| s.trim().is_empty()) {
            return Err(MapError::ConfigInvalid("shell must name a program".to_string()));
        }
        if self.script_interpreter.trim().is_empty() {
            return Err(MapError::ConfigInvalid(
                "script_interpreter cannot be empty".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(MapError::ConfigInvalid(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_in_flight == Some(0) {
            return Err(MapError::ConfigInvalid(
                "max_in_flight must be at least 1; omit it for no limit".to_string(),
            ));
        }
        Ok(())
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Load settings.
    ///
    /// With `path`, the file must exist. Without it, the default location is
    /// tried and defaults are used if nothing is there.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => load_settings(path),
            None => match default_settings_path() {
                Some(path) if path.exists() => load_settings(&path),
                _ => {
                    debug!("No settings file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }
}

/// Load and validate a settings file.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_settings(path: &Path) -> Result<Settings> {
    let path = expand_home(path)?.unwrap_or_else(|| path.to_path_buf());
    let format = ConfigFormat::from_extension(&path).ok_or_else(|| {
        MapError::ConfigParse(format!(
            "Unknown settings format for '{}': expected .yaml, .yml, or .toml",
            path.display()
        ))
    })?;

    let content = std::fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MapError::ConfigNotFound {
                path: path.display().to_string(),
            }
        } else {
            MapError::Io(e)
        }
    })?;

    let mut settings = settings_from_str(&content, format)?;

    // A relative profiles_path in a file is relative to the file.
    let explicit = file_sets_profiles_path(&content, format);
    if explicit {
        let resolver = PathResolver::new(&path)?;
        settings.profiles_path = resolver.resolve(&settings.profiles_path)?;
    }

    info!(
        profiles = %settings.profiles_path.display(),
        interpreter = %settings.script_interpreter,
        "Settings loaded"
    );
    Ok(settings)
}

/// Parse settings text in a given format.
pub fn settings_from_str(content: &str, format: ConfigFormat) -> Result<Settings> {
    let settings: Settings = match format {
        ConfigFormat::Yaml if content.trim().is_empty() => Settings::default(),
        ConfigFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| MapError::ConfigParse(format!("YAML: {e}")))?
        }
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| MapError::ConfigParse(format!("TOML: {e}")))?
        }
    };
    settings.validate()?;
    Ok(settings)
}

fn file_sets_profiles_path(content: &str, format: ConfigFormat) -> bool {
    match format {
        ConfigFormat::Yaml => serde_yaml::from_str::<serde_yaml::Value>(content)
            .ok()
            .and_then(|v| v.get("profiles_path").cloned())
            .is_some(),
        ConfigFormat::Toml => toml::from_str::<toml::Table>(content)
            .is_ok_and(|t| t.contains_key("profiles_path")),
    }
}
