//! Path resolution helpers for settings files.
//!
//! Supports absolute paths, paths relative to the settings file, and "~"
//! home directory expansion.

use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use crate::error::{MapError, Result};

/// Resolve a path from a settings file.
///
/// Resolution rules:
/// 1. Absolute paths: used as-is
/// 2. Paths starting with `~`: expanded to home directory
/// 3. Relative paths: resolved relative to the settings file's directory
pub fn resolve_path(path: &Path, config_dir: &Path) -> Result<PathBuf> {
    trace!(
        path = %path.display(),
        config_dir = %config_dir.display(),
        "Resolving path"
    );

    if let Some(expanded) = expand_home(path)? {
        return Ok(expanded);
    }

    if path.is_absolute() {
        debug!(path = %path.display(), "Using absolute path as-is");
        return Ok(path.to_path_buf());
    }

    let resolved = config_dir.join(path);
    debug!(
        original = %path.display(),
        config_dir = %config_dir.display(),
        resolved = %resolved.display(),
        "Resolved relative path"
    );
    Ok(resolved)
}

/// Expand a leading `~`. Returns `None` for paths that don't start with it.
pub fn expand_home(path: &Path) -> Result<Option<PathBuf>> {
    let path_str = path.to_string_lossy();
    if path_str != "~" && !path_str.starts_with("~/") {
        return Ok(None);
    }
    let home = home_dir()?;
    let rest = path_str.strip_prefix("~/").unwrap_or("");
    let resolved = if rest.is_empty() { home } else { home.join(rest) };
    debug!(
        original = %path.display(),
        resolved = %resolved.display(),
        "Expanded home directory path"
    );
    Ok(Some(resolved))
}

/// Resolve the user's home directory (cross-platform).
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        MapError::ConfigInvalid("Could not determine home directory".to_string())
    })
}

/// Default location of the settings file: `<config dir>/midimap/settings.toml`.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("midimap").join("settings.toml"))
}

/// Path resolution context for a settings file.
pub struct PathResolver {
    config_dir: PathBuf,
}

impl PathResolver {
    /// Create a resolver for a specific settings file path.
    pub fn new(config_path: &Path) -> Result<Self> {
        let config_dir = config_path.parent().ok_or_else(|| {
            MapError::ConfigInvalid(format!(
                "Settings path has no parent directory: {}",
                config_path.display()
            ))
        })?;

        let canonical = config_dir.canonicalize().unwrap_or_else(|_| {
            warn!(
                config_dir = %config_dir.display(),
                "Failed to canonicalize settings directory"
            );
            config_dir.to_path_buf()
        });

        Ok(Self { config_dir: canonical })
    }

    /// Resolve a path relative to the settings file.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        resolve_path(path, &self.config_dir)
    }

    /// Return the base settings directory.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}
