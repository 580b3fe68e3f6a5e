//! Durable profile document.
//!
//! [`ProfileDocument`] owns the path of `profiles.json`. Reads always go
//! to disk so the listener sees edits on the next message; every mutation
//! is a read-modify-write committed with an atomic rename before the call
//! returns.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, trace, warn};

use super::schema::{Profile, ProfileStore};
use crate::action::Binding;
use crate::error::{MapError, Result, ResultExt};
use crate::midi::ControlType;

/// Default document file name, relative to the working directory.
pub const DEFAULT_DOCUMENT: &str = "profiles.json";

/// What `load` found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadStatus {
    /// Document parsed as-is.
    Loaded,
    /// No document existed; the seeded one was written.
    Created,
    /// Document was unreadable and has been replaced with the seeded one.
    Repaired { reason: String },
    /// Document parsed but lacked a `default` profile, which was added.
    DefaultAdded,
}

/// File-backed profile store.
#[derive(Debug)]
pub struct ProfileDocument {
    path: PathBuf,
    // Serializes writers within this process.
    write_lock: Mutex<()>,
}

impl ProfileDocument {
    /// Use the document at `path`. Nothing is read until the first load.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the store, creating or repairing the document if needed.
    ///
    /// Missing and corrupt documents are replaced with
    /// [`ProfileStore::seeded`]; the corruption is logged as a warning. Only
    /// I/O failures while writing the replacement are returned.
    pub fn load(&self) -> Result<ProfileStore> {
        self.load_with_status().map(|(store, _)| store)
    }

    /// Like [`load`](Self::load), also reporting what happened.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load_with_status(&self) -> Result<(ProfileStore, LoadStatus)> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No profile document, creating default");
                let store = ProfileStore::seeded();
                self.save(&store)?;
                return Ok((store, LoadStatus::Created));
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return self.repair(format!("not valid UTF-8: {e}"));
            }
            Err(e) => return Err(MapError::Io(e)),
        };
        trace!(bytes = content.len(), "Read profile document");

        match parse_document(&content) {
            Ok((store, added_default)) => {
                if added_default {
                    warn!("Profile document had no default profile, adding it");
                    self.save(&store)?;
                    Ok((store, LoadStatus::DefaultAdded))
                } else {
                    debug!(profiles = store.len(), "Profile document loaded");
                    Ok((store, LoadStatus::Loaded))
                }
            }
            Err(reason) => self.repair(reason),
        }
    }

    fn repair(&self, reason: String) -> Result<(ProfileStore, LoadStatus)> {
        let report = MapError::DocumentCorrupt {
            path: self.path.display().to_string(),
            reason: reason.clone(),
        };
        warn!(error = %report, "Replacing profile document with defaults");
        let store = ProfileStore::seeded();
        self.save(&store)?;
        Ok((store, LoadStatus::Repaired { reason }))
    }

    /// Write the whole store atomically.
    ///
    /// The document is written to a temporary file in the same directory,
    /// synced, then renamed over the target.
    #[instrument(skip(self, store), fields(path = %self.path.display(), profiles = store.len()))]
    pub fn save(&self, store: &ProfileStore) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut content =
            serde_json::to_vec_pretty(store).with_context(|| "Failed to serialize profiles")?;
        content.push(b'\n');

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| MapError::Io(e.error))?;

        debug!(bytes = content.len(), "Profile document saved");
        Ok(())
    }

    /// Reload, apply `f`, and commit. The closure's error aborts the write.
    fn mutate<T>(&self, f: impl FnOnce(&mut ProfileStore) -> Result<T>) -> Result<T> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut store = self.load()?;
        let out = f(&mut store)?;
        self.save(&store)?;
        Ok(out)
    }

    /// Fresh read of one slot. `None` means unbound.
    pub fn get_binding(
        &self,
        profile: &str,
        control_type: ControlType,
        control_id: &str,
    ) -> Result<Option<Binding>> {
        let store = self.load()?;
        Ok(store.get_binding(profile, control_type, control_id).cloned())
    }

    /// Store a binding durably, creating profile and table on demand.
    ///
    /// Returns the control-change slot that held the binding's wire CC
    /// number before, if it was another slot.
    #[instrument(skip(self, binding), fields(action = %binding.action))]
    pub fn set_binding(
        &self,
        profile: &str,
        control_type: ControlType,
        control_id: &str,
        binding: Binding,
    ) -> Result<Option<String>> {
        control_type.validate_id(control_id)?;
        let moved_from = self.mutate(|store| {
            let moved_from = binding
                .cc_wire_id()
                .filter(|_| control_type == ControlType::ControlChange)
                .and_then(|wire| store.profile(profile)?.cc_slot_for_wire(wire))
                .filter(|slot| *slot != control_id)
                .map(str::to_string);
            store.set_binding(profile, control_type, control_id, binding);
            Ok(moved_from)
        })?;
        info!(moved_from = ?moved_from, "Binding saved");
        Ok(moved_from)
    }

    /// Remove a binding durably. Returns the removed binding, if any.
    pub fn clear_binding(
        &self,
        profile: &str,
        control_type: ControlType,
        control_id: &str,
    ) -> Result<Option<Binding>> {
        self.mutate(|store| store.clear_binding(profile, control_type, control_id))
    }

    /// Add a profile durably. Fails with `DuplicateProfile` if the name is taken.
    #[instrument(skip(self))]
    pub fn add_profile(&self, name: &str, window_match: &str) -> Result<()> {
        self.insert_profile(Profile::new(name, window_match))
    }

    /// Add a fully built profile durably.
    pub fn insert_profile(&self, profile: Profile) -> Result<()> {
        let name = profile.name.clone();
        self.mutate(|store| store.add_profile(profile))?;
        info!(name = %name, "Profile added");
        Ok(())
    }

    /// Remove a profile durably. Removing an absent profile succeeds.
    #[instrument(skip(self))]
    pub fn remove_profile(&self, name: &str) -> Result<bool> {
        let removed = self.mutate(|store| store.remove_profile(name))?;
        if removed {
            info!("Profile removed");
        } else {
            debug!("Profile was already absent");
        }
        Ok(removed)
    }

    /// Change a profile's window match durably.
    pub fn set_window_match(&self, name: &str, window_match: &str) -> Result<()> {
        self.mutate(|store| store.set_window_match(name, window_match))
    }
}

/// Parse document text. Returns the store and whether `default` had to be added.
fn parse_document(content: &str) -> std::result::Result<(ProfileStore, bool), String> {
    let value: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let had_default = value
        .as_object()
        .is_some_and(|map| map.contains_key(super::schema::DEFAULT_PROFILE));
    let store: ProfileStore = serde_json::from_value(value).map_err(|e| e.to_string())?;
    Ok((store, !had_default))
}
