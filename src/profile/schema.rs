//! Profile document schema.
//!
//! The persisted document is a JSON object mapping profile names to
//! profile bodies, in the order the user created them:
//!
//! ```json
//! {
//!     "default": {
//!         "window_match": "",
//!         "KEY": {
//!             "69": {"action": "1", "params": {"command": "start notepad"}}
//!         }
//!     },
//!     "chrome": {
//!         "file_path": "C:/Program Files/Google/Chrome/Application/chrome.exe",
//!         "window_match": "chrome",
//!         "CONTROL_CHANGE": {
//!             "3": {"action": "2", "params": {"shortcut": "ctrl+t", "cc_control_id": "74"}}
//!         }
//!     }
//! }
//! ```
//!
//! Order matters: the resolver picks the first matching profile.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, trace, warn};

use crate::action::{ActionKind, Binding, CC_CONTROL_ID};
use crate::error::{MapError, Result};
use crate::midi::ControlType;

/// Name of the fallback profile.
pub const DEFAULT_PROFILE: &str = "default";

/// Bindings of one control type, keyed by control id.
pub type BindingTable = BTreeMap<String, Binding>;

static FALLBACK_DEFAULT: LazyLock<Profile> = LazyLock::new(|| Profile::new(DEFAULT_PROFILE, ""));

/// A named binding table activated by a window match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    /// Case-insensitive substring of the foreground window identity. Empty never matches.
    pub window_match: String,
    /// Executable the profile was created from, if any.
    pub file_path: Option<String>,
    pub bindings: BTreeMap<ControlType, BindingTable>,
}

impl Profile {
    /// Create an empty profile.
    pub fn new(name: impl Into<String>, window_match: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            window_match: window_match.into(),
            file_path: None,
            bindings: BTreeMap::new(),
        }
    }

    /// Create a profile for an executable.
    ///
    /// The window match is the executable's base name without extension,
    /// lower-cased (`C:\...\chrome.exe` matches windows containing "chrome").
    pub fn from_executable(name: Option<&str>, path: &Path) -> Result<Self> {
        let app = app_name_from_path(path).ok_or_else(|| {
            MapError::ConfigInvalid(format!("Cannot derive an app name from {}", path.display()))
        })?;
        let name = name.map_or_else(|| app.clone(), str::to_string);
        let mut profile = Self::new(name, app);
        profile.file_path = Some(path.display().to_string());
        Ok(profile)
    }

    /// True if this profile applies to the given window identity.
    pub fn matches(&self, window: &str) -> bool {
        let needle = self.window_match.trim();
        !needle.is_empty() && window.to_lowercase().contains(&needle.to_lowercase())
    }

    /// Bindings for one control type, if any.
    pub fn table(&self, control_type: ControlType) -> Option<&BindingTable> {
        self.bindings.get(&control_type)
    }

    /// Binding stored in a slot.
    pub fn binding(&self, control_type: ControlType, control_id: &str) -> Option<&Binding> {
        self.table(control_type)?.get(control_id)
    }

    /// Play-time lookup for an incoming control.
    ///
    /// Keys and the pitch wheel are looked up by slot. For control changes
    /// `control_id` is the wire CC number: a binding matches when its
    /// `cc_control_id` equals it, or, lacking that parameter, when its slot
    /// key does.
    pub fn lookup(&self, control_type: ControlType, control_id: &str) -> Option<&Binding> {
        match control_type {
            ControlType::Key | ControlType::PitchWheel => self.binding(control_type, control_id),
            ControlType::ControlChange => {
                let wire: u8 = control_id.parse().ok()?;
                let table = self.table(ControlType::ControlChange)?;
                table
                    .values()
                    .find(|b| b.cc_wire_id() == Some(wire))
                    .or_else(|| {
                        table
                            .get(control_id)
                            .filter(|b| b.cc_wire_id().is_none())
                    })
            }
        }
    }

    /// Slot that was last bound to a wire CC number.
    pub fn cc_slot_for_wire(&self, wire: u8) -> Option<&str> {
        self.table(ControlType::ControlChange)?
            .iter()
            .find(|(_, b)| b.cc_wire_id() == Some(wire))
            .map(|(slot, _)| slot.as_str())
    }

    /// Store a binding, creating the control-type table on demand.
    ///
    /// A control-change binding carrying a wire CC number takes that number
    /// over: other slots lose their claim on it and fall back to matching
    /// on their slot key.
    pub fn set_binding(&mut self, control_type: ControlType, control_id: &str, binding: Binding) {
        trace!(profile = %self.name, %control_type, control_id, action = %binding.action, "Setting binding");
        let wire = binding.cc_wire_id().filter(|_| control_type == ControlType::ControlChange);
        let table = self.bindings.entry(control_type).or_default();
        if let Some(wire) = wire {
            for (slot, other) in table.iter_mut() {
                if slot != control_id && other.cc_wire_id() == Some(wire) {
                    debug!(profile = %self.name, wire, from = %slot, to = control_id, "Moving CC wire number");
                    other.parameters.remove(CC_CONTROL_ID);
                }
            }
        }
        table.insert(control_id.to_string(), binding);
    }

    /// Remove a binding. Returns the removed binding.
    pub fn clear_binding(&mut self, control_type: ControlType, control_id: &str) -> Option<Binding> {
        let table = self.bindings.get_mut(&control_type)?;
        let removed = table.remove(control_id);
        if table.is_empty() {
            self.bindings.remove(&control_type);
        }
        removed
    }

    /// Total number of bindings.
    pub fn binding_count(&self) -> usize {
        self.bindings.values().map(BTreeMap::len).sum()
    }
}

/// Application name of an executable path: base name, no extension, lower-cased.
pub fn app_name_from_path(path: &Path) -> Option<String> {
    // Windows paths are split by hand so they work on every host.
    let raw = path.to_string_lossy();
    let base = raw.rsplit(['/', '\\']).next()?;
    let stem = base.rsplit_once('.').map_or(base, |(stem, _)| stem);
    let stem = stem.trim();
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_lowercase())
    }
}

/// Ordered collection of profiles.
///
/// Always contains a `default` profile; names are unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileStore {
    profiles: Vec<Profile>,
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::from_profiles(Vec::new())
    }
}

impl ProfileStore {
    /// Store holding only an empty `default` profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// The document written when none exists or the existing one is unreadable.
    pub fn seeded() -> Self {
        let mut default = Profile::new(DEFAULT_PROFILE, "");
        default.set_binding(ControlType::Key, "69", Binding::command("start notepad"));
        default.set_binding(ControlType::Key, "70", Binding::command("start chrome"));
        Self::from_profiles(vec![default])
    }

    /// Build a store from profiles in order. Later duplicates replace earlier
    /// ones in place; a `default` profile is prepended when missing.
    pub fn from_profiles(profiles: Vec<Profile>) -> Self {
        let mut store = Self {
            profiles: Vec::with_capacity(profiles.len() + 1),
        };
        for profile in profiles {
            if let Some(existing) = store.profile_mut(&profile.name) {
                warn!(name = %profile.name, "Duplicate profile in document, keeping the last one");
                *existing = profile;
            } else {
                store.profiles.push(profile);
            }
        }
        store.ensure_default();
        store
    }

    /// Insert the `default` profile if it is missing. Returns true if it was added.
    pub fn ensure_default(&mut self) -> bool {
        if self.contains(DEFAULT_PROFILE) {
            return false;
        }
        debug!("Adding missing default profile");
        self.profiles.insert(0, Profile::new(DEFAULT_PROFILE, ""));
        true
    }

    /// Profiles in document order.
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Profile names in document order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.iter().any(|p| p.name == name)
    }

    /// Look up a profile by exact name.
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    fn profile_mut(&mut self, name: &str) -> Option<&mut Profile> {
        self.profiles.iter_mut().find(|p| p.name == name)
    }

    /// Look up a profile, failing with `ProfileNotFound`.
    pub fn require(&self, name: &str) -> Result<&Profile> {
        self.profile(name).ok_or_else(|| MapError::ProfileNotFound {
            name: name.to_string(),
        })
    }

    /// The fallback profile.
    pub fn default_profile(&self) -> &Profile {
        self.profile(DEFAULT_PROFILE).unwrap_or(&FALLBACK_DEFAULT)
    }

    /// Pure slot lookup. `None` means unbound.
    pub fn get_binding(
        &self,
        profile: &str,
        control_type: ControlType,
        control_id: &str,
    ) -> Option<&Binding> {
        self.profile(profile)?.binding(control_type, control_id)
    }

    /// Store a binding, creating the profile (with an empty window match)
    /// and the control-type table on demand.
    pub fn set_binding(
        &mut self,
        profile: &str,
        control_type: ControlType,
        control_id: &str,
        binding: Binding,
    ) {
        if !self.contains(profile) {
            debug!(profile, "Creating profile for new binding");
            self.profiles.push(Profile::new(profile, ""));
        }
        if let Some(p) = self.profile_mut(profile) {
            p.set_binding(control_type, control_id, binding);
        }
    }

    /// Remove a binding. Removing an absent binding is not an error.
    pub fn clear_binding(
        &mut self,
        profile: &str,
        control_type: ControlType,
        control_id: &str,
    ) -> Result<Option<Binding>> {
        let p = self
            .profile_mut(profile)
            .ok_or_else(|| MapError::ProfileNotFound {
                name: profile.to_string(),
            })?;
        Ok(p.clear_binding(control_type, control_id))
    }

    /// Append a new profile. Fails with `DuplicateProfile` if the name is taken.
    pub fn add_profile(&mut self, profile: Profile) -> Result<()> {
        if profile.name.trim().is_empty() {
            return Err(MapError::ConfigInvalid("Profile name cannot be empty".to_string()));
        }
        if self.contains(&profile.name) {
            return Err(MapError::DuplicateProfile { name: profile.name });
        }
        self.profiles.push(profile);
        Ok(())
    }

    /// Remove a profile. Absent names are a no-op; `default` cannot be removed.
    pub fn remove_profile(&mut self, name: &str) -> Result<bool> {
        if name == DEFAULT_PROFILE {
            return Err(MapError::ConfigInvalid(
                "The default profile cannot be removed".to_string(),
            ));
        }
        let before = self.profiles.len();
        self.profiles.retain(|p| p.name != name);
        Ok(self.profiles.len() != before)
    }

    /// Change a profile's window match.
    pub fn set_window_match(&mut self, name: &str, window_match: &str) -> Result<()> {
        let p = self.profile_mut(name).ok_or_else(|| MapError::ProfileNotFound {
            name: name.to_string(),
        })?;
        p.window_match = window_match.to_string();
        Ok(())
    }
}

// === Serialization ===

/// On-disk body of a profile.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_path: Option<String>,
    #[serde(default)]
    window_match: Option<String>,
    #[serde(
        rename = "KEY",
        alias = "KEYS",
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "lenient_table"
    )]
    keys: BindingTable,
    #[serde(
        rename = "CONTROL_CHANGE",
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "lenient_table"
    )]
    control_change: BindingTable,
    #[serde(
        rename = "PITCHWHEEL",
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "lenient_table"
    )]
    pitch_wheel: BindingTable,
}

impl ProfileBody {
    fn from_profile(profile: &Profile) -> Self {
        let table = |ct| profile.table(ct).cloned().unwrap_or_default();
        Self {
            file_path: profile.file_path.clone(),
            window_match: Some(profile.window_match.clone()),
            keys: table(ControlType::Key),
            control_change: table(ControlType::ControlChange),
            pitch_wheel: table(ControlType::PitchWheel),
        }
    }

    fn into_profile(self, name: String) -> Profile {
        // Documents without a window match fall back to matching on the
        // profile name, except for the default profile.
        let window_match = self.window_match.unwrap_or_else(|| {
            if name == DEFAULT_PROFILE {
                String::new()
            } else {
                name.clone()
            }
        });
        let mut bindings = BTreeMap::new();
        for (ct, table) in [
            (ControlType::Key, self.keys),
            (ControlType::ControlChange, self.control_change),
            (ControlType::PitchWheel, self.pitch_wheel),
        ] {
            if !table.is_empty() {
                bindings.insert(ct, table);
            }
        }
        Profile {
            name,
            window_match,
            file_path: self.file_path.filter(|p| p != "None" && !p.is_empty()),
            bindings,
        }
    }
}

/// Deserialize a binding table, dropping entries that fail to parse.
///
/// A single unknown action code must not make the whole document corrupt,
/// which would wipe every other binding on repair.
fn lenient_table<'de, D>(deserializer: D) -> std::result::Result<BindingTable, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    let mut table = BindingTable::new();
    for (id, value) in raw {
        match serde_json::from_value::<Binding>(value) {
            Ok(binding) => {
                table.insert(id, binding);
            }
            Err(e) => warn!(control_id = %id, error = %e, "Rejected binding"),
        }
    }
    Ok(table)
}

impl Serialize for ProfileStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.profiles.len()))?;
        for profile in &self.profiles {
            map.serialize_entry(&profile.name, &ProfileBody::from_profile(profile))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ProfileStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct StoreVisitor;

        impl<'de> Visitor<'de> for StoreVisitor {
            type Value = ProfileStore;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of profile names to profiles")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut profiles = Vec::new();
                while let Some((name, body)) = access.next_entry::<String, ProfileBody>()? {
                    profiles.push(body.into_profile(name));
                }
                Ok(ProfileStore::from_profiles(profiles))
            }
        }

        deserializer.deserialize_map(StoreVisitor)
    }
}

/// Convenience for describing a binding in one line.
pub fn describe_binding(binding: &Binding) -> String {
    match (binding.action, binding.value()) {
        (ActionKind::None, _) => "none".to_string(),
        (kind, Some(value)) => format!("{kind}: {value}"),
        (kind, None) => format!("{kind}: <empty>"),
    }
}
