//! Picks the active profile for the focused window.

use std::sync::Arc;

use tracing::debug;

use super::schema::{Profile, ProfileStore};
use crate::window::ForegroundWindowProvider;

/// Select the profile for a window identity.
///
/// Profiles are tried in document order and the first whose window match
/// is a case-insensitive substring of `window` wins, so a broad match placed
/// before a narrow one shadows it. Without a window, or without a match,
/// the default profile is returned.
pub fn resolve<'a>(store: &'a ProfileStore, window: Option<&str>) -> &'a Profile {
    let Some(window) = window else {
        return store.default_profile();
    };
    store
        .profiles()
        .iter()
        .find(|p| p.matches(window))
        .unwrap_or_else(|| store.default_profile())
}

/// Resolver bound to a window provider.
///
/// Nothing is cached: every call asks the provider again, so a focus change
/// takes effect on the next message.
#[derive(Clone)]
pub struct ProfileResolver {
    window: Arc<dyn ForegroundWindowProvider>,
}

impl ProfileResolver {
    pub fn new(window: Arc<dyn ForegroundWindowProvider>) -> Self {
        Self { window }
    }

    /// Current foreground identity.
    pub fn foreground(&self) -> Option<String> {
        self.window.foreground_window()
    }

    /// Resolve against the current foreground window.
    pub fn resolve<'a>(&self, store: &'a ProfileStore) -> &'a Profile {
        self.resolve_with_window(store).1
    }

    /// Like [`resolve`](Self::resolve), also returning the window identity
    /// the choice was made for.
    pub fn resolve_with_window<'a>(&self, store: &'a ProfileStore) -> (Option<String>, &'a Profile) {
        let window = self.foreground();
        let profile = resolve(store, window.as_deref());
        debug!(window = ?window, profile = %profile.name, "Resolved profile");
        (window, profile)
    }
}
