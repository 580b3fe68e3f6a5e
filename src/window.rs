//! Foreground window inspection.

use std::sync::Mutex;

use tracing::trace;

/// Reports the identity (title or application name) of the focused window.
pub trait ForegroundWindowProvider: Send + Sync {
    /// `None` when no window has focus or the platform cannot tell.
    fn foreground_window(&self) -> Option<String>;
}

/// Provider backed by the operating system.
///
/// Reports "<app name> - <title>" so window matches can target either.
/// Without the `desktop` feature it never reports a window, so the
/// default profile is always used.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemWindow;

impl ForegroundWindowProvider for SystemWindow {
    #[cfg(feature = "desktop")]
    fn foreground_window(&self) -> Option<String> {
        match active_win_pos_rs::get_active_window() {
            Ok(window) => {
                let identity = if window.title.is_empty() {
                    window.app_name
                } else {
                    format!("{} - {}", window.app_name, window.title)
                };
                trace!(window = %identity, "Foreground window");
                Some(identity)
            }
            Err(()) => {
                trace!("No foreground window");
                None
            }
        }
    }

    #[cfg(not(feature = "desktop"))]
    fn foreground_window(&self) -> Option<String> {
        trace!("Built without desktop support, no foreground window");
        None
    }
}

/// Provider with a settable identity. Used for `--window` overrides and tests.
#[derive(Debug, Default)]
pub struct FixedWindow {
    identity: Mutex<Option<String>>,
}

impl FixedWindow {
    pub fn new(identity: Option<&str>) -> Self {
        Self {
            identity: Mutex::new(identity.map(str::to_string)),
        }
    }

    /// Simulate a focus change.
    pub fn focus(&self, identity: Option<&str>) {
        *self
            .identity
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = identity.map(str::to_string);
    }
}

impl ForegroundWindowProvider for FixedWindow {
    fn foreground_window(&self) -> Option<String> {
        self.identity
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_window_focus_changes() {
        let window = FixedWindow::new(Some("Notepad"));
        assert_eq!(window.foreground_window().as_deref(), Some("Notepad"));
        window.focus(None);
        assert_eq!(window.foreground_window(), None);
    }
}
