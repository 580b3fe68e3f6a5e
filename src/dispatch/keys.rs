//! Keyboard shortcut parsing and injection.
//!
//! Shortcuts are written the way users type them: `ctrl+shift+t`, `alt+f4`,
//! `enter`. A comma separates steps of a sequence: `ctrl+c, ctrl+v`.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{MapError, Result};

/// Modifier key held while the main key is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    Meta,
}

impl Modifier {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "ctrl" | "control" => Some(Self::Ctrl),
            "shift" => Some(Self::Shift),
            "alt" | "option" | "opt" => Some(Self::Alt),
            "meta" | "cmd" | "command" | "win" | "windows" | "super" => Some(Self::Meta),
            _ => None,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Ctrl => "ctrl",
            Self::Shift => "shift",
            Self::Alt => "alt",
            Self::Meta => "meta",
        }
    }
}

/// Non-modifier key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Key {
    Char(char),
    Enter,
    Tab,
    Space,
    Escape,
    Backspace,
    Delete,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
}

impl Key {
    fn parse(token: &str) -> Option<Self> {
        let key = match token {
            "enter" | "return" => Self::Enter,
            "tab" => Self::Tab,
            "space" => Self::Space,
            "esc" | "escape" => Self::Escape,
            "backspace" => Self::Backspace,
            "delete" | "del" => Self::Delete,
            "up" => Self::Up,
            "down" => Self::Down,
            "left" => Self::Left,
            "right" => Self::Right,
            "home" => Self::Home,
            "end" => Self::End,
            "pageup" | "page up" | "page_up" => Self::PageUp,
            "pagedown" | "page down" | "page_down" => Self::PageDown,
            "plus" => Self::Char('+'),
            "comma" => Self::Char(','),
            _ => {
                if let Some(n) = token.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                    return (1..=12).contains(&n).then_some(Self::F(n));
                }
                let mut chars = token.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Self::Char(c),
                    _ => return None,
                }
            }
        };
        Some(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Char(c) => write!(f, "{c}"),
            Self::F(n) => write!(f, "f{n}"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

/// One chord: modifiers plus a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCombo {
    pub modifiers: Vec<Modifier>,
    pub key: Key,
}

impl FromStr for KeyCombo {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| MapError::ConfigInvalid(format!("shortcut '{s}': {reason}"));

        let tokens: Vec<String> = s.split('+').map(|t| t.trim().to_lowercase()).collect();
        let Some((last, mods)) = tokens.split_last() else {
            return Err(invalid("empty"));
        };
        if last.is_empty() {
            return Err(invalid("missing key"));
        }

        let mut modifiers = Vec::with_capacity(mods.len());
        for token in mods {
            let modifier = Modifier::parse(token)
                .ok_or_else(|| invalid(&format!("unknown modifier '{token}'")))?;
            if !modifiers.contains(&modifier) {
                modifiers.push(modifier);
            }
        }
        modifiers.sort();

        let key = Key::parse(last).ok_or_else(|| invalid(&format!("unknown key '{last}'")))?;
        trace!(shortcut = %s, ?modifiers, ?key, "Parsed key combo");
        Ok(Self { modifiers, key })
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.modifiers {
            write!(f, "{}+", m.name())?;
        }
        write!(f, "{}", self.key)
    }
}

/// Parse a shortcut, possibly a comma-separated sequence.
pub fn parse_shortcut(s: &str) -> Result<Vec<KeyCombo>> {
    if s.trim().is_empty() {
        return Err(MapError::ConfigInvalid("shortcut is empty".to_string()));
    }
    // A lone "," is the comma key, not a separator.
    if s.trim() == "," {
        return Ok(vec![KeyCombo {
            modifiers: Vec::new(),
            key: Key::Char(','),
        }]);
    }
    s.split(',').map(str::parse).collect()
}

/// Injects key presses into the focused window.
pub trait KeystrokeInjector: Send + Sync {
    fn send(&self, combo: &KeyCombo) -> Result<()>;
}

/// Injector backed by the operating system.
///
/// Needs the `desktop` feature; without it every send fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemKeyboard;

#[cfg(feature = "desktop")]
impl KeystrokeInjector for SystemKeyboard {
    fn send(&self, combo: &KeyCombo) -> Result<()> {
        use enigo::KeyboardControllable;

        let mut enigo = enigo::Enigo::new();
        for m in &combo.modifiers {
            enigo.key_down(enigo_modifier(*m));
        }
        enigo.key_click(enigo_key(combo.key));
        for m in combo.modifiers.iter().rev() {
            enigo.key_up(enigo_modifier(*m));
        }
        debug!(combo = %combo, "Injected key combo");
        Ok(())
    }
}

#[cfg(feature = "desktop")]
const fn enigo_modifier(m: Modifier) -> enigo::Key {
    match m {
        Modifier::Ctrl => enigo::Key::Control,
        Modifier::Shift => enigo::Key::Shift,
        Modifier::Alt => enigo::Key::Alt,
        Modifier::Meta => enigo::Key::Meta,
    }
}

#[cfg(feature = "desktop")]
const fn enigo_key(key: Key) -> enigo::Key {
    use enigo::Key as E;
    match key {
        Key::Char(c) => E::Layout(c),
        Key::Enter => E::Return,
        Key::Tab => E::Tab,
        Key::Space => E::Space,
        Key::Escape => E::Escape,
        Key::Backspace => E::Backspace,
        Key::Delete => E::Delete,
        Key::Up => E::UpArrow,
        Key::Down => E::DownArrow,
        Key::Left => E::LeftArrow,
        Key::Right => E::RightArrow,
        Key::Home => E::Home,
        Key::End => E::End,
        Key::PageUp => E::PageUp,
        Key::PageDown => E::PageDown,
        Key::F(1) => E::F1,
        Key::F(2) => E::F2,
        Key::F(3) => E::F3,
        Key::F(4) => E::F4,
        Key::F(5) => E::F5,
        Key::F(6) => E::F6,
        Key::F(7) => E::F7,
        Key::F(8) => E::F8,
        Key::F(9) => E::F9,
        Key::F(10) => E::F10,
        Key::F(11) => E::F11,
        Key::F(_) => E::F12,
    }
}

#[cfg(not(feature = "desktop"))]
impl KeystrokeInjector for SystemKeyboard {
    fn send(&self, combo: &KeyCombo) -> Result<()> {
        debug!(combo = %combo, "Built without desktop support, cannot inject");
        Err(MapError::Other(
            "keystroke injection needs the 'desktop' feature".to_string(),
        ))
    }
}
