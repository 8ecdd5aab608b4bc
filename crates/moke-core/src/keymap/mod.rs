//! Key registry: the whitelist of keys usable in a chord and the mouse buttons
//! they can emulate.
//!
//! Lookups are pure and case-insensitive.  Only platform modifier keys are
//! accepted, because those are the keys a user can hold without typing a
//! character into whatever window has focus.

pub mod codes;

use std::fmt;

use codes::{
    BTN_LEFT, BTN_MIDDLE, BTN_RIGHT, KEY_LEFTALT, KEY_LEFTCTRL, KEY_LEFTMETA, KEY_RIGHTALT,
    KEY_RIGHTCTRL, KEY_RIGHTMETA,
};

/// A raw evdev key code (`KEY_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub const LEFT_CTRL: KeyCode = KeyCode(KEY_LEFTCTRL);
    pub const LEFT_ALT: KeyCode = KeyCode(KEY_LEFTALT);
    pub const RIGHT_CTRL: KeyCode = KeyCode(KEY_RIGHTCTRL);
    pub const RIGHT_ALT: KeyCode = KeyCode(KEY_RIGHTALT);
    pub const LEFT_META: KeyCode = KeyCode(KEY_LEFTMETA);
    pub const RIGHT_META: KeyCode = KeyCode(KEY_RIGHTMETA);

    /// Returns the numeric evdev code.
    pub fn code(self) -> u16 {
        self.0
    }

    /// Returns the canonical registry name, if the key is whitelisted.
    pub fn name(self) -> Option<&'static str> {
        name_for_code(self)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "key {}", self.0),
        }
    }
}

/// Mouse button identifier.
///
/// The discriminant is the evdev `BTN_*` code emitted on the virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MouseButton {
    Left = BTN_LEFT,
    Right = BTN_RIGHT,
    Middle = BTN_MIDDLE,
}

impl MouseButton {
    /// All buttons, in the order they are listed in help output.
    pub const ALL: [MouseButton; 3] = [MouseButton::Left, MouseButton::Middle, MouseButton::Right];

    /// Returns the evdev `BTN_*` code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Returns the registry name (`LeftMouse`, `MiddleMouse`, `RightMouse`).
    pub fn name(self) -> &'static str {
        match self {
            MouseButton::Left => "LeftMouse",
            MouseButton::Middle => "MiddleMouse",
            MouseButton::Right => "RightMouse",
        }
    }
}

impl TryFrom<u16> for MouseButton {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            BTN_LEFT => Ok(MouseButton::Left),
            BTN_RIGHT => Ok(MouseButton::Right),
            BTN_MIDDLE => Ok(MouseButton::Middle),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.name())
    }
}

/// Whitelisted key names.  The first entry for a code is its canonical name.
const KEY_NAMES: &[(KeyCode, &str)] = &[
    (KeyCode::LEFT_META, "Windows"),
    (KeyCode::LEFT_ALT, "LeftAlt"),
    (KeyCode::RIGHT_ALT, "RightAlt"),
    (KeyCode::LEFT_CTRL, "LeftCtrl"),
    (KeyCode::RIGHT_CTRL, "RightCtrl"),
    (KeyCode::RIGHT_META, "RightMeta"),
    // Aliases
    (KeyCode::LEFT_META, "LeftMeta"),
    (KeyCode::LEFT_ALT, "Alt_L"),
    (KeyCode::LEFT_CTRL, "Ctrl_L"),
    (KeyCode::LEFT_META, "Super_L"),
    (KeyCode::RIGHT_ALT, "Alt_R"),
    (KeyCode::RIGHT_CTRL, "Ctrl_R"),
    (KeyCode::RIGHT_META, "Super_R"),
];

/// Resolves a key name to its code, ignoring ASCII case.
///
/// Returns `None` for anything outside the whitelist.
///
/// # Examples
///
/// ```rust
/// use moke_core::keymap::{code_for_name, KeyCode};
///
/// assert_eq!(code_for_name("windows"), Some(KeyCode::LEFT_META));
/// assert_eq!(code_for_name("Shift_L"), None);
/// ```
pub fn code_for_name(name: &str) -> Option<KeyCode> {
    KEY_NAMES
        .iter()
        .find(|(_, known)| known.eq_ignore_ascii_case(name))
        .map(|(code, _)| *code)
}

/// Returns the canonical name for a whitelisted key code.
pub fn name_for_code(code: KeyCode) -> Option<&'static str> {
    KEY_NAMES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| *name)
}

/// Returns every accepted key name, canonical names first.
pub fn known_key_names() -> impl Iterator<Item = &'static str> {
    KEY_NAMES.iter().map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_for_name_is_case_insensitive() {
        assert_eq!(code_for_name("LEFTALT"), Some(KeyCode::LEFT_ALT));
        assert_eq!(code_for_name("rightctrl"), Some(KeyCode::RIGHT_CTRL));
        assert_eq!(code_for_name("super_l"), Some(KeyCode::LEFT_META));
    }

    #[test]
    fn test_code_for_name_rejects_unknown_and_partial_names() {
        assert_eq!(code_for_name("Shift"), None);
        assert_eq!(code_for_name("Win"), None);
        assert_eq!(code_for_name(""), None);
        assert_eq!(code_for_name("LeftAlt "), None);
    }

    #[test]
    fn test_name_for_code_returns_canonical_name_not_alias() {
        assert_eq!(name_for_code(KeyCode::LEFT_META), Some("Windows"));
        assert_eq!(name_for_code(KeyCode::RIGHT_ALT), Some("RightAlt"));
    }

    #[test]
    fn test_name_for_code_unknown_key_is_none() {
        assert_eq!(name_for_code(KeyCode(30)), None);
    }

    #[test]
    fn test_every_alias_resolves_to_a_named_code() {
        for name in known_key_names() {
            let code = code_for_name(name).expect("whitelisted name must resolve");
            assert!(name_for_code(code).is_some());
        }
    }

    #[test]
    fn test_key_display_falls_back_to_number() {
        assert_eq!(KeyCode::LEFT_ALT.to_string(), "LeftAlt");
        assert_eq!(KeyCode(30).to_string(), "key 30");
    }

    #[test]
    fn test_mouse_button_codes_round_trip() {
        for button in MouseButton::ALL {
            assert_eq!(MouseButton::try_from(button.code()), Ok(button));
        }
        assert_eq!(MouseButton::try_from(0x113), Err(()));
    }

    #[test]
    fn test_mouse_button_display_includes_code_and_name() {
        assert_eq!(MouseButton::Middle.to_string(), "274 (MiddleMouse)");
    }
}
