//! Chord-to-button mapping rules and per-key tracking state.
//!
//! A [`MappingTable`] collects rules from configuration one at a time
//! ([`MappingTable::parse`]) and is then frozen into a [`Mapping`]
//! ([`MappingTable::finalize`]), which computes the override relationships
//! between rules and the set of keys the engine must watch.
//!
//! # Override and hysteresis (for beginners)
//!
//! With the default rules, `Windows` alone is the left button and
//! `Windows+LeftAlt` is the middle button.  Both chords share the primary key
//! `Windows`, so pressing `Windows` then `LeftAlt` would otherwise hold both
//! buttons.  The modified rule therefore *overrides* the bare one: while the
//! chord is active, the bare rule is forced up.
//!
//! Once a chord is down it stays down until its primary key is released, even
//! if the modifier goes up first.  This is the hysteresis term in the engine's
//! evaluation and prevents a button from flickering when the user lets go of
//! the keys in the "wrong" order.

use std::fmt;

use thiserror::Error;

use crate::domain::bitset::KeyBitset;
use crate::keymap::codes::KEY_CNT;
use crate::keymap::{code_for_name, KeyCode, MouseButton};

/// Maximum number of rules a table can hold.
pub const MAX_RULES: usize = 3;

/// Errors that can occur while building the mapping table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The table already holds [`MAX_RULES`] rules.
    #[error("too many buttons (limit is {limit})")]
    TooManyRules { limit: usize },

    /// A rule for this button was already configured.
    #[error("button {button} is already specified")]
    DuplicateButton { button: MouseButton },

    /// A key or modifier name is not in the registry.
    #[error("unknown key `{0}'")]
    UnknownKey(String),

    /// A chord's modifier is also the primary key of a rule.
    #[error(
        "{modifier} modifier for {} chord is key for {}",
        .chord.name(),
        .other.name()
    )]
    ModifierConflict {
        modifier: KeyCode,
        chord: MouseButton,
        other: MouseButton,
    },
}

/// One configured translation: `key` (optionally with `modifier` held) drives
/// `button`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRule {
    /// Mouse button emitted by this rule.
    pub button: MouseButton,
    /// Primary trigger key.
    pub key: KeyCode,
    /// Key that must also be held for the rule to fire.
    pub modifier: Option<KeyCode>,
    /// Index of the unmodified rule sharing `key` that this chord shadows.
    pub override_of: Option<usize>,
    /// Whether the emitted button is currently held.
    pub is_down: bool,
}

impl MappingRule {
    fn new(button: MouseButton, key: KeyCode, modifier: Option<KeyCode>) -> Self {
        Self {
            button,
            key,
            modifier,
            override_of: None,
            is_down: false,
        }
    }
}

impl fmt::Display for MappingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.button.name(), self.key)?;
        if let Some(modifier) = self.modifier {
            write!(f, "+{modifier}")?;
        }
        Ok(())
    }
}

/// The rules used when nothing was configured.
fn default_rules() -> Vec<MappingRule> {
    vec![
        MappingRule::new(MouseButton::Left, KeyCode::LEFT_META, None),
        MappingRule::new(MouseButton::Middle, KeyCode::LEFT_META, Some(KeyCode::LEFT_ALT)),
        MappingRule::new(MouseButton::Right, KeyCode::LEFT_META, Some(KeyCode::RIGHT_ALT)),
    ]
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Rule table under construction.
#[derive(Debug, Default)]
pub struct MappingTable {
    rules: Vec<MappingRule>,
}

impl MappingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule for `button` from a `KEY` or `KEY+MODIFIER` string.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::TooManyRules`] when the table is full.
    /// - [`ConfigError::DuplicateButton`] when `button` already has a rule.
    /// - [`ConfigError::UnknownKey`] when either name is not whitelisted.  An
    ///   unknown modifier is an error too, never "no modifier".
    ///
    /// # Examples
    ///
    /// ```rust
    /// use moke_core::{MappingTable, MouseButton};
    ///
    /// let mut table = MappingTable::new();
    /// table.parse(MouseButton::Right, "RightCtrl+RightAlt").unwrap();
    /// assert!(table.parse(MouseButton::Right, "Windows").is_err());
    /// ```
    pub fn parse(&mut self, button: MouseButton, chord: &str) -> Result<(), ConfigError> {
        if self.rules.len() == MAX_RULES {
            return Err(ConfigError::TooManyRules { limit: MAX_RULES });
        }
        if self.rules.iter().any(|rule| rule.button == button) {
            return Err(ConfigError::DuplicateButton { button });
        }

        let (key_name, modifier_name) = match chord.split_once('+') {
            Some((key, modifier)) => (key, Some(modifier)),
            None => (chord, None),
        };
        let key = resolve(key_name)?;
        let modifier = modifier_name.map(resolve).transpose()?;

        self.rules.push(MappingRule::new(button, key, modifier));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Freezes the table.
    ///
    /// An empty table is replaced by the built-in defaults.  Every chord's
    /// modifier is checked against the primary keys of all rules, then
    /// override links and the wanted-key set are computed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ModifierConflict`] for the first chord whose
    /// modifier is some rule's primary key.
    pub fn finalize(self) -> Result<Mapping, ConfigError> {
        let mut rules = if self.rules.is_empty() {
            default_rules()
        } else {
            self.rules
        };

        for ix in 0..rules.len() {
            let Some(modifier) = rules[ix].modifier else {
                continue;
            };
            if let Some(other) = rules.iter().find(|rule| rule.key == modifier) {
                return Err(ConfigError::ModifierConflict {
                    modifier,
                    chord: rules[ix].button,
                    other: other.button,
                });
            }
            let key = rules[ix].key;
            let shadowed = rules
                .iter()
                .position(|rule| rule.modifier.is_none() && rule.key == key);
            rules[ix].override_of = shadowed;
        }

        let wanted_keys = rules
            .iter()
            .flat_map(|rule| std::iter::once(rule.key).chain(rule.modifier))
            .collect();

        Ok(Mapping { rules, wanted_keys })
    }
}

fn resolve(name: &str) -> Result<KeyCode, ConfigError> {
    code_for_name(name).ok_or_else(|| ConfigError::UnknownKey(name.to_string()))
}

// ── Finalized mapping ─────────────────────────────────────────────────────────

/// Capabilities the virtual output device must register before use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDeclaration {
    /// Every button some rule can emit, in rule order.
    pub buttons: Vec<MouseButton>,
    /// Every wanted key, so suppression releases are accepted by the kernel.
    pub keys: Vec<KeyCode>,
}

/// A validated rule table.
#[derive(Debug, Clone)]
pub struct Mapping {
    pub(crate) rules: Vec<MappingRule>,
    wanted_keys: KeyBitset,
}

impl Mapping {
    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    /// Every primary and modifier key referenced by some rule.
    pub fn wanted_keys(&self) -> &KeyBitset {
        &self.wanted_keys
    }

    pub fn declaration(&self) -> DeviceDeclaration {
        DeviceDeclaration {
            buttons: self.rules.iter().map(|rule| rule.button).collect(),
            keys: self.wanted_keys.iter().collect(),
        }
    }
}

// ── Key state ─────────────────────────────────────────────────────────────────

/// Per-key tracking flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyState(pub u8);

impl KeyState {
    pub const WANTED: u8 = 0x01;
    pub const DOWN: u8 = 0x02;
    pub const CHANGED: u8 = 0x04;

    pub fn is_wanted(self) -> bool {
        self.0 & Self::WANTED != 0
    }

    pub fn is_down(self) -> bool {
        self.0 & Self::DOWN != 0
    }

    pub fn is_changed(self) -> bool {
        self.0 & Self::CHANGED != 0
    }
}

/// Key state for the whole key-code space.  Only wanted entries ever change.
#[derive(Debug, Clone)]
pub struct KeyStateTable {
    states: Vec<KeyState>,
}

impl KeyStateTable {
    /// Creates a table with every key up and the keys in `wanted` marked.
    pub fn new(wanted: &KeyBitset) -> Self {
        let mut states = vec![KeyState::default(); KEY_CNT];
        for key in wanted.iter() {
            states[key.code() as usize] = KeyState(KeyState::WANTED);
        }
        Self { states }
    }

    pub fn get(&self, key: KeyCode) -> KeyState {
        self.states
            .get(key.code() as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_wanted(&self, key: KeyCode) -> bool {
        self.get(key).is_wanted()
    }

    pub fn is_down(&self, key: KeyCode) -> bool {
        self.get(key).is_down()
    }

    /// Records a press or release of a wanted key.
    ///
    /// Returns `true` if the recorded state flipped, in which case the key is
    /// also marked changed.  Unwanted keys are ignored.
    pub fn record(&mut self, key: KeyCode, down: bool) -> bool {
        let Some(state) = self.states.get_mut(key.code() as usize) else {
            return false;
        };
        if !state.is_wanted() || state.is_down() == down {
            return false;
        }
        state.0 ^= KeyState::DOWN;
        state.0 |= KeyState::CHANGED;
        true
    }

    pub fn clear_changed(&mut self, key: KeyCode) {
        if let Some(state) = self.states.get_mut(key.code() as usize) {
            state.0 &= !KeyState::CHANGED;
        }
    }

    /// Aligns every wanted key with a snapshot of physically pressed keys.
    ///
    /// Returns the keys whose recorded state flipped.
    pub fn reconcile(&mut self, pressed: &KeyBitset) -> Vec<KeyCode> {
        let wanted: Vec<KeyCode> = (0..KEY_CNT as u16)
            .map(KeyCode)
            .filter(|key| self.is_wanted(*key))
            .collect();
        wanted
            .into_iter()
            .filter(|key| self.record(*key, pressed.test(*key)))
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn finalized(chords: &[(MouseButton, &str)]) -> Result<Mapping, ConfigError> {
        let mut table = MappingTable::new();
        for (button, chord) in chords {
            table.parse(*button, chord)?;
        }
        table.finalize()
    }

    #[test]
    fn test_parse_single_key() {
        // Arrange
        let mut table = MappingTable::new();

        // Act
        table.parse(MouseButton::Left, "windows").unwrap();

        // Assert
        let mapping = table.finalize().unwrap();
        assert_eq!(mapping.rules()[0].key, KeyCode::LEFT_META);
        assert_eq!(mapping.rules()[0].modifier, None);
    }

    #[test]
    fn test_parse_chord_resolves_both_keys() {
        let mapping = finalized(&[(MouseButton::Right, "RightCtrl+Alt_R")]).unwrap();

        let rule = &mapping.rules()[0];
        assert_eq!(rule.button, MouseButton::Right);
        assert_eq!(rule.key, KeyCode::RIGHT_CTRL);
        assert_eq!(rule.modifier, Some(KeyCode::RIGHT_ALT));
    }

    #[test]
    fn test_parse_unknown_key_is_error() {
        let mut table = MappingTable::new();
        assert_eq!(
            table.parse(MouseButton::Left, "Shift"),
            Err(ConfigError::UnknownKey("Shift".to_string()))
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_parse_unknown_modifier_is_error_not_bare_key() {
        let mut table = MappingTable::new();
        assert_eq!(
            table.parse(MouseButton::Left, "Windows+Hyper"),
            Err(ConfigError::UnknownKey("Hyper".to_string()))
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_parse_only_first_plus_splits() {
        let mut table = MappingTable::new();
        assert_eq!(
            table.parse(MouseButton::Left, "Windows+LeftAlt+RightAlt"),
            Err(ConfigError::UnknownKey("LeftAlt+RightAlt".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_duplicate_button() {
        let mut table = MappingTable::new();
        table.parse(MouseButton::Middle, "Windows").unwrap();

        let err = table.parse(MouseButton::Middle, "LeftCtrl").unwrap_err();

        assert_eq!(
            err,
            ConfigError::DuplicateButton {
                button: MouseButton::Middle
            }
        );
        assert_eq!(err.to_string(), "button 274 (MiddleMouse) is already specified");
    }

    #[test]
    fn test_parse_rejects_rule_beyond_capacity() {
        // Arrange: capacity equals the number of buttons, so fill every slot.
        let mut table = MappingTable::new();
        for button in MouseButton::ALL {
            table.parse(button, "LeftCtrl").unwrap();
        }

        // Act
        let result = table.parse(MouseButton::Left, "RightCtrl");

        // Assert: capacity is checked before uniqueness.
        assert_eq!(result, Err(ConfigError::TooManyRules { limit: MAX_RULES }));
        assert_eq!(table.len(), MAX_RULES);
    }

    #[test]
    fn test_finalize_empty_table_installs_defaults() {
        let mapping = MappingTable::new().finalize().unwrap();

        let summary: Vec<String> = mapping.rules().iter().map(|r| r.to_string()).collect();
        assert_eq!(
            summary,
            vec![
                "LeftMouse <- Windows",
                "MiddleMouse <- Windows+LeftAlt",
                "RightMouse <- Windows+RightAlt",
            ]
        );
    }

    #[test]
    fn test_finalize_links_chords_to_bare_rule() {
        let mapping = MappingTable::new().finalize().unwrap();

        let overrides: Vec<Option<usize>> =
            mapping.rules().iter().map(|r| r.override_of).collect();
        assert_eq!(overrides, vec![None, Some(0), Some(0)]);
    }

    #[test]
    fn test_finalize_no_override_without_bare_sibling() {
        let mapping = finalized(&[
            (MouseButton::Left, "LeftCtrl+LeftAlt"),
            (MouseButton::Right, "RightCtrl"),
        ])
        .unwrap();

        assert!(mapping.rules().iter().all(|r| r.override_of.is_none()));
    }

    #[test]
    fn test_finalize_marks_every_primary_and_modifier_wanted() {
        let mapping = MappingTable::new().finalize().unwrap();

        let wanted: Vec<KeyCode> = mapping.wanted_keys().iter().collect();
        assert_eq!(
            wanted,
            vec![KeyCode::LEFT_ALT, KeyCode::RIGHT_ALT, KeyCode::LEFT_META]
        );
    }

    #[test]
    fn test_finalize_rejects_modifier_used_as_primary_key() {
        // Arrange
        let mut table = MappingTable::new();
        table.parse(MouseButton::Left, "LeftAlt").unwrap();
        table.parse(MouseButton::Middle, "Windows+LeftAlt").unwrap();

        // Act
        let err = table.finalize().unwrap_err();

        // Assert
        assert_eq!(
            err,
            ConfigError::ModifierConflict {
                modifier: KeyCode::LEFT_ALT,
                chord: MouseButton::Middle,
                other: MouseButton::Left,
            }
        );
        assert_eq!(
            err.to_string(),
            "LeftAlt modifier for MiddleMouse chord is key for LeftMouse"
        );
    }

    #[test]
    fn test_finalize_rejects_chord_with_itself_as_modifier() {
        let err = finalized(&[(MouseButton::Left, "Windows+Super_L")]).unwrap_err();

        assert!(matches!(err, ConfigError::ModifierConflict { .. }));
    }

    #[test]
    fn test_declaration_lists_buttons_and_wanted_keys() {
        let mapping = finalized(&[
            (MouseButton::Right, "RightCtrl"),
            (MouseButton::Left, "Windows+LeftCtrl"),
        ])
        .unwrap();

        let declaration = mapping.declaration();

        assert_eq!(declaration.buttons, vec![MouseButton::Right, MouseButton::Left]);
        assert_eq!(
            declaration.keys,
            vec![KeyCode::LEFT_CTRL, KeyCode::RIGHT_CTRL, KeyCode::LEFT_META]
        );
    }

    #[test]
    fn test_key_state_ignores_unwanted_keys() {
        let wanted: KeyBitset = [KeyCode::LEFT_META].into_iter().collect();
        let mut keys = KeyStateTable::new(&wanted);

        assert!(!keys.record(KeyCode(30), true));
        assert!(!keys.is_down(KeyCode(30)));
        assert!(!keys.record(KeyCode(0xffff), true));
    }

    #[test]
    fn test_key_state_record_flips_once() {
        // Arrange
        let wanted: KeyBitset = [KeyCode::LEFT_META].into_iter().collect();
        let mut keys = KeyStateTable::new(&wanted);

        // Act / Assert
        assert!(keys.record(KeyCode::LEFT_META, true));
        assert!(!keys.record(KeyCode::LEFT_META, true));
        assert!(keys.is_down(KeyCode::LEFT_META));
        assert!(keys.get(KeyCode::LEFT_META).is_changed());

        keys.clear_changed(KeyCode::LEFT_META);
        assert!(!keys.get(KeyCode::LEFT_META).is_changed());
        assert!(keys.is_down(KeyCode::LEFT_META));
    }

    #[test]
    fn test_key_state_reconcile_reports_flipped_keys() {
        let wanted: KeyBitset = [KeyCode::LEFT_META, KeyCode::LEFT_ALT].into_iter().collect();
        let mut keys = KeyStateTable::new(&wanted);
        keys.record(KeyCode::LEFT_META, true);
        keys.clear_changed(KeyCode::LEFT_META);

        let pressed: KeyBitset = [KeyCode::LEFT_ALT, KeyCode(30)].into_iter().collect();
        let flipped = keys.reconcile(&pressed);

        assert_eq!(flipped, vec![KeyCode::LEFT_ALT, KeyCode::LEFT_META]);
        assert!(keys.is_down(KeyCode::LEFT_ALT));
        assert!(!keys.is_down(KeyCode::LEFT_META));
        assert!(!keys.is_down(KeyCode(30)));
    }
}
