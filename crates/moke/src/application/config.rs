//! Run configuration.
//!
//! [`RunConfig`] is the single source of truth for one run of the program.
//! The binary builds it from command-line arguments; tests build it directly
//! or start from [`RunConfig::default`].

use std::path::PathBuf;

use moke_core::keymap::known_key_names;
use moke_core::{ConfigError, Mapping, MappingTable, MouseButton, Passthrough, Selector};

/// Output device used when none is given.
pub const DEFAULT_OUTPUT: &str = "/dev/uinput";

/// How the keyboard is held while the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrabMode {
    /// Hold an exclusive grab for the whole run and forward the chord keys
    /// through the virtual device.
    ///
    /// No other key reaches the desktop, so the keyboard cannot type while
    /// the program runs.  Use [`GrabMode::Probe`] to keep typing.
    #[default]
    Exclusive,
    /// Grab once to detect a competing reader, release immediately and share
    /// the keyboard.  Only button records are written.
    Probe,
}

impl GrabMode {
    /// Passthrough policy that goes with this grab mode.
    pub fn passthrough(self) -> Passthrough {
        match self {
            GrabMode::Exclusive => Passthrough::WantedKeys,
            GrabMode::Probe => Passthrough::Off,
        }
    }
}

/// One chord from the command line, not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChordConfig {
    pub button: MouseButton,
    /// `KEY` or `KEY+MODIFIER`.
    pub keys: String,
}

/// All settings for one run.
///
/// # Example
///
/// ```rust
/// use moke::application::config::{GrabMode, RunConfig};
///
/// let cfg = RunConfig::default();
/// assert!(cfg.chords.is_empty());
/// assert_eq!(cfg.grab, GrabMode::Exclusive);
/// assert_eq!(cfg.output.to_str(), Some("/dev/uinput"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Configured chords in rule order.  Empty means the built-in defaults.
    pub chords: Vec<ChordConfig>,
    /// Keyboard path or name fragment.  `None` selects the default pattern.
    pub keyboard: Option<String>,
    /// uinput control device.
    pub output: PathBuf,
    pub grab: GrabMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            chords: Vec::new(),
            keyboard: None,
            output: PathBuf::from(DEFAULT_OUTPUT),
            grab: GrabMode::default(),
        }
    }
}

impl RunConfig {
    /// Builds and finalizes the chord table.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] from parsing or finalizing.
    pub fn mapping(&self) -> Result<Mapping, ConfigError> {
        let mut table = MappingTable::new();
        for chord in &self.chords {
            table.parse(chord.button, &chord.keys)?;
        }
        table.finalize()
    }

    pub fn selector(&self) -> Selector {
        Selector::new(self.keyboard.as_deref())
    }
}

/// Help text listing every accepted key and button name.
pub fn key_help() -> String {
    let keys: Vec<&str> = known_key_names().collect();
    let buttons: Vec<&str> = MouseButton::ALL.iter().map(|b| b.name()).collect();
    format!(
        "Known keys are {}\nButtons are {}\n\nIf no buttons are specified, the default mapping is:\n   -l Windows -m Windows+LeftAlt -r Windows+RightAlt",
        keys.join(", "),
        buttons.join(", ")
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use moke_core::KeyCode;

    #[test]
    fn test_default_config_uses_default_mapping() {
        let mapping = RunConfig::default().mapping().unwrap();

        assert_eq!(mapping.rules().len(), 3);
        assert_eq!(mapping.rules()[0].key, KeyCode::LEFT_META);
    }

    #[test]
    fn test_chords_are_parsed_in_order() {
        // Arrange
        let cfg = RunConfig {
            chords: vec![
                ChordConfig {
                    button: MouseButton::Right,
                    keys: "RightCtrl".to_string(),
                },
                ChordConfig {
                    button: MouseButton::Middle,
                    keys: "RightCtrl+RightAlt".to_string(),
                },
            ],
            ..RunConfig::default()
        };

        // Act
        let mapping = cfg.mapping().unwrap();

        // Assert
        let buttons: Vec<MouseButton> = mapping.rules().iter().map(|r| r.button).collect();
        assert_eq!(buttons, vec![MouseButton::Right, MouseButton::Middle]);
        assert_eq!(mapping.rules()[1].override_of, Some(0));
    }

    #[test]
    fn test_bad_chord_surfaces_config_error() {
        let cfg = RunConfig {
            chords: vec![ChordConfig {
                button: MouseButton::Left,
                keys: "CapsLock".to_string(),
            }],
            ..RunConfig::default()
        };

        assert_eq!(
            cfg.mapping().unwrap_err(),
            ConfigError::UnknownKey("CapsLock".to_string())
        );
    }

    #[test]
    fn test_grab_mode_selects_passthrough() {
        assert_eq!(GrabMode::Exclusive.passthrough(), Passthrough::WantedKeys);
        assert_eq!(GrabMode::Probe.passthrough(), Passthrough::Off);
    }

    #[test]
    fn test_selector_defaults_when_keyboard_unset() {
        assert_eq!(RunConfig::default().selector(), Selector::default());
    }

    #[test]
    fn test_key_help_lists_aliases_and_buttons() {
        let help = key_help();
        assert!(help.contains("Windows, LeftAlt"));
        assert!(help.contains("Super_R"));
        assert!(help.contains("MiddleMouse"));
    }
}
