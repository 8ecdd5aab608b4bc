//! Startup sequence: from a [`RunConfig`] to a running engine.
//!
//! The order is fixed and every step must succeed before the next one runs:
//!
//! 1. Build and finalize the chord table.
//! 2. Find the keyboard and check its capabilities.
//! 3. Check for (and, in exclusive mode, hold) the input grab.
//! 4. Create the virtual output device declaring the buttons and chord keys.
//! 5. Run the engine until the keyboard stream ends.
//!
//! Nothing is written to the output device before step 4 completes, and the
//! exclusive grab is released when [`run`] returns, whatever the outcome.
//!
//! The OS-facing pieces are reached through two ports, [`Keyboard`] and
//! [`OutputFactory`], so the whole sequence runs against in-memory mocks in
//! tests.

use std::io;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use moke_core::{
    find_keyboard, ConfigError, DeviceDeclaration, DeviceNamespace, Engine, EngineError,
    EventSink, EventSource, MatchError, ProbeDevice,
};

use super::config::{GrabMode, RunConfig};

// ── Ports ─────────────────────────────────────────────────────────────────────

/// An opened physical keyboard.
pub trait Keyboard: ProbeDevice + EventSource {
    /// Takes the exclusive input grab.
    fn grab(&mut self) -> io::Result<()>;

    /// Releases the exclusive input grab.
    fn ungrab(&mut self) -> io::Result<()>;
}

/// Creates the virtual output device.
pub trait OutputFactory {
    type Sink: EventSink;

    /// Opens `path` and registers a device that can emit exactly the codes in
    /// `declaration`.
    fn create(&self, path: &Path, declaration: &DeviceDeclaration) -> io::Result<Self::Sink>;
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Fatal errors from startup or the engine loop.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("keyboard `{path}' is grabbed by another process")]
    GrabConflict {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot initialize output `{}'", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl AppError {
    /// `true` when no keyboard matched the selector.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::Match(MatchError::NotFound { .. }))
    }
}

// ── Grab guard ────────────────────────────────────────────────────────────────

/// Holds the exclusive grab and releases it on drop.
pub struct GrabGuard<'a, K: Keyboard> {
    keyboard: &'a mut K,
}

impl<'a, K: Keyboard> GrabGuard<'a, K> {
    pub fn acquire(keyboard: &'a mut K) -> io::Result<Self> {
        keyboard.grab()?;
        Ok(Self { keyboard })
    }
}

impl<K: Keyboard> Deref for GrabGuard<'_, K> {
    type Target = K;

    fn deref(&self) -> &K {
        self.keyboard
    }
}

impl<K: Keyboard> DerefMut for GrabGuard<'_, K> {
    fn deref_mut(&mut self) -> &mut K {
        self.keyboard
    }
}

impl<K: Keyboard> Drop for GrabGuard<'_, K> {
    fn drop(&mut self) {
        if let Err(e) = self.keyboard.ungrab() {
            warn!("cannot release keyboard grab: {e}");
        }
    }
}

// ── Sequence ──────────────────────────────────────────────────────────────────

/// Runs the full startup sequence and then the engine loop.
///
/// Returns `Ok(())` when the keyboard stream ends normally.
///
/// # Errors
///
/// Returns the first [`AppError`] from any step.  Earlier steps leave no
/// trace: a failed grab check means no output device was created.
pub fn run<N, O>(config: &RunConfig, namespace: &N, outputs: &O) -> Result<(), AppError>
where
    N: DeviceNamespace,
    N::Device: Keyboard,
    O: OutputFactory,
{
    let mapping = config.mapping()?;
    for rule in mapping.rules() {
        debug!("chord {rule}");
    }

    let selector = config.selector();
    let found = find_keyboard(namespace, &selector, mapping.wanted_keys())?;
    info!("using keyboard `{}' ({})", found.path, found.descriptor.name);
    let path = found.path;
    let mut keyboard = found.device;

    let declaration = mapping.declaration();
    let mut engine = Engine::new(mapping, config.grab.passthrough());

    match config.grab {
        GrabMode::Exclusive => {
            let mut guard = GrabGuard::acquire(&mut keyboard)
                .map_err(|source| AppError::GrabConflict {
                    path: path.clone(),
                    source,
                })?;
            let mut sink = create_output(outputs, &config.output, &declaration)?;
            engine.run(&mut *guard, &mut sink)?;
        }
        GrabMode::Probe => {
            {
                let _probe = GrabGuard::acquire(&mut keyboard).map_err(|source| {
                    AppError::GrabConflict {
                        path: path.clone(),
                        source,
                    }
                })?;
            }
            let mut sink = create_output(outputs, &config.output, &declaration)?;
            engine.run(&mut keyboard, &mut sink)?;
        }
    }
    Ok(())
}

fn create_output<O: OutputFactory>(
    outputs: &O,
    path: &Path,
    declaration: &DeviceDeclaration,
) -> Result<O::Sink, AppError> {
    let sink = outputs
        .create(path, declaration)
        .map_err(|source| AppError::Output {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(
        "output `{}' declares {} buttons and {} keys",
        path.display(),
        declaration.buttons.len(),
        declaration.keys.len()
    );
    Ok(sink)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::ChordConfig;
    use crate::infrastructure::keyboard::mock::{GrabEvent, MockKeyboard, MockNamespace};
    use crate::infrastructure::virtual_device::mock::MockOutputFactory;
    use moke_core::keymap::codes::{BTN_LEFT, KEY_LEFTMETA, KEY_RIGHTCTRL};
    use moke_core::{InputRecord, MouseButton};

    fn namespace_with(keyboard: MockKeyboard) -> MockNamespace {
        let mut namespace = MockNamespace::new();
        namespace.insert("event3", keyboard);
        namespace
    }

    #[test]
    fn test_exclusive_run_grabs_then_releases() {
        // Arrange
        let keyboard = MockKeyboard::named("AT Translated Set 2 keyboard")
            .with_frame(&[InputRecord::key(KEY_LEFTMETA, 1), InputRecord::syn_report()]);
        let grabs = keyboard.grab_log();
        let namespace = namespace_with(keyboard);
        let outputs = MockOutputFactory::new();

        // Act
        run(&RunConfig::default(), &namespace, &outputs).unwrap();

        // Assert
        assert_eq!(
            *grabs.lock().unwrap(),
            vec![GrabEvent::Grabbed, GrabEvent::Released]
        );
        let written = outputs.written_records();
        assert!(written.iter().any(|r| r.code == BTN_LEFT && r.value == 1));
    }

    #[test]
    fn test_grab_conflict_creates_no_output() {
        // Arrange
        let keyboard = MockKeyboard::named("AT Translated Set 2 keyboard").failing_grab();
        let namespace = namespace_with(keyboard);
        let outputs = MockOutputFactory::new();

        // Act
        let err = run(&RunConfig::default(), &namespace, &outputs).unwrap_err();

        // Assert
        assert!(matches!(err, AppError::GrabConflict { ref path, .. } if path == "/dev/input/event3"));
        assert!(outputs.created.lock().unwrap().is_empty());
    }

    #[test]
    fn test_probe_mode_releases_before_running() {
        // Arrange
        let keyboard = MockKeyboard::named("AT Translated Set 2 keyboard")
            .with_frame(&[InputRecord::key(KEY_LEFTMETA, 1), InputRecord::syn_report()]);
        let grabs = keyboard.grab_log();
        let namespace = namespace_with(keyboard);
        let outputs = MockOutputFactory::new();
        let cfg = RunConfig {
            grab: GrabMode::Probe,
            ..RunConfig::default()
        };

        // Act
        run(&cfg, &namespace, &outputs).unwrap();

        // Assert
        assert_eq!(
            *grabs.lock().unwrap(),
            vec![GrabEvent::Grabbed, GrabEvent::Released]
        );
        // No key passthrough when the keyboard is shared.
        let written = outputs.written_records();
        assert!(written.iter().all(|r| r.code != KEY_LEFTMETA || r.value == 0));
    }

    #[test]
    fn test_output_declares_chord_keys_and_buttons() {
        // Arrange
        let keyboard = MockKeyboard::named("AT Translated Set 2 keyboard");
        let namespace = namespace_with(keyboard);
        let outputs = MockOutputFactory::new();
        let cfg = RunConfig {
            chords: vec![ChordConfig {
                button: MouseButton::Right,
                keys: "RightCtrl".to_string(),
            }],
            ..RunConfig::default()
        };

        // Act
        run(&cfg, &namespace, &outputs).unwrap();

        // Assert
        let created = outputs.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        let (path, declaration) = &created[0];
        assert_eq!(path, &PathBuf::from("/dev/uinput"));
        assert_eq!(declaration.buttons, vec![MouseButton::Right]);
        assert_eq!(
            declaration.keys.iter().map(|k| k.code()).collect::<Vec<_>>(),
            vec![KEY_RIGHTCTRL]
        );
    }

    #[test]
    fn test_output_failure_is_reported_with_path() {
        let namespace = namespace_with(MockKeyboard::named("AT Translated Set 2 keyboard"));
        let outputs = MockOutputFactory {
            should_fail: true,
            ..MockOutputFactory::new()
        };

        let err = run(&RunConfig::default(), &namespace, &outputs).unwrap_err();

        assert_eq!(err.to_string(), "cannot initialize output `/dev/uinput'");
    }

    #[test]
    fn test_config_error_stops_before_device_search() {
        let namespace = MockNamespace::new();
        let outputs = MockOutputFactory::new();
        let cfg = RunConfig {
            chords: vec![ChordConfig {
                button: MouseButton::Left,
                keys: "Bogus".to_string(),
            }],
            ..RunConfig::default()
        };

        let err = run(&cfg, &namespace, &outputs).unwrap_err();

        assert!(matches!(err, AppError::Config(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn test_missing_keyboard_is_not_found() {
        let namespace = MockNamespace::new();
        let outputs = MockOutputFactory::new();

        let err = run(&RunConfig::default(), &namespace, &outputs).unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "no keyboard matching ` keyboard$' found");
    }

    #[test]
    fn test_read_error_is_fatal_and_releases_grab() {
        // Arrange
        let keyboard = MockKeyboard::named("AT Translated Set 2 keyboard").failing_read();
        let grabs = keyboard.grab_log();
        let namespace = namespace_with(keyboard);
        let outputs = MockOutputFactory::new();

        // Act
        let err = run(&RunConfig::default(), &namespace, &outputs).unwrap_err();

        // Assert
        assert!(matches!(err, AppError::Engine(EngineError::Read(_))));
        assert_eq!(grabs.lock().unwrap().last(), Some(&GrabEvent::Released));
    }
}
