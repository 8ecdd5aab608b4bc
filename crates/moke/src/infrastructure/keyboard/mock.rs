//! In-memory keyboards for testing the startup sequence.
//!
//! # Why a mock keyboard?
//!
//! The evdev reader needs real device nodes and root access.  The
//! [`MockNamespace`] stands in for `/dev/input`: each entry is a
//! [`MockKeyboard`] with scripted capabilities and scripted reads.
//!
//! Opening an entry returns a clone of the keyboard.  The grab log is shared
//! between clones through an `Arc<Mutex<...>>`, so a test keeps a handle from
//! [`MockKeyboard::grab_log`] and inspects it after the run.
//!
//! # Usage in tests
//!
//! ```ignore
//! let keyboard = MockKeyboard::named("AT Translated Set 2 keyboard")
//!     .with_frame(&[InputRecord::key(KEY_LEFTMETA, 1), InputRecord::syn_report()]);
//! let grabs = keyboard.grab_log();
//! let mut namespace = MockNamespace::new();
//! namespace.insert("event3", keyboard);
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};

use moke_core::domain::device::KEYBOARD_EVENT_TYPES;
use moke_core::keymap::codes::{
    ALPHA_KEYS, KEY_LEFTALT, KEY_LEFTCTRL, KEY_LEFTMETA, KEY_RIGHTALT, KEY_RIGHTCTRL,
    KEY_RIGHTMETA,
};
use moke_core::{
    encode_records, DeviceNamespace, EventSource, EventTypeSet, InputRecord, KeyBitset, KeyCode,
    ProbeDevice, RawCapabilities,
};

use crate::application::startup::Keyboard;

/// Root reported by [`MockNamespace`].
pub const MOCK_ROOT: &str = "/dev/input";

/// One call recorded by the grab log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabEvent {
    Grabbed,
    Released,
}

/// A scripted keyboard.
#[derive(Debug, Clone, Default)]
pub struct MockKeyboard {
    /// Returned by `capabilities`; `None` simulates a non-evdev node.
    pub capabilities: Option<RawCapabilities>,
    /// Byte chunks returned by successive reads, then end of stream.
    pub reads: VecDeque<Vec<u8>>,
    /// Returned by `pressed_keys`.
    pub pressed: Option<KeyBitset>,
    /// When `true`, `grab` fails as if another process held the grab.
    pub grab_fails: bool,
    /// When `true`, the read after the script fails instead of ending.
    pub read_fails: bool,
    grabs: Arc<Mutex<Vec<GrabEvent>>>,
}

impl MockKeyboard {
    /// A plain keyboard with the letters and every modifier key.
    pub fn named(name: &str) -> Self {
        let mut keys = KeyBitset::new();
        for code in ALPHA_KEYS.iter().chain(&[
            KEY_LEFTCTRL,
            KEY_LEFTALT,
            KEY_RIGHTCTRL,
            KEY_RIGHTALT,
            KEY_LEFTMETA,
            KEY_RIGHTMETA,
        ]) {
            keys.set(KeyCode(*code));
        }
        Self::with_capabilities(name, KEYBOARD_EVENT_TYPES, keys)
    }

    pub fn with_capabilities(name: &str, event_types: EventTypeSet, keys: KeyBitset) -> Self {
        let mut name = name.as_bytes().to_vec();
        name.push(0);
        Self {
            capabilities: Some(RawCapabilities {
                name,
                event_types,
                keys,
            }),
            ..Self::default()
        }
    }

    /// Appends one read returning `records`.
    pub fn with_frame(mut self, records: &[InputRecord]) -> Self {
        let mut bytes = Vec::new();
        encode_records(records, &mut bytes);
        self.reads.push_back(bytes);
        self
    }

    pub fn with_pressed(mut self, pressed: KeyBitset) -> Self {
        self.pressed = Some(pressed);
        self
    }

    pub fn failing_grab(mut self) -> Self {
        self.grab_fails = true;
        self
    }

    pub fn failing_read(mut self) -> Self {
        self.read_fails = true;
        self
    }

    /// Handle on the grab log shared by every clone of this keyboard.
    pub fn grab_log(&self) -> Arc<Mutex<Vec<GrabEvent>>> {
        Arc::clone(&self.grabs)
    }
}

impl ProbeDevice for MockKeyboard {
    fn capabilities(&self) -> io::Result<RawCapabilities> {
        self.capabilities
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "not an input device"))
    }
}

impl EventSource for MockKeyboard {
    fn read_batch(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut chunk) = self.reads.pop_front() else {
            if self.read_fails {
                return Err(io::Error::new(io::ErrorKind::Other, "no such device"));
            }
            return Ok(0);
        };
        if chunk.len() > buf.len() {
            let rest = chunk.split_off(buf.len());
            self.reads.push_front(rest);
        }
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    fn pressed_keys(&mut self) -> io::Result<Option<KeyBitset>> {
        Ok(self.pressed.clone())
    }
}

impl Keyboard for MockKeyboard {
    fn grab(&mut self) -> io::Result<()> {
        if self.grab_fails {
            return Err(io::Error::new(io::ErrorKind::Other, "device or resource busy"));
        }
        self.grabs.lock().unwrap().push(GrabEvent::Grabbed);
        Ok(())
    }

    fn ungrab(&mut self) -> io::Result<()> {
        self.grabs.lock().unwrap().push(GrabEvent::Released);
        Ok(())
    }
}

// ── Namespace ─────────────────────────────────────────────────────────────────

/// A fake `/dev/input` holding named [`MockKeyboard`]s.
#[derive(Debug, Clone, Default)]
pub struct MockNamespace {
    pub devices: BTreeMap<String, MockKeyboard>,
}

impl MockNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: &str, keyboard: MockKeyboard) {
        self.devices.insert(entry.to_string(), keyboard);
    }
}

impl DeviceNamespace for MockNamespace {
    type Device = MockKeyboard;

    fn root(&self) -> &str {
        MOCK_ROOT
    }

    fn open(&self, path: &str) -> io::Result<MockKeyboard> {
        let entry = path
            .strip_prefix(MOCK_ROOT)
            .and_then(|rest| rest.strip_prefix('/'))
            .or_else(|| path.strip_prefix("./"))
            .unwrap_or(path);
        self.devices
            .get(entry)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file or directory"))
    }

    fn entries(&self) -> io::Result<Vec<String>> {
        Ok(self.devices.keys().cloned().collect())
    }
}
