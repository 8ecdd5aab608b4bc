//! Keyboard discovery: selector parsing, capability validation and the
//! directory scan that picks exactly one device.
//!
//! The OS side is reached only through [`DeviceNamespace`] (open a path, list
//! entries) and [`ProbeDevice`] (report name and capability bitmaps), so the
//! whole decision procedure runs against in-memory fakes in tests.

use std::io;

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::bitset::{EventTypeSet, KeyBitset};
use crate::keymap::codes::{ALPHA_KEYS, EV_KEY, EV_LED, EV_MSC, EV_REP, EV_SYN};
use crate::keymap::KeyCode;

/// Selector used when none is configured.
pub const DEFAULT_SELECTOR: &str = " keyboard$";

/// Name registered for the virtual output device.  A device whose name starts
/// with this is a running instance of this program.
pub const VIRTUAL_DEVICE_NAME: &str = "Moke Key to Button Mapper";

/// Size of the buffer passed to the name query.
pub const NAME_BUFFER_SIZE: usize = 256;

/// Event types a plain keyboard may declare.
pub const KEYBOARD_EVENT_TYPES: EventTypeSet =
    EventTypeSet::of(&[EV_SYN, EV_KEY, EV_MSC, EV_LED, EV_REP]);

/// Errors that end the search for a keyboard.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    /// Nothing matched the selector.
    #[error("no keyboard matching `{selector}' found")]
    NotFound { selector: String },

    /// More than one device matched the selector.
    #[error("multiple devices found (`{first}' and `{second}'), use a more specific name?")]
    Ambiguous { first: String, second: String },

    /// Another instance of this program already owns a virtual device.
    #[error("already present at `{0}'")]
    AlreadyRunning(String),

    /// The selected keyboard cannot produce every key the rules need.
    #[error("keyboard `{path}' does not generate {}", key_list(.missing))]
    CapabilityMismatch { path: String, missing: Vec<KeyCode> },
}

fn key_list(keys: &[KeyCode]) -> String {
    keys.iter()
        .map(|key| format!("key {} ({key})", key.code()))
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Ports ─────────────────────────────────────────────────────────────────────

/// Capability query results exactly as the device reported them.
#[derive(Debug, Clone, Default)]
pub struct RawCapabilities {
    /// Name bytes as returned, including the trailing NUL.
    pub name: Vec<u8>,
    /// Declared event types.
    pub event_types: EventTypeSet,
    /// Key codes the device can generate.
    pub keys: KeyBitset,
}

/// A device that can answer capability queries.
pub trait ProbeDevice {
    /// Queries version, name and capability bitmaps.
    ///
    /// Any failed query is an error; the caller treats it as "not an input
    /// device".
    fn capabilities(&self) -> io::Result<RawCapabilities>;
}

/// A directory of input devices.
pub trait DeviceNamespace {
    type Device: ProbeDevice;

    /// Display form of the namespace root, such as `/dev/input`.
    fn root(&self) -> &str;

    /// Opens `path`.  Relative paths are resolved against [`Self::root`].
    fn open(&self, path: &str) -> io::Result<Self::Device>;

    /// Names of the character-device entries in the root, sorted.
    fn entries(&self) -> io::Result<Vec<String>>;
}

// ── Selector ──────────────────────────────────────────────────────────────────

/// How the user named the keyboard: a path, a name fragment, or both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    text: String,
}

impl Selector {
    /// Creates a selector; `None` or an empty string selects the default.
    pub fn new(text: Option<&str>) -> Self {
        let text = match text {
            Some(text) if !text.is_empty() => text,
            _ => DEFAULT_SELECTOR,
        };
        Self {
            text: text.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Starts with `/` or `./`.
    pub fn is_pathname(&self) -> bool {
        self.text.starts_with('/') || self.text.starts_with("./")
    }

    /// Worth trying as a direct open: a pathname, or anything without a space.
    pub fn may_be_path(&self) -> bool {
        self.is_pathname() || !self.text.contains(' ')
    }

    pub fn pattern(&self) -> NamePattern {
        NamePattern::parse(&self.text)
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::new(None)
    }
}

/// A name fragment with optional `^` and `$` anchors.  Not a regex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern {
    pub fragment: String,
    pub anchor_start: bool,
    pub anchor_end: bool,
}

impl NamePattern {
    /// Splits the anchors off `text`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use moke_core::NamePattern;
    ///
    /// let pattern = NamePattern::parse("^AT Translated");
    /// assert!(pattern.matches("AT Translated Set 2 keyboard"));
    /// assert!(!pattern.matches("Mock AT Translated"));
    /// ```
    pub fn parse(text: &str) -> Self {
        let anchor_start = text.starts_with('^');
        let rest = if anchor_start { &text[1..] } else { text };
        let anchor_end = rest.ends_with('$');
        let fragment = if anchor_end {
            &rest[..rest.len() - 1]
        } else {
            rest
        };
        Self {
            fragment: fragment.to_string(),
            anchor_start,
            anchor_end,
        }
    }

    /// Compares byte for byte; `name` need not be valid UTF-8.
    pub fn matches(&self, name: impl AsRef<[u8]>) -> bool {
        let name = name.as_ref();
        let fragment = self.fragment.as_bytes();
        match (self.anchor_start, self.anchor_end) {
            (true, true) => name == fragment,
            (true, false) => name.starts_with(fragment),
            (false, true) => name.ends_with(fragment),
            (false, false) => {
                fragment.is_empty() || name.windows(fragment.len()).any(|w| w == fragment)
            }
        }
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

/// A validated input device that declares key events.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    /// Display form of the name; invalid UTF-8 is replaced.
    pub name: String,
    /// The name as reported, without its NUL.
    pub raw_name: Vec<u8>,
    pub event_types: EventTypeSet,
    pub keys: KeyBitset,
}

/// Why a device was passed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    BadName,
    NoKeyEvents,
}

impl DeviceDescriptor {
    /// Checks the name is NUL-terminated and the device declares `EV_KEY`.
    fn from_raw(raw: RawCapabilities) -> Result<Self, Rejection> {
        let name = match raw.name.split_last() {
            Some((&0, name)) if raw.name.len() <= NAME_BUFFER_SIZE => name,
            _ => return Err(Rejection::BadName),
        };
        if !raw.event_types.contains(EV_KEY) {
            return Err(Rejection::NoKeyEvents);
        }
        Ok(Self {
            name: String::from_utf8_lossy(name).into_owned(),
            raw_name: name.to_vec(),
            event_types: raw.event_types,
            keys: raw.keys,
        })
    }

    /// Whether this is the virtual device of a running instance.
    pub fn is_own_virtual_device(&self) -> bool {
        self.raw_name.starts_with(VIRTUAL_DEVICE_NAME.as_bytes())
    }

    /// Declares only keyboard event types and has every letter key.
    pub fn looks_like_keyboard(&self) -> bool {
        self.event_types.outside(KEYBOARD_EVENT_TYPES).is_empty()
            && ALPHA_KEYS.iter().all(|code| self.keys.test(KeyCode(*code)))
    }
}

/// The keyboard chosen by [`find_keyboard`], still open.
#[derive(Debug)]
pub struct FoundDevice<D> {
    /// Path as the user would write it.
    pub path: String,
    pub descriptor: DeviceDescriptor,
    pub device: D,
}

enum Verdict {
    Rejected,
    OwnDevice,
    Usable(DeviceDescriptor),
}

/// Runs the validation steps on one open device.
///
/// `scanning` enables the running-instance check; `pattern` is applied last.
fn inspect<D: ProbeDevice>(
    device: &D,
    path: &str,
    scanning: bool,
    pattern: Option<&NamePattern>,
) -> Verdict {
    let raw = match device.capabilities() {
        Ok(raw) => raw,
        Err(err) => {
            debug!("rejecting `{path}': not an evdev device ({err})");
            return Verdict::Rejected;
        }
    };
    let descriptor = match DeviceDescriptor::from_raw(raw) {
        Ok(descriptor) => descriptor,
        Err(Rejection::BadName) => {
            debug!("rejecting `{path}': name badly formed");
            return Verdict::Rejected;
        }
        Err(Rejection::NoKeyEvents) => {
            debug!("rejecting `{path}': not a keyboard");
            return Verdict::Rejected;
        }
    };
    let name = descriptor.name.as_str();

    if scanning && descriptor.is_own_virtual_device() {
        debug!("own virtual device at `{path}'");
        return Verdict::OwnDevice;
    }
    if !descriptor.looks_like_keyboard() {
        debug!("rejecting `{path}' ({name}): not a plain keyboard");
        return Verdict::Rejected;
    }
    if let Some(pattern) = pattern {
        if !pattern.matches(&descriptor.raw_name) {
            debug!("rejecting `{path}' ({name}): does not match pattern");
            return Verdict::Rejected;
        }
    }

    debug!("found keyboard `{path}' ({name})");
    Verdict::Usable(descriptor)
}

// ── Search ────────────────────────────────────────────────────────────────────

fn join(root: &str, entry: &str) -> String {
    if entry.starts_with('/') {
        entry.to_string()
    } else {
        format!("{}/{entry}", root.trim_end_matches('/'))
    }
}

/// Finds the one keyboard that matches `selector` and can generate every key
/// in `required`.
///
/// A selector that may be a path is first opened directly.  When that yields a
/// keyboard the directory scan only looks for running instances; otherwise
/// every entry is matched against the selector as a name pattern and a second
/// match is an ambiguity.
///
/// # Errors
///
/// - [`MatchError::AlreadyRunning`] if any entry is this program's own virtual
///   device, even when a keyboard was otherwise found.
/// - [`MatchError::Ambiguous`] if two entries match the pattern.
/// - [`MatchError::NotFound`] if nothing matched.
/// - [`MatchError::CapabilityMismatch`] if the match lacks required keys.
pub fn find_keyboard<N: DeviceNamespace>(
    namespace: &N,
    selector: &Selector,
    required: &KeyBitset,
) -> Result<FoundDevice<N::Device>, MatchError> {
    let mut found: Option<FoundDevice<N::Device>> = None;

    if selector.may_be_path() {
        match namespace.open(selector.as_str()) {
            Ok(device) => {
                if let Verdict::Usable(descriptor) =
                    inspect(&device, selector.as_str(), false, None)
                {
                    found = Some(FoundDevice {
                        path: selector.as_str().to_string(),
                        descriptor,
                        device,
                    });
                }
            }
            Err(err) if selector.is_pathname() => {
                warn!("cannot open `{}': {err}", selector.as_str());
            }
            Err(err) => debug!("`{}' is not a device path: {err}", selector.as_str()),
        }
    }

    let pattern = if found.is_some() {
        None
    } else {
        Some(selector.pattern())
    };
    let mut running: Option<String> = None;
    let mut ambiguous: Option<(String, String)> = None;

    match namespace.entries() {
        Ok(entries) => {
            for entry in entries {
                let path = join(namespace.root(), &entry);
                let device = match namespace.open(&entry) {
                    Ok(device) => device,
                    Err(err) => {
                        debug!("skipping `{path}': {err}");
                        continue;
                    }
                };
                match inspect(&device, &path, true, pattern.as_ref()) {
                    Verdict::Rejected => {}
                    Verdict::OwnDevice => {
                        running.get_or_insert(path);
                    }
                    Verdict::Usable(_) if pattern.is_none() => {}
                    Verdict::Usable(descriptor) => {
                        match found.as_ref().map(|first| first.path.clone()) {
                            Some(first) => {
                                ambiguous.get_or_insert((first, path));
                            }
                            None => {
                                found = Some(FoundDevice {
                                    path,
                                    descriptor,
                                    device,
                                })
                            }
                        }
                    }
                }
            }
        }
        Err(err) => warn!("cannot read {}: {err}", namespace.root()),
    }

    if let Some(path) = running {
        return Err(MatchError::AlreadyRunning(path));
    }
    if let Some((first, second)) = ambiguous {
        return Err(MatchError::Ambiguous { first, second });
    }
    let found = found.ok_or_else(|| MatchError::NotFound {
        selector: selector.as_str().to_string(),
    })?;

    let missing = required.missing_from(&found.descriptor.keys);
    if !missing.is_empty() {
        return Err(MatchError::CapabilityMismatch {
            path: found.path,
            missing,
        });
    }
    Ok(found)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
