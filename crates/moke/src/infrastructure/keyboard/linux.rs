//! Linux evdev keyboard reader.
//!
//! # What is evdev? (for beginners)
//!
//! Every input device the kernel knows about appears as a character device
//! under `/dev/input` (`event0`, `event1`, ...).  Reading one returns a
//! stream of fixed-size `input_event` records; ioctls report the device
//! name, which event types and key codes it can generate, and which keys are
//! currently held.
//!
//! An `EVIOCGRAB` ioctl makes the reader the only consumer of the device:
//! the desktop no longer sees its events until the grab is released or the
//! file is closed.  That is how chord keys are hidden while a button is
//! emulated.
//!
//! # Permissions
//!
//! `/dev/input/event*` is normally readable by root (or the `input` group)
//! only.

use std::fs::{self, File};
use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;

use tracing::debug;

use moke_core::domain::bitset::{EVENT_BITMAP_BYTES, KEY_BITMAP_BYTES};
use moke_core::domain::device::NAME_BUFFER_SIZE;
use moke_core::{
    DeviceNamespace, EventSource, EventTypeSet, KeyBitset, ProbeDevice, RawCapabilities,
};

use crate::application::startup::Keyboard;
use crate::infrastructure::ioctl::{
    eviocgbit_keys, eviocgbit_types, eviocgkey, eviocgname, eviocgrab, eviocgversion,
};

/// Directory scanned for keyboards.
pub const INPUT_DEV_DIR: &str = "/dev/input";

// ── Namespace ─────────────────────────────────────────────────────────────────

/// The evdev device directory.
#[derive(Debug, Clone)]
pub struct EvdevNamespace {
    root: PathBuf,
    display: String,
}

impl EvdevNamespace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let display = root.display().to_string();
        Self { root, display }
    }
}

impl Default for EvdevNamespace {
    fn default() -> Self {
        Self::new(INPUT_DEV_DIR)
    }
}

impl DeviceNamespace for EvdevNamespace {
    type Device = EvdevKeyboard;

    fn root(&self) -> &str {
        &self.display
    }

    fn open(&self, path: &str) -> io::Result<EvdevKeyboard> {
        // Absolute paths replace the root on join.
        let file = File::open(self.root.join(path))?;
        Ok(EvdevKeyboard { file })
    }

    fn entries(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_char_device() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => debug!("skipping non-UTF-8 entry {name:?}"),
            }
        }
        names.sort();
        Ok(names)
    }
}

// ── Keyboard ──────────────────────────────────────────────────────────────────

/// An open evdev device, read in blocking mode.
#[derive(Debug)]
pub struct EvdevKeyboard {
    file: File,
}

impl ProbeDevice for EvdevKeyboard {
    fn capabilities(&self) -> io::Result<RawCapabilities> {
        let fd = self.file.as_raw_fd();
        let mut version: libc::c_int = 0;
        let mut name = [0u8; NAME_BUFFER_SIZE];
        let mut types = [0u8; EVENT_BITMAP_BYTES];
        let mut keys = [0u8; KEY_BITMAP_BYTES];

        // SAFETY: `fd` is open for the lifetime of `self.file` and every
        // buffer is a live local valid for its full length.
        let name_len = unsafe {
            eviocgversion(fd, &mut version)?;
            let len = eviocgname(fd, &mut name)?;
            eviocgbit_types(fd, &mut types)?;
            eviocgbit_keys(fd, &mut keys)?;
            len
        };
        let name_len = usize::try_from(name_len).unwrap_or(0).min(name.len());

        Ok(RawCapabilities {
            name: name[..name_len].to_vec(),
            event_types: EventTypeSet::from_kernel_bytes(&types),
            keys: KeyBitset::from_kernel_bytes(&keys),
        })
    }
}

impl EventSource for EvdevKeyboard {
    fn read_batch(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn pressed_keys(&mut self) -> io::Result<Option<KeyBitset>> {
        let mut keys = [0u8; KEY_BITMAP_BYTES];
        // SAFETY: see `capabilities`.
        unsafe { eviocgkey(self.file.as_raw_fd(), &mut keys)? };
        Ok(Some(KeyBitset::from_kernel_bytes(&keys)))
    }
}

impl Keyboard for EvdevKeyboard {
    fn grab(&mut self) -> io::Result<()> {
        // SAFETY: `EVIOCGRAB` takes its argument by value.
        unsafe { eviocgrab(self.file.as_raw_fd(), 1)? };
        Ok(())
    }

    fn ungrab(&mut self) -> io::Result<()> {
        // SAFETY: as for `grab`.
        unsafe { eviocgrab(self.file.as_raw_fd(), 0)? };
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
