//! Linux uinput virtual device.
//!
//! # What is uinput? (for beginners)
//!
//! `/dev/uinput` lets a user-space process create an input device.  The
//! sequence is:
//!
//! 1. Open `/dev/uinput` for writing.
//! 2. Declare the event types (`UI_SET_EVBIT`) and key codes
//!    (`UI_SET_KEYBIT`) the device will emit.  The kernel drops any event
//!    that was not declared.
//! 3. Write one `uinput_user_dev` record carrying the device name and ids.
//! 4. Call `UI_DEV_CREATE`.  A new `/dev/input/eventN` appears and the
//!    desktop treats it like any other mouse or keyboard.
//!
//! From then on every `write` of `input_event` records injects them.  The
//! device disappears on `UI_DEV_DESTROY` or when the file is closed.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use tracing::{debug, warn};

use moke_core::domain::device::VIRTUAL_DEVICE_NAME;
use moke_core::keymap::codes::EV_KEY;
use moke_core::{DeviceDeclaration, EventSink};

use crate::application::startup::OutputFactory;
use crate::infrastructure::ioctl::{ui_dev_create, ui_dev_destroy, ui_set_evbit, ui_set_keybit};

// ── uinput_user_dev ───────────────────────────────────────────────────────────

const UINPUT_MAX_NAME_SIZE: usize = 80;
const ABS_CNT: usize = 0x40;
/// name, input_id, ff_effects_max, then absmax/absmin/absfuzz/absflat.
pub const USER_DEV_SIZE: usize = UINPUT_MAX_NAME_SIZE + 8 + 4 + 4 * ABS_CNT * 4;

const BUS_VIRTUAL: u16 = 0x06;
const VENDOR_ID: u16 = 21324;
const PRODUCT_ID: u16 = 1;

/// Version id: `major * 1000 + minor` of this package.
fn version_id() -> u16 {
    let major: u16 = env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0);
    let minor: u16 = env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0);
    major.saturating_mul(1000).saturating_add(minor)
}

/// Serializes a `struct uinput_user_dev` in native byte order.
fn user_dev_bytes(name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(USER_DEV_SIZE);
    let mut name_field = [0u8; UINPUT_MAX_NAME_SIZE];
    let len = name.len().min(UINPUT_MAX_NAME_SIZE - 1);
    name_field[..len].copy_from_slice(&name.as_bytes()[..len]);
    buf.extend_from_slice(&name_field);
    for id in [BUS_VIRTUAL, VENDOR_ID, PRODUCT_ID, version_id()] {
        buf.extend_from_slice(&id.to_ne_bytes());
    }
    // ff_effects_max and the absolute-axis tables stay zero.
    buf.resize(USER_DEV_SIZE, 0);
    buf
}

// ── Factory ───────────────────────────────────────────────────────────────────

/// Creates uinput devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct UinputFactory;

impl OutputFactory for UinputFactory {
    type Sink = UinputDevice;

    fn create(&self, path: &Path, declaration: &DeviceDeclaration) -> io::Result<UinputDevice> {
        let mut file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        let fd = file.as_raw_fd();

        let codes = declaration
            .buttons
            .iter()
            .map(|button| button.code())
            .chain(declaration.keys.iter().map(|key| key.code()));

        // SAFETY: `fd` is an open uinput descriptor; each call takes its
        // argument by value.
        unsafe {
            ui_set_evbit(fd, EV_KEY.into())?;
            for code in codes {
                ui_set_keybit(fd, code.into())?;
            }
        }

        file.write_all(&user_dev_bytes(VIRTUAL_DEVICE_NAME))?;

        // SAFETY: as above; the setup record has been written.
        unsafe { ui_dev_create(fd)? };
        debug!("created `{VIRTUAL_DEVICE_NAME}' via {}", path.display());

        Ok(UinputDevice { file })
    }
}

// ── Device ────────────────────────────────────────────────────────────────────

/// A created uinput device; destroyed on drop.
#[derive(Debug)]
pub struct UinputDevice {
    file: File,
}

impl EventSink for UinputDevice {
    fn emit(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.file.write(bytes)
    }
}

impl Drop for UinputDevice {
    fn drop(&mut self) {
        // SAFETY: the descriptor is still open.
        if let Err(e) = unsafe { ui_dev_destroy(self.file.as_raw_fd()) } {
            warn!("cannot destroy virtual device: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
