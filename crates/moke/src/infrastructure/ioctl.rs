//! evdev and uinput ioctl wrappers.
//!
//! # What is an ioctl? (for beginners)
//!
//! Device files under `/dev` accept plain `read`/`write` for their data and
//! `ioctl` for everything else.  An ioctl request number packs four fields:
//! direction (none, read, write), a "type" byte (`'E'` for evdev, `'U'` for
//! uinput), a command number and the size of the argument.  The `nix` macros
//! below compute those numbers at compile time, or at call time for the
//! buffer variants whose size is the slice length.
//!
//! | Wrapper            | Kernel name               |
//! |--------------------|---------------------------|
//! | `eviocgversion`    | `EVIOCGVERSION`           |
//! | `eviocgname`       | `EVIOCGNAME(len)`         |
//! | `eviocgbit_types`  | `EVIOCGBIT(0, len)`       |
//! | `eviocgbit_keys`   | `EVIOCGBIT(EV_KEY, len)`  |
//! | `eviocgkey`        | `EVIOCGKEY(len)`          |
//! | `eviocgrab`        | `EVIOCGRAB`               |
//! | `ui_set_evbit`     | `UI_SET_EVBIT`            |
//! | `ui_set_keybit`    | `UI_SET_KEYBIT`           |
//! | `ui_dev_create`    | `UI_DEV_CREATE`           |
//! | `ui_dev_destroy`   | `UI_DEV_DESTROY`          |
//!
//! All wrappers are `unsafe`: the caller must pass an open descriptor of the
//! right device class and buffers valid for the whole slice.

use nix::{ioctl_none, ioctl_read, ioctl_read_buf, ioctl_write_int};

const EVDEV_MAGIC: u8 = b'E';
const UINPUT_MAGIC: u8 = b'U';

// ── evdev ─────────────────────────────────────────────────────────────────────

ioctl_read!(eviocgversion, EVDEV_MAGIC, 0x01, libc::c_int);
ioctl_read_buf!(eviocgname, EVDEV_MAGIC, 0x06, u8);
ioctl_read_buf!(eviocgkey, EVDEV_MAGIC, 0x18, u8);
// EVIOCGBIT is 0x20 plus the event type.
ioctl_read_buf!(eviocgbit_types, EVDEV_MAGIC, 0x20, u8);
ioctl_read_buf!(eviocgbit_keys, EVDEV_MAGIC, 0x21, u8);
ioctl_write_int!(eviocgrab, EVDEV_MAGIC, 0x90);

// ── uinput ────────────────────────────────────────────────────────────────────

ioctl_none!(ui_dev_create, UINPUT_MAGIC, 1);
ioctl_none!(ui_dev_destroy, UINPUT_MAGIC, 2);
ioctl_write_int!(ui_set_evbit, UINPUT_MAGIC, 100);
ioctl_write_int!(ui_set_keybit, UINPUT_MAGIC, 101);
