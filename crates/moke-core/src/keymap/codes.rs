//! Linux input event codes used by Moke.
//!
//! Values come from `linux/input-event-codes.h`.  Only the handful of codes
//! the engine and device matcher care about are listed here.
//!
//! # Event types, codes and values (for beginners)
//!
//! Every kernel input event carries a *type* (what kind of thing happened), a
//! *code* (which key, axis or sync marker) and a *value*:
//!
//! | Type       | Code example     | Value meaning                      |
//! |------------|------------------|------------------------------------|
//! | `EV_KEY`   | `KEY_LEFTMETA`   | 0 = up, 1 = down, 2 = autorepeat   |
//! | `EV_SYN`   | `SYN_REPORT`     | end of one coherent frame          |
//! | `EV_SYN`   | `SYN_DROPPED`    | the kernel buffer overflowed       |
//! | `EV_MSC`   | `MSC_SCAN`       | raw hardware scan code             |
//!
//! Mouse buttons are `EV_KEY` events too; they simply use the `BTN_*` code
//! range starting at 0x110.

// ── Event types ───────────────────────────────────────────────────────────────

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;
pub const EV_MSC: u16 = 0x04;
pub const EV_LED: u16 = 0x11;
pub const EV_REP: u16 = 0x14;
/// Number of event types; the event-type bitmap has this many bits.
pub const EV_CNT: usize = 0x20;

// ── Sync codes ────────────────────────────────────────────────────────────────

pub const SYN_REPORT: u16 = 0;
pub const SYN_DROPPED: u16 = 3;

// ── Key values ────────────────────────────────────────────────────────────────

pub const KEY_RELEASED: i32 = 0;
pub const KEY_PRESSED: i32 = 1;
pub const KEY_REPEATED: i32 = 2;

// ── Key codes ─────────────────────────────────────────────────────────────────

/// Size of the key code space; the key bitmap has this many bits.
pub const KEY_CNT: usize = 0x300;

pub const KEY_LEFTCTRL: u16 = 29;
pub const KEY_LEFTALT: u16 = 56;
pub const KEY_RIGHTCTRL: u16 = 97;
pub const KEY_RIGHTALT: u16 = 100;
pub const KEY_LEFTMETA: u16 = 125;
pub const KEY_RIGHTMETA: u16 = 126;

pub const BTN_LEFT: u16 = 0x110;
pub const BTN_RIGHT: u16 = 0x111;
pub const BTN_MIDDLE: u16 = 0x112;

/// `KEY_A` through `KEY_Z`, in alphabetical order.
///
/// Evdev numbers keys by their position on a PC keyboard, so the letters are
/// not contiguous.
pub const ALPHA_KEYS: [u16; 26] = [
    30, // KEY_A
    48, // KEY_B
    46, // KEY_C
    32, // KEY_D
    18, // KEY_E
    33, // KEY_F
    34, // KEY_G
    35, // KEY_H
    23, // KEY_I
    36, // KEY_J
    37, // KEY_K
    38, // KEY_L
    50, // KEY_M
    49, // KEY_N
    24, // KEY_O
    25, // KEY_P
    16, // KEY_Q
    19, // KEY_R
    31, // KEY_S
    20, // KEY_T
    22, // KEY_U
    47, // KEY_V
    17, // KEY_W
    45, // KEY_X
    21, // KEY_Y
    44, // KEY_Z
];
