//! # moke-core
//!
//! Shared library for Moke containing the key registry, the raw input record
//! codec, the keyboard-to-mouse mapping table, the device matcher and the
//! event translation engine.
//!
//! This crate has zero dependencies on OS APIs.  Everything that touches a
//! character device (opening `/dev/input/*`, ioctls, `/dev/uinput`) lives in
//! the `moke` application crate and reaches this crate only through the
//! traits defined here.
//!
//! # Architecture overview (for beginners)
//!
//! Moke lets a keyboard emulate mouse buttons.  A configured key, or a
//! key+modifier chord, is turned into a mouse button press on a virtual
//! pointing device, and the key presses that formed the chord are hidden from
//! everything downstream.
//!
//! - **`keymap`** – The tiny whitelist of keys that may be used in a chord and
//!   the mouse buttons they can drive, plus the Linux input event constants.
//!
//! - **`protocol`** – How a kernel `struct input_event` looks as bytes, and
//!   how a read buffer is turned into typed records and back.
//!
//! - **`domain`** – The mapping table (which chord drives which button), the
//!   per-key state, and the device matcher that picks the keyboard to read.
//!
//! - **`engine`** – The translation loop: raw records in, synthetic button
//!   records (plus optional passthrough) out.

pub mod domain;
pub mod engine;
pub mod keymap;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `moke_core::MappingTable` instead of `moke_core::domain::mapping::MappingTable`.
pub use domain::bitset::{EventTypeSet, KeyBitset};
pub use domain::device::{
    find_keyboard, DeviceDescriptor, DeviceNamespace, FoundDevice, MatchError, NamePattern,
    ProbeDevice, RawCapabilities, Selector,
};
pub use domain::mapping::{ConfigError, DeviceDeclaration, Mapping, MappingRule, MappingTable};
pub use engine::{Engine, EngineError, EventSink, EventSource, Passthrough};
pub use keymap::{KeyCode, MouseButton};
pub use protocol::record::{decode_records, encode_records, InputRecord, RecordError};
