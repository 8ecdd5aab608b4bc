//! Raw input record codec.
//!
//! Evdev and uinput both speak the same fixed-size binary record, so one
//! codec serves the read side and the write side.

pub mod record;

pub use record::{decode_records, encode_records, InputRecord, RecordError, RECORD_SIZE};
