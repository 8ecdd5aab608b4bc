//! Binary codec for kernel input event records.
//!
//! Wire format (one `struct input_event`, host byte order):
//! ```text
//! [tv_sec:W][tv_usec:W][type:2][code:2][value:4]
//! ```
//! `W` is the width of a C `long` on the host, so a record is 24 bytes on
//! 64-bit Linux.  Records are read from an evdev character device and written
//! to a uinput device in exactly this layout; there is no header or framing.

use thiserror::Error;

use crate::keymap::codes::{EV_KEY, EV_SYN, SYN_DROPPED, SYN_REPORT};

/// Width of each timestamp field (`long` on Linux).
pub const TIME_FIELD_SIZE: usize = std::mem::size_of::<isize>();

/// Size of one encoded record in bytes.
pub const RECORD_SIZE: usize = 2 * TIME_FIELD_SIZE + 8;

/// Errors that can occur while decoding a read buffer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// The byte count is not a whole number of records.
    #[error("torn record: {len} bytes is not a multiple of {RECORD_SIZE}")]
    TornRecord { len: usize },
}

/// One decoded input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputRecord {
    /// Seconds part of the event timestamp.
    pub sec: i64,
    /// Microseconds part of the event timestamp.
    pub usec: i64,
    /// Event type (`EV_*`).
    pub kind: u16,
    /// Event code (`KEY_*`, `BTN_*`, `SYN_*`, ...).
    pub code: u16,
    /// Event value.
    pub value: i32,
}

impl InputRecord {
    /// Creates a record with a zero timestamp.
    pub fn new(kind: u16, code: u16, value: i32) -> Self {
        Self {
            sec: 0,
            usec: 0,
            kind,
            code,
            value,
        }
    }

    /// Creates an `EV_KEY` record.
    pub fn key(code: u16, value: i32) -> Self {
        Self::new(EV_KEY, code, value)
    }

    /// Creates an `EV_SYN`/`SYN_REPORT` record.
    pub fn syn_report() -> Self {
        Self::new(EV_SYN, SYN_REPORT, 0)
    }

    /// Returns a copy of `self` carrying the timestamp of `other`.
    pub fn stamped_like(mut self, other: &InputRecord) -> Self {
        self.sec = other.sec;
        self.usec = other.usec;
        self
    }

    pub fn is_key(&self) -> bool {
        self.kind == EV_KEY
    }

    pub fn is_syn_report(&self) -> bool {
        self.kind == EV_SYN && self.code == SYN_REPORT
    }

    pub fn is_syn_dropped(&self) -> bool {
        self.kind == EV_SYN && self.code == SYN_DROPPED
    }

    /// Decodes one record from exactly [`RECORD_SIZE`] bytes.
    fn decode(chunk: &[u8]) -> Self {
        let t = TIME_FIELD_SIZE;
        Self {
            sec: read_long(&chunk[..t]),
            usec: read_long(&chunk[t..2 * t]),
            kind: u16::from_ne_bytes([chunk[2 * t], chunk[2 * t + 1]]),
            code: u16::from_ne_bytes([chunk[2 * t + 2], chunk[2 * t + 3]]),
            value: i32::from_ne_bytes([
                chunk[2 * t + 4],
                chunk[2 * t + 5],
                chunk[2 * t + 6],
                chunk[2 * t + 7],
            ]),
        }
    }

    /// Appends the binary layout of this record to `buf`.
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.sec as isize).to_ne_bytes());
        buf.extend_from_slice(&(self.usec as isize).to_ne_bytes());
        buf.extend_from_slice(&self.kind.to_ne_bytes());
        buf.extend_from_slice(&self.code.to_ne_bytes());
        buf.extend_from_slice(&self.value.to_ne_bytes());
    }
}

fn read_long(bytes: &[u8]) -> i64 {
    let mut raw = [0u8; TIME_FIELD_SIZE];
    raw.copy_from_slice(bytes);
    isize::from_ne_bytes(raw) as i64
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes every record in a read buffer.
///
/// # Errors
///
/// Returns [`RecordError::TornRecord`] if `bytes.len()` is not a multiple of
/// [`RECORD_SIZE`].  A torn read cannot be safely reinterpreted, so no partial
/// result is returned.
///
/// # Examples
///
/// ```rust
/// use moke_core::protocol::record::{decode_records, encode_records, InputRecord};
///
/// let mut bytes = Vec::new();
/// encode_records(&[InputRecord::key(125, 1), InputRecord::syn_report()], &mut bytes);
/// let records = decode_records(&bytes).unwrap();
/// assert_eq!(records.len(), 2);
/// assert_eq!(records[0].code, 125);
/// ```
pub fn decode_records(bytes: &[u8]) -> Result<Vec<InputRecord>, RecordError> {
    if bytes.len() % RECORD_SIZE != 0 {
        return Err(RecordError::TornRecord { len: bytes.len() });
    }
    Ok(bytes.chunks_exact(RECORD_SIZE).map(InputRecord::decode).collect())
}

/// Appends the binary layout of `records` to `buf`.
pub fn encode_records(records: &[InputRecord], buf: &mut Vec<u8>) {
    buf.reserve(records.len() * RECORD_SIZE);
    for record in records {
        record.encode(buf);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
