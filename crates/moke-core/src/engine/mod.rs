//! Translation engine: turns keyboard event batches into mouse-button events.
//!
//! The engine owns the finalized [`Mapping`] and the per-key state table.  It
//! is driven either one slice of records at a time ([`Engine::process_batch`],
//! used by tests and benches) or by [`Engine::run`], which reads raw bytes
//! from an [`EventSource`] and writes encoded batches to an [`EventSink`]
//! until the source reports end of stream or fails.
//!
//! # Frames
//!
//! The kernel groups events into frames closed by `SYN_REPORT`.  Rules are
//! evaluated once per frame, and only if a wanted key changed state during
//! it.  Every output batch is written with a single call and, when it carries
//! synthetic records, ends with a copy of the input `SYN_REPORT`.
//!
//! # Dropped events
//!
//! `SYN_DROPPED` means the kernel's buffer overflowed.  Everything up to the
//! next `SYN_REPORT` is discarded.  At that report the source is asked for a
//! snapshot of the keys that are physically down; wanted keys that differ
//! from the recorded state are flipped and rules re-evaluated.  Without a
//! snapshot the recorded state is kept, so a key that is still held never
//! produces a spurious release.

use std::io;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::bitset::KeyBitset;
use crate::domain::mapping::{KeyStateTable, Mapping, MAX_RULES};
use crate::keymap::codes::{EV_KEY, EV_SYN, KEY_RELEASED, KEY_REPEATED};
use crate::keymap::{KeyCode, MouseButton};
use crate::protocol::record::{
    decode_records, encode_records, InputRecord, RecordError, RECORD_SIZE,
};

/// Records requested from the source per read.
pub const READ_BATCH: usize = 8;

/// Largest output batch: a full read of passthrough records, a button record
/// plus two suppression releases per rule, and the closing `SYN_REPORT`.
pub const OUTPUT_CAPACITY: usize = READ_BATCH + MAX_RULES * 3 + 1;

/// Consecutive failed writes after which the engine gives up.
pub const MAX_CONSECUTIVE_WRITE_FAILURES: u32 = 8;

/// Errors that stop the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Reading the keyboard failed.
    #[error("error reading keyboard")]
    Read(#[source] io::Error),

    /// The keyboard returned a partial record.
    #[error("unexpected byte count reading keyboard")]
    TornRead(#[from] RecordError),

    /// Writing to the output device kept failing.
    #[error("writing output device failed {failures} times in a row")]
    Write {
        failures: u32,
        #[source]
        source: io::Error,
    },

    /// An output batch exceeded [`OUTPUT_CAPACITY`].
    #[error("output batch overflow (capacity is {capacity} records)")]
    Overflow { capacity: usize },
}

/// Which input records are copied to the output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Passthrough {
    /// Only synthetic records are written.  Used when other readers still see
    /// the physical keyboard.
    #[default]
    Off,
    /// Press and release records of wanted keys and all non-key records are
    /// forwarded.  Repeats and unwanted keys are dropped, since the output
    /// device declares neither.
    WantedKeys,
}

/// Where raw event bytes come from.
pub trait EventSource {
    /// Reads up to `buf.len()` bytes of whole records.  `Ok(0)` is end of
    /// stream.
    fn read_batch(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Keys physically held right now, if the source can tell.
    fn pressed_keys(&mut self) -> io::Result<Option<KeyBitset>> {
        Ok(None)
    }
}

/// Where encoded output batches go.
pub trait EventSink {
    /// Writes one batch, returning the number of bytes accepted.
    fn emit(&mut self, bytes: &[u8]) -> io::Result<usize>;
}

/// A capacity-checked output batch.
#[derive(Debug, Default)]
struct OutputBatch {
    records: Vec<InputRecord>,
}

impl OutputBatch {
    fn push(&mut self, record: InputRecord) -> Result<(), EngineError> {
        if self.records.len() == OUTPUT_CAPACITY {
            return Err(EngineError::Overflow {
                capacity: OUTPUT_CAPACITY,
            });
        }
        self.records.push(record);
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Event translation state machine.
#[derive(Debug)]
pub struct Engine {
    mapping: Mapping,
    keys: KeyStateTable,
    /// Wanted keys that changed since the last evaluation, without repeats.
    touched: Vec<KeyCode>,
    /// Discarding input until the next `SYN_REPORT`.
    resync: bool,
    passthrough: Passthrough,
    /// Forwarded records waiting for the next flush.
    pending: Vec<InputRecord>,
    /// Records were flushed without a closing `SYN_REPORT`.
    unterminated: bool,
}

impl Engine {
    pub fn new(mapping: Mapping, passthrough: Passthrough) -> Self {
        let keys = KeyStateTable::new(mapping.wanted_keys());
        Self {
            mapping,
            keys,
            touched: Vec::with_capacity(MAX_RULES * 2),
            resync: false,
            passthrough,
            pending: Vec::with_capacity(READ_BATCH),
            unterminated: false,
        }
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn passthrough(&self) -> Passthrough {
        self.passthrough
    }

    /// Whether input is being discarded after `SYN_DROPPED`.
    pub fn is_resyncing(&self) -> bool {
        self.resync
    }

    /// Buttons currently held down, in rule order.
    pub fn buttons_down(&self) -> impl Iterator<Item = MouseButton> + '_ {
        self.mapping
            .rules()
            .iter()
            .filter(|rule| rule.is_down)
            .map(|rule| rule.button)
    }

    /// Processes records without a key-state snapshot source.
    pub fn feed(&mut self, records: &[InputRecord]) -> Result<Vec<Vec<InputRecord>>, EngineError> {
        self.process_batch(records, || None)
    }

    /// Processes one batch of input records.
    ///
    /// Returns the output batches in order; each must be written with one
    /// call.  `snapshot` is consulted only when a resynchronization completes.
    pub fn process_batch<F>(
        &mut self,
        records: &[InputRecord],
        mut snapshot: F,
    ) -> Result<Vec<Vec<InputRecord>>, EngineError>
    where
        F: FnMut() -> Option<KeyBitset>,
    {
        let mut out = Vec::new();

        for record in records {
            if self.resync {
                if record.is_syn_report() {
                    self.resync = false;
                    match snapshot() {
                        Some(pressed) => {
                            for key in self.keys.reconcile(&pressed) {
                                // Releases lost while dropped still reach the desktop.
                                if !self.keys.is_down(key) {
                                    self.forward(
                                        &InputRecord::key(key.code(), KEY_RELEASED)
                                            .stamped_like(record),
                                    );
                                }
                                self.touch(key);
                            }
                        }
                        None => debug!("no key snapshot, keeping recorded key state"),
                    }
                    self.end_frame(record, &mut out)?;
                }
                continue;
            }

            match record.kind {
                EV_KEY => self.on_key(record),
                EV_SYN if record.is_syn_dropped() => {
                    warn!("dropped packets, resynchronizing");
                    self.resync = true;
                    self.pending.clear();
                }
                EV_SYN if record.is_syn_report() => self.end_frame(record, &mut out)?,
                EV_SYN => {
                    self.forward(record);
                    self.flush_pending(&mut out)?;
                }
                _ => self.forward(record),
            }

            if self.pending.len() >= READ_BATCH {
                self.flush_pending(&mut out)?;
            }
        }

        self.flush_pending(&mut out)?;
        Ok(out)
    }

    /// Reads, translates and writes until end of stream or a fatal error.
    ///
    /// Interrupted reads are retried.  Failed or short writes are logged; only
    /// [`MAX_CONSECUTIVE_WRITE_FAILURES`] of them in a row stop the loop.
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K) -> Result<(), EngineError>
    where
        S: EventSource,
        K: EventSink,
    {
        let mut buf = [0u8; READ_BATCH * RECORD_SIZE];
        let mut bytes = Vec::with_capacity(OUTPUT_CAPACITY * RECORD_SIZE);
        let mut failures = 0u32;

        loop {
            let count = match source.read_batch(&mut buf) {
                Ok(0) => {
                    info!("keyboard stream ended");
                    return Ok(());
                }
                Ok(count) => count,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(EngineError::Read(e)),
            };
            let records = decode_records(&buf[..count])?;

            let batches = self.process_batch(&records, || match source.pressed_keys() {
                Ok(pressed) => pressed,
                Err(e) => {
                    warn!("cannot read key state: {e}");
                    None
                }
            })?;

            for batch in batches {
                bytes.clear();
                encode_records(&batch, &mut bytes);
                let error = match sink.emit(&bytes) {
                    Ok(written) if written == bytes.len() => {
                        failures = 0;
                        continue;
                    }
                    Ok(written) => io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!("wrote {written} of {} bytes", bytes.len()),
                    ),
                    Err(e) => e,
                };
                failures += 1;
                warn!("unexpected byte count writing: {error}");
                if failures >= MAX_CONSECUTIVE_WRITE_FAILURES {
                    return Err(EngineError::Write {
                        failures,
                        source: error,
                    });
                }
            }
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn on_key(&mut self, record: &InputRecord) {
        let key = KeyCode(record.code);
        if !self.keys.is_wanted(key) || record.value == KEY_REPEATED {
            return;
        }
        let down = record.value != KEY_RELEASED;
        // A key of a held button stays hidden until the button lifts.
        if !(down && self.held_by_button(key)) {
            self.forward(record);
        }
        if self.keys.record(key, down) {
            self.touch(key);
        }
    }

    fn held_by_button(&self, key: KeyCode) -> bool {
        self.mapping
            .rules()
            .iter()
            .any(|rule| rule.is_down && (rule.key == key || rule.modifier == Some(key)))
    }

    fn touch(&mut self, key: KeyCode) {
        if !self.touched.contains(&key) {
            self.touched.push(key);
        }
    }

    fn forward(&mut self, record: &InputRecord) {
        if self.passthrough == Passthrough::WantedKeys {
            self.pending.push(*record);
        }
    }

    /// Writes forwarded records that are not yet followed by a report.
    fn flush_pending(&mut self, out: &mut Vec<Vec<InputRecord>>) -> Result<(), EngineError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut batch = OutputBatch::default();
        for record in self.pending.drain(..) {
            batch.push(record)?;
        }
        out.push(batch.records);
        self.unterminated = true;
        Ok(())
    }

    /// Closes a frame: forwarded records, then synthetic ones, then the report.
    fn end_frame(
        &mut self,
        report: &InputRecord,
        out: &mut Vec<Vec<InputRecord>>,
    ) -> Result<(), EngineError> {
        let mut batch = OutputBatch::default();
        for record in self.pending.drain(..) {
            batch.push(record)?;
        }
        if !self.touched.is_empty() {
            self.evaluate(report, &mut batch)?;
        }
        if !batch.is_empty() || self.unterminated {
            batch.push(*report)?;
            out.push(batch.records);
            self.unterminated = false;
        }
        Ok(())
    }

    /// Recomputes every rule and appends records for each button transition.
    fn evaluate(&mut self, report: &InputRecord, batch: &mut OutputBatch) -> Result<(), EngineError> {
        let keys = &self.keys;
        let rules = &mut self.mapping.rules;

        let mut down_mask = 0u32;
        let mut override_mask = 0u32;
        for (ix, rule) in rules.iter().enumerate() {
            // A held chord ignores its modifier until the primary key lifts.
            let down = keys.is_down(rule.key)
                && rule
                    .modifier
                    .map_or(true, |modifier| rule.is_down || keys.is_down(modifier));
            if down {
                down_mask |= 1 << ix;
            }
            if let Some(shadowed) = rule.override_of {
                if down || rule.is_down {
                    override_mask |= 1 << shadowed;
                }
            }
        }
        down_mask &= !override_mask;

        for (ix, rule) in rules.iter_mut().enumerate() {
            let down = down_mask >> ix & 1 == 1;
            if down == rule.is_down {
                continue;
            }
            debug!(
                "mouse {} is {}",
                rule.button,
                if down { "pressed" } else { "released" }
            );
            rule.is_down = down;
            batch.push(InputRecord::key(rule.button.code(), down as i32).stamped_like(report))?;
            if down {
                batch.push(InputRecord::key(rule.key.code(), KEY_RELEASED).stamped_like(report))?;
                if let Some(modifier) = rule.modifier {
                    batch.push(
                        InputRecord::key(modifier.code(), KEY_RELEASED).stamped_like(report),
                    )?;
                }
            }
        }

        for key in self.touched.drain(..) {
            self.keys.clear_changed(key);
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
