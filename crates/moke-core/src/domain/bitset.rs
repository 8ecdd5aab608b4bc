//! Fixed-size bitsets over the evdev key-code and event-type spaces.
//!
//! The kernel reports capabilities (`EVIOCGBIT`) and pressed keys
//! (`EVIOCGKEY`) as arrays of C `unsigned long`, bit `n` of the bitmap living
//! in word `n / BITS_PER_LONG`.  [`KeyBitset::from_kernel_bytes`] accepts that
//! buffer as raw bytes and decodes it word by word in host byte order, so the
//! same code is correct on little- and big-endian machines.

use std::fmt;

use crate::keymap::codes::{EV_CNT, KEY_CNT};
use crate::keymap::KeyCode;

const WORD_BITS: usize = u64::BITS as usize;
const KEY_WORDS: usize = KEY_CNT.div_ceil(WORD_BITS);

const LONG_SIZE: usize = std::mem::size_of::<usize>();
const LONG_BITS: usize = usize::BITS as usize;

/// Size in bytes of a kernel key bitmap covering the whole key space.
pub const KEY_BITMAP_BYTES: usize = KEY_CNT / 8;

/// Size in bytes of a kernel event-type bitmap (`EV_CNT` bits, one long).
pub const EVENT_BITMAP_BYTES: usize = EV_CNT.div_ceil(LONG_BITS) * LONG_SIZE;

/// Reads one kernel `unsigned long`; a short chunk is zero-padded.
fn read_long(chunk: &[u8]) -> usize {
    let mut raw = [0u8; LONG_SIZE];
    let n = chunk.len().min(LONG_SIZE);
    raw[..n].copy_from_slice(&chunk[..n]);
    usize::from_ne_bytes(raw)
}

/// One bit per key code in `0..KEY_CNT`.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct KeyBitset {
    words: [u64; KEY_WORDS],
}

impl KeyBitset {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a kernel `unsigned long` bitmap.
    ///
    /// Bytes beyond the key space are ignored; a short buffer leaves the
    /// remaining bits clear.
    pub fn from_kernel_bytes(bytes: &[u8]) -> Self {
        let mut set = Self::new();
        for (word_ix, chunk) in bytes.chunks(LONG_SIZE).enumerate() {
            let word = read_long(chunk);
            for bit in 0..LONG_BITS {
                if word >> bit & 1 == 1 {
                    set.set_code(word_ix * LONG_BITS + bit);
                }
            }
        }
        set
    }

    /// Returns `true` if `key` is in the set.  Codes outside the key space
    /// are never present.
    pub fn test(&self, key: KeyCode) -> bool {
        let n = key.code() as usize;
        n < KEY_CNT && self.words[n / WORD_BITS] >> (n % WORD_BITS) & 1 == 1
    }

    /// Adds `key` to the set.  Returns `false` if the code is outside the key
    /// space and was not stored.
    pub fn set(&mut self, key: KeyCode) -> bool {
        self.set_code(key.code() as usize)
    }

    /// Removes `key` from the set.
    pub fn clear(&mut self, key: KeyCode) {
        let n = key.code() as usize;
        if n < KEY_CNT {
            self.words[n / WORD_BITS] &= !(1u64 << (n % WORD_BITS));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Iterates over the members in ascending code order.
    pub fn iter(&self) -> impl Iterator<Item = KeyCode> + '_ {
        (0..KEY_CNT as u16)
            .map(KeyCode)
            .filter(move |key| self.test(*key))
    }

    /// Returns the members of `self` that are absent from `other`.
    pub fn missing_from(&self, other: &KeyBitset) -> Vec<KeyCode> {
        self.iter().filter(|key| !other.test(*key)).collect()
    }

    fn set_code(&mut self, n: usize) -> bool {
        if n >= KEY_CNT {
            return false;
        }
        self.words[n / WORD_BITS] |= 1u64 << (n % WORD_BITS);
        true
    }
}

impl FromIterator<KeyCode> for KeyBitset {
    fn from_iter<I: IntoIterator<Item = KeyCode>>(iter: I) -> Self {
        let mut set = Self::new();
        for key in iter {
            set.set(key);
        }
        set
    }
}

impl fmt::Debug for KeyBitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|k| k.code())).finish()
    }
}

/// One bit per event type in `0..EV_CNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventTypeSet(pub u32);

impl EventTypeSet {
    /// Builds a set from a list of `EV_*` types.
    pub const fn of(types: &[u16]) -> Self {
        let mut bits = 0u32;
        let mut ix = 0;
        while ix < types.len() {
            bits |= 1 << types[ix];
            ix += 1;
        }
        Self(bits)
    }

    /// Decodes the kernel reply to `EVIOCGBIT(0, ...)`.
    pub fn from_kernel_bytes(bytes: &[u8]) -> Self {
        // EV_CNT is 32, so every type lives in the low half of the first long.
        Self(read_long(bytes) as u32)
    }

    pub fn contains(self, ev: u16) -> bool {
        (ev as usize) < EV_CNT && self.0 >> ev & 1 == 1
    }

    /// Returns the types in `self` that are not in `allowed`.
    pub fn outside(self, allowed: EventTypeSet) -> EventTypeSet {
        EventTypeSet(self.0 & !allowed.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::codes::{EV_KEY, EV_REL, EV_SYN};

    #[test]
    fn test_set_and_test_round_trip() {
        // Arrange
        let mut set = KeyBitset::new();

        // Act
        assert!(set.set(KeyCode::LEFT_META));
        assert!(set.set(KeyCode(0x2ff)));

        // Assert
        assert!(set.test(KeyCode::LEFT_META));
        assert!(set.test(KeyCode(0x2ff)));
        assert!(!set.test(KeyCode::LEFT_ALT));
    }

    #[test]
    fn test_out_of_range_codes_are_not_stored() {
        let mut set = KeyBitset::new();
        assert!(!set.set(KeyCode(KEY_CNT as u16)));
        assert!(!set.test(KeyCode(KEY_CNT as u16)));
        assert!(set.is_empty());
    }

    #[test]
    fn test_clear_removes_member() {
        let mut set: KeyBitset = [KeyCode::LEFT_ALT, KeyCode::RIGHT_ALT].into_iter().collect();
        set.clear(KeyCode::LEFT_ALT);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![KeyCode::RIGHT_ALT]);
    }

    #[test]
    fn test_from_kernel_bytes_decodes_host_words() {
        // Arrange: build the bitmap the way the kernel does, as an array of
        // native unsigned longs.
        let long_bits = usize::BITS as usize;
        let mut longs = vec![0usize; KEY_BITMAP_BYTES / std::mem::size_of::<usize>()];
        for code in [30usize, 125, 0x110] {
            longs[code / long_bits] |= 1 << (code % long_bits);
        }
        let bytes: Vec<u8> = longs.iter().flat_map(|l| l.to_ne_bytes()).collect();

        // Act
        let set = KeyBitset::from_kernel_bytes(&bytes);

        // Assert
        let members: Vec<u16> = set.iter().map(|k| k.code()).collect();
        assert_eq!(members, vec![30, 125, 0x110]);
    }

    #[test]
    fn test_missing_from_lists_absent_members() {
        let wanted: KeyBitset = [KeyCode::LEFT_META, KeyCode::RIGHT_ALT].into_iter().collect();
        let device: KeyBitset = [KeyCode::LEFT_META].into_iter().collect();

        assert_eq!(wanted.missing_from(&device), vec![KeyCode::RIGHT_ALT]);
        assert!(device.missing_from(&wanted).is_empty());
    }

    #[test]
    fn test_event_type_set_contains_and_outside() {
        let allowed = EventTypeSet::of(&[EV_SYN, EV_KEY]);
        let device = EventTypeSet::of(&[EV_SYN, EV_KEY, EV_REL]);

        assert!(device.contains(EV_REL));
        assert!(!allowed.contains(EV_REL));
        assert_eq!(device.outside(allowed), EventTypeSet::of(&[EV_REL]));
        assert!(allowed.outside(device).is_empty());
    }

    #[test]
    fn test_event_type_set_from_kernel_bytes() {
        let bits = EventTypeSet::of(&[EV_SYN, EV_KEY]).0 as usize;
        let set = EventTypeSet::from_kernel_bytes(&bits.to_ne_bytes());
        assert!(set.contains(EV_KEY));
        assert!(set.contains(EV_SYN));
        assert!(!set.contains(EV_REL));
    }
}
