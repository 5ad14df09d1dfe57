//! Open-addressing frequency table keyed by window content.
//!
//! Keys name a byte range of the code buffer; two keys are the same entry when
//! their bytes are identical, wherever they occur. The table never resizes.

use crate::{Address, AnalysisError};

/// Multiplier spreading FNV hashes across the slot array.
pub const MIXING_CONSTANT: u32 = 0x9E37_79B9;

/// A contiguous byte range of the code buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub offset: Address,
    pub length: u32,
}

impl WindowKey {
    pub fn new(offset: Address, length: u32) -> Self {
        Self { offset, length }
    }

    /// The bytes this key names.
    pub fn bytes<'a>(&self, code: &'a [u8]) -> &'a [u8] {
        let start = self.offset as usize;
        &code[start..start + self.length as usize]
    }

    /// Content equality: same length, then same bytes.
    pub fn content_eq(&self, other: &WindowKey, code: &[u8]) -> bool {
        self.length == other.length && self.bytes(code) == other.bytes(code)
    }
}

/// One distinct window and how often it occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyEntry {
    /// First occurrence of the window
    pub key: WindowKey,
    pub count: u32,
}

/// Fixed-capacity open-addressing table with linear probing.
#[derive(Debug, Clone)]
pub struct FrequencyTable {
    slots: Vec<Option<FrequencyEntry>>,
    occupied: usize,
}

impl FrequencyTable {
    /// Create an empty table with `capacity` slots (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            occupied: 0,
        }
    }

    /// Create a table sized for a code buffer of `code_length` bytes.
    pub fn for_code_length(code_length: usize) -> Self {
        Self::with_capacity(default_capacity(code_length))
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Count one occurrence of the window `key`, whose FNV hash is `hash`.
    ///
    /// Probing starts at `(hash * MIXING_CONSTANT) mod capacity` and walks
    /// forward with wraparound until it meets an empty slot or a slot with
    /// byte-identical content. Returns the updated count.
    pub fn mark_occurrence(
        &mut self,
        code: &[u8],
        hash: u32,
        key: WindowKey,
    ) -> Result<u32, AnalysisError> {
        let capacity = self.slots.len();
        let mut index = hash.wrapping_mul(MIXING_CONSTANT) as usize % capacity;

        for _ in 0..capacity {
            match self.slots[index] {
                Some(ref mut entry) if entry.key.content_eq(&key, code) => {
                    entry.count += 1;
                    return Ok(entry.count);
                }
                Some(_) => index = (index + 1) % capacity,
                None => {
                    self.slots[index] = Some(FrequencyEntry { key, count: 1 });
                    self.occupied += 1;
                    return Ok(1);
                }
            }
        }

        Err(AnalysisError::TableFull { capacity })
    }

    /// Move every occupied slot to the front of the slot array and return how
    /// many there are. The table is no longer probe-consistent afterwards, so
    /// only [`FrequencyTable::packed`] and further packing make sense.
    pub fn pack(&mut self) -> usize {
        let mut packed = 0;
        for unpacked in 0..self.slots.len() {
            if self.slots[unpacked].is_some() {
                if packed != unpacked {
                    self.slots[packed] = self.slots[unpacked].take();
                }
                packed += 1;
            }
        }
        packed
    }

    /// Entries in slot order, skipping empty slots.
    pub fn entries(&self) -> impl Iterator<Item = &FrequencyEntry> + '_ {
        self.slots.iter().flatten()
    }

    /// The occupied prefix after [`FrequencyTable::pack`].
    pub fn packed(&mut self) -> &mut [Option<FrequencyEntry>] {
        let packed = self.pack();
        &mut self.slots[..packed]
    }

    /// Current count for the window with the same content as `key`.
    pub fn count_of(&self, code: &[u8], key: WindowKey) -> u32 {
        self.entries()
            .find(|entry| entry.key.content_eq(&key, code))
            .map_or(0, |entry| entry.count)
    }
}

/// Slot count for a code buffer of `code_length` bytes: the load-factor
/// heuristic `(len/5 + 256 + len/3 + 65536) * 4/3`, never below
/// `2*len + 1`, which exceeds the number of distinct 1- and 2-windows.
pub fn default_capacity(code_length: usize) -> usize {
    let heuristic = (code_length / 5 + 256 + code_length / 3 + 65536) / 3 * 4;
    heuristic.max(2 * code_length + 1)
}
