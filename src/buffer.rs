//! # WriteBuffer - In-Memory Generation Buffer
//!
//! The WriteBuffer accumulates writes for the current chunk generation.
//! Entries live in a SkipSet so concurrent inserts never block each other.
//!
//! ## Design
//!
//! - Multi-map semantics: every insert is kept, including exact duplicates.
//!   Each slot carries a write sequence number that makes it unique.
//! - Slots order by key, then value, then write sequence, so a sealed
//!   generation iterates in the same order the merge uses.
//! - The active generation sits behind a `RwLock`. Inserts share the read
//!   guard. `swap` takes the write guard only long enough to replace the
//!   generation, so every insert lands in exactly one generation.

use crate::entry::Entry;
use crate::error::{Error, Result};
use crossbeam_skiplist::SkipSet;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Maximum number of generations a single shard may produce.
///
/// Chunk names carry a five-digit generation number, so numbers run from
/// `0` to `99_999`.
pub const MAX_GENERATIONS: u64 = 100_000;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Slot {
    entry: Entry,
    seq: u64,
}

/// A snapshot of the write buffer for one chunk generation.
///
/// Once returned from [`WriteBuffer::swap`] a generation is sealed: nothing
/// can insert into it anymore.
pub struct Generation {
    number: u64,
    slots: SkipSet<Slot>,
    bytes: AtomicUsize,
}

impl Generation {
    fn new(number: u64) -> Self {
        Self { number, slots: SkipSet::new(), bytes: AtomicUsize::new(0) }
    }

    fn insert(&self, entry: Entry, seq: u64) -> usize {
        self.bytes.fetch_add(entry.approximate_size(), Ordering::Relaxed);
        self.slots.insert(Slot { entry, seq });
        self.slots.len()
    }

    /// Zero-based generation number.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Number of entries in this generation.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the generation holds no entries.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Approximate size of keys and values in bytes.
    pub fn approximate_size(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Iterates over copies of the entries in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Entry> + '_ {
        self.slots.iter().map(|slot| slot.value().entry.clone())
    }

    /// Consumes the generation, yielding entries in ascending order.
    pub fn into_entries(self) -> impl Iterator<Item = Entry> {
        self.slots.into_iter().map(|slot| slot.entry)
    }
}

/// Concurrent multi-map buffer with an atomic generation swap.
///
/// # Example
///
/// ```rust
/// use sstshard::buffer::WriteBuffer;
/// use sstshard::Entry;
///
/// let buffer = WriteBuffer::new();
/// buffer.insert(Entry::new(b"b", b"1")).unwrap();
/// buffer.insert(Entry::new(b"a", b"1")).unwrap();
///
/// let sealed = buffer.swap().unwrap().unwrap();
/// assert_eq!(sealed.number(), 0);
/// assert_eq!(sealed.iter().next().unwrap().key(), b"a");
/// assert_eq!(buffer.size(), 0);
/// ```
pub struct WriteBuffer {
    active: RwLock<Generation>,
    sequence: AtomicU64,
}

impl WriteBuffer {
    /// Creates an empty buffer whose first generation is `0`.
    pub fn new() -> Self {
        Self { active: RwLock::new(Generation::new(0)), sequence: AtomicU64::new(0) }
    }

    /// Adds an entry and returns the buffered count after the insert.
    ///
    /// Fails with [`Error::GenerationLimit`] without buffering the entry once
    /// every generation number has been sealed, since nothing inserted after
    /// that point could ever reach a chunk.
    pub fn insert(&self, entry: Entry) -> Result<usize> {
        let active = self.active.read();
        if active.number >= MAX_GENERATIONS {
            return Err(Error::GenerationLimit(MAX_GENERATIONS));
        }
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        Ok(active.insert(entry, seq))
    }

    /// Number of entries in the active generation.
    pub fn size(&self) -> usize {
        self.active.read().len()
    }

    /// Number that the active generation will carry once sealed.
    pub fn next_generation(&self) -> u64 {
        self.active.read().number
    }

    /// Seals the active generation and installs a fresh, empty one.
    ///
    /// Returns `Ok(None)` without consuming a generation number when the
    /// buffer is empty. Fails with [`Error::GenerationLimit`] once the shard
    /// has used every generation number; the buffered entries stay in place.
    pub fn swap(&self) -> Result<Option<Generation>> {
        let mut active = self.active.write();
        if active.is_empty() {
            return Ok(None);
        }
        if active.number >= MAX_GENERATIONS {
            return Err(Error::GenerationLimit(MAX_GENERATIONS));
        }

        let next = Generation::new(active.number + 1);
        Ok(Some(std::mem::replace(&mut *active, next)))
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl WriteBuffer {
    pub(crate) fn with_generation(number: u64) -> Self {
        Self { active: RwLock::new(Generation::new(number)), sequence: AtomicU64::new(0) }
    }
}
