//! Batched read cursor over a serialized entry stream.
//!
//! The cursor pulls up to `batch_size` entries per refill into a FIFO
//! look-ahead buffer and serves `next` from that buffer. Once a refill hits
//! the end of the stream the cursor latches as exhausted and drops its
//! source. After that `next` returns `Ok(None)` without touching any I/O.
//!
//! Not safe for concurrent use; each cursor belongs to one reader.

use crate::entry::Entry;
use crate::error::Result;
use crate::format::RecordReader;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Upper bound on up-front buffer allocation; larger batches grow on demand.
pub(crate) const PREALLOC_LIMIT: usize = 4096;

/// A source of entries that signals end of stream with `Ok(None)`.
pub trait EntrySource {
    /// Reads the next entry, or `None` at the end of the stream.
    fn read_next(&mut self) -> Result<Option<Entry>>;
}

impl<R: Read> EntrySource for RecordReader<R> {
    fn read_next(&mut self) -> Result<Option<Entry>> {
        RecordReader::read_next(self)
    }
}

impl<S: EntrySource + ?Sized> EntrySource for Box<S> {
    fn read_next(&mut self) -> Result<Option<Entry>> {
        (**self).read_next()
    }
}

/// Buffered, batch-refilling cursor.
pub struct BatchedCursor<S: EntrySource> {
    source: Option<S>,
    buffer: VecDeque<Entry>,
    batch_size: usize,
    refills: u64,
}

/// Cursor over a record stream file.
pub type FileCursor = BatchedCursor<RecordReader<BufReader<File>>>;

impl FileCursor {
    /// Opens `path` and wraps it in a cursor.
    pub fn open<P: AsRef<Path>>(path: P, batch_size: usize) -> Result<Self> {
        Ok(Self::new(RecordReader::open(path)?, batch_size))
    }
}

impl<S: EntrySource> BatchedCursor<S> {
    /// Wraps `source`, refilling `batch_size` entries at a time.
    ///
    /// A `batch_size` of zero is treated as one.
    pub fn new(source: S, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            source: Some(source),
            buffer: VecDeque::with_capacity(batch_size.min(PREALLOC_LIMIT)),
            batch_size,
            refills: 0,
        }
    }

    /// Returns the next entry, or `Ok(None)` once the stream is exhausted.
    ///
    /// Corruption and I/O errors from the source are returned as-is.
    pub fn next(&mut self) -> Result<Option<Entry>> {
        if self.buffer.is_empty() {
            self.fill_buffer()?;
        }
        Ok(self.buffer.pop_front())
    }

    /// Returns `true` if another entry is available.
    pub fn has_next(&mut self) -> Result<bool> {
        if self.buffer.is_empty() {
            self.fill_buffer()?;
        }
        Ok(!self.buffer.is_empty())
    }

    /// Returns `true` once the source has been drained and released.
    pub fn is_exhausted(&self) -> bool {
        self.source.is_none()
    }

    /// Number of entries currently held in the look-ahead buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of refills that touched the source.
    pub fn refills(&self) -> u64 {
        self.refills
    }

    /// Refills only when the buffer is empty and the source is still open.
    fn fill_buffer(&mut self) -> Result<()> {
        let source = match self.source.as_mut() {
            Some(source) if self.buffer.is_empty() => source,
            _ => return Ok(()),
        };

        self.refills += 1;
        while self.buffer.len() < self.batch_size {
            match source.read_next()? {
                Some(entry) => self.buffer.push_back(entry),
                None => {
                    self.source = None;
                    break;
                }
            }
        }
        Ok(())
    }
}

impl<S: EntrySource> Iterator for BatchedCursor<S> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        BatchedCursor::next(self).transpose()
    }
}
