//! Shard writer orchestration.
//!
//! `DiskShardWriter` drives the whole write path:
//!
//! ```text
//! write ──> WriteBuffer ──(threshold)──> flush ──> ChunkWriter ──> shard.partNNNNN
//! close ──> final flush ──> merge_chunks ──> shard (single sorted file)
//! ```
//!
//! ## Thread Safety
//!
//! Any number of threads may call `write` concurrently. Inserts share a read
//! guard on the lifecycle and on the buffer, so writers never wait for each
//! other. Flushes are serialized by the chunk list mutex. `close` takes the
//! lifecycle exclusively, so no write can slip in after the final flush.

use crate::buffer::WriteBuffer;
use crate::chunk::{ChunkFile, ChunkWriter};
use crate::config::Options;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::format::{self, RecordWriter};
use crate::merge::{merge_chunks, temp_path, MergeOutcome};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Write capability of a shard backend.
pub trait ShardWriter {
    /// Adds a record. Keys do not have to be unique.
    fn write(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Persists everything buffered so far as a new chunk.
    fn flush(&self) -> Result<()>;

    /// Flushes, merges all chunks into the final shard file and closes.
    fn close(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Open,
    Closed,
    Failed,
}

impl Lifecycle {
    fn ensure_open(self) -> Result<()> {
        match self {
            Lifecycle::Open => Ok(()),
            Lifecycle::Closed => Err(Error::invalid_state("shard writer is closed")),
            Lifecycle::Failed => Err(Error::invalid_state("shard writer failed to close")),
        }
    }
}

/// Writes one shard to a local directory.
///
/// # Example
///
/// ```rust,no_run
/// use sstshard::{DiskShardWriter, Options, ShardWriter};
///
/// # fn main() -> Result<(), sstshard::Error> {
/// let writer = DiskShardWriter::create("./data", "users", Options::default())?;
/// writer.write(b"bob", b"1")?;
/// writer.write(b"alice", b"2")?;
/// writer.close()?; // ./data/users now holds both entries, sorted
/// # Ok(())
/// # }
/// ```
pub struct DiskShardWriter {
    name: String,
    output: PathBuf,
    options: Options,
    buffer: WriteBuffer,
    chunk_writer: ChunkWriter,
    /// Chunks written so far, in generation order.
    chunks: Mutex<Vec<ChunkFile>>,
    lifecycle: RwLock<Lifecycle>,
}

impl DiskShardWriter {
    /// Creates a writer for shard `name` inside `dir`.
    ///
    /// Chunks are written as `dir/{name}.partNNNNN` and the final file
    /// lands at `dir/{name}`. The directory is created if missing.
    pub fn create<P: AsRef<Path>>(dir: P, name: impl Into<String>, options: Options) -> Result<Self> {
        options.validate()?;

        let name = name.into();
        if name.is_empty() || name.contains(std::path::is_separator) {
            return Err(Error::invalid_argument(format!("Invalid shard name: {:?}", name)));
        }

        let dir = dir.as_ref();
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }

        log::info!(
            "Opening shard writer {:?} in {:?} (max_buffer_size={}, batch_size={})",
            name,
            dir,
            options.max_buffer_size,
            options.batch_size
        );

        Ok(Self {
            output: dir.join(&name),
            chunk_writer: ChunkWriter::new(dir, name.clone(), options.sync_on_flush),
            name,
            options,
            buffer: WriteBuffer::new(),
            chunks: Mutex::new(Vec::new()),
            lifecycle: RwLock::new(Lifecycle::Open),
        })
    }

    /// Adds an entry, flushing if the buffer reached its threshold.
    ///
    /// Entries too large for the record format are rejected here, before
    /// they can reach the buffer and fail a later flush.
    pub fn write_entry(&self, entry: Entry) -> Result<()> {
        format::ensure_encodable(&entry)?;
        let buffered = {
            let state = self.lifecycle.read();
            state.ensure_open()?;
            self.buffer.insert(entry)?
        };

        if buffered >= self.options.max_buffer_size {
            self.flush_if_full()?;
        }
        Ok(())
    }

    /// Adds a record whose value is the `bincode` encoding of `value`.
    pub fn write_serialized<T: Serialize>(&self, key: &[u8], value: &T) -> Result<()> {
        self.write_entry(Entry::from_serialized(key, value)?)
    }

    /// Flush triggered from the write path.
    ///
    /// Several writers may cross the threshold together; only the first to
    /// get the chunk lock flushes, the rest see a small buffer and return.
    fn flush_if_full(&self) -> Result<()> {
        let state = self.lifecycle.read();
        if *state != Lifecycle::Open {
            // Entries written before close were picked up by its final flush.
            return Ok(());
        }

        let mut chunks = self.chunks.lock();
        if self.buffer.size() < self.options.max_buffer_size {
            return Ok(());
        }
        log::debug!("Write buffer reached {} entries, flushing", self.options.max_buffer_size);
        self.flush_locked(&mut chunks)
    }

    fn flush_locked(&self, chunks: &mut Vec<ChunkFile>) -> Result<()> {
        let generation = match self.buffer.swap()? {
            Some(generation) => generation,
            None => return Ok(()),
        };
        let chunk = self.chunk_writer.write(generation)?;
        chunks.push(chunk);
        Ok(())
    }

    fn finish(&self, chunks: &mut Vec<ChunkFile>) -> Result<()> {
        self.flush_locked(chunks)?;

        let paths: Vec<PathBuf> = chunks.iter().map(|c| c.path.clone()).collect();
        let expected: u64 = chunks.iter().map(|c| c.entries).sum();

        match merge_chunks(&paths, &self.output, self.options.batch_size, self.options.sync_on_flush)? {
            MergeOutcome::Empty => self.write_empty_output()?,
            MergeOutcome::Renamed => {}
            MergeOutcome::Merged(stats) => {
                if stats.entries != expected {
                    if let Err(e) = fs::remove_file(&self.output) {
                        log::warn!("Failed to remove invalid output {:?}: {}", self.output, e);
                    }
                    return Err(Error::CountMismatch { expected, actual: stats.entries });
                }
                for path in &paths {
                    if let Err(e) = fs::remove_file(path) {
                        log::warn!("Failed to remove merged chunk {:?}: {}", path, e);
                    }
                }
            }
        }

        chunks.clear();
        Ok(())
    }

    fn write_empty_output(&self) -> Result<()> {
        let tmp = temp_path(&self.output);
        RecordWriter::create(&tmp)?.finish_file(self.options.sync_on_flush)?;
        fs::rename(&tmp, &self.output)?;
        Ok(())
    }

    /// Shard name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the final shard file.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Options the writer was created with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Chunk files currently on disk, in generation order.
    ///
    /// Empty after a successful close. After a failed close it lists the
    /// chunks that were left in place.
    pub fn chunk_files(&self) -> Vec<ChunkFile> {
        self.chunks.lock().clone()
    }

    /// Entries buffered in memory and not yet flushed.
    pub fn buffered_len(&self) -> usize {
        self.buffer.size()
    }

    /// Generation number the next flush will use.
    pub fn next_generation(&self) -> u64 {
        self.buffer.next_generation()
    }

    /// Returns `true` once `close` has succeeded.
    pub fn is_closed(&self) -> bool {
        *self.lifecycle.read() == Lifecycle::Closed
    }
}

impl ShardWriter for DiskShardWriter {
    fn write(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write_entry(Entry::new(key, value))
    }

    /// A no-op when nothing is buffered.
    fn flush(&self) -> Result<()> {
        let state = self.lifecycle.read();
        state.ensure_open()?;
        let mut chunks = self.chunks.lock();
        self.flush_locked(&mut chunks)
    }

    /// Not idempotent: a second call fails with [`Error::InvalidState`].
    ///
    /// If the final flush or the merge fails the writer moves to a failed
    /// state. The final file does not exist and `chunk_files` reports which
    /// chunks remain on disk.
    fn close(&self) -> Result<()> {
        let mut state = self.lifecycle.write();
        match *state {
            Lifecycle::Open => {}
            Lifecycle::Closed => return Err(Error::invalid_state("shard writer is already closed")),
            Lifecycle::Failed => return Err(Error::invalid_state("shard writer failed to close")),
        }

        let mut chunks = self.chunks.lock();
        log::info!("Closing shard {:?}: {} chunks on disk", self.name, chunks.len());

        match self.finish(&mut chunks) {
            Ok(()) => {
                *state = Lifecycle::Closed;
                log::info!("Shard {:?} written to {:?}", self.name, self.output);
                Ok(())
            }
            Err(e) => {
                *state = Lifecycle::Failed;
                log::warn!("Closing shard {:?} failed: {}", self.name, e);
                Err(e)
            }
        }
    }
}

impl Drop for DiskShardWriter {
    fn drop(&mut self) {
        if *self.lifecycle.get_mut() == Lifecycle::Open {
            let buffered = self.buffer.size();
            if buffered > 0 || !self.chunks.get_mut().is_empty() {
                log::warn!(
                    "Shard writer {:?} dropped without close: {} buffered entries discarded",
                    self.name,
                    buffered
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MAX_GENERATIONS;
    use crate::reader::{DiskShardReader, ShardReader};
    use tempfile::TempDir;

    fn read_output(writer: &DiskShardWriter) -> Vec<Entry> {
        let reader = DiskShardReader::open(writer.output_path(), 16).unwrap();
        reader.iter().unwrap().collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_threshold_triggers_flush() {
        let dir = TempDir::new().unwrap();
        let writer =
            DiskShardWriter::create(dir.path(), "shard", Options::new().max_buffer_size(2)).unwrap();

        writer.write(b"b", b"1").unwrap();
        assert!(writer.chunk_files().is_empty());
        writer.write(b"a", b"1").unwrap();

        let chunks = writer.chunk_files();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].generation, 0);
        assert_eq!(chunks[0].path, dir.path().join("shard.part00000"));
        assert_eq!(writer.buffered_len(), 0);
        assert_eq!(writer.next_generation(), 1);
    }

    #[test]
    fn test_flush_empty_buffer_is_noop() {
        let dir = TempDir::new().unwrap();
        let writer = DiskShardWriter::create(dir.path(), "shard", Options::default()).unwrap();

        writer.flush().unwrap();
        writer.flush().unwrap();
        assert!(writer.chunk_files().is_empty());
        assert_eq!(writer.next_generation(), 0);
    }

    #[test]
    fn test_close_merges_and_removes_chunks() {
        let dir = TempDir::new().unwrap();
        let writer =
            DiskShardWriter::create(dir.path(), "shard", Options::new().max_buffer_size(2)).unwrap();

        writer.write(b"b", b"1").unwrap();
        writer.write(b"a", b"1").unwrap();
        writer.write(b"c", b"1").unwrap();
        writer.close().unwrap();

        assert!(writer.is_closed());
        assert!(writer.chunk_files().is_empty());
        assert!(!dir.path().join("shard.part00000").exists());
        assert!(!dir.path().join("shard.part00001").exists());
        assert_eq!(
            read_output(&writer),
            vec![Entry::new(b"a", b"1"), Entry::new(b"b", b"1"), Entry::new(b"c", b"1")]
        );
    }

    #[test]
    fn test_close_without_writes_creates_empty_shard() {
        let dir = TempDir::new().unwrap();
        let writer = DiskShardWriter::create(dir.path(), "shard", Options::default()).unwrap();
        writer.close().unwrap();
        assert!(writer.output_path().exists());
        assert!(read_output(&writer).is_empty());
    }

    #[test]
    fn test_operations_after_close_fail() {
        let dir = TempDir::new().unwrap();
        let writer = DiskShardWriter::create(dir.path(), "shard", Options::default()).unwrap();
        writer.write(b"k", b"v").unwrap();
        writer.close().unwrap();

        assert!(matches!(writer.write(b"k", b"v"), Err(Error::InvalidState(_))));
        assert!(matches!(writer.flush(), Err(Error::InvalidState(_))));
        assert!(matches!(writer.close(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_failed_close_keeps_chunks() {
        let dir = TempDir::new().unwrap();
        let writer =
            DiskShardWriter::create(dir.path(), "shard", Options::new().max_buffer_size(1)).unwrap();
        writer.write(b"a", b"1").unwrap();
        writer.write(b"b", b"1").unwrap();

        // A directory squatting on the output path makes the final rename fail.
        fs::create_dir(writer.output_path()).unwrap();
        fs::write(writer.output_path().join("occupied"), b"x").unwrap();

        assert!(writer.close().is_err());
        assert!(!writer.is_closed());
        assert_eq!(writer.chunk_files().len(), 2);
        assert!(writer.chunk_files().iter().all(|c| c.path.exists()));
        assert!(matches!(writer.write(b"c", b"1"), Err(Error::InvalidState(_))));
        assert!(matches!(writer.close(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_write_serialized() {
        let dir = TempDir::new().unwrap();
        let writer = DiskShardWriter::create(dir.path(), "shard", Options::default()).unwrap();
        writer.write_serialized(b"k", &vec![1u32, 2, 3]).unwrap();
        writer.close().unwrap();

        let entries = read_output(&writer);
        assert_eq!(entries[0].decode_value::<Vec<u32>>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_oversized_entry_rejected_before_buffering() {
        let dir = TempDir::new().unwrap();
        let writer = DiskShardWriter::create(dir.path(), "shard", Options::default()).unwrap();

        writer.write(b"small", b"v").unwrap();
        let big = vec![0u8; format::MAX_ENTRY_SIZE + 1024 * 1024];
        assert!(matches!(writer.write(b"big", &big), Err(Error::InvalidArgument(_))));
        assert_eq!(writer.buffered_len(), 1);

        writer.flush().unwrap();
        writer.close().unwrap();
        assert_eq!(read_output(&writer), vec![Entry::new(b"small", b"v")]);
    }

    #[test]
    fn test_write_after_last_generation_is_not_buffered() {
        let dir = TempDir::new().unwrap();
        let mut writer = DiskShardWriter::create(dir.path(), "shard", Options::default()).unwrap();
        writer.buffer = WriteBuffer::with_generation(MAX_GENERATIONS);

        assert!(matches!(writer.write(b"k", b"v"), Err(Error::GenerationLimit(_))));
        assert_eq!(writer.buffered_len(), 0);

        writer.close().unwrap();
        assert!(read_output(&writer).is_empty());
    }

    #[test]
    fn test_unbounded_batch_size() {
        let dir = TempDir::new().unwrap();
        let options = Options::new().max_buffer_size(1).batch_size(usize::MAX);
        let writer = DiskShardWriter::create(dir.path(), "shard", options).unwrap();

        writer.write(b"b", b"1").unwrap();
        writer.write(b"a", b"1").unwrap();
        assert_eq!(writer.chunk_files().len(), 2);
        writer.close().unwrap();

        let reader = DiskShardReader::open(writer.output_path(), usize::MAX).unwrap();
        let entries = reader.iter().unwrap().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(entries, vec![Entry::new(b"a", b"1"), Entry::new(b"b", b"1")]);
    }

    #[test]
    fn test_invalid_create_arguments() {
        let dir = TempDir::new().unwrap();
        assert!(DiskShardWriter::create(dir.path(), "", Options::default()).is_err());
        assert!(DiskShardWriter::create(dir.path(), "a/b", Options::default()).is_err());
        assert!(
            DiskShardWriter::create(dir.path(), "s", Options::new().batch_size(0)).is_err()
        );
    }
}
