//! Chunk writer: spills a sealed generation to its own sorted file.

use crate::buffer::{Generation, MAX_GENERATIONS};
use crate::error::{Error, Result};
use crate::format::RecordWriter;
use std::fs;
use std::path::{Path, PathBuf};

/// Returns the chunk file name for `generation` of `shard_name`.
///
/// Format: `{shard_name}.part{generation:05}`.
pub fn chunk_file_name(shard_name: &str, generation: u64) -> Result<String> {
    if generation >= MAX_GENERATIONS {
        return Err(Error::GenerationLimit(MAX_GENERATIONS));
    }
    Ok(format!("{}.part{:05}", shard_name, generation))
}

/// A chunk file that has been fully written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFile {
    /// Generation this chunk was written from.
    pub generation: u64,
    /// Location of the chunk on disk.
    pub path: PathBuf,
    /// Number of entries in the chunk.
    pub entries: u64,
    /// File size in bytes.
    pub size: u64,
}

/// Writes sealed generations to chunk files in a directory.
pub struct ChunkWriter {
    dir: PathBuf,
    shard_name: String,
    sync: bool,
}

impl ChunkWriter {
    /// Creates a chunk writer placing chunks under `dir`.
    pub fn new<P: AsRef<Path>>(dir: P, shard_name: impl Into<String>, sync: bool) -> Self {
        Self { dir: dir.as_ref().to_path_buf(), shard_name: shard_name.into(), sync }
    }

    /// Path of the chunk for `generation`.
    pub fn chunk_path(&self, generation: u64) -> Result<PathBuf> {
        Ok(self.dir.join(chunk_file_name(&self.shard_name, generation)?))
    }

    /// Serializes every entry of `generation` to a new chunk file.
    ///
    /// On failure the partial file is removed and the generation's entries
    /// are lost; they are not handed back for re-buffering.
    pub fn write(&self, generation: Generation) -> Result<ChunkFile> {
        let number = generation.number();
        let path = self.chunk_path(number)?;

        log::debug!(
            "Writing generation {} ({} entries, ~{} bytes) to {:?}",
            number,
            generation.len(),
            generation.approximate_size(),
            path
        );

        match self.write_entries(&path, generation) {
            Ok((entries, size)) => {
                log::info!("Wrote chunk {:?}: {} entries, {} bytes", path, entries, size);
                Ok(ChunkFile { generation: number, path, entries, size })
            }
            Err(e) => {
                log::warn!("Failed to write chunk {:?}: {}", path, e);
                if let Err(cleanup) = fs::remove_file(&path) {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        log::warn!("Failed to remove partial chunk {:?}: {}", path, cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    fn write_entries(&self, path: &Path, generation: Generation) -> Result<(u64, u64)> {
        let mut writer = RecordWriter::create(path)?;
        for entry in generation.into_entries() {
            writer.append(&entry)?;
        }
        let size = writer.bytes_written() + 1;
        let entries = writer.finish_file(self.sync)?;
        Ok((entries, size))
    }

    /// Directory chunks are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Shard name used as the chunk file prefix.
    pub fn shard_name(&self) -> &str {
        &self.shard_name
    }
}
