//! Forward reader over a finished shard file.

use crate::cursor::FileCursor;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::format::RecordReader;
use std::path::{Path, PathBuf};

/// Read capability of a shard backend.
pub trait ShardReader {
    /// Iterator over the shard's entries in ascending order.
    type Iter: Iterator<Item = Result<Entry>>;

    /// Opens a fresh forward iterator from the start of the shard.
    fn iter(&self) -> Result<Self::Iter>;
}

/// Reads a shard file produced by [`crate::DiskShardWriter`].
#[derive(Debug, Clone)]
pub struct DiskShardReader {
    path: PathBuf,
    batch_size: usize,
}

impl DiskShardReader {
    /// Opens the shard at `path`, checking that it is a record stream.
    pub fn open<P: AsRef<Path>>(path: P, batch_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if batch_size == 0 {
            return Err(Error::invalid_argument("batch_size must be > 0"));
        }
        RecordReader::open(&path)?;
        Ok(Self { path, batch_size })
    }

    /// Path of the shard file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole shard and checks that keys never decrease.
    ///
    /// Returns the number of entries.
    pub fn verify(&self) -> Result<u64> {
        let mut count = 0;
        let mut last: Option<Entry> = None;
        for entry in self.iter()? {
            let entry = entry?;
            if let Some(prev) = &last {
                if entry.key() < prev.key() {
                    return Err(Error::corruption(format!(
                        "Key order violated after entry {} in {:?}",
                        count, self.path
                    )));
                }
            }
            last = Some(entry);
            count += 1;
        }
        Ok(count)
    }
}

impl ShardReader for DiskShardReader {
    type Iter = FileCursor;

    fn iter(&self) -> Result<FileCursor> {
        FileCursor::open(&self.path, self.batch_size)
    }
}
