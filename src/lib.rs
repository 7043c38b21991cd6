//! # sstshard - Sorted Shard Writer
//!
//! sstshard builds one shard of a sorted, immutable on-disk table. Writes
//! accumulate in memory, sorted chunks spill to disk whenever the buffer
//! fills, and closing the writer merges every chunk into a single sorted
//! file with a bounded-memory k-way merge.
//!
//! ## Architecture
//!
//! - **Entry**: ordered key/value pair; keys need not be unique
//! - **WriteBuffer**: concurrent in-memory multi-map for the current generation
//! - **ChunkWriter**: spills a sealed generation to `{shard}.partNNNNN`
//! - **BatchedCursor**: reads a record stream in fixed-size batches
//! - **Merge**: k-way merge of chunk streams into the final file
//! - **DiskShardWriter**: `write` / `flush` / `close` over all of the above
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sstshard::{DiskShardReader, DiskShardWriter, Options, ShardReader, ShardWriter};
//!
//! # fn main() -> Result<(), sstshard::Error> {
//! let options = Options::default().max_buffer_size(10_000);
//! let writer = DiskShardWriter::create("./data", "users", options)?;
//!
//! writer.write(b"carol", b"3")?;
//! writer.write(b"alice", b"1")?;
//! writer.write(b"alice", b"2")?; // duplicates are kept
//! writer.close()?;
//!
//! let reader = DiskShardReader::open("./data/users", 1024)?;
//! for entry in reader.iter()? {
//!     let entry = entry?;
//!     println!("{:?} => {:?}", entry.key(), entry.value());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod buffer;
pub mod chunk;
pub mod config;
pub mod cursor;
pub mod entry;
pub mod error;
pub mod format;
pub mod merge;
pub mod reader;
pub mod writer;

// Re-exports
pub use buffer::{Generation, WriteBuffer, MAX_GENERATIONS};
pub use chunk::{chunk_file_name, ChunkFile, ChunkWriter};
pub use config::Options;
pub use cursor::{BatchedCursor, EntrySource, FileCursor};
pub use entry::Entry;
pub use error::{Error, Result};
pub use merge::{merge_chunks, merge_cursors, MergeCandidate, MergeOutcome, MergeStats};
pub use reader::{DiskShardReader, ShardReader};
pub use writer::{DiskShardWriter, ShardWriter};
