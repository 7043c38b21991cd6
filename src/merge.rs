//! Bounded-memory k-way merge of sorted chunk streams.
//!
//! Every source is read through a [`BatchedCursor`] and the heads of all
//! sources sit in a min-heap of [`MergeCandidate`]s. Output is staged in a
//! write buffer of at most `batch_size` entries, so memory stays at
//! `O(batch_size * (1 + sources))` regardless of the data size.
//!
//! Candidates are totally ordered by key, then value, then source index.
//! Ties never depend on heap internals, so merging the same inputs always
//! produces byte-identical output.

use crate::cursor::{BatchedCursor, EntrySource, FileCursor, PREALLOC_LIMIT};
use crate::entry::Entry;
use crate::error::Result;
use crate::format::RecordWriter;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// An entry paired with the index of the source it was read from.
#[derive(Debug, Clone)]
pub struct MergeCandidate {
    /// The entry.
    pub entry: Entry,
    /// Index of the source cursor that produced it.
    pub source_index: usize,
}

impl PartialEq for MergeCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeCandidate {}

impl PartialOrd for MergeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entry
            .key()
            .cmp(other.entry.key())
            .then_with(|| self.entry.value().cmp(other.entry.value()))
            .then_with(|| self.source_index.cmp(&other.source_index))
    }
}

/// Counters from a k-way merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Number of sources merged.
    pub sources: usize,
    /// Entries written to the output.
    pub entries: u64,
    /// Number of output batches written.
    pub batches: u64,
}

/// What [`merge_chunks`] did to produce the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No inputs; no output was written.
    Empty,
    /// A single input was renamed to the output path.
    Renamed,
    /// Two or more inputs were merged.
    Merged(MergeStats),
}

/// Merges sorted cursors into `out`, flushing every `batch_size` entries.
///
/// The caller owns `out` and is responsible for finishing it.
pub fn merge_cursors<S, W>(
    mut cursors: Vec<BatchedCursor<S>>,
    out: &mut RecordWriter<W>,
    batch_size: usize,
) -> Result<MergeStats>
where
    S: EntrySource,
    W: Write,
{
    let batch_size = batch_size.max(1);
    let mut stats = MergeStats { sources: cursors.len(), ..Default::default() };

    let mut heap = BinaryHeap::with_capacity(cursors.len());
    for (source_index, cursor) in cursors.iter_mut().enumerate() {
        if let Some(entry) = cursor.next()? {
            heap.push(Reverse(MergeCandidate { entry, source_index }));
        }
    }

    let mut write_buffer: Vec<Entry> = Vec::with_capacity(batch_size.min(PREALLOC_LIMIT));
    while let Some(Reverse(head)) = heap.pop() {
        let source_index = head.source_index;
        write_buffer.push(head.entry);

        if let Some(entry) = cursors[source_index].next()? {
            heap.push(Reverse(MergeCandidate { entry, source_index }));
        }

        if write_buffer.len() >= batch_size {
            flush_batch(out, &mut write_buffer, &mut stats)?;
        }
    }

    if !write_buffer.is_empty() {
        flush_batch(out, &mut write_buffer, &mut stats)?;
    }

    Ok(stats)
}

fn flush_batch<W: Write>(
    out: &mut RecordWriter<W>,
    batch: &mut Vec<Entry>,
    stats: &mut MergeStats,
) -> Result<()> {
    for entry in batch.iter() {
        out.append(entry)?;
    }
    stats.entries += batch.len() as u64;
    stats.batches += 1;
    batch.clear();
    Ok(())
}

/// Merges chunk files into a single sorted file at `output`.
///
/// - No chunks: nothing is written.
/// - One chunk: the chunk is renamed to `output`, content unchanged.
/// - Otherwise the merge is written to a temporary file next to `output`
///   and renamed into place on success. On failure the temporary file is
///   removed and `output` is left untouched.
///
/// Input chunk files are never deleted here.
pub fn merge_chunks<P: AsRef<Path>>(
    chunks: &[PathBuf],
    output: P,
    batch_size: usize,
    sync: bool,
) -> Result<MergeOutcome> {
    let output = output.as_ref();
    match chunks {
        [] => {
            log::debug!("No chunks to merge into {:?}", output);
            Ok(MergeOutcome::Empty)
        }
        [single] => {
            log::info!("Single chunk, renaming {:?} to {:?}", single, output);
            fs::rename(single, output)?;
            Ok(MergeOutcome::Renamed)
        }
        _ => {
            let tmp = temp_path(output);
            log::info!("Merging {} chunks into {:?}", chunks.len(), output);

            match merge_into(chunks, &tmp, batch_size, sync).and_then(|stats| {
                fs::rename(&tmp, output)?;
                Ok(stats)
            }) {
                Ok(stats) => {
                    log::info!(
                        "Merged {} entries from {} chunks into {:?} ({} batches)",
                        stats.entries,
                        stats.sources,
                        output,
                        stats.batches
                    );
                    Ok(MergeOutcome::Merged(stats))
                }
                Err(e) => {
                    log::warn!("Merge into {:?} failed: {}", output, e);
                    if let Err(cleanup) = fs::remove_file(&tmp) {
                        if cleanup.kind() != std::io::ErrorKind::NotFound {
                            log::warn!("Failed to remove partial output {:?}: {}", tmp, cleanup);
                        }
                    }
                    Err(e)
                }
            }
        }
    }
}

fn merge_into(chunks: &[PathBuf], tmp: &Path, batch_size: usize, sync: bool) -> Result<MergeStats> {
    let cursors = chunks
        .iter()
        .map(|path| FileCursor::open(path, batch_size))
        .collect::<Result<Vec<_>>>()?;

    let mut out = RecordWriter::create(tmp)?;
    let stats = merge_cursors(cursors, &mut out, batch_size)?;
    out.finish_file(sync)?;
    Ok(stats)
}

/// `{output}.tmp`, in the same directory as `output`.
pub(crate) fn temp_path(output: &Path) -> PathBuf {
    let mut name: OsString = output.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
