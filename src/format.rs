//! Record stream format shared by chunk files and the final shard file.
//!
//! ```text
//! [magic: "SSHD"] [version: u8]
//! [tag: 1] [len: u32 LE] [bincode(Entry)]   (repeated)
//! [tag: 0]                                  (end marker)
//! ```
//!
//! A stream is only complete once its end marker has been written. A reader
//! that hits EOF before the end marker reports corruption, so a truncated
//! file is never mistaken for a short one.

use crate::entry::Entry;
use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

/// Magic bytes at the start of every stream.
pub const MAGIC: &[u8; 4] = b"SSHD";

/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

/// Size of the stream header (magic + version).
pub const STREAM_HEADER_SIZE: usize = 5;

const TAG_END: u8 = 0;
const TAG_ENTRY: u8 = 1;

/// Largest encoded entry a reader will accept.
pub const MAX_ENTRY_SIZE: usize = 64 * 1024 * 1024;

/// Fails with `InvalidArgument` if `entry` encodes to more than
/// [`MAX_ENTRY_SIZE`] bytes.
pub fn ensure_encodable(entry: &Entry) -> Result<()> {
    let size = bincode::serialized_size(entry)?;
    if size > MAX_ENTRY_SIZE as u64 {
        return Err(Error::invalid_argument(format!(
            "Encoded entry is {} bytes, limit is {}",
            size, MAX_ENTRY_SIZE
        )));
    }
    Ok(())
}

/// Appends entries in non-decreasing key order to a record stream.
pub struct RecordWriter<W: Write> {
    writer: W,
    last_key: Option<Vec<u8>>,
    entries: u64,
    bytes_written: u64,
    scratch: BytesMut,
}

impl RecordWriter<BufWriter<File>> {
    /// Creates (or truncates) a file and writes the stream header.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }

    /// Writes the end marker, flushes and optionally fsyncs the file.
    pub fn finish_file(mut self, sync: bool) -> Result<u64> {
        self.write_end_marker()?;
        self.writer.flush()?;
        if sync {
            self.writer.get_ref().sync_all()?;
        }
        Ok(self.entries)
    }
}

impl<W: Write> RecordWriter<W> {
    /// Wraps a writer and emits the stream header.
    pub fn new(mut writer: W) -> Result<Self> {
        writer.write_all(MAGIC)?;
        writer.write_all(&[FORMAT_VERSION])?;
        Ok(Self {
            writer,
            last_key: None,
            entries: 0,
            bytes_written: STREAM_HEADER_SIZE as u64,
            scratch: BytesMut::new(),
        })
    }

    /// Appends one entry.
    ///
    /// Keys must arrive in non-decreasing order.
    pub fn append(&mut self, entry: &Entry) -> Result<()> {
        if let Some(last) = &self.last_key {
            if entry.key() < last.as_slice() {
                return Err(Error::invalid_argument("Entries must be appended in key order"));
            }
        }

        let payload = bincode::serialize(entry)?;
        if payload.len() > MAX_ENTRY_SIZE {
            return Err(Error::invalid_argument(format!(
                "Encoded entry is {} bytes, limit is {}",
                payload.len(),
                MAX_ENTRY_SIZE
            )));
        }

        self.scratch.clear();
        self.scratch.put_u8(TAG_ENTRY);
        self.scratch.put_u32_le(payload.len() as u32);
        self.scratch.put_slice(&payload);
        self.writer.write_all(&self.scratch)?;

        self.bytes_written += self.scratch.len() as u64;
        self.entries += 1;
        let last = self.last_key.get_or_insert_with(Vec::new);
        last.clear();
        last.extend_from_slice(entry.key());
        Ok(())
    }

    /// Writes the end marker and flushes, returning the inner writer.
    pub fn finish(mut self) -> Result<W> {
        self.write_end_marker()?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    /// Number of entries appended so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Bytes written so far, including the header.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn write_end_marker(&mut self) -> Result<()> {
        self.writer.write_all(&[TAG_END])?;
        self.bytes_written += 1;
        Ok(())
    }
}

/// Reads entries back from a record stream.
pub struct RecordReader<R: Read> {
    reader: R,
    position: u64,
    finished: bool,
}

impl RecordReader<BufReader<File>> {
    /// Opens a file and validates the stream header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> RecordReader<R> {
    /// Wraps a reader and validates the stream header.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut header = [0u8; STREAM_HEADER_SIZE];
        read_exact_or_corrupt(&mut reader, &mut header, "stream header")?;
        if &header[..4] != MAGIC {
            return Err(Error::corruption("Bad magic in stream header"));
        }
        if header[4] != FORMAT_VERSION {
            return Err(Error::corruption(format!("Unsupported format version: {}", header[4])));
        }
        Ok(Self { reader, position: STREAM_HEADER_SIZE as u64, finished: false })
    }

    /// Reads the next entry.
    ///
    /// Returns `Ok(None)` once the end marker has been read, and on every
    /// call after that.
    pub fn read_next(&mut self) -> Result<Option<Entry>> {
        if self.finished {
            return Ok(None);
        }

        let start = self.position;
        let mut tag = [0u8; 1];
        read_exact_or_corrupt(&mut self.reader, &mut tag, "record tag")?;
        self.position += 1;

        match tag[0] {
            TAG_END => {
                self.finished = true;
                Ok(None)
            }
            TAG_ENTRY => {
                let mut len = [0u8; 4];
                read_exact_or_corrupt(&mut self.reader, &mut len, "record length")?;
                let len = u32::from_le_bytes(len) as usize;
                if len > MAX_ENTRY_SIZE {
                    return Err(Error::corruption(format!(
                        "Record length {} at offset {} exceeds limit",
                        len, start
                    )));
                }

                let mut payload = vec![0u8; len];
                read_exact_or_corrupt(&mut self.reader, &mut payload, "record payload")?;
                self.position += 4 + len as u64;

                let entry = bincode::deserialize(&payload).map_err(|e| {
                    Error::corruption(format!("Undecodable record at offset {}: {}", start, e))
                })?;
                Ok(Some(entry))
            }
            other => Err(Error::corruption(format!(
                "Invalid record tag {} at offset {}",
                other, start
            ))),
        }
    }

    /// Current byte offset into the stream.
    pub fn position(&self) -> u64 {
        self.position
    }
}

fn read_exact_or_corrupt<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            Err(Error::corruption(format!("Unexpected EOF while reading {}", what)))
        }
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(entries: &[Entry]) -> Vec<u8> {
        let mut writer = RecordWriter::new(Vec::new()).unwrap();
        for entry in entries {
            writer.append(entry).unwrap();
        }
        writer.finish().unwrap()
    }

    fn decode_all(data: Vec<u8>) -> Result<Vec<Entry>> {
        let mut reader = RecordReader::new(Cursor::new(data))?;
        let mut out = Vec::new();
        while let Some(entry) = reader.read_next()? {
            out.push(entry);
        }
        Ok(out)
    }

    #[test]
    fn test_empty_stream() {
        let data = encode(&[]);
        assert_eq!(data.len(), STREAM_HEADER_SIZE + 1);
        assert!(decode_all(data).unwrap().is_empty());
    }

    #[test]
    fn test_entries_read_back_in_order() {
        let entries =
            vec![Entry::new(b"a", b"1"), Entry::new(b"a", b"2"), Entry::new(b"b", b"")];
        assert_eq!(decode_all(encode(&entries)).unwrap(), entries);
    }

    #[test]
    fn test_out_of_order_append_rejected() {
        let mut writer = RecordWriter::new(Vec::new()).unwrap();
        writer.append(&Entry::new(b"b", b"1")).unwrap();
        let err = writer.append(&Entry::new(b"a", b"1")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_end_marker_is_sticky() {
        let mut reader = RecordReader::new(Cursor::new(encode(&[Entry::new(b"k", b"v")]))).unwrap();
        assert!(reader.read_next().unwrap().is_some());
        assert!(reader.read_next().unwrap().is_none());
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn test_missing_end_marker_is_corruption() {
        let mut data = encode(&[Entry::new(b"k", b"v")]);
        data.pop();
        let err = decode_all(data).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_truncated_payload_is_corruption() {
        let mut data = encode(&[Entry::new(b"key", b"value")]);
        data.truncate(data.len() - 4);
        assert!(matches!(decode_all(data), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_bad_magic_and_tag() {
        assert!(matches!(
            RecordReader::new(Cursor::new(b"NOPE\x01\x00".to_vec())),
            Err(Error::Corruption(_))
        ));

        let mut data = encode(&[]);
        let last = data.len() - 1;
        data[last] = 9;
        assert!(matches!(decode_all(data), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_undecodable_record_reports_its_offset() {
        let mut data = encode(&[Entry::new(b"a", b"1")]);
        let second = data.len() - 1;
        data.truncate(second);
        // Tag, length 1, then a byte too short for any entry.
        data.extend_from_slice(&[TAG_ENTRY, 1, 0, 0, 0, 0xff, TAG_END]);

        let mut reader = RecordReader::new(Cursor::new(data)).unwrap();
        assert!(reader.read_next().unwrap().is_some());
        match reader.read_next() {
            Err(Error::Corruption(msg)) => {
                assert!(msg.contains(&format!("offset {}", second)), "{}", msg)
            }
            other => panic!("expected corruption, got {:?}", other),
        }
    }

    #[test]
    fn test_ensure_encodable_limit() {
        assert!(ensure_encodable(&Entry::new(b"k", vec![0u8; 1024])).is_ok());
        let err = ensure_encodable(&Entry::new(b"k", vec![0u8; MAX_ENTRY_SIZE])).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stream");

        let mut writer = RecordWriter::create(&path).unwrap();
        writer.append(&Entry::new(b"x", b"1")).unwrap();
        assert_eq!(writer.finish_file(true).unwrap(), 1);

        let mut reader = RecordReader::open(&path).unwrap();
        assert_eq!(reader.read_next().unwrap(), Some(Entry::new(b"x", b"1")));
        assert_eq!(reader.read_next().unwrap(), None);
    }
}
