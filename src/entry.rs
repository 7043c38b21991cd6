//! # Entry
//!
//! The key/value pair moved through every stage of the shard writer.
//!
//! ## Ordering
//!
//! Entries are ordered by:
//! 1. key (ascending, bytewise)
//! 2. value (ascending, bytewise)
//!
//! Keys are not unique. Two entries with the same key and different values
//! are distinct and both survive every stage.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// An immutable key/value pair.
///
/// # Example
///
/// ```rust
/// use sstshard::Entry;
///
/// let a = Entry::new(b"apple", b"1");
/// let b = Entry::new(b"apple", b"2");
/// assert!(a < b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Entry {
    key: Vec<u8>,
    value: Vec<u8>,
}

impl Entry {
    /// Creates a new entry from raw key and value bytes.
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    /// Creates an entry whose value is the `bincode` encoding of `value`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sstshard::Entry;
    ///
    /// let entry = Entry::from_serialized(b"user:1", &(42u32, "alice".to_string())).unwrap();
    /// let (id, name): (u32, String) = entry.decode_value().unwrap();
    /// assert_eq!(id, 42);
    /// assert_eq!(name, "alice");
    /// ```
    pub fn from_serialized<T: Serialize>(key: impl Into<Vec<u8>>, value: &T) -> Result<Self> {
        Ok(Self { key: key.into(), value: bincode::serialize(value)? })
    }

    /// Decodes the value as a `bincode`-encoded `T`.
    pub fn decode_value<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(bincode::deserialize(&self.value)?)
    }

    /// Returns the key.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Returns the value.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Splits the entry into its key and value.
    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        (self.key, self.value)
    }

    /// Approximate in-memory footprint, used for logging.
    pub(crate) fn approximate_size(&self) -> usize {
        self.key.len() + self.value.len() + 16
    }
}

impl<K: Into<Vec<u8>>, V: Into<Vec<u8>>> From<(K, V)> for Entry {
    fn from((key, value): (K, V)) -> Self {
        Entry::new(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_ordering() {
        let a1 = Entry::new(b"a", b"1");
        let a2 = Entry::new(b"a", b"2");
        let b1 = Entry::new(b"b", b"0");

        assert!(a1 < a2);
        assert!(a2 < b1);
        assert_ne!(a1, a2);
        assert_eq!(a1, Entry::new(b"a".to_vec(), b"1".to_vec()));
    }

    #[test]
    fn test_entry_key_shorter_prefix_sorts_first() {
        let short = Entry::new(b"ab", b"z");
        let long = Entry::new(b"abc", b"a");
        assert!(short < long);
    }

    #[test]
    fn test_serialized_value() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Payload {
            id: u64,
            tags: Vec<String>,
        }

        let payload = Payload { id: 7, tags: vec!["x".into(), "y".into()] };
        let entry = Entry::from_serialized(b"k", &payload).unwrap();
        assert_eq!(entry.key(), b"k");
        assert_eq!(entry.decode_value::<Payload>().unwrap(), payload);
    }

    #[test]
    fn test_decode_value_wrong_type() {
        let entry = Entry::new(b"k", vec![1u8]);
        assert!(entry.decode_value::<u64>().is_err());
    }
}
