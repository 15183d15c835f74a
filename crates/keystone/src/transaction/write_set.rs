//! Buffered writes of an open transaction.

use std::collections::HashMap;

use keystone_storage::KeyValue;

/// Pending writes, in first-insertion order with the last value per key.
///
/// Reads through [`WriteSet::get`] see the transaction's own writes before
/// anything is committed.
#[derive(Debug, Default, Clone)]
pub struct WriteSet {
    /// Entries in the order their key was first written.
    entries: Vec<KeyValue>,
    /// Position of each key in `entries`.
    index: HashMap<Vec<u8>, usize>,
}

impl WriteSet {
    /// Create an empty write-set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write. A later write to the same key replaces the value but
    /// keeps the key's original position.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// The pending value for a key, if this transaction wrote it.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.index.get(key).map(|&i| self.entries[i].1.as_slice())
    }

    /// Number of distinct keys written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over pending writes in order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Consume the write-set, yielding pairs ready for the backend.
    #[must_use]
    pub fn into_entries(self) -> Vec<KeyValue> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins_in_first_position() {
        let mut ws = WriteSet::new();
        ws.put(b"a".to_vec(), b"1".to_vec());
        ws.put(b"b".to_vec(), b"2".to_vec());
        ws.put(b"a".to_vec(), b"3".to_vec());

        assert_eq!(ws.len(), 2);
        assert_eq!(ws.get(b"a"), Some(&b"3"[..]));
        assert_eq!(
            ws.into_entries(),
            vec![(b"a".to_vec(), b"3".to_vec()), (b"b".to_vec(), b"2".to_vec())]
        );
    }

    #[test]
    fn test_unwritten_key() {
        let ws = WriteSet::new();
        assert!(ws.is_empty());
        assert_eq!(ws.get(b"missing"), None);
    }

    #[test]
    fn test_empty_value_is_a_write() {
        let mut ws = WriteSet::new();
        ws.put(b"k".to_vec(), Vec::new());
        assert_eq!(ws.get(b"k"), Some(&b""[..]));
    }
}
