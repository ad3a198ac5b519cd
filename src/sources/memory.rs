//! Fully buffered in-memory sources.

use super::Producer;
use crate::cancel::CancelToken;
use crate::error::MeduceError;
use anyhow::Result;
use std::sync::Mutex;
use std::vec::IntoIter;

/// Pairs held in memory, handed out in buffer order.
pub struct MemorySource<K, V> {
    pairs: Mutex<IntoIter<(K, V)>>,
}

impl<K, V> MemorySource<K, V> {
    pub fn new(pairs: Vec<(K, V)>) -> Self {
        Self {
            pairs: Mutex::new(pairs.into_iter()),
        }
    }
}

/// Source over a vector; the key of each element is its position.
pub fn from_vec<T>(items: Vec<T>) -> MemorySource<usize, T> {
    MemorySource::new(items.into_iter().enumerate().collect())
}

/// Source over the entries of a map (or any other keyed collection).
pub fn from_map<K, V, M>(map: M) -> MemorySource<K, V>
where
    M: IntoIterator<Item = (K, V)>,
{
    MemorySource::new(map.into_iter().collect())
}

/// Source over explicit key/value pairs, kept in the given order.
pub fn from_pairs<K, V>(pairs: Vec<(K, V)>) -> MemorySource<K, V> {
    MemorySource::new(pairs)
}

impl<K: Send, V: Send> Producer<K, V> for MemorySource<K, V> {
    fn recv(&self, cancel: &CancelToken) -> Result<Option<(K, V)>> {
        if cancel.is_cancelled() {
            return Err(MeduceError::Cancelled.into());
        }
        Ok(self.pairs.lock().unwrap().next())
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.pairs.lock().unwrap().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn vec_keys_are_positions() -> Result<()> {
        let source = from_vec(vec!["a", "b"]);
        let cancel = CancelToken::new();
        assert_eq!(source.size_hint(), Some(2));
        assert_eq!(source.recv(&cancel)?, Some((0, "a")));
        assert_eq!(source.size_hint(), Some(1));
        assert_eq!(source.recv(&cancel)?, Some((1, "b")));
        assert_eq!(source.recv(&cancel)?, None);
        assert_eq!(source.recv(&cancel)?, None);
        Ok(())
    }

    #[test]
    fn map_source_yields_every_entry() -> Result<()> {
        let map: BTreeMap<&str, u32> = [("x", 1), ("y", 2)].into_iter().collect();
        let source = from_map(map);
        let cancel = CancelToken::new();
        let mut seen = Vec::new();
        while let Some(pair) = source.recv(&cancel)? {
            seen.push(pair);
        }
        assert_eq!(seen, vec![("x", 1), ("y", 2)]);
        Ok(())
    }

    #[test]
    fn cancelled_source_refuses_to_hand_out_pairs() {
        let source = from_pairs(vec![(1u8, 1u8)]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = source.recv(&cancel).unwrap_err();
        assert!(crate::error::is_cancelled(&err));
    }
}
