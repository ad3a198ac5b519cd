use super::Sink;
use crate::error::MeduceError;
use anyhow::Result;
use std::fmt::Debug;

/// Sink for computations that produce exactly one pair.
///
/// A second delivery is a [`MeduceError::Misuse`]. Reading is check-then-read:
/// [`is_set`](Self::is_set) / [`try_get`](Self::try_get) never fail, while
/// [`get`](Self::get) is a misuse error when nothing was collected or when the
/// pair was collected under another key.
#[derive(Debug, Clone)]
pub struct SingleValueSink<K, V> {
    pair: Option<(K, V)>,
}

impl<K, V> SingleValueSink<K, V> {
    pub fn new() -> Self {
        Self { pair: None }
    }

    pub fn is_set(&self) -> bool {
        self.pair.is_some()
    }

    pub fn key(&self) -> Option<&K> {
        self.pair.as_ref().map(|(k, _)| k)
    }

    pub fn into_pair(self) -> Option<(K, V)> {
        self.pair
    }
}

impl<K: PartialEq + Debug, V> SingleValueSink<K, V> {
    pub fn try_get(&self, key: &K) -> Option<&V> {
        match &self.pair {
            Some((k, v)) if k == key => Some(v),
            _ => None,
        }
    }

    pub fn get(&self, key: &K) -> Result<&V> {
        match &self.pair {
            None => Err(MeduceError::misuse("value was not set").into()),
            Some((k, _)) if k != key => Err(MeduceError::misuse(format!(
                "value was collected under key {k:?}, not {key:?}"
            ))
            .into()),
            Some((_, v)) => Ok(v),
        }
    }
}

impl<K, V> Default for SingleValueSink<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Send + Debug, V: Send> Sink<K, V> for SingleValueSink<K, V> {
    fn collect(&mut self, key: K, value: V) -> Result<()> {
        if let Some((first, _)) = &self.pair {
            return Err(MeduceError::misuse(format!(
                "single value sink already holds key {first:?}, got a second pair for {key:?}"
            ))
            .into());
        }
        self.pair = Some((key, value));
        Ok(())
    }
}
