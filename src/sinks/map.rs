use super::Sink;
use anyhow::Result;
use std::collections::HashMap;
use std::hash::Hash;

/// Collects every delivered pair into a `HashMap`.
#[derive(Debug, Clone)]
pub struct MapSink<K, V> {
    map: HashMap<K, V>,
}

impl<K: Eq + Hash, V> MapSink<K, V> {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn as_map(&self) -> &HashMap<K, V> {
        &self.map
    }

    pub fn into_inner(self) -> HashMap<K, V> {
        self.map
    }
}

impl<K: Eq + Hash, V> Default for MapSink<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Sink<K, V> for MapSink<K, V>
where
    K: Eq + Hash + Send,
    V: Send,
{
    fn collect(&mut self, key: K, value: V) -> Result<()> {
        self.map.insert(key, value);
        Ok(())
    }
}
