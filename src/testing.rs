//! Testing utilities for processes.
//!
//! - [`assert_kv_collections_equal`]: compare key/value pairs, ignoring order.
//! - [`assert_map_contents`]: compare a [`MapSink`] against expected pairs.
//! - [`RecordingSink`]: a sink that records every call made on it.
//!
//! ```
//! use meduce::*;
//! use meduce::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let recorder = RecordingSink::new();
//! let config = Config::new()
//!     .with_natural_order()
//!     .with_mapper(|_: usize, n: u32, out: &mut Emitter<bool, u32>| out.emit(n % 2 == 0, n))
//!     .with_reducer(reducers::Sum::<u32>::new())
//!     .with_producer(from_vec(vec![1, 2, 3, 4]))
//!     .with_sink(recorder.clone());
//! Process::new(config).run()?;
//!
//! assert_kv_collections_equal(recorder.pairs(), vec![(false, 4), (true, 6)]);
//! assert_eq!(recorder.finalize_calls(), 1);
//! # Ok(())
//! # }
//! ```

use crate::sinks::{MapSink, Sink};
use anyhow::Result;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

/// Assert that two collections of key-value pairs are equal after sorting by key.
///
/// # Panics
///
/// Panics if the collections differ in length or content.
///
/// # Example
///
/// ```
/// use meduce::testing::assert_kv_collections_equal;
///
/// let actual = vec![("b", 2), ("a", 1)];
/// let expected = vec![("a", 1), ("b", 2)];
/// assert_kv_collections_equal(actual, expected);
/// ```
pub fn assert_kv_collections_equal<K, V>(mut actual: Vec<(K, V)>, mut expected: Vec<(K, V)>)
where
    K: Debug + Ord,
    V: Debug + PartialEq,
{
    actual.sort_by(|a, b| a.0.cmp(&b.0));
    expected.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(
        actual.len(),
        expected.len(),
        "Collection length mismatch:\n  Expected length: {}\n  Actual length: {}\n  \
         Expected: {expected:?}\n  Actual: {actual:?}",
        expected.len(),
        actual.len()
    );

    for (i, ((ak, av), (ek, ev))) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            ak == ek && av == ev,
            "Collection mismatch at index {i} after sorting:\n  \
             Expected: ({ek:?}, {ev:?})\n  Actual: ({ak:?}, {av:?})\n  \
             Full expected: {expected:?}\n  Full actual: {actual:?}"
        );
    }
}

/// Assert that `sink` holds exactly `expected`.
///
/// # Panics
///
/// Panics if a key is missing, extra, or maps to a different value.
pub fn assert_map_contents<K, V>(sink: &MapSink<K, V>, expected: impl IntoIterator<Item = (K, V)>)
where
    K: Debug + Eq + Hash,
    V: Debug + PartialEq,
{
    let expected: HashMap<K, V> = expected.into_iter().collect();
    assert_eq!(
        sink.as_map(),
        &expected,
        "Sink contents mismatch:\n  Expected: {expected:?}\n  Actual: {:?}",
        sink.as_map()
    );
}

/// Sink that records deliveries plus `init`/`finalize` calls.
///
/// Clones share the same record, so keep one clone to inspect what the
/// process delivered to the other.
pub struct RecordingSink<K, V> {
    record: Arc<Mutex<Record<K, V>>>,
}

struct Record<K, V> {
    pairs: Vec<(K, V)>,
    inits: usize,
    finalizes: usize,
}

impl<K, V> RecordingSink<K, V> {
    pub fn new() -> Self {
        Self {
            record: Arc::new(Mutex::new(Record {
                pairs: Vec::new(),
                inits: 0,
                finalizes: 0,
            })),
        }
    }

    /// Delivered pairs, in delivery order.
    pub fn pairs(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.record.lock().unwrap().pairs.clone()
    }

    pub fn collect_calls(&self) -> usize {
        self.record.lock().unwrap().pairs.len()
    }

    pub fn init_calls(&self) -> usize {
        self.record.lock().unwrap().inits
    }

    pub fn finalize_calls(&self) -> usize {
        self.record.lock().unwrap().finalizes
    }
}

impl<K, V> Clone for RecordingSink<K, V> {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
        }
    }
}

impl<K, V> Default for RecordingSink<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Send, V: Send> Sink<K, V> for RecordingSink<K, V> {
    fn init(&mut self) -> Result<()> {
        self.record.lock().unwrap().inits += 1;
        Ok(())
    }

    fn collect(&mut self, key: K, value: V) -> Result<()> {
        self.record.lock().unwrap().pairs.push((key, value));
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.record.lock().unwrap().finalizes += 1;
        Ok(())
    }
}
