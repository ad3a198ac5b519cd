//! User-supplied callables: mapper, reducer, finalizer and filter.

use std::sync::Arc;

/// Buffer a mapping worker hands to the mapper for emitting pairs.
///
/// Each mapping worker owns exactly one `Emitter`; nothing else can observe
/// it until the worker has finished.
pub struct Emitter<K, V> {
    pairs: Vec<(K, V)>,
}

impl<K, V> Emitter<K, V> {
    pub(crate) fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Emit one intermediate pair. May be called any number of times per input.
    #[inline]
    pub fn emit(&mut self, key: K, value: V) {
        self.pairs.push((key, value));
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub(crate) fn into_pairs(self) -> Vec<(K, V)> {
        self.pairs
    }
}

/// Mapper: consumes one input pair, emits any number of intermediate pairs.
pub type MapFn<KI, VI, KO, VO> = Arc<dyn Fn(KI, VI, &mut Emitter<KO, VO>) + Send + Sync>;

/// Finalizer: adjusts a reduced value in place.
pub type FinalizeFn<K, V> = Arc<dyn Fn(&K, &mut V) + Send + Sync>;

/// Filter: decides whether a reduced pair reaches the sink.
pub type FilterFn<K, V> = Arc<dyn Fn(&K, &V) -> bool + Send + Sync>;

/// Folds all values of one key into a single value.
///
/// The engine calls a reducer twice per key in general: once per mapping
/// worker as a local combiner, then once over the merged partial results. It
/// must therefore be an associative, order-insensitive fold that returns its
/// input unchanged when given a single value.
///
/// Implemented for every `Fn(&K, Vec<V>) -> V`; see [`crate::reducers`] for
/// ready-made implementations.
pub trait Reducer<K, V>: Send + Sync {
    /// `values` is never empty.
    fn reduce(&self, key: &K, values: Vec<V>) -> V;
}

impl<K, V, F> Reducer<K, V> for F
where
    F: Fn(&K, Vec<V>) -> V + Send + Sync,
{
    fn reduce(&self, key: &K, values: Vec<V>) -> V {
        self(key, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_reducers() {
        let concat = |_k: &u8, values: Vec<String>| values.concat();
        assert_eq!(concat.reduce(&0, vec!["a".into(), "b".into()]), "ab");
    }

    #[test]
    fn emitter_keeps_emission_order() {
        let mut emitter = Emitter::new();
        assert!(emitter.is_empty());
        emitter.emit("b", 2);
        emitter.emit("a", 1);
        assert_eq!(emitter.len(), 2);
        assert_eq!(emitter.into_pairs(), vec![("b", 2), ("a", 1)]);
    }
}
