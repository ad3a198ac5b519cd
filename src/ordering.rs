//! Ordering policy over intermediate pairs.
//!
//! A [`SortOrder`] is a total order over output keys plus an optional
//! secondary order over output values. The key comparator alone decides which
//! pairs belong to the same reduction group; the value comparator only breaks
//! ties between pairs whose keys compare `Equal`.

use std::cmp::Ordering;
use std::sync::Arc;

/// Shared comparator over `T`.
pub type Compare<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

pub struct SortOrder<K, V> {
    key: Compare<K>,
    value: Option<Compare<V>>,
}

impl<K, V> Clone for SortOrder<K, V> {
    fn clone(&self) -> Self {
        Self {
            key: Arc::clone(&self.key),
            value: self.value.clone(),
        }
    }
}

impl<K, V> SortOrder<K, V> {
    /// Order keys with a custom comparator; values are left unordered.
    pub fn by_key<F>(cmp: F) -> Self
    where
        F: Fn(&K, &K) -> Ordering + Send + Sync + 'static,
    {
        Self {
            key: Arc::new(cmp),
            value: None,
        }
    }

    /// Order keys by their `Ord` implementation.
    pub fn natural() -> Self
    where
        K: Ord + 'static,
    {
        Self::by_key(|a: &K, b: &K| a.cmp(b))
    }

    /// Break ties between equal keys with `cmp`.
    #[must_use]
    pub fn then_by_value<F>(mut self, cmp: F) -> Self
    where
        F: Fn(&V, &V) -> Ordering + Send + Sync + 'static,
    {
        self.value = Some(Arc::new(cmp));
        self
    }

    /// Break ties between equal keys with the values' `Ord` implementation.
    #[must_use]
    pub fn then_by_value_natural(self) -> Self
    where
        V: Ord + 'static,
    {
        self.then_by_value(|a: &V, b: &V| a.cmp(b))
    }

    pub fn has_value_order(&self) -> bool {
        self.value.is_some()
    }

    #[inline]
    pub fn compare_keys(&self, a: &K, b: &K) -> Ordering {
        (self.key)(a, b)
    }

    /// Whether two keys fall into the same reduction group.
    #[inline]
    pub fn same_group(&self, a: &K, b: &K) -> bool {
        self.compare_keys(a, b) == Ordering::Equal
    }

    /// Compare by key, then by value when a value order is set.
    ///
    /// Without a value order, pairs with equal keys compare `Equal`, so stable
    /// algorithms keep them in arrival order.
    pub fn compare_pairs(&self, a: &(K, V), b: &(K, V)) -> Ordering {
        match self.compare_keys(&a.0, &b.0) {
            Ordering::Equal => match &self.value {
                Some(cmp) => cmp(&a.1, &b.1),
                None => Ordering::Equal,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_order_only_breaks_key_ties() {
        let order = SortOrder::<u32, i32>::natural().then_by_value(|a, b| b.cmp(a));
        assert_eq!(order.compare_pairs(&(1, 5), &(2, 0)), Ordering::Less);
        assert_eq!(order.compare_pairs(&(1, 5), &(1, 7)), Ordering::Greater);
        assert!(order.same_group(&3, &3));
    }

    #[test]
    fn equal_keys_without_value_order_are_equal() {
        let order = SortOrder::<String, u8>::by_key(|a: &String, b: &String| {
            a.to_lowercase().cmp(&b.to_lowercase())
        });
        assert!(!order.has_value_order());
        assert!(order.same_group(&"Key".to_string(), &"KEY".to_string()));
        assert_eq!(
            order.compare_pairs(&("a".into(), 9), &("A".into(), 1)),
            Ordering::Equal
        );
    }
}
