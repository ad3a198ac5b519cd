//! Deterministic k-way merge of the sorted runs left by the mapping workers.
//!
//! The merge only establishes global order. Keys combined inside one run can
//! still repeat across runs; after the merge those repeats are contiguous.
//! Among pairs that compare `Equal` the one from the lowest run index is taken
//! first, with either strategy.

use crate::error::Stage;
use crate::ordering::SortOrder;
use crate::runner::guarded;
use anyhow::Result;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

/// Above this many runs the merge keeps its cursors in a heap instead of
/// scanning all of them for every output pair.
pub(crate) const HEAP_MERGE_THRESHOLD: usize = 8;

#[derive(Debug)]
pub(crate) struct Merged<K, V> {
    pub pairs: Vec<(K, V)>,
    pub distinct_keys: usize,
}

/// Merge `runs` into one sequence sorted under `order`.
///
/// A panicking comparator is reported as an [`Stage::Ordering`] failure.
pub(crate) fn merge_runs<K, V>(
    runs: Vec<Vec<(K, V)>>,
    order: &SortOrder<K, V>,
) -> Result<Merged<K, V>> {
    let mut runs: Vec<_> = runs.into_iter().filter(|run| !run.is_empty()).collect();
    if runs.len() == 1 {
        // A single run is already sorted and holds each key once.
        let pairs = runs.pop().unwrap_or_default();
        let distinct_keys = pairs.len();
        return Ok(Merged { pairs, distinct_keys });
    }
    guarded(Stage::Ordering, move || {
        if runs.len() > HEAP_MERGE_THRESHOLD {
            merge_with_heap(runs, order)
        } else {
            merge_linear(runs, order)
        }
    })
}

struct Output<'a, K, V> {
    merged: Merged<K, V>,
    order: &'a SortOrder<K, V>,
}

impl<'a, K, V> Output<'a, K, V> {
    fn new(capacity: usize, order: &'a SortOrder<K, V>) -> Self {
        Self {
            merged: Merged {
                pairs: Vec::with_capacity(capacity),
                distinct_keys: 0,
            },
            order,
        }
    }

    fn push(&mut self, pair: (K, V)) {
        let starts_group = self
            .merged
            .pairs
            .last()
            .is_none_or(|(last, _)| !self.order.same_group(last, &pair.0));
        if starts_group {
            self.merged.distinct_keys += 1;
        }
        self.merged.pairs.push(pair);
    }
}

/// Scan every cursor for the minimum; O(pairs × runs).
fn merge_linear<K, V>(runs: Vec<Vec<(K, V)>>, order: &SortOrder<K, V>) -> Merged<K, V> {
    let total = runs.iter().map(Vec::len).sum();
    let mut cursors: Vec<VecDeque<(K, V)>> = runs.into_iter().map(VecDeque::from).collect();
    let mut out = Output::new(total, order);

    loop {
        let mut best: Option<usize> = None;
        for (i, run) in cursors.iter().enumerate() {
            let Some(head) = run.front() else { continue };
            let better = match best {
                None => true,
                Some(b) => cursors[b]
                    .front()
                    .is_none_or(|current| order.compare_pairs(head, current) == Ordering::Less),
            };
            if better {
                best = Some(i);
            }
        }
        let Some(b) = best else { break };
        if let Some(pair) = cursors[b].pop_front() {
            out.push(pair);
        }
    }
    out.merged
}

struct HeapEntry<'a, K, V> {
    pair: (K, V),
    run: usize,
    order: &'a SortOrder<K, V>,
}

impl<K, V> Ord for HeapEntry<'_, K, V> {
    // Reversed: `BinaryHeap` is a max-heap and the smallest pair must pop first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.order
            .compare_pairs(&other.pair, &self.pair)
            .then_with(|| other.run.cmp(&self.run))
    }
}

impl<K, V> PartialOrd for HeapEntry<'_, K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, V> PartialEq for HeapEntry<'_, K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K, V> Eq for HeapEntry<'_, K, V> {}

/// O(pairs × log runs).
fn merge_with_heap<K, V>(runs: Vec<Vec<(K, V)>>, order: &SortOrder<K, V>) -> Merged<K, V> {
    let total = runs.iter().map(Vec::len).sum();
    let mut cursors: Vec<_> = runs.into_iter().map(Vec::into_iter).collect();
    let mut heap = BinaryHeap::with_capacity(cursors.len());
    for (run, cursor) in cursors.iter_mut().enumerate() {
        if let Some(pair) = cursor.next() {
            heap.push(HeapEntry { pair, run, order });
        }
    }

    let mut out = Output::new(total, order);
    while let Some(HeapEntry { pair, run, .. }) = heap.pop() {
        if let Some(next) = cursors[run].next() {
            heap.push(HeapEntry { pair: next, run, order });
        }
        out.push(pair);
    }
    out.merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs_of(n: usize) -> Vec<Vec<(u32, u32)>> {
        // Run i holds keys i, i+3, i+6, ... and key 100 tagged with its index.
        (0..n)
            .map(|i| {
                let mut run: Vec<_> = (0..5).map(|j| (i as u32 + 3 * j, i as u32)).collect();
                run.push((100, i as u32));
                run
            })
            .collect()
    }

    #[test]
    fn output_is_globally_sorted_with_contiguous_keys() -> Result<()> {
        let order = SortOrder::natural();
        let merged = merge_runs(runs_of(4), &order)?;
        assert_eq!(merged.pairs.len(), 24);
        assert!(merged.pairs.windows(2).all(|w| w[0].0 <= w[1].0));
        let mut keys: Vec<_> = merged.pairs.iter().map(|(k, _)| *k).collect();
        keys.dedup();
        assert_eq!(merged.distinct_keys, keys.len());
        Ok(())
    }

    #[test]
    fn equal_keys_keep_run_order_without_value_order() -> Result<()> {
        let order = SortOrder::natural();
        let merged = merge_runs(runs_of(3), &order)?;
        let tail: Vec<_> = merged
            .pairs
            .iter()
            .filter(|(k, _)| *k == 100)
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(tail, vec![0, 1, 2]);
        Ok(())
    }

    #[test]
    fn value_order_breaks_ties_across_runs() -> Result<()> {
        let order = SortOrder::natural().then_by_value_natural();
        let merged = merge_runs(vec![vec![(1, 3)], vec![(1, 1)], vec![(1, 2)]], &order)?;
        assert_eq!(merged.pairs, vec![(1, 1), (1, 2), (1, 3)]);
        assert_eq!(merged.distinct_keys, 1);
        Ok(())
    }

    #[test]
    fn heap_and_linear_merges_agree() {
        let order = SortOrder::natural();
        let n = HEAP_MERGE_THRESHOLD + 3;
        let linear = merge_linear(runs_of(n), &order);
        let heap = merge_with_heap(runs_of(n), &order);
        assert_eq!(linear.pairs, heap.pairs);
        assert_eq!(linear.distinct_keys, heap.distinct_keys);

        let reversed = SortOrder::<u32, u32>::by_key(|a: &u32, b: &u32| b.cmp(a));
        let runs = |n: usize| -> Vec<Vec<(u32, u32)>> {
            runs_of(n)
                .into_iter()
                .map(|mut r| {
                    r.reverse();
                    r
                })
                .collect()
        };
        assert_eq!(
            merge_linear(runs(n), &reversed).pairs,
            merge_with_heap(runs(n), &reversed).pairs
        );
    }

    #[test]
    fn empty_runs_are_ignored() -> Result<()> {
        let order = SortOrder::<u8, u8>::natural();
        let merged = merge_runs(vec![vec![], vec![(1, 1)], vec![]], &order)?;
        assert_eq!(merged.pairs, vec![(1, 1)]);
        assert_eq!(merged.distinct_keys, 1);
        assert_eq!(merge_runs(Vec::new(), &order)?.pairs.len(), 0);
        Ok(())
    }

    #[test]
    fn panicking_comparator_is_an_ordering_failure() {
        let order = SortOrder::<u8, u8>::by_key(|_: &u8, _: &u8| panic!("cannot compare"));
        let err = merge_runs(vec![vec![(1, 1)], vec![(2, 2)]], &order).unwrap_err();
        assert!(err.to_string().contains("ordering failed"));
    }
}
