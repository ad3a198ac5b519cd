//! Group generation: slice a key-ordered sequence into equal-key groups.

use crate::cancel::CancelToken;
use crate::error::{MeduceError, Stage};
use crate::ordering::SortOrder;
use crate::runner::guarded;
use anyhow::Result;
use crossbeam_channel::{Sender, select};
use std::iter::Peekable;

/// All values of one key, in the order they appear in the input sequence.
#[derive(Debug, PartialEq)]
pub(crate) struct Group<K, V> {
    pub key: K,
    pub values: Vec<V>,
}

/// Splits an ordered pair sequence into maximal runs of equal keys.
///
/// Keys are compared with the key comparator only. A comparator panic is
/// yielded as an `Err` item.
pub(crate) struct Groups<'a, K, V, I: Iterator<Item = (K, V)>> {
    pairs: Peekable<I>,
    order: &'a SortOrder<K, V>,
}

impl<'a, K, V, I: Iterator<Item = (K, V)>> Groups<'a, K, V, I> {
    pub fn new(pairs: I, order: &'a SortOrder<K, V>) -> Self {
        Self {
            pairs: pairs.peekable(),
            order,
        }
    }
}

impl<K, V, I: Iterator<Item = (K, V)>> Iterator for Groups<'_, K, V, I> {
    type Item = Result<Group<K, V>>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, first) = self.pairs.next()?;
        let mut values = vec![first];
        let order = self.order;
        loop {
            let same = match self.pairs.peek() {
                Some((next, _)) => match guarded(Stage::Ordering, || order.same_group(&key, next)) {
                    Ok(same) => same,
                    Err(err) => return Some(Err(err)),
                },
                None => false,
            };
            if !same {
                break;
            }
            if let Some((_, value)) = self.pairs.next() {
                values.push(value);
            }
        }
        Some(Ok(Group { key, values }))
    }
}

/// Publish every group of `pairs` onto `queue`, then close it by dropping
/// the sender. Blocks while the queue is full.
pub(crate) fn generate_groups<K, V>(
    pairs: Vec<(K, V)>,
    order: &SortOrder<K, V>,
    queue: Sender<Group<K, V>>,
    cancel: &CancelToken,
) -> Result<usize> {
    let mut published = 0;
    for group in Groups::new(pairs.into_iter(), order) {
        let group = group?;
        select! {
            send(queue, group) -> sent => {
                // Every reducing worker is gone; one of them failed and
                // already holds the error worth reporting.
                if sent.is_err() {
                    return Err(MeduceError::Cancelled.into());
                }
            }
            recv(cancel.signal()) -> _ => return Err(MeduceError::Cancelled.into()),
        }
        published += 1;
    }
    Ok(published)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_cancelled;
    use crossbeam_channel::bounded;
    use std::thread;

    #[test]
    fn groups_are_maximal_equal_key_runs() -> Result<()> {
        let order = SortOrder::<&str, u32>::natural();
        let pairs = vec![("a", 1), ("a", 2), ("b", 3), ("c", 4), ("c", 5), ("c", 6)];
        let groups: Vec<_> = Groups::new(pairs.into_iter(), &order).collect::<Result<_>>()?;
        assert_eq!(
            groups,
            vec![
                Group { key: "a", values: vec![1, 2] },
                Group { key: "b", values: vec![3] },
                Group { key: "c", values: vec![4, 5, 6] },
            ]
        );
        Ok(())
    }

    #[test]
    fn comparator_decides_group_membership() -> Result<()> {
        let order = SortOrder::<i32, ()>::by_key(|a: &i32, b: &i32| (a / 10).cmp(&(b / 10)));
        let pairs = vec![(11, ()), (15, ()), (23, ())];
        let groups: Vec<_> = Groups::new(pairs.into_iter(), &order).collect::<Result<_>>()?;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, 11);
        assert_eq!(groups[0].values.len(), 2);
        Ok(())
    }

    #[test]
    fn generator_closes_the_queue_when_done() -> Result<()> {
        let order = SortOrder::<u8, u8>::natural();
        let (tx, rx) = bounded(1);
        let cancel = CancelToken::new();
        let consumer =
            thread::spawn(move || rx.iter().map(|g: Group<u8, u8>| g.key).collect::<Vec<_>>());
        let published = generate_groups(vec![(1, 0), (1, 1), (2, 0), (3, 0)], &order, tx, &cancel)?;
        assert_eq!(published, 3);
        assert_eq!(consumer.join().unwrap(), vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn generator_stops_on_cancel() {
        let order = SortOrder::<u8, u8>::natural();
        let (tx, _rx) = bounded(1);
        let cancel = CancelToken::new();
        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(std::time::Duration::from_millis(20));
                cancel.cancel();
            })
        };
        let err = generate_groups(vec![(1, 0), (2, 0), (3, 0)], &order, tx, &cancel).unwrap_err();
        canceller.join().unwrap();
        assert!(is_cancelled(&err));
    }
}
