//! Ready-made reducers: First, Last, Sum, Min, Max and their by-field variants.
//!
//! Every reducer here is a valid fold for the engine: it returns a lone value
//! unchanged, and applying it to partial results gives the same answer as
//! applying it to all values at once. `Min`/`Max` style reducers keep the
//! first of several equal extremes.

use crate::callables::Reducer;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::ops::Add;

/* ===================== First / Last ===================== */

/// First value of the group, in group order.
///
/// Group order is arrival order unless the process sets a value order, so
/// `First` is usually paired with `SortOrder::then_by_value`.
#[derive(Clone, Copy, Debug, Default)]
pub struct First;

impl<K, V> Reducer<K, V> for First {
    fn reduce(&self, _key: &K, values: Vec<V>) -> V {
        values
            .into_iter()
            .next()
            .expect("First::reduce called on empty group")
    }
}

/// Last value of the group, in group order.
#[derive(Clone, Copy, Debug, Default)]
pub struct Last;

impl<K, V> Reducer<K, V> for Last {
    fn reduce(&self, _key: &K, mut values: Vec<V>) -> V {
        values.pop().expect("Last::reduce called on empty group")
    }
}

/* ===================== Sum<T> ===================== */

/// Sum of values per key.
///
/// Requires `T: Add<Output=T> + Default`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sum<T>(pub PhantomData<T>);
impl<T> Sum<T> {
    /// Convenience constructor (same as `Default`).
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<K, T> Reducer<K, T> for Sum<T>
where
    T: Add<Output = T> + Default + Send + Sync,
{
    fn reduce(&self, _key: &K, values: Vec<T>) -> T {
        values.into_iter().fold(T::default(), |a, v| a + v)
    }
}

/* ===================== Min<T> / Max<T> ===================== */

/// Minimum value per key (requires `Ord`).
#[derive(Clone, Copy, Debug, Default)]
pub struct Min<T>(pub PhantomData<T>);
impl<T> Min<T> {
    /// Convenience constructor (same as `Default`).
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<K, T> Reducer<K, T> for Min<T>
where
    T: Ord + Send + Sync,
{
    fn reduce(&self, _key: &K, values: Vec<T>) -> T {
        values
            .into_iter()
            .reduce(|best, v| if v < best { v } else { best })
            .expect("Min::reduce called on empty group")
    }
}

/// Maximum value per key (requires `Ord`).
#[derive(Clone, Copy, Debug, Default)]
pub struct Max<T>(pub PhantomData<T>);
impl<T> Max<T> {
    /// Convenience constructor (same as `Default`).
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<K, T> Reducer<K, T> for Max<T>
where
    T: Ord + Send + Sync,
{
    fn reduce(&self, _key: &K, values: Vec<T>) -> T {
        values
            .into_iter()
            .reduce(|best, v| if v > best { v } else { best })
            .expect("Max::reduce called on empty group")
    }
}

/* ===================== MinBy / MaxBy ===================== */

/// Value with the smallest derived field, e.g. `MinBy::new(|r: &Row| r.age)`.
pub struct MinBy<F, D> {
    field: F,
    _field: PhantomData<fn() -> D>,
}

impl<F, D> MinBy<F, D> {
    pub fn new(field: F) -> Self {
        Self {
            field,
            _field: PhantomData,
        }
    }
}

impl<K, V, F, D> Reducer<K, V> for MinBy<F, D>
where
    F: Fn(&V) -> D + Send + Sync,
    D: Ord,
{
    fn reduce(&self, _key: &K, values: Vec<V>) -> V {
        pick(values, |v, best| (self.field)(v).cmp(&(self.field)(best)) == Ordering::Less)
            .expect("MinBy::reduce called on empty group")
    }
}

/// Value with the largest derived field.
pub struct MaxBy<F, D> {
    field: F,
    _field: PhantomData<fn() -> D>,
}

impl<F, D> MaxBy<F, D> {
    pub fn new(field: F) -> Self {
        Self {
            field,
            _field: PhantomData,
        }
    }
}

impl<K, V, F, D> Reducer<K, V> for MaxBy<F, D>
where
    F: Fn(&V) -> D + Send + Sync,
    D: Ord,
{
    fn reduce(&self, _key: &K, values: Vec<V>) -> V {
        pick(values, |v, best| (self.field)(v).cmp(&(self.field)(best)) == Ordering::Greater)
            .expect("MaxBy::reduce called on empty group")
    }
}

/* ===================== MinByCmp / MaxByCmp ===================== */

/// Like [`MinBy`], with an explicit comparator over the derived field for
/// types that are not `Ord` (floats, say).
pub struct MinByCmp<F, C, D> {
    field: F,
    cmp: C,
    _field: PhantomData<fn() -> D>,
}

impl<F, C, D> MinByCmp<F, C, D> {
    pub fn new(field: F, cmp: C) -> Self {
        Self {
            field,
            cmp,
            _field: PhantomData,
        }
    }
}

impl<K, V, F, C, D> Reducer<K, V> for MinByCmp<F, C, D>
where
    F: Fn(&V) -> D + Send + Sync,
    C: Fn(&D, &D) -> Ordering + Send + Sync,
{
    fn reduce(&self, _key: &K, values: Vec<V>) -> V {
        pick(values, |v, best| {
            (self.cmp)(&(self.field)(v), &(self.field)(best)) == Ordering::Less
        })
        .expect("MinByCmp::reduce called on empty group")
    }
}

pub struct MaxByCmp<F, C, D> {
    field: F,
    cmp: C,
    _field: PhantomData<fn() -> D>,
}

impl<F, C, D> MaxByCmp<F, C, D> {
    pub fn new(field: F, cmp: C) -> Self {
        Self {
            field,
            cmp,
            _field: PhantomData,
        }
    }
}

impl<K, V, F, C, D> Reducer<K, V> for MaxByCmp<F, C, D>
where
    F: Fn(&V) -> D + Send + Sync,
    C: Fn(&D, &D) -> Ordering + Send + Sync,
{
    fn reduce(&self, _key: &K, values: Vec<V>) -> V {
        pick(values, |v, best| {
            (self.cmp)(&(self.field)(v), &(self.field)(best)) == Ordering::Greater
        })
        .expect("MaxByCmp::reduce called on empty group")
    }
}

/// Keep the current pick unless `replaces(candidate, current)` holds.
fn pick<V>(values: Vec<V>, replaces: impl Fn(&V, &V) -> bool) -> Option<V> {
    values
        .into_iter()
        .reduce(|best, v| if replaces(&v, &best) { v } else { best })
}
