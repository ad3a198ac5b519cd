//! Reducing phase: reduce, finalize, filter and deliver each group.

use crate::callables::{FilterFn, FinalizeFn, Reducer};
use crate::cancel::CancelToken;
use crate::error::{MeduceError, Stage};
use crate::grouping::Group;
use crate::process_id::ProcessId;
use crate::runner::{guarded, run_workers};
use crate::sinks::Sink;
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, select};
use std::sync::Mutex;
use tracing::debug;

/// Where reduced pairs go, fixed when the process starts.
///
/// An ordinary sink is shared behind one lock. A sink that exposes its own
/// queue, and the handoff queue of a pipeline link, already serialise their
/// writers, so workers send to them directly.
pub(crate) enum Delivery<S, K, V> {
    Exclusive(Mutex<S>),
    Queued { sink: Mutex<S>, queue: Sender<(K, V)> },
    Handoff(Sender<(K, V)>),
}

impl<S: Sink<K, V>, K, V> Delivery<S, K, V> {
    /// Pick the delivery path for an unlinked process's sink.
    pub fn for_sink(sink: S) -> Self {
        match sink.queue() {
            Some(queue) => Delivery::Queued {
                sink: Mutex::new(sink),
                queue,
            },
            None => Delivery::Exclusive(Mutex::new(sink)),
        }
    }

    fn sink(&self) -> Option<&Mutex<S>> {
        match self {
            Delivery::Exclusive(sink) | Delivery::Queued { sink, .. } => Some(sink),
            Delivery::Handoff(_) => None,
        }
    }

    pub fn init(&self) -> Result<()> {
        match self.sink() {
            Some(sink) => {
                let mut sink = sink.lock().unwrap();
                guarded(Stage::Sink, || sink.init())?
            }
            None => Ok(()),
        }
    }

    fn deliver(&self, key: K, value: V, cancel: &CancelToken) -> Result<()> {
        match self {
            Delivery::Exclusive(sink) => {
                let mut sink = sink.lock().unwrap();
                guarded(Stage::Sink, || sink.collect(key, value))?
            }
            Delivery::Queued { queue, .. } => {
                send_or_cancel(queue, (key, value), cancel, "sink queue receiver was dropped")
            }
            Delivery::Handoff(queue) => send_or_cancel(
                queue,
                (key, value),
                cancel,
                "downstream process stopped reading its input",
            ),
        }
    }

    pub fn finalize(&self) -> Result<()> {
        match self.sink() {
            Some(sink) => {
                let mut sink = sink.lock().unwrap();
                guarded(Stage::Sink, || sink.finalize())?
            }
            None => Ok(()),
        }
    }

    /// The sink, once every worker is done; `None` for a handoff. Dropping a
    /// queue sender here closes the queue once the sink has let go of its own.
    pub fn into_sink(self) -> Option<S> {
        match self {
            Delivery::Exclusive(sink) | Delivery::Queued { sink, .. } => {
                Some(sink.into_inner().unwrap_or_else(|p| p.into_inner()))
            }
            Delivery::Handoff(_) => None,
        }
    }
}

/// Send `pair`, waiting for room unless `cancel` fires first.
fn send_or_cancel<K, V>(
    queue: &Sender<(K, V)>,
    pair: (K, V),
    cancel: &CancelToken,
    closed: &str,
) -> Result<()> {
    select! {
        send(queue, pair) -> sent => {
            if sent.is_err() {
                return Err(MeduceError::resource(closed).into());
            }
        }
        recv(cancel.signal()) -> _ => return Err(MeduceError::Cancelled.into()),
    }
    Ok(())
}

/// Everything a reducing worker reads but does not own.
pub(crate) struct ReducePhase<'a, K, V, S> {
    pub queue: &'a Receiver<Group<K, V>>,
    pub reducer: &'a dyn Reducer<K, V>,
    pub finalizer: Option<&'a FinalizeFn<K, V>>,
    pub filter: Option<&'a FilterFn<K, V>>,
    pub delivery: &'a Delivery<S, K, V>,
    pub cancel: &'a CancelToken,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ReduceWorkerStats {
    pub groups: u64,
    pub reductions: u64,
    pub collections: u64,
}

struct ReduceWorker {
    index: usize,
    stats: ReduceWorkerStats,
}

impl ReduceWorker {
    fn new(index: usize) -> Self {
        Self {
            index,
            stats: ReduceWorkerStats::default(),
        }
    }

    fn run<K, V, S: Sink<K, V>>(
        mut self,
        process: ProcessId,
        phase: &ReducePhase<'_, K, V, S>,
    ) -> Result<ReduceWorkerStats> {
        loop {
            let group = select! {
                recv(phase.queue) -> group => group.ok(),
                recv(phase.cancel.signal()) -> _ => return Err(MeduceError::Cancelled.into()),
            };
            let Some(group) = group else { break };
            self.reduce_group(group, phase)?;
        }
        debug!(
            process = %process,
            worker = self.index,
            groups = self.stats.groups,
            reductions = self.stats.reductions,
            collections = self.stats.collections,
            "reducing worker finished"
        );
        Ok(self.stats)
    }

    fn reduce_group<K, V, S: Sink<K, V>>(
        &mut self,
        group: Group<K, V>,
        phase: &ReducePhase<'_, K, V, S>,
    ) -> Result<()> {
        let Group { key, mut values } = group;
        self.stats.groups += 1;

        let mut value = if values.len() == 1 {
            values.swap_remove(0)
        } else {
            self.stats.reductions += 1;
            guarded(Stage::Reducer, || phase.reducer.reduce(&key, values))?
        };
        if let Some(finalize) = phase.finalizer {
            guarded(Stage::Finalizer, || finalize(&key, &mut value))?;
        }
        if let Some(keep) = phase.filter
            && !guarded(Stage::Filter, || keep(&key, &value))?
        {
            return Ok(());
        }

        phase.delivery.deliver(key, value, phase.cancel)?;
        self.stats.collections += 1;
        Ok(())
    }
}

/// Run `workers` reducing workers until the group queue is closed and empty.
pub(crate) fn run_reduce_phase<K, V, S>(
    process: ProcessId,
    workers: usize,
    phase: &ReducePhase<'_, K, V, S>,
) -> Result<Vec<ReduceWorkerStats>>
where
    K: Send,
    V: Send,
    S: Sink<K, V>,
{
    let pool: Vec<ReduceWorker> = (0..workers).map(ReduceWorker::new).collect();
    run_workers(process, "reduce", phase.cancel, pool, |worker| worker.run(process, phase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::{MapSink, channel_sink};
    use crossbeam_channel::bounded;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn sum(_: &&'static str, values: Vec<u32>) -> u32 {
        values.iter().sum()
    }

    fn feed(groups: Vec<Group<&'static str, u32>>) -> Receiver<Group<&'static str, u32>> {
        let (tx, rx) = bounded(groups.len().max(1));
        for group in groups {
            tx.send(group).unwrap();
        }
        rx
    }

    fn group(key: &'static str, values: &[u32]) -> Group<&'static str, u32> {
        Group {
            key,
            values: values.to_vec(),
        }
    }

    #[test]
    fn groups_are_reduced_finalized_and_filtered() -> Result<()> {
        let queue = feed(vec![group("a", &[1, 2]), group("b", &[5]), group("c", &[1, 1, 1])]);
        let finalize: FinalizeFn<&'static str, u32> =
            Arc::new(|_: &&'static str, v: &mut u32| *v *= 10);
        let filter: FilterFn<&'static str, u32> = Arc::new(|k: &&'static str, _: &u32| *k != "c");
        let delivery = Delivery::Exclusive(Mutex::new(MapSink::new()));
        let cancel = CancelToken::new();
        let phase = ReducePhase {
            queue: &queue,
            reducer: &sum,
            finalizer: Some(&finalize),
            filter: Some(&filter),
            delivery: &delivery,
            cancel: &cancel,
        };

        let stats = run_reduce_phase(ProcessId::next(), 2, &phase)?;
        let reductions: u64 = stats.iter().map(|s| s.reductions).sum();
        let collections: u64 = stats.iter().map(|s| s.collections).sum();
        assert_eq!(reductions, 2);
        assert_eq!(collections, 2);

        let sink = delivery.into_sink().unwrap();
        assert_eq!(sink.get(&"a"), Some(&30));
        assert_eq!(sink.get(&"b"), Some(&50));
        assert_eq!(sink.get(&"c"), None);
        Ok(())
    }

    #[test]
    fn handoff_forwards_without_a_sink() -> Result<()> {
        let queue = feed(vec![group("x", &[1, 2, 3])]);
        let (tx, rx) = bounded(4);
        let delivery: Delivery<MapSink<&'static str, u32>, _, _> = Delivery::Handoff(tx);
        let cancel = CancelToken::new();
        let phase = ReducePhase {
            queue: &queue,
            reducer: &sum,
            finalizer: None,
            filter: None,
            delivery: &delivery,
            cancel: &cancel,
        };
        run_reduce_phase(ProcessId::next(), 1, &phase)?;
        assert!(delivery.into_sink().is_none());
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![("x", 6)]);
        Ok(())
    }

    #[test]
    fn finalizer_panic_is_reported_with_its_stage() {
        let queue = feed(vec![group("a", &[1])]);
        let finalize: FinalizeFn<&'static str, u32> =
            Arc::new(|_: &&'static str, v: &mut u32| {
                if *v > 0 {
                    panic!("cannot finalize");
                }
            });
        let delivery = Delivery::Exclusive(Mutex::new(MapSink::new()));
        let cancel = CancelToken::new();
        let phase = ReducePhase {
            queue: &queue,
            reducer: &sum,
            finalizer: Some(&finalize),
            filter: None,
            delivery: &delivery,
            cancel: &cancel,
        };
        let err = run_reduce_phase(ProcessId::next(), 1, &phase).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MeduceError>(),
            Some(MeduceError::Callable {
                stage: Stage::Finalizer,
                ..
            })
        ));
    }

    #[test]
    fn queued_sink_workers_leave_a_full_queue_on_cancel() {
        let queue = feed(vec![group("a", &[1]), group("b", &[2]), group("c", &[3])]);
        let (sink, results) = channel_sink(1);
        let delivery = Delivery::for_sink(sink);
        assert!(matches!(delivery, Delivery::Queued { .. }));
        let cancel = CancelToken::new();
        let phase = ReducePhase {
            queue: &queue,
            reducer: &sum,
            finalizer: None,
            filter: None,
            delivery: &delivery,
            cancel: &cancel,
        };

        let outcome = thread::scope(|scope| {
            let canceller = scope.spawn(|| {
                thread::sleep(Duration::from_millis(50));
                cancel.cancel();
            });
            let outcome = run_reduce_phase(ProcessId::next(), 2, &phase);
            canceller.join().unwrap();
            outcome
        });
        let err = outcome.unwrap_err();
        assert!(matches!(err.downcast_ref::<MeduceError>(), Some(MeduceError::Cancelled)));

        delivery.finalize().unwrap();
        assert!(delivery.into_sink().is_some());
        // The one pair that fit is all the reader gets, then the queue closes.
        assert_eq!(results.iter().count(), 1);
    }
}
