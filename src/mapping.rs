//! Mapping phase: drain the producer, map, then sort and combine locally.
//!
//! Each worker owns its [`Emitter`]; nothing is shared between workers but
//! the producer. What a worker hands back is its run: sorted under the
//! process order, with every key present at most once.

use crate::callables::{Emitter, MapFn, Reducer};
use crate::cancel::CancelToken;
use crate::error::Stage;
use crate::grouping::{Group, Groups};
use crate::ordering::SortOrder;
use crate::process_id::ProcessId;
use crate::runner::{guarded, run_workers};
use crate::sources::Producer;
use anyhow::Result;
use tracing::debug;

/// Everything a mapping worker reads but does not own.
pub(crate) struct MapPhase<'a, KI, VI, KO, VO> {
    pub producer: &'a dyn Producer<KI, VI>,
    pub mapper: &'a MapFn<KI, VI, KO, VO>,
    pub reducer: &'a dyn Reducer<KO, VO>,
    pub order: &'a SortOrder<KO, VO>,
    pub cancel: &'a CancelToken,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct MapWorkerStats {
    pub mappings: u64,
    pub emitted: u64,
    pub unique_keys: u64,
}

pub(crate) struct MapOutput<K, V> {
    pub run: Vec<(K, V)>,
    pub stats: MapWorkerStats,
}

struct MapWorker<K, V> {
    index: usize,
    emitter: Emitter<K, V>,
    mappings: u64,
}

impl<K, V> MapWorker<K, V> {
    fn new(index: usize) -> Self {
        Self {
            index,
            emitter: Emitter::new(),
            mappings: 0,
        }
    }

    fn run<KI, VI>(
        mut self,
        process: ProcessId,
        phase: &MapPhase<'_, KI, VI, K, V>,
    ) -> Result<MapOutput<K, V>> {
        while let Some((key, value)) = phase.producer.recv(phase.cancel)? {
            let emitter = &mut self.emitter;
            guarded(Stage::Mapper, || (phase.mapper)(key, value, emitter))?;
            self.mappings += 1;
        }

        let pairs = self.emitter.into_pairs();
        let emitted = pairs.len() as u64;
        let run = sort_and_combine(pairs, phase.order, phase.reducer)?;
        let stats = MapWorkerStats {
            mappings: self.mappings,
            emitted,
            unique_keys: run.len() as u64,
        };
        debug!(
            process = %process,
            worker = self.index,
            mappings = stats.mappings,
            emitted = stats.emitted,
            unique_keys = stats.unique_keys,
            "mapping worker finished"
        );
        Ok(MapOutput { run, stats })
    }
}

/// Run `workers` mapping workers against the shared producer and return
/// their runs in worker order.
pub(crate) fn run_map_phase<KI, VI, KO, VO>(
    process: ProcessId,
    workers: usize,
    phase: &MapPhase<'_, KI, VI, KO, VO>,
) -> Result<Vec<MapOutput<KO, VO>>>
where
    KO: Send,
    VO: Send,
{
    let pool: Vec<MapWorker<KO, VO>> = (0..workers).map(MapWorker::new).collect();
    run_workers(process, "map", phase.cancel, pool, |worker| worker.run(process, phase))
}

/// Sort `pairs` under `order` and fold every run of equal keys into one pair.
///
/// The sort is stable, so without a value order equal keys keep emission
/// order. Runs of one pair pass through without a reducer call.
pub(crate) fn sort_and_combine<K, V>(
    mut pairs: Vec<(K, V)>,
    order: &SortOrder<K, V>,
    reducer: &dyn Reducer<K, V>,
) -> Result<Vec<(K, V)>> {
    guarded(Stage::Ordering, || pairs.sort_by(|a, b| order.compare_pairs(a, b)))?;

    let mut run = Vec::with_capacity(pairs.len());
    for group in Groups::new(pairs.into_iter(), order) {
        let Group { key, mut values } = group?;
        let value = if values.len() == 1 {
            values.swap_remove(0)
        } else {
            guarded(Stage::Reducer, || reducer.reduce(&key, values))?
        };
        run.push((key, value));
    }
    Ok(run)
}
