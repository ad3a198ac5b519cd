//! The process: one configured MapReduce run and its lifecycle.
//!
//! A [`Process`] moves strictly through `Created → Mapping → Reducing →
//! Finished`, or ends in `Failed` from any of them. [`Process::start`]
//! validates the configuration on the caller's thread and then runs the
//! phases on a thread of its own; [`Process::wait`] blocks until the end and
//! hands back the sink.
//!
//! Inside a run:
//! 1. mapping workers drain the producer into locally sorted and combined runs;
//! 2. once every mapping worker is done, the runs are merged;
//! 3. a group generator publishes equal-key groups onto a bounded queue while
//!    the reducing workers reduce them and deliver to the sink;
//! 4. once every reducing worker is done, the sink is finalized.
//!
//! A process whose output is [`link`](crate::link)ed starts its downstream
//! when it enters the reducing phase and closes the handoff queue when it
//! leaves it.

use crate::callables::{FilterFn, FinalizeFn, Reducer};
use crate::cancel::CancelToken;
use crate::config::{Config, group_queue_capacity};
use crate::error::{MeduceError, panic_message};
use crate::grouping::generate_groups;
use crate::mapping::{MapPhase, run_map_phase};
use crate::merge::merge_runs;
use crate::metrics::{self, MetricsCollector};
use crate::ordering::SortOrder;
use crate::process_id::ProcessId;
use crate::reducing::{Delivery, ReducePhase, run_reduce_phase};
use crate::sinks::{NoSink, Sink};
use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Sender, bounded};
use serde::Serialize;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Created,
    Mapping,
    Reducing,
    Finished,
    Failed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Created => "created",
            ProcessState::Mapping => "mapping",
            ProcessState::Reducing => "reducing",
            ProcessState::Finished => "finished",
            ProcessState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a process did, filled in as its phases complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessStats {
    pub map_workers: usize,
    /// Input pairs handed to the mapper.
    pub pairs_read: u64,
    pub pairs_emitted: u64,
    /// Pairs left across all runs after the local combine.
    pub combined_keys: u64,
    pub merged_pairs: u64,
    pub groups: u64,
    pub reduce_workers: usize,
    /// Reducer calls during the reducing phase.
    pub reductions: u64,
    /// Pairs delivered to the sink or handoff queue.
    pub collections: u64,
}

/// Start/cancel hooks an upstream process holds on its downstream.
pub(crate) trait Launch: Send + Sync {
    fn launch(self: Arc<Self>) -> Result<()>;
    fn cancel(&self);
}

pub(crate) struct Lifecycle<KI, VI, KO, VO, S> {
    pub state: ProcessState,
    pub config: Option<Config<KI, VI, KO, VO, S>>,
    /// Set when the output is linked into another process.
    pub handoff: Option<Sender<(KO, VO)>>,
    pub downstream: Option<Arc<dyn Launch>>,
    /// Set when the input is the handoff queue of another process.
    pub input_linked: bool,
    outcome: Option<Result<Option<S>>>,
    waited: bool,
    stats: ProcessStats,
}

pub(crate) struct Shared<KI, VI, KO, VO, S> {
    pub id: ProcessId,
    cancel: CancelToken,
    cell: Mutex<Lifecycle<KI, VI, KO, VO, S>>,
    changed: Condvar,
}

/// One MapReduce run. See the [module docs](self).
pub struct Process<KI, VI, KO, VO, S = NoSink> {
    pub(crate) shared: Arc<Shared<KI, VI, KO, VO, S>>,
}

impl<KI, VI, KO, VO, S> Process<KI, VI, KO, VO, S>
where
    KI: Send + 'static,
    VI: Send + 'static,
    KO: Send + 'static,
    VO: Send + 'static,
    S: Sink<KO, VO> + 'static,
{
    pub fn new(config: Config<KI, VI, KO, VO, S>) -> Self {
        let id = ProcessId::next();
        debug!(process = %id, "process created");
        Self {
            shared: Arc::new(Shared {
                id,
                cancel: CancelToken::new(),
                cell: Mutex::new(Lifecycle {
                    state: ProcessState::Created,
                    config: Some(config),
                    handoff: None,
                    downstream: None,
                    input_linked: false,
                    outcome: None,
                    waited: false,
                    stats: ProcessStats::default(),
                }),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn id(&self) -> ProcessId {
        self.shared.id
    }

    pub fn state(&self) -> ProcessState {
        self.shared.lock().state
    }

    pub fn stats(&self) -> ProcessStats {
        self.shared.lock().stats
    }

    /// Validate the configuration and start the run in the background.
    ///
    /// Configuration errors are returned here and leave the process
    /// `Created`. Starting twice, or starting a process whose input is
    /// linked (its upstream starts it), is a misuse error.
    pub fn start(&self) -> Result<()> {
        if self.shared.lock().input_linked {
            return Err(MeduceError::misuse(format!(
                "process {} reads a linked input and is started by its upstream",
                self.id()
            ))
            .into());
        }
        self.shared.begin()
    }

    /// Block until the run is over.
    ///
    /// Returns the sink, or `None` when the output was linked into another
    /// process. The outcome can be taken once; waiting again, or waiting on
    /// a process that was never started, is a misuse error.
    pub fn wait(&self) -> Result<Option<S>> {
        let mut cell = self.shared.lock();
        loop {
            if let Some(outcome) = cell.outcome.take() {
                cell.waited = true;
                return outcome;
            }
            if cell.waited {
                return Err(MeduceError::misuse(format!(
                    "the outcome of process {} was already taken",
                    self.id()
                ))
                .into());
            }
            if cell.state == ProcessState::Created && !cell.input_linked {
                return Err(
                    MeduceError::misuse(format!("process {} was never started", self.id())).into(),
                );
            }
            cell = self.shared.changed.wait(cell).unwrap();
        }
    }

    /// `start` followed by `wait`.
    pub fn run(&self) -> Result<Option<S>> {
        self.start()?;
        self.wait()
    }

    /// Stop the run at the next suspension point of every worker.
    ///
    /// The process ends `Failed` with [`MeduceError::Cancelled`]; so does its
    /// downstream, if linked. A process that already ended is left alone.
    pub fn cancel(&self) {
        self.shared.cancel_run();
    }
}

impl<KI, VI, KO, VO, S> Shared<KI, VI, KO, VO, S> {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Lifecycle<KI, VI, KO, VO, S>> {
        self.cell.lock().unwrap()
    }
}

impl<KI, VI, KO, VO, S> Shared<KI, VI, KO, VO, S>
where
    KI: Send + 'static,
    VI: Send + 'static,
    KO: Send + 'static,
    VO: Send + 'static,
    S: Sink<KO, VO> + 'static,
{
    fn begin(self: &Arc<Self>) -> Result<()> {
        let config = {
            let mut cell = self.lock();
            if cell.state != ProcessState::Created {
                return Err(MeduceError::misuse(format!(
                    "process {} cannot start: it is {}",
                    self.id, cell.state
                ))
                .into());
            }
            let Some(config) = cell.config.take() else {
                let message = format!("process {} has no configuration", self.id);
                return Err(MeduceError::misuse(message).into());
            };
            if let Err(err) = config.validate(cell.handoff.is_some()) {
                cell.config = Some(config);
                return Err(err);
            }
            cell.state = ProcessState::Mapping;
            config
        };

        info!(process = %self.id, "process started");
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("meduce-{}", self.id))
            .spawn(move || shared.execute(config));
        if let Err(err) = spawned {
            let message = err.to_string();
            self.finish(Err(anyhow::Error::new(err)
                .context(MeduceError::resource("spawn process thread"))));
            return Err(MeduceError::resource(format!("spawn process thread: {message}")).into());
        }
        Ok(())
    }

    fn execute(&self, config: Config<KI, VI, KO, VO, S>) {
        let result = catch_unwind(AssertUnwindSafe(|| self.run_phases(config)))
            .unwrap_or_else(|payload| {
                Err(anyhow!("process {} panicked: {}", self.id, panic_message(payload.as_ref())))
            });
        self.finish(result);
    }

    fn run_phases(&self, config: Config<KI, VI, KO, VO, S>) -> Result<Option<S>> {
        let id = self.id;
        let cancel = &self.cancel;
        let map_workers = config.map_workers();
        let exec = config.exec;
        let queue_capacity = config.group_queue_capacity;
        let Config {
            order,
            mapper,
            reducer,
            finalizer,
            filter,
            producer,
            sink,
            metrics: collector,
            ..
        } = config;
        let order = order.ok_or_else(|| MeduceError::config("missing key order"))?;
        let mapper = mapper.ok_or_else(|| MeduceError::config("missing mapper"))?;
        let reducer = reducer.ok_or_else(|| MeduceError::config("missing reducer"))?;
        let producer = producer.ok_or_else(|| MeduceError::config("missing producer"))?;
        let counters = Counters(collector.as_ref());
        if let Some(collector) = &collector {
            collector.record_start();
        }

        // Mapping.
        info!(process = %id, workers = map_workers, "mapping phase started");
        counters.add(metrics::MAP_WORKERS, map_workers as u64);
        self.update_stats(|s| s.map_workers = map_workers);
        let outputs = run_map_phase(
            id,
            map_workers,
            &MapPhase {
                producer: producer.as_ref(),
                mapper: &mapper,
                reducer: reducer.as_ref(),
                order: &order,
                cancel,
            },
        )
        .context("mapping phase")?;
        drop(producer);

        let (mut pairs_read, mut pairs_emitted, mut combined_keys) = (0, 0, 0);
        let runs: Vec<_> = outputs
            .into_iter()
            .map(|output| {
                pairs_read += output.stats.mappings;
                pairs_emitted += output.stats.emitted;
                combined_keys += output.stats.unique_keys;
                output.run
            })
            .collect();
        info!(process = %id, pairs_read, pairs_emitted, combined_keys, "mapping phase finished");
        counters.add(metrics::PAIRS_READ, pairs_read);
        counters.add(metrics::PAIRS_EMITTED, pairs_emitted);
        counters.add(metrics::COMBINED_KEYS, combined_keys);

        let merged = merge_runs(runs, &order).context("merging runs")?;
        let merged_pairs = merged.pairs.len() as u64;
        let groups = merged.distinct_keys as u64;
        debug!(process = %id, merged_pairs, groups, "runs merged");
        counters.add(metrics::MERGED_PAIRS, merged_pairs);
        self.update_stats(|s| {
            s.pairs_read = pairs_read;
            s.pairs_emitted = pairs_emitted;
            s.combined_keys = combined_keys;
            s.merged_pairs = merged_pairs;
        });
        if cancel.is_cancelled() {
            return Err(MeduceError::Cancelled.into());
        }

        // Reducing.
        let (handoff, downstream) = self.enter_reducing()?;
        if let Some(downstream) = &downstream {
            Arc::clone(downstream)
                .launch()
                .context("starting linked process")?;
        }
        let delivery = match handoff {
            Some(queue) => Delivery::Handoff(queue),
            None => Delivery::for_sink(sink.ok_or_else(|| MeduceError::config("missing sink"))?),
        };
        let reduce_workers = exec.reduce_workers(merged.distinct_keys);
        let capacity = group_queue_capacity(queue_capacity, reduce_workers);
        info!(process = %id, workers = reduce_workers, groups, "reducing phase started");
        counters.add(metrics::REDUCE_WORKERS, reduce_workers as u64);
        self.update_stats(|s| s.reduce_workers = reduce_workers);

        let reduced = self.reduce_into(
            &delivery,
            merged.pairs,
            &order,
            reducer.as_ref(),
            finalizer.as_ref(),
            filter.as_ref(),
            reduce_workers,
            capacity,
        );
        let (reductions, collections) = match reduced {
            Ok(totals) => totals,
            Err(err) => {
                // The downstream must not mistake the closing handoff for
                // end-of-input.
                if let Some(downstream) = &downstream {
                    downstream.cancel();
                }
                return Err(err);
            }
        };

        counters.add(metrics::GROUPS, groups);
        counters.add(metrics::REDUCTIONS, reductions);
        counters.add(metrics::COLLECTIONS, collections);
        self.update_stats(|s| {
            s.groups = groups;
            s.reductions = reductions;
            s.collections = collections;
        });
        if let Some(collector) = &collector {
            collector.record_end();
        }
        info!(process = %id, groups, reductions, collections, "reducing phase finished");

        // Dropping a handoff here closes the downstream input.
        Ok(delivery.into_sink())
    }

    /// Generate groups from the merged pairs and reduce them into `delivery`.
    ///
    /// Returns the total reductions and collections. The sink is finalized
    /// even when reducing fails.
    #[allow(clippy::too_many_arguments)]
    fn reduce_into(
        &self,
        delivery: &Delivery<S, KO, VO>,
        pairs: Vec<(KO, VO)>,
        order: &SortOrder<KO, VO>,
        reducer: &dyn Reducer<KO, VO>,
        finalizer: Option<&FinalizeFn<KO, VO>>,
        filter: Option<&FilterFn<KO, VO>>,
        workers: usize,
        capacity: usize,
    ) -> Result<(u64, u64)> {
        let id = self.id;
        let cancel = &self.cancel;
        delivery.init()?;
        let (queue_tx, queue_rx) = bounded(capacity);
        let phase = thread::scope(|scope| -> Result<_> {
            let generator = thread::Builder::new()
                .name(format!("meduce-{id}-groups"))
                .spawn_scoped(scope, move || generate_groups(pairs, order, queue_tx, cancel))
                .context(MeduceError::resource("spawn group generator"))?;
            let reduced = run_reduce_phase(
                id,
                workers,
                &ReducePhase {
                    queue: &queue_rx,
                    reducer,
                    finalizer,
                    filter,
                    delivery,
                    cancel,
                },
            );
            drop(queue_rx);
            let generated = generator.join().unwrap_or_else(|payload| {
                Err(anyhow!("group generator panicked: {}", panic_message(payload.as_ref())))
            });
            Ok((reduced, generated))
        });
        let finalized = delivery.finalize();

        let (reduced, generated) = phase?;
        let worker_stats = reduced.context("reducing phase")?;
        generated.context("generating groups")?;
        finalized.context("finalizing sink")?;

        Ok(worker_stats
            .iter()
            .fold((0, 0), |(r, c), w| (r + w.reductions, c + w.collections)))
    }

    /// Move to `Reducing` and take the link endpoints out of the cell.
    fn enter_reducing(&self) -> Result<(Option<Sender<(KO, VO)>>, Option<Arc<dyn Launch>>)> {
        let mut cell = self.lock();
        if cell.state != ProcessState::Mapping {
            return Err(MeduceError::Cancelled.into());
        }
        cell.state = ProcessState::Reducing;
        Ok((cell.handoff.take(), cell.downstream.clone()))
    }

    fn update_stats(&self, f: impl FnOnce(&mut ProcessStats)) {
        f(&mut self.lock().stats);
    }

    /// Record the outcome, wake every waiter and, on failure, cancel the
    /// downstream.
    fn finish(&self, result: Result<Option<S>>) {
        let (failed, downstream) = {
            let mut cell = self.lock();
            match &result {
                Ok(_) => {
                    cell.state = ProcessState::Finished;
                    info!(process = %self.id, "process finished");
                }
                Err(err) => {
                    cell.state = ProcessState::Failed;
                    let message = format!("{err:#}");
                    error!(process = %self.id, error = %message, "process failed");
                }
            }
            cell.handoff = None;
            cell.outcome = Some(result);
            (cell.state == ProcessState::Failed, cell.downstream.take())
        };
        self.changed.notify_all();

        if failed {
            self.cancel.cancel();
            if let Some(downstream) = downstream {
                downstream.cancel();
            }
        }
    }

    fn cancel_run(&self) {
        self.cancel.cancel();
        let downstream = {
            let mut cell = self.lock();
            if cell.state != ProcessState::Created {
                return;
            }
            info!(process = %self.id, "process cancelled before start");
            cell.state = ProcessState::Failed;
            cell.config = None;
            cell.handoff = None;
            cell.outcome = Some(Err(MeduceError::Cancelled.into()));
            cell.downstream.take()
        };
        self.changed.notify_all();
        if let Some(downstream) = downstream {
            downstream.cancel();
        }
    }
}

impl<KI, VI, KO, VO, S> Launch for Shared<KI, VI, KO, VO, S>
where
    KI: Send + 'static,
    VI: Send + 'static,
    KO: Send + 'static,
    VO: Send + 'static,
    S: Sink<KO, VO> + 'static,
{
    fn launch(self: Arc<Self>) -> Result<()> {
        if let Err(err) = self.begin() {
            let message = format!("{err:#}");
            let still_created = self.lock().state == ProcessState::Created;
            if still_created {
                self.finish(Err(err));
            }
            return Err(MeduceError::config(format!(
                "linked process {} did not start: {message}",
                self.id
            ))
            .into());
        }
        Ok(())
    }

    fn cancel(&self) {
        self.cancel_run();
    }
}

/// Bumps metrics counters when a collector is configured.
struct Counters<'a>(Option<&'a MetricsCollector>);

impl Counters<'_> {
    fn add(&self, name: &str, value: u64) {
        if let Some(metrics) = self.0 {
            metrics.increment_counter(name, value);
        }
    }
}
