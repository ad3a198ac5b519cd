//! Process configuration, assembled fluently before the run.
//!
//! ```no_run
//! use meduce::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::new()
//!     .with_natural_order()
//!     .with_mapper(|_line: usize, text: String, out: &mut Emitter<String, u64>| {
//!         for word in text.split_whitespace() {
//!             out.emit(word.to_lowercase(), 1);
//!         }
//!     })
//!     .with_reducer(reducers::Sum::<u64>::new())
//!     .with_producer(from_file("input.txt")?)
//!     .with_sink(to_stdout())
//!     .with_exec_mode(ExecMode::workers(4));
//! Process::new(config).run()?;
//! # Ok(())
//! # }
//! ```

use crate::callables::{Emitter, FilterFn, FinalizeFn, MapFn, Reducer};
use crate::error::MeduceError;
use crate::metrics::MetricsCollector;
use crate::ordering::SortOrder;
use crate::runner::ExecMode;
use crate::sinks::NoSink;
use crate::sources::Producer;
use anyhow::Result;
use std::sync::Arc;

/// Group queue slots per reducing worker when no capacity is set.
const GROUP_QUEUE_SLOTS_PER_WORKER: usize = 4;

/// Everything a [`Process`](crate::Process) needs to run.
///
/// `KI`/`VI` are the input pair types, `KO`/`VO` the intermediate and output
/// pair types, and `S` the sink. Order, mapper, reducer, producer and sink are
/// required; the producer may instead come from
/// [`link`](crate::link), and the sink may be left out when the process
/// output is linked into another process.
pub struct Config<KI, VI, KO, VO, S = NoSink> {
    pub(crate) order: Option<SortOrder<KO, VO>>,
    pub(crate) mapper: Option<MapFn<KI, VI, KO, VO>>,
    pub(crate) reducer: Option<Arc<dyn Reducer<KO, VO>>>,
    pub(crate) finalizer: Option<FinalizeFn<KO, VO>>,
    pub(crate) filter: Option<FilterFn<KO, VO>>,
    pub(crate) producer: Option<Box<dyn Producer<KI, VI>>>,
    pub(crate) sink: Option<S>,
    pub(crate) exec: ExecMode,
    pub(crate) group_queue_capacity: Option<usize>,
    pub(crate) metrics: Option<MetricsCollector>,
}

impl<KI, VI, KO, VO> Config<KI, VI, KO, VO, NoSink> {
    pub fn new() -> Self {
        Self {
            order: None,
            mapper: None,
            reducer: None,
            finalizer: None,
            filter: None,
            producer: None,
            sink: None,
            exec: ExecMode::default(),
            group_queue_capacity: None,
            metrics: None,
        }
    }
}

impl<KI, VI, KO, VO> Default for Config<KI, VI, KO, VO, NoSink> {
    fn default() -> Self {
        Self::new()
    }
}

impl<KI, VI, KO, VO, S> Config<KI, VI, KO, VO, S> {
    #[must_use]
    pub fn with_order(mut self, order: SortOrder<KO, VO>) -> Self {
        self.order = Some(order);
        self
    }

    /// Order keys by their `Ord` implementation, values unordered.
    #[must_use]
    pub fn with_natural_order(self) -> Self
    where
        KO: Ord + 'static,
    {
        self.with_order(SortOrder::natural())
    }

    #[must_use]
    pub fn with_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(KI, VI, &mut Emitter<KO, VO>) + Send + Sync + 'static,
    {
        self.mapper = Some(Arc::new(mapper));
        self
    }

    /// The reducer is used both as the per-worker combiner and for the final
    /// reduction; see [`Reducer`] for what that asks of it.
    #[must_use]
    pub fn with_reducer<R>(mut self, reducer: R) -> Self
    where
        R: Reducer<KO, VO> + 'static,
    {
        self.reducer = Some(Arc::new(reducer));
        self
    }

    /// Adjust each reduced value in place before filtering.
    #[must_use]
    pub fn with_finalizer<F>(mut self, finalizer: F) -> Self
    where
        F: Fn(&KO, &mut VO) + Send + Sync + 'static,
    {
        self.finalizer = Some(Arc::new(finalizer));
        self
    }

    /// Only pairs for which `filter` returns `true` reach the sink.
    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&KO, &VO) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn with_producer<P>(mut self, producer: P) -> Self
    where
        P: Producer<KI, VI> + 'static,
    {
        self.producer = Some(Box::new(producer));
        self
    }

    #[must_use]
    pub fn with_sink<S2>(self, sink: S2) -> Config<KI, VI, KO, VO, S2> {
        Config {
            order: self.order,
            mapper: self.mapper,
            reducer: self.reducer,
            finalizer: self.finalizer,
            filter: self.filter,
            producer: self.producer,
            sink: Some(sink),
            exec: self.exec,
            group_queue_capacity: self.group_queue_capacity,
            metrics: self.metrics,
        }
    }

    #[must_use]
    pub fn with_exec_mode(mut self, exec: ExecMode) -> Self {
        self.exec = exec;
        self
    }

    /// Bound on the queue between the group generator and the reducing
    /// workers. Defaults to four slots per reducing worker.
    #[must_use]
    pub fn with_group_queue_capacity(mut self, capacity: usize) -> Self {
        self.group_queue_capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn exec_mode(&self) -> ExecMode {
        self.exec
    }

    /// Check that every required piece is present.
    ///
    /// `output_linked` waives the sink requirement.
    pub(crate) fn validate(&self, output_linked: bool) -> Result<()> {
        let mut missing = Vec::new();
        if self.order.is_none() {
            missing.push("key order");
        }
        if self.mapper.is_none() {
            missing.push("mapper");
        }
        if self.reducer.is_none() {
            missing.push("reducer");
        }
        if self.producer.is_none() {
            missing.push("producer");
        }
        if self.sink.is_none() && !output_linked {
            missing.push("sink");
        }
        if !missing.is_empty() {
            return Err(MeduceError::config(format!("missing {}", missing.join(", "))).into());
        }
        if self.group_queue_capacity == Some(0) {
            return Err(MeduceError::config("group queue capacity must be at least 1").into());
        }
        if let ExecMode::Parallel {
            map_workers: Some(0),
            ..
        }
        | ExecMode::Parallel {
            reduce_workers: Some(0),
            ..
        } = self.exec
        {
            return Err(MeduceError::config("worker counts must be at least 1").into());
        }
        Ok(())
    }

    /// Mapping workers for this run: the configured count, but never more
    /// than the producer has pairs to hand out.
    pub(crate) fn map_workers(&self) -> usize {
        let wanted = self.exec.map_workers();
        match self.producer.as_ref().and_then(|p| p.size_hint()) {
            Some(remaining) => wanted.min(remaining.max(1)),
            None => wanted,
        }
    }
}

/// Capacity of the group queue: the configured one, or four slots per
/// reducing worker.
pub(crate) fn group_queue_capacity(configured: Option<usize>, reduce_workers: usize) -> usize {
    configured
        .unwrap_or(GROUP_QUEUE_SLOTS_PER_WORKER * reduce_workers)
        .max(1)
}
