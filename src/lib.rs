//! # Meduce
//!
//! A **single-machine, in-memory MapReduce engine**. A [`Process`] reads
//! key/value pairs from a [`Producer`], maps them in parallel, groups the
//! intermediate pairs by key, reduces every group in parallel and delivers the
//! results to a [`Sink`]. Processes can be chained with [`link`] so that one
//! process's reduction feeds the next one's mapping through a bounded queue.
//!
//! ## Key Features
//!
//! - **Local combine** - each mapping worker sorts its own output and folds
//!   equal keys with the reducer before anything is shared
//! - **Deterministic merge** - worker runs are merged into one key-ordered
//!   sequence, so the set of results never depends on the worker count
//! - **Custom ordering** - any total order over keys, plus an optional
//!   secondary order over values
//! - **Finalizer and filter** - adjust or drop reduced pairs before delivery
//! - **Pipelining with backpressure** - linked processes overlap, bounded by
//!   the handoff queue
//! - **Fail fast** - the first error (or panicking callable) stops every
//!   worker; [`Process::cancel`] does the same on request
//!
//! ## Quick Start
//!
//! ```
//! use meduce::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let lines = vec!["2020\tA".to_string(), "2021\tB".to_string(), "2020\tC".to_string()];
//!
//! let config = Config::new()
//!     .with_natural_order()
//!     .with_mapper(|_index: usize, line: String, out: &mut Emitter<String, u64>| {
//!         if let Some((year, _)) = line.split_once('\t') {
//!             out.emit(year.to_string(), 1);
//!         }
//!     })
//!     .with_reducer(reducers::Sum::<u64>::new())
//!     .with_producer(from_vec(lines))
//!     .with_sink(MapSink::new());
//!
//! let counts = Process::new(config).run()?.expect("sink");
//! assert_eq!(counts.get(&"2020".to_string()), Some(&2));
//! assert_eq!(counts.get(&"2021".to_string()), Some(&1));
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Callables
//!
//! - **Mapper** `Fn(KI, VI, &mut Emitter<KO, VO>)` - emits any number of pairs per input
//! - **Reducer** [`Reducer<KO, VO>`] - folds all values of a key into one; it
//!   runs both as a per-worker combiner and as the final reduction, so it must
//!   be associative and order-insensitive (see [`reducers`])
//! - **Finalizer** `Fn(&KO, &mut VO)` - optional in-place adjustment
//! - **Filter** `Fn(&KO, &VO) -> bool` - optional gate in front of the sink
//!
//! A panic inside any of them fails the process with
//! [`MeduceError::Callable`], naming the [`Stage`].
//!
//! ### Ordering
//!
//! [`SortOrder`] decides both the order of the merged sequence and which keys
//! are the same group: two keys share a group exactly when the key comparator
//! returns `Equal`.
//!
//! ### Execution Modes
//!
//! [`ExecMode::Sequential`] uses one worker per phase; [`ExecMode::Parallel`]
//! uses as many as requested, or the number of CPUs. Mapping never uses more
//! workers than the producer has pairs, and reducing never more than there
//! are groups.
//!
//! ## Producers and Sinks
//!
//! - [`sources`]: [`from_vec`], [`from_map`], [`from_pairs`], [`from_file`],
//!   [`channel_source`], [`fan_in`]
//! - [`sinks`]: [`MapSink`], [`SingleValueSink`], [`to_file`], [`to_stdout`],
//!   [`channel_sink`]
//!
//! ## Logging
//!
//! The engine logs through [`tracing`]: phase boundaries at `info`, per-worker
//! summaries at `debug`, failures at `error`. Install any subscriber to see
//! them. For numbers you can read back, attach a
//! [`MetricsCollector`](metrics::MetricsCollector).

pub mod callables;
pub mod cancel;
pub mod config;
pub mod error;
mod grouping;
mod mapping;
mod merge;
pub mod metrics;
pub mod ordering;
pub mod pipeline;
pub mod process;
pub mod process_id;
pub mod reducers;
mod reducing;
pub mod runner;
pub mod sinks;
pub mod sources;
pub mod testing;

pub use callables::{Emitter, FilterFn, FinalizeFn, MapFn, Reducer};
pub use cancel::CancelToken;
pub use config::Config;
pub use error::{MeduceError, Stage, is_cancelled};
pub use metrics::MetricsCollector;
pub use ordering::{Compare, SortOrder};
pub use pipeline::{DEFAULT_BUFFER_SIZE, link, link_default};
pub use process::{Process, ProcessState, ProcessStats};
pub use process_id::ProcessId;
pub use runner::ExecMode;
pub use sinks::{
    ChannelSink, FileSink, Formatter, MapSink, NoSink, SingleValueSink, Sink, StdoutSink,
    WriterSink, channel_sink, to_file, to_stdout,
};
pub use sources::{
    ChannelSource, FanIn, FileSource, MemorySource, Producer, channel_source, fan_in, from_file,
    from_map, from_pairs, from_vec,
};
