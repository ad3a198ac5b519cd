//! Counters reported by a running process.
//!
//! A [`MetricsCollector`] is the optional diagnostic sink of a process. It is
//! a cloneable handle around a shared registry of named counters plus the
//! start and end instants of the run; give one clone to
//! [`Config::with_metrics`](crate::Config::with_metrics) and keep another to
//! read the numbers back. Nothing in the engine ever reads a counter, so a
//! collector only observes.
//!
//! # Example
//!
//! ```no_run
//! use meduce::*;
//! use meduce::metrics::{self, MetricsCollector};
//!
//! # fn main() -> anyhow::Result<()> {
//! let metrics = MetricsCollector::new();
//! let config = Config::new()
//!     .with_natural_order()
//!     .with_mapper(|_i: usize, word: String, out: &mut Emitter<String, u64>| out.emit(word, 1))
//!     .with_reducer(reducers::Sum::<u64>::new())
//!     .with_producer(from_vec(vec!["a".to_string(), "b".to_string(), "a".to_string()]))
//!     .with_sink(MapSink::new())
//!     .with_metrics(metrics.clone());
//! Process::new(config).run()?;
//!
//! assert_eq!(metrics.counter(metrics::GROUPS), 2);
//! metrics.print();
//! metrics.save_to_file("metrics.json")?;
//! # Ok(())
//! # }
//! ```

use crate::error::MeduceError;
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Mapping workers started.
pub const MAP_WORKERS: &str = "map_workers";
/// Input pairs taken from the producer (one mapper call each).
pub const PAIRS_READ: &str = "pairs_read";
/// Intermediate pairs emitted by the mapper.
pub const PAIRS_EMITTED: &str = "pairs_emitted";
/// Pairs left in all runs after the local combine.
pub const COMBINED_KEYS: &str = "combined_keys";
/// Pairs in the merged sequence.
pub const MERGED_PAIRS: &str = "merged_pairs";
/// Distinct keys, i.e. groups handed to the reducing workers.
pub const GROUPS: &str = "groups";
pub const REDUCE_WORKERS: &str = "reduce_workers";
/// Reducer calls in the reducing phase (singleton groups skip the call).
pub const REDUCTIONS: &str = "reductions";
/// Pairs delivered to the sink or handoff queue.
pub const COLLECTIONS: &str = "collections";

/// Thread-safe registry of named counters.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsCollectorInner>>,
}

struct MetricsCollectorInner {
    counters: BTreeMap<String, u64>,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsCollectorInner {
                counters: BTreeMap::new(),
                start_time: None,
                end_time: None,
            })),
        }
    }

    pub fn record_start(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.start_time = Some(Instant::now());
        inner.end_time = None;
    }

    pub fn record_end(&self) {
        self.inner.lock().unwrap().end_time = Some(Instant::now());
    }

    /// Time between `record_start` and `record_end`, once both happened.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.inner.lock().unwrap();
        match (inner.start_time, inner.end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// Add `value` to a counter, creating it at zero first if needed.
    pub fn increment_counter(&self, name: &str, value: u64) {
        let mut inner = self.inner.lock().unwrap();
        *inner.counters.entry(name.to_string()).or_insert(0) += value;
    }

    pub fn set_counter(&self, name: &str, value: u64) {
        self.inner
            .lock()
            .unwrap()
            .counters
            .insert(name.to_string(), value);
    }

    /// Current value of a counter; zero when it was never touched.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .counters
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.inner.lock().unwrap().counters.clone()
    }

    /// Every counter, plus `execution_time_ms` once the run has ended.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let inner = self.inner.lock().unwrap();
        let mut out = serde_json::Map::new();
        for (name, value) in &inner.counters {
            out.insert(name.clone(), json!(value));
        }
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            let elapsed_ms = end.duration_since(start).as_millis();
            out.insert("execution_time_ms".to_string(), json!(elapsed_ms));
        }
        Value::Object(out)
    }

    /// Print every counter to stdout, one per line.
    pub fn print(&self) {
        println!("\n========== Process Metrics ==========");
        if let Some(elapsed) = self.elapsed() {
            println!(
                "Execution Time: {:.3}s ({} ms)",
                elapsed.as_secs_f64(),
                elapsed.as_millis()
            );
            println!("-------------------------------------");
        }
        for (name, value) in self.snapshot() {
            println!("{name}: {value}");
        }
        println!("=====================================\n");
    }

    /// Write [`to_json`](Self::to_json) to `path`, pretty-printed.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        let mut file = File::create(path)
            .context(MeduceError::resource(format!("create {}", path.display())))?;
        file.write_all(formatted.as_bytes())
            .context(MeduceError::resource(format!("write {}", path.display())))?;
        Ok(())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
