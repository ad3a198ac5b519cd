//! Worker pool execution shared by the mapping and reducing phases.
//!
//! Each phase builds a dedicated Rayon pool sized to exactly its worker count
//! and spawns one job per worker inside `pool.scope`. Leaving the scope is the
//! phase barrier: every worker has reported back before the caller continues.

use crate::cancel::CancelToken;
use crate::error::{MeduceError, Stage};
use crate::process_id::ProcessId;
use anyhow::{Context, Result};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use tracing::error;

/// How many workers each phase may use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    /// One mapping worker and one reducing worker.
    Sequential,
    /// `None` means "available parallelism".
    Parallel {
        map_workers: Option<usize>,
        reduce_workers: Option<usize>,
    },
}

impl Default for ExecMode {
    fn default() -> Self {
        ExecMode::Parallel {
            map_workers: None,
            reduce_workers: None,
        }
    }
}

impl ExecMode {
    /// Fixed number of workers for both phases.
    pub fn workers(n: usize) -> Self {
        ExecMode::Parallel {
            map_workers: Some(n),
            reduce_workers: Some(n),
        }
    }

    /// Mapping workers before the producer's size hint is applied.
    pub(crate) fn map_workers(&self) -> usize {
        match self {
            ExecMode::Sequential => 1,
            ExecMode::Parallel { map_workers, .. } => {
                map_workers.unwrap_or_else(num_cpus::get).max(1)
            }
        }
    }

    /// Reducing workers for `groups` groups; zero groups need zero workers.
    pub(crate) fn reduce_workers(&self, groups: usize) -> usize {
        let cap = match self {
            ExecMode::Sequential => 1,
            ExecMode::Parallel { reduce_workers, .. } => {
                reduce_workers.unwrap_or_else(num_cpus::get).max(1)
            }
        };
        groups.min(cap)
    }
}

/// Run a user callable, turning a panic into a [`MeduceError::Callable`].
pub(crate) fn guarded<T>(stage: Stage, f: impl FnOnce() -> T) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| MeduceError::from_panic(stage, payload).into())
}

/// Run every worker on its own thread of a fresh pool and wait for all of them.
///
/// The first failing worker fires `cancel` so the others leave their
/// suspension points; its error is the one returned. Results keep the order
/// of `workers`.
pub(crate) fn run_workers<W, T, F>(
    process: ProcessId,
    phase: &'static str,
    cancel: &CancelToken,
    workers: Vec<W>,
    f: F,
) -> Result<Vec<T>>
where
    W: Send,
    T: Send,
    F: Fn(W) -> Result<T> + Sync,
{
    if workers.is_empty() {
        return Ok(Vec::new());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.len())
        .thread_name(move |i| format!("meduce-{process}-{phase}-{i}"))
        .build()
        .with_context(|| format!("build {phase} pool for process {process}"))?;

    let first_failure: Mutex<Option<anyhow::Error>> = Mutex::new(None);
    let mut slots: Vec<Option<T>> = workers.iter().map(|_| None).collect();
    let f = &f;
    let first_failure_ref = &first_failure;

    pool.scope(|s| {
        for (slot, worker) in slots.iter_mut().zip(workers) {
            s.spawn(move |_| match f(worker) {
                Ok(out) => *slot = Some(out),
                Err(err) => {
                    let mut first = first_failure_ref.lock().unwrap();
                    if first.is_none() {
                        let message = format!("{err:#}");
                        error!(process = %process, phase, error = %message, "worker failed");
                        *first = Some(err);
                    }
                    cancel.cancel();
                }
            });
        }
    });

    if let Some(err) = first_failure.into_inner().unwrap_or_else(|p| p.into_inner()) {
        return Err(err);
    }
    slots
        .into_iter()
        .map(|slot| slot.ok_or_else(|| anyhow::anyhow!("{phase} worker produced no result")))
        .collect()
}
