//! Unique identifier for a [`Process`](crate::process::Process).
//!
//! Identifiers are handed out by a single process-wide counter when a
//! `Process` is constructed. They are only used to tell processes apart in
//! logs, thread names and metrics; nothing in the engine depends on their
//! numeric value.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// The process-wide counter. Starts at 1 so that a zero id never appears in logs.
static NEXT_PROCESS_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, `Copy` identifier of a process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct ProcessId(u64);

impl ProcessId {
    /// Take the next identifier from the process-wide counter.
    pub(crate) fn next() -> Self {
        Self(NEXT_PROCESS_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the underlying numeric value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
