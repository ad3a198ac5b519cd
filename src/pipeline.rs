//! Pipelining: feed one process's output straight into another's input.
//!
//! [`link`] replaces the downstream producer with the receiving end of a
//! bounded handoff queue and gives the upstream the sending end in place of
//! its sink. The downstream is started by the upstream as soon as the
//! upstream enters its reducing phase, so upstream reduction and downstream
//! mapping overlap. Upstream reducing workers block once the queue is full.
//! The upstream closes the queue when its reducing phase ends, which is
//! end-of-input for the downstream.
//!
//! ```no_run
//! use meduce::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! // Count words, then count how many words share each count.
//! let words = Process::new(
//!     Config::new()
//!         .with_natural_order()
//!         .with_mapper(|_: usize, line: String, out: &mut Emitter<String, u64>| {
//!             line.split_whitespace().for_each(|w| out.emit(w.to_string(), 1));
//!         })
//!         .with_reducer(reducers::Sum::<u64>::new())
//!         .with_producer(from_file("input.txt")?),
//! );
//! let histogram = Process::new(
//!     Config::new()
//!         .with_natural_order()
//!         .with_mapper(|_: String, n: u64, out: &mut Emitter<u64, u64>| out.emit(n, 1))
//!         .with_reducer(reducers::Sum::<u64>::new())
//!         .with_sink(MapSink::new()),
//! );
//! link_default(&words, &histogram)?;
//! words.start()?;
//! words.wait()?;
//! let counts = histogram.wait()?;
//! # Ok(())
//! # }
//! ```

use crate::error::MeduceError;
use crate::process::{Launch, Process, ProcessState};
use crate::sinks::Sink;
use crate::sources::ChannelSource;
use anyhow::Result;
use crossbeam_channel::bounded;
use std::sync::Arc;
use tracing::debug;

/// Handoff queue capacity used by [`link_default`].
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Link `upstream`'s output into `downstream`'s input through a queue of
/// `buffer_size` pairs.
///
/// Both processes must still be `Created`; each side can be linked once.
/// Whatever producer `downstream` was configured with is replaced, and
/// `upstream` no longer needs a sink (if it has one, it is not used).
pub fn link<KI, VI, K, V, KO, VO, S1, S2>(
    upstream: &Process<KI, VI, K, V, S1>,
    downstream: &Process<K, V, KO, VO, S2>,
    buffer_size: usize,
) -> Result<()>
where
    KI: Send + 'static,
    VI: Send + 'static,
    K: Send + 'static,
    V: Send + 'static,
    KO: Send + 'static,
    VO: Send + 'static,
    S1: Sink<K, V> + 'static,
    S2: Sink<KO, VO> + 'static,
{
    if buffer_size == 0 {
        return Err(MeduceError::config("handoff buffer size must be at least 1").into());
    }
    let (up_id, down_id) = (upstream.id(), downstream.id());
    if up_id == down_id {
        let message = format!("process {up_id} cannot be linked to itself");
        return Err(MeduceError::misuse(message).into());
    }

    // Lock in id order so concurrent links never wait on each other in a cycle.
    let (mut up, mut down) = if up_id.raw() < down_id.raw() {
        let up = upstream.shared.lock();
        (up, downstream.shared.lock())
    } else {
        let down = downstream.shared.lock();
        (upstream.shared.lock(), down)
    };

    for (id, state) in [(up_id, up.state), (down_id, down.state)] {
        if state != ProcessState::Created {
            return Err(
                MeduceError::misuse(format!("process {id} cannot be linked: it is {state}")).into(),
            );
        }
    }
    if up.handoff.is_some() {
        let message = format!("output of process {up_id} is already linked");
        return Err(MeduceError::misuse(message).into());
    }
    if down.input_linked {
        let message = format!("input of process {down_id} is already linked");
        return Err(MeduceError::misuse(message).into());
    }
    let Some(down_config) = down.config.as_mut() else {
        return Err(MeduceError::misuse(format!("process {down_id} has no configuration")).into());
    };

    let (tx, rx) = bounded(buffer_size);
    down_config.producer = Some(Box::new(ChannelSource::from_receiver(rx)));
    down.input_linked = true;
    up.handoff = Some(tx);
    up.downstream = Some(Arc::clone(&downstream.shared) as Arc<dyn Launch>);
    debug!(upstream = %up_id, downstream = %down_id, buffer_size, "processes linked");
    Ok(())
}

/// [`link`] with a handoff queue of [`DEFAULT_BUFFER_SIZE`] pairs.
pub fn link_default<KI, VI, K, V, KO, VO, S1, S2>(
    upstream: &Process<KI, VI, K, V, S1>,
    downstream: &Process<K, V, KO, VO, S2>,
) -> Result<()>
where
    KI: Send + 'static,
    VI: Send + 'static,
    K: Send + 'static,
    V: Send + 'static,
    KO: Send + 'static,
    VO: Send + 'static,
    S1: Sink<K, V> + 'static,
    S2: Sink<KO, VO> + 'static,
{
    link(upstream, downstream, DEFAULT_BUFFER_SIZE)
}
