//! Sinks: where a process delivers its reduced pairs.
//!
//! The engine calls [`Sink::init`] once before the first delivery,
//! [`Sink::collect`] once per surviving key, and [`Sink::finalize`] once after
//! the last reducing worker has finished.
//!
//! Sinks take `&mut self`: the engine serialises deliveries from concurrent
//! reducing workers behind a single lock. A sink backed by a bounded queue
//! can say so through [`Sink::queue`]; the engine then sends to that queue
//! directly, without the lock, and a worker waiting on a full queue still
//! wakes up on cancellation. The handoff queue of a pipeline link is
//! delivered to the same way.
//!
//! `finalize` runs on failure too, so sinks release what they hold (the
//! console gate, an open file, a channel). Whatever was delivered before the
//! failure stays delivered: a [`FileSink`] is flushed with the lines written
//! so far. Check the outcome of [`Process::wait`](crate::Process::wait)
//! before trusting sink contents.
//!
//! - [`MapSink`] -- collects into a `HashMap`.
//! - [`SingleValueSink`] -- expects exactly one pair.
//! - [`WriterSink`] / [`FileSink`] / [`StdoutSink`] -- formatted lines.
//! - [`ChannelSink`] -- forwards into a bounded channel.
//! - [`NoSink`] -- placeholder for processes whose output is linked.

mod channel;
mod map;
mod single;
mod writer;

pub use channel::{ChannelSink, channel_sink};
pub use map::MapSink;
pub use single::SingleValueSink;
pub use writer::{FileSink, Formatter, StdoutSink, WriterSink, to_file, to_stdout};

use crate::error::MeduceError;
use anyhow::Result;
use crossbeam_channel::Sender;

pub trait Sink<K, V>: Send {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn collect(&mut self, key: K, value: V) -> Result<()>;

    /// The sending end of the bounded queue this sink writes into, if any.
    ///
    /// Asked once, when the reducing phase starts. Returning a sender makes
    /// the engine deliver by sending on it instead of calling `collect`
    /// under the sink lock; `init` and `finalize` are still called.
    fn queue(&self) -> Option<Sender<(K, V)>> {
        None
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink type of a process that has none; only valid for a linked upstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSink;

impl<K, V> Sink<K, V> for NoSink {
    fn collect(&mut self, _key: K, _value: V) -> Result<()> {
        Err(MeduceError::misuse("no sink configured").into())
    }
}
