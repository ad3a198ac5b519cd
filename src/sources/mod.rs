//! Producers: where a process reads its input pairs from.
//!
//! A [`Producer`] is shared by every mapping worker of a process. Workers call
//! [`Producer::recv`] concurrently; each pair is handed to exactly one of them,
//! first come first served, and `Ok(None)` tells a worker the input is
//! exhausted.
//!
//! - [`MemorySource`] -- an in-memory buffer ([`from_vec`], [`from_map`], [`from_pairs`]).
//! - [`FileSource`] -- lines of a text file ([`from_file`]).
//! - [`ChannelSource`] -- a bounded channel fed by any thread ([`channel_source`]);
//!   also the downstream end of a pipeline link.
//! - [`FanIn`] -- several channel sources merged into one ([`fan_in`]).

mod channel;
mod fan_in;
mod file;
mod memory;

pub use channel::{ChannelSource, channel_source};
pub use fan_in::{FanIn, fan_in};
pub use file::{FileSource, from_file};
pub use memory::{MemorySource, from_map, from_pairs, from_vec};

use crate::cancel::CancelToken;
use anyhow::Result;

pub trait Producer<K, V>: Send + Sync {
    /// Next pair, blocking until one is ready; `None` once exhausted.
    ///
    /// Blocking implementations must return
    /// [`MeduceError::Cancelled`](crate::MeduceError::Cancelled) promptly once
    /// `cancel` fires.
    fn recv(&self, cancel: &CancelToken) -> Result<Option<(K, V)>>;

    /// Number of pairs still to come, when known up front.
    fn size_hint(&self) -> Option<usize> {
        None
    }
}

impl<K, V, P> Producer<K, V> for Box<P>
where
    P: Producer<K, V> + ?Sized,
{
    fn recv(&self, cancel: &CancelToken) -> Result<Option<(K, V)>> {
        (**self).recv(cancel)
    }

    fn size_hint(&self) -> Option<usize> {
        (**self).size_hint()
    }
}
