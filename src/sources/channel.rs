//! Channel-backed source: any thread can feed it.

use super::Producer;
use crate::cancel::CancelToken;
use crate::error::MeduceError;
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, bounded, select};
use std::thread;

/// Reads pairs from a bounded channel until every sender has been dropped.
pub struct ChannelSource<K, V> {
    rx: Receiver<(K, V)>,
}

/// Create a bounded channel and the source reading from it.
///
/// Senders block once `capacity` pairs are waiting, which throttles whoever
/// feeds the channel to the speed of the mapping workers.
pub fn channel_source<K, V>(capacity: usize) -> (Sender<(K, V)>, ChannelSource<K, V>) {
    let (tx, rx) = bounded(capacity);
    (tx, ChannelSource { rx })
}

impl<K, V> ChannelSource<K, V> {
    pub fn from_receiver(rx: Receiver<(K, V)>) -> Self {
        Self { rx }
    }

    /// Feed a channel source from `items` on a background thread.
    ///
    /// The thread stops early if the source is dropped.
    pub fn spawn<I>(items: I, capacity: usize) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)> + Send + 'static,
        K: Send + 'static,
        V: Send + 'static,
    {
        let (tx, source) = channel_source(capacity);
        thread::Builder::new()
            .name("meduce-source-feeder".into())
            .spawn(move || {
                for pair in items {
                    if tx.send(pair).is_err() {
                        break;
                    }
                }
            })
            .context(MeduceError::resource("spawn source feeder thread"))?;
        Ok(source)
    }

    pub(crate) fn into_receiver(self) -> Receiver<(K, V)> {
        self.rx
    }
}

impl<K: Send, V: Send> Producer<K, V> for ChannelSource<K, V> {
    fn recv(&self, cancel: &CancelToken) -> Result<Option<(K, V)>> {
        select! {
            recv(self.rx) -> msg => Ok(msg.ok()),
            recv(cancel.signal()) -> _ => Err(MeduceError::Cancelled.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn exhausted_when_all_senders_are_gone() -> Result<()> {
        let (tx, source) = channel_source(4);
        let cancel = CancelToken::new();
        tx.send((1u32, "one"))?;
        let tx2 = tx.clone();
        drop(tx);
        tx2.send((2, "two"))?;
        drop(tx2);
        assert_eq!(source.recv(&cancel)?, Some((1, "one")));
        assert_eq!(source.recv(&cancel)?, Some((2, "two")));
        assert_eq!(source.recv(&cancel)?, None);
        Ok(())
    }

    #[test]
    fn spawned_feeder_delivers_everything() -> Result<()> {
        let source = ChannelSource::spawn((0..50u32).map(|i| (i, i * 2)), 3)?;
        let cancel = CancelToken::new();
        let mut total = 0;
        while let Some((_, v)) = source.recv(&cancel)? {
            total += v;
        }
        assert_eq!(total, (0..50).map(|i| i * 2).sum::<u32>());
        Ok(())
    }

    #[test]
    fn blocked_receive_wakes_on_cancel() {
        let (_tx, source) = channel_source::<u8, u8>(1);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            trigger.cancel();
        });
        let err = source.recv(&cancel).unwrap_err();
        assert!(crate::error::is_cancelled(&err));
        canceller.join().unwrap();
    }
}
