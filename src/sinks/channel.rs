use super::Sink;
use crate::error::MeduceError;
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, bounded};

/// Forwards delivered pairs into a bounded channel.
///
/// Delivery blocks while the channel is full. Inside a process the channel
/// is handed to the engine through [`Sink::queue`], so the wait is lock-free
/// and cancellable. Readers see the end of the output once the sink is
/// finalized and the process has let go of its sender.
pub struct ChannelSink<K, V> {
    tx: Option<Sender<(K, V)>>,
}

pub fn channel_sink<K, V>(capacity: usize) -> (ChannelSink<K, V>, Receiver<(K, V)>) {
    let (tx, rx) = bounded(capacity);
    (ChannelSink { tx: Some(tx) }, rx)
}

impl<K: Send, V: Send> Sink<K, V> for ChannelSink<K, V> {
    fn collect(&mut self, key: K, value: V) -> Result<()> {
        let Some(tx) = &self.tx else {
            return Err(MeduceError::misuse("channel sink already finalized").into());
        };
        tx.send((key, value))
            .map_err(|_| MeduceError::resource("channel sink receiver was dropped").into())
    }

    fn queue(&self) -> Option<Sender<(K, V)>> {
        self.tx.clone()
    }

    fn finalize(&mut self) -> Result<()> {
        self.tx.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_disconnects_readers() -> Result<()> {
        let (mut sink, rx) = channel_sink(4);
        sink.init()?;
        sink.collect('a', 1)?;
        sink.collect('b', 2)?;
        sink.finalize()?;
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![('a', 1), ('b', 2)]);
        assert!(sink.collect('c', 3).is_err());
        assert!(sink.queue().is_none());
        Ok(())
    }
}
