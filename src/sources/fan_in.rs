//! Fan-in: several channel sources read as one.

use super::{ChannelSource, Producer};
use crate::cancel::CancelToken;
use crate::error::MeduceError;
use anyhow::Result;
use crossbeam_channel::{Receiver, Select};
use std::sync::Mutex;

/// Merges several channel sources in whatever order their pairs become ready.
///
/// Every call polls the still-open inputs with a single readiness `Select`;
/// inputs whose senders are all gone are removed from the poll set. The
/// fan-in is exhausted once every input is.
pub struct FanIn<K, V> {
    inputs: Vec<Receiver<(K, V)>>,
    open: Mutex<Vec<bool>>,
}

pub fn fan_in<K, V>(sources: impl IntoIterator<Item = ChannelSource<K, V>>) -> FanIn<K, V> {
    let inputs: Vec<_> = sources.into_iter().map(ChannelSource::into_receiver).collect();
    let open = Mutex::new(vec![true; inputs.len()]);
    FanIn { inputs, open }
}

impl<K, V> FanIn<K, V> {
    fn open_inputs(&self) -> Vec<usize> {
        let open = self.open.lock().unwrap();
        (0..open.len()).filter(|&i| open[i]).collect()
    }
}

impl<K: Send, V: Send> Producer<K, V> for FanIn<K, V> {
    fn recv(&self, cancel: &CancelToken) -> Result<Option<(K, V)>> {
        loop {
            let open = self.open_inputs();
            if open.is_empty() {
                return Ok(None);
            }

            let mut sel = Select::new();
            for &i in &open {
                sel.recv(&self.inputs[i]);
            }
            let cancel_index = sel.recv(cancel.signal());

            let op = sel.select();
            let index = op.index();
            if index == cancel_index {
                let _ = op.recv(cancel.signal());
                return Err(MeduceError::Cancelled.into());
            }

            let input = open[index];
            match op.recv(&self.inputs[input]) {
                Ok(pair) => return Ok(Some(pair)),
                Err(_) => self.open.lock().unwrap()[input] = false,
            }
        }
    }
}
