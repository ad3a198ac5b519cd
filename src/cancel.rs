//! Cancellation token threaded through every suspension point.
//!
//! The token owns the only [`Sender`] of a zero-capacity channel that never
//! carries a message. Cancelling drops that sender, which makes the paired
//! [`Receiver`] permanently ready; blocked workers `select!` on it next to
//! their real queue and wake up immediately.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
                signal: rx,
            }),
        }
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.trigger.lock().unwrap().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Receiver that becomes ready (disconnected) once the token fires.
    ///
    /// Meant to be used as one arm of a `crossbeam_channel::select!`.
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::select;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn cancel_wakes_a_blocked_select() {
        let token = CancelToken::new();
        let (_tx, rx) = bounded::<u32>(1);

        let waiter = {
            let token = token.clone();
            thread::spawn(move || {
                select! {
                    recv(rx) -> _ => false,
                    recv(token.signal()) -> _ => true,
                }
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!token.is_cancelled());
        token.cancel();
        token.cancel();

        assert!(waiter.join().unwrap());
        assert!(token.is_cancelled());
    }
}
