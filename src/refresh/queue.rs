//! FIFO queue of callers waiting on an in-flight refresh.
//!
//! Each waiter holds a oneshot receiver; the coordinator resolves every
//! waiter exactly once when the refresh settles, all with the same outcome.
//! The queue is only ever touched under the coordinator's state lock.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::errors::Error;

/// What a waiter eventually observes: the new access credential, or the
/// shared refresh failure.
pub type QueueResult = Result<String, Arc<Error>>;

#[derive(Default)]
pub struct PendingQueue {
    waiters: VecDeque<oneshot::Sender<QueueResult>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a waiter and hands back the receiving half.
    pub fn enqueue(&mut self) -> oneshot::Receiver<QueueResult> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(tx);
        rx
    }

    /// Resolves every waiter in arrival order with the same outcome and
    /// empties the queue. A waiter whose receiver is already gone is skipped;
    /// nobody is left pending across refresh cycles.
    pub fn drain(&mut self, result: &QueueResult) {
        while let Some(waiter) = self.waiters.pop_front() {
            let _ = waiter.send(result.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}
