//! Multi-producer/single-consumer FIFO feeding the channel thread.
//!
//! Producers are cheap to clone and may live on any thread. The consumer is
//! deliberately not `Clone`, so exactly one context drains the queue.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{TransportError, TransportResult};

/// Creates a connected producer/consumer pair.
pub fn msg_queue<T>() -> (QueueProducer<T>, QueueConsumer<T>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (
        QueueProducer { tx },
        QueueConsumer {
            rx,
            stash: None,
        },
    )
}

/// Sending side of the queue.
#[derive(Debug)]
pub struct QueueProducer<T> {
    tx: Sender<T>,
}

impl<T> Clone for QueueProducer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> QueueProducer<T> {
    /// Appends `msg` to the tail of the queue.
    ///
    /// Fails with [`TransportError::Closed`] once the consumer is gone; the
    /// message is dropped in that case.
    pub fn push(&self, msg: T) -> TransportResult<()> {
        self.tx.send(msg).map_err(|_| TransportError::Closed)
    }
}

/// Receiving side of the queue.
#[derive(Debug)]
pub struct QueueConsumer<T> {
    rx: Receiver<T>,
    stash: Option<T>,
}

impl<T> QueueConsumer<T> {
    /// Pops the oldest message, if any.
    pub fn try_pop(&mut self) -> Option<T> {
        if let Some(msg) = self.stash.take() {
            return Some(msg);
        }
        match self.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Blocks for at most `timeout` until a message is available without
    /// consuming it. Returns `true` when the next [`try_pop`](Self::try_pop)
    /// will yield a message.
    pub fn wait_timeout(&mut self, timeout: Duration) -> bool {
        if self.stash.is_some() {
            return true;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => {
                self.stash = Some(msg);
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.rx.len() + usize::from(self.stash.is_some())
    }

    /// Returns `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
