//! Single-assignment result slot.
//!
//! The channel thread owns the [`Promise`]; the caller owns the matching
//! [`ResultFuture`]. A promise dropped without a value resolves the future
//! with [`FabricError::Closed`] so no caller waits forever.

use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{FabricError, FabricResult};

enum Slot<T> {
    Pending,
    Ready(T),
    Abandoned,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Shared<T> {
    fn complete(&self, value: Slot<T>) {
        let mut slot = self.slot.lock();
        if matches!(*slot, Slot::Pending) {
            *slot = value;
        }
        drop(slot);
        self.ready.notify_all();
    }
}

/// Creates a connected promise/future pair.
pub fn promise<T>() -> (Promise<T>, ResultFuture<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Pending),
        ready: Condvar::new(),
    });
    (
        Promise {
            shared: Some(Arc::clone(&shared)),
        },
        ResultFuture { shared },
    )
}

/// Writing half; can be fulfilled at most once.
pub struct Promise<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Promise<T> {
    pub fn fulfill(mut self, value: T) {
        if let Some(shared) = self.shared.take() {
            shared.complete(Slot::Ready(value));
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            tracing::debug!("promise dropped before fulfilment");
            shared.complete(Slot::Abandoned);
        }
    }
}

/// Reading half held by the caller.
pub struct ResultFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> ResultFuture<T> {
    /// Returns `true` once the promise has been fulfilled or dropped.
    pub fn is_ready(&self) -> bool {
        !matches!(*self.shared.slot.lock(), Slot::Pending)
    }

    /// Blocks until the promise is fulfilled or dropped.
    pub fn wait(self) -> FabricResult<T> {
        let mut slot = self.shared.slot.lock();
        while matches!(*slot, Slot::Pending) {
            self.shared.ready.wait(&mut slot);
        }
        take(&mut slot).unwrap_or(Err(FabricError::Closed))
    }

    /// Blocks for at most `timeout`; gives the future back if still pending.
    pub fn wait_timeout(self, timeout: Duration) -> Result<FabricResult<T>, Self> {
        let deadline = Instant::now() + timeout;
        let taken = {
            let mut slot = self.shared.slot.lock();
            while matches!(*slot, Slot::Pending) {
                if self.shared.ready.wait_until(&mut slot, deadline).timed_out() {
                    break;
                }
            }
            take(&mut slot)
        };
        taken.ok_or(self)
    }
}

fn take<T>(slot: &mut Slot<T>) -> Option<FabricResult<T>> {
    match mem::replace(slot, Slot::Abandoned) {
        Slot::Pending => {
            *slot = Slot::Pending;
            None
        }
        Slot::Ready(value) => Some(Ok(value)),
        Slot::Abandoned => Some(Err(FabricError::Closed)),
    }
}
