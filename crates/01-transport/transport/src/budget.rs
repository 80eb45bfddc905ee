//! Lock-free byte budget shared by concurrent producers.
//!
//! Producers reserve bytes with a compare-and-swap loop and never block; the
//! single consumer hands bytes back once it has taken ownership of a payload.

#[cfg(feature = "loom")]
use loom::sync::atomic::{AtomicUsize, Ordering};
#[cfg(not(feature = "loom"))]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{TransportError, TransportResult};

/// Bounded counter of reserved bytes.
#[derive(Debug)]
pub struct ByteBudget {
    capacity: usize,
    used: AtomicUsize,
}

impl ByteBudget {
    /// Creates a budget able to hold `capacity` bytes in flight.
    pub fn new(capacity: usize) -> TransportResult<Self> {
        if capacity == 0 {
            return Err(TransportError::InvalidCapacity {
                requested: capacity,
                minimum: 1,
            });
        }
        Ok(Self {
            capacity,
            used: AtomicUsize::new(0),
        })
    }

    /// Total number of bytes this budget admits.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently reserved.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Bytes that can still be reserved.
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used())
    }

    /// Attempts to reserve `bytes`; returns `false` without side effects when
    /// the reservation would exceed the capacity.
    pub fn try_acquire(&self, bytes: usize) -> bool {
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let next = match current.checked_add(bytes) {
                Some(next) if next <= self.capacity => next,
                _ => return false,
            };
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Returns `bytes` previously obtained from [`ByteBudget::try_acquire`].
    pub fn release(&self, bytes: usize) {
        let previous = self.used.fetch_sub(bytes, Ordering::AcqRel);
        debug_assert!(previous >= bytes, "released more bytes than reserved");
    }
}

/// Reservation on a shared [`ByteBudget`], released when dropped.
#[derive(Debug)]
pub struct BudgetGuard {
    budget: Arc<ByteBudget>,
    bytes: usize,
}

impl BudgetGuard {
    /// Reserves `bytes` from `budget`, or returns `None` when exhausted.
    pub fn try_reserve(budget: &Arc<ByteBudget>, bytes: usize) -> Option<Self> {
        budget.try_acquire(bytes).then(|| Self {
            budget: Arc::clone(budget),
            bytes,
        })
    }

    /// Number of bytes held by this reservation.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for BudgetGuard {
    fn drop(&mut self) {
        self.budget.release(self.bytes);
    }
}
