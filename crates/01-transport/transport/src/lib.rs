//! Core transport primitives shared by the channel thread and adapter threads.
//!
//! * [`ByteBudget`] – lock-free storage semaphore bounding in-flight bytes.
//! * [`BudgetGuard`] – owned reservation that hands its bytes back on drop.
//! * [`msg_queue`] – multi-producer/single-consumer FIFO feeding the channel thread.
//! * [`Envelope`] – tag/version header travelling beside every rkyv payload.
//! * [`TransportError`] – lightweight error surface for configuration failures.

mod budget;
mod envelope;
mod error;
mod queue;
pub mod schema;

pub use budget::{BudgetGuard, ByteBudget};
pub use envelope::Envelope;
pub use error::{TransportError, TransportResult};
pub use queue::{msg_queue, QueueConsumer, QueueProducer};
pub use schema::*;
