#![allow(missing_docs)]
//! Fabric layer between channel handles and the channel thread.
//!
//! Provides the codec seam used for call arguments and results, the
//! single-assignment result slot a synchronous caller blocks on, and the host
//! loop that drives pollable engines.

mod codec;
mod error;
mod future;
mod runtime;

pub use codec::{Codec, Encoded};
pub use error::{FabricError, FabricResult};
pub use future::{promise, Promise, ResultFuture};
pub use runtime::{HostLoop, PollEngine};
