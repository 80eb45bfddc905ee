//! Interface ABI shared between technology adapters and the channel.
//!
//! This crate defines the protocol boundary between the channel (layer 05)
//! and adapter implementations (layer 04): opaque ids, group URIs, the
//! adapter contract, and the typed RPC vocabulary.

#![allow(missing_docs)]

mod adapter;
mod error;
mod group;
mod ids;
mod options;
mod rpc;

pub use adapter::{
    Adapter, AdapterFactory, AdapterHandle, AdmitOutcome, InboundHandle, InboundSink,
    InterfaceProperty, ServiceDiscovery, DEFAULT_MAX_MSG_SIZE,
};
pub use error::{AdapterError, AdapterResult, InvalidGroup};
pub use group::GroupUri;
pub use ids::{IdGenerator, InterfaceId, SocketId, StreamId};
pub use options::TechOptions;
pub use rpc::{CallArgs, CallFailure, CallResult, FailureKind, Opcode};
