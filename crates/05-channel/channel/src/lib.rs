//! Client-side multicast channel.
//!
//! The channel sits between application sockets and the registered
//! technology adapters:
//!
//! * [`InterfaceRegistry`] – adapters by id, with per-group join refcounts.
//! * [`SocketTable`] – per-socket TTL, attachments, groups, streams and delivery mode.
//! * [`Admission`] – budget-checked inbound path used by adapter threads.
//! * [`Dispatcher`] – immutable operation-code table driving every mutation.
//! * [`Channel`] – single consumer of the queue; [`Channel::poll`] makes progress.
//! * [`ChannelHandle`] – typed, cloneable client API; [`spawn`] runs a channel on its own thread.

mod channel;
mod client;
mod config;
mod dispatch;
mod error;
mod inbound;
mod msg;
mod registry;
mod runner;
mod socket;

#[cfg(test)]
mod tests;

pub use channel::{Channel, ChannelBuilder, ChannelCore};
pub use client::{ChannelHandle, FromCallResult, PendingCall};
pub use config::{
    ChannelConfig, ChannelSettings, ConfigError, DEFAULT_BUDGET_BYTES, DEFAULT_DRAIN_BATCH,
    DEFAULT_SEND_BUDGET_BYTES,
};
pub use dispatch::Dispatcher;
pub use error::{CallError, ChannelError, ChannelResult};
pub use inbound::Admission;
pub use msg::{CallReply, ChannelMsg, InboundPacket, OutboundPacket};
pub use registry::{Interface, InterfaceRegistry, DEFAULT_TECHNOLOGY, TECHNOLOGY_ORDER};
pub use runner::{spawn, RunningChannel};
pub use socket::{
    receive_buffer, BlockingTarget, DeliveryMode, MulticastPacket, PacketReceiver,
    ReceiveCallback, SocketState, SocketTable, DEFAULT_TTL,
};
