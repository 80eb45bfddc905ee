//! Messages travelling on the channel queue.

use iface_abi::{GroupUri, SocketId, StreamId};
use transport::BudgetGuard;
use transport_fabric::{Encoded, Promise};

use crate::socket::{BlockingTarget, ReceiveCallback};

/// Data handed to the channel by a local sender.
pub struct OutboundPacket {
    pub socket: SocketId,
    pub stream: StreamId,
    pub payload: Box<[u8]>,
    pub reservation: BudgetGuard,
}

/// Data admitted from an adapter.
pub struct InboundPacket {
    pub source: GroupUri,
    pub payload: Box<[u8]>,
    pub reservation: BudgetGuard,
}

/// Where a call's encoded result goes.
pub enum CallReply {
    /// Fire-and-forget: the result is dropped.
    Discard,
    Sink(Promise<Encoded>),
}

pub enum ChannelMsg {
    RegisterBlockingTarget {
        socket: SocketId,
        target: BlockingTarget,
    },
    RegisterAsyncCallback {
        socket: SocketId,
        callback: ReceiveCallback,
    },
    Outbound(OutboundPacket),
    SynchronousCall {
        opcode: u16,
        args: Encoded,
        reply: CallReply,
    },
    Acknowledge,
    Inbound(InboundPacket),
}

impl ChannelMsg {
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelMsg::RegisterBlockingTarget { .. } => "register_blocking_target",
            ChannelMsg::RegisterAsyncCallback { .. } => "register_async_callback",
            ChannelMsg::Outbound(_) => "outbound_packet",
            ChannelMsg::SynchronousCall { .. } => "synchronous_call",
            ChannelMsg::Acknowledge => "acknowledge",
            ChannelMsg::Inbound(_) => "inbound_packet",
        }
    }
}
