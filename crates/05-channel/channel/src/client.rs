//! Application-side handle onto a running channel.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use iface_abi::{
    CallArgs, CallResult, GroupUri, InterfaceId, InterfaceProperty, Opcode, SocketId, StreamId,
};
use transport::{BudgetGuard, ByteBudget, QueueProducer};
use transport_codecs::RpcCodec;
use transport_fabric::{promise, Codec, Encoded, ResultFuture};

use crate::error::{CallError, ChannelError, ChannelResult};
use crate::msg::{CallReply, ChannelMsg, OutboundPacket};
use crate::socket::BlockingTarget;

/// Typed view of a call result.
pub trait FromCallResult: Sized {
    const EXPECTED: &'static str;

    fn from_call_result(result: CallResult) -> Option<Self>;
}

macro_rules! from_call_result {
    ($ty:ty, $expected:literal, $pat:pat => $value:expr) => {
        impl FromCallResult for $ty {
            const EXPECTED: &'static str = $expected;

            fn from_call_result(result: CallResult) -> Option<Self> {
                match result {
                    $pat => Some($value),
                    _ => None,
                }
            }
        }
    };
}

from_call_result!((), "unit", CallResult::Unit => ());
from_call_result!(SocketId, "socket id", CallResult::Socket(id) => id);
from_call_result!(StreamId, "stream id", CallResult::Stream(id) => id);
from_call_result!(Vec<InterfaceId>, "interface ids", CallResult::InterfaceIds(ids) => ids);
from_call_result!(Vec<InterfaceProperty>, "interface list", CallResult::Interfaces(list) => list);
from_call_result!(Vec<GroupUri>, "group list", CallResult::Groups(groups) => groups);
from_call_result!(Vec<(GroupUri, u32)>, "group set", CallResult::GroupSet(set) => set);
from_call_result!(bool, "flag", CallResult::Flag(value) => value);
from_call_result!(u32, "size", CallResult::Size(bytes) => bytes);

impl FromCallResult for CallResult {
    const EXPECTED: &'static str = "any result";

    fn from_call_result(result: CallResult) -> Option<Self> {
        Some(result)
    }
}

enum Pending {
    Waiting(ResultFuture<Encoded>),
    Failed(CallError),
}

/// Result of a synchronous call that may not have been answered yet.
pub struct PendingCall<T> {
    state: Pending,
    codec: RpcCodec,
    _result: PhantomData<fn() -> T>,
}

impl<T: FromCallResult> PendingCall<T> {
    fn new(state: Pending) -> Self {
        Self {
            state,
            codec: RpcCodec,
            _result: PhantomData,
        }
    }

    pub fn is_ready(&self) -> bool {
        match &self.state {
            Pending::Waiting(future) => future.is_ready(),
            Pending::Failed(_) => true,
        }
    }

    /// Blocks until the channel answers.
    pub fn wait(self) -> Result<T, CallError> {
        match self.state {
            Pending::Waiting(future) => decode(&self.codec, future.wait()?),
            Pending::Failed(err) => Err(err),
        }
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<T, CallError> {
        match self.state {
            Pending::Waiting(future) => match future.wait_timeout(timeout) {
                Ok(encoded) => decode(&self.codec, encoded?),
                Err(_) => Err(CallError::TimedOut),
            },
            Pending::Failed(err) => Err(err),
        }
    }

    /// Takes the result if it is available, otherwise hands the call back.
    pub fn try_take(self) -> Result<Result<T, CallError>, Self> {
        if self.is_ready() {
            Ok(self.wait())
        } else {
            Err(self)
        }
    }
}

fn decode<T: FromCallResult>(codec: &RpcCodec, encoded: Encoded) -> Result<T, CallError> {
    let result = codec.decode_reply(encoded.envelope, &encoded.payload)?;
    if let CallResult::Failed(failure) = result {
        return Err(failure.into());
    }
    let found = result.kind_name();
    T::from_call_result(result).ok_or(CallError::ProtocolMismatch {
        expected: T::EXPECTED,
        found,
    })
}

/// Cloneable, `Send` entry point for application threads.
///
/// Every operation is queued behind earlier ones, so the effects of calls
/// made from one handle are observed in call order.
#[derive(Clone)]
pub struct ChannelHandle {
    queue: QueueProducer<ChannelMsg>,
    send_budget: Arc<ByteBudget>,
    closed: Arc<AtomicBool>,
    codec: RpcCodec,
}

impl ChannelHandle {
    pub(crate) fn new(
        queue: QueueProducer<ChannelMsg>,
        send_budget: Arc<ByteBudget>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            queue,
            send_budget,
            closed,
            codec: RpcCodec,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn push(&self, msg: ChannelMsg) -> ChannelResult<()> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        self.queue.push(msg).map_err(|_| ChannelError::Closed)
    }

    fn encode(&self, opcode: u16, args: &CallArgs, reply: CallReply) -> ChannelResult<()> {
        let args = self.codec.encode_args(args)?;
        self.push(ChannelMsg::SynchronousCall {
            opcode,
            args,
            reply,
        })
    }

    /// Queues a synchronous call by raw operation code.
    pub fn call<T: FromCallResult>(&self, opcode: u16, args: CallArgs) -> PendingCall<T> {
        let (promise, future) = promise();
        let state = match self.encode(opcode, &args, CallReply::Sink(promise)) {
            Ok(()) => Pending::Waiting(future),
            Err(ChannelError::Codec(err)) => Pending::Failed(CallError::Codec(err)),
            Err(_) => Pending::Failed(CallError::Closed),
        };
        PendingCall::new(state)
    }

    /// Fire-and-forget dispatch; the result is discarded.
    pub fn notify(&self, opcode: Opcode, args: CallArgs) -> ChannelResult<()> {
        self.encode(opcode.code(), &args, CallReply::Discard)
    }

    pub fn create_socket(&self) -> PendingCall<SocketId> {
        self.call(Opcode::CreateSocket.code(), CallArgs::Empty)
    }

    pub fn destroy_socket(&self, socket: SocketId) -> PendingCall<()> {
        self.call(Opcode::DestroySocket.code(), CallArgs::Socket(socket))
    }

    pub fn create_stream(&self, socket: SocketId, group: &str) -> PendingCall<StreamId> {
        self.call(
            Opcode::CreateStream.code(),
            CallArgs::SocketGroup {
                socket,
                group: group.to_owned(),
            },
        )
    }

    pub fn join(&self, socket: SocketId, group: &str) -> PendingCall<()> {
        self.call(
            Opcode::Join.code(),
            CallArgs::SocketGroup {
                socket,
                group: group.to_owned(),
            },
        )
    }

    pub fn leave(&self, socket: SocketId, group: &str) -> PendingCall<()> {
        self.call(
            Opcode::Leave.code(),
            CallArgs::SocketGroup {
                socket,
                group: group.to_owned(),
            },
        )
    }

    pub fn set_ttl(&self, socket: SocketId, ttl: u8) -> PendingCall<()> {
        self.call(Opcode::SetTtl.code(), CallArgs::SocketTtl { socket, ttl })
    }

    pub fn list_interfaces(&self, socket: SocketId) -> PendingCall<Vec<InterfaceId>> {
        self.call(Opcode::ListInterfaces.code(), CallArgs::Socket(socket))
    }

    pub fn attach_interface(&self, socket: SocketId, interface: InterfaceId) -> PendingCall<()> {
        self.call(
            Opcode::AttachInterface.code(),
            CallArgs::SocketInterface { socket, interface },
        )
    }

    pub fn detach_interface(&self, socket: SocketId, interface: InterfaceId) -> PendingCall<()> {
        self.call(
            Opcode::DetachInterface.code(),
            CallArgs::SocketInterface { socket, interface },
        )
    }

    pub fn set_interfaces(&self, socket: SocketId, interfaces: &[InterfaceId]) -> PendingCall<()> {
        self.call(
            Opcode::SetInterfaces.code(),
            CallArgs::SocketInterfaces {
                socket,
                interfaces: interfaces.to_vec(),
            },
        )
    }

    pub fn get_interfaces(&self) -> PendingCall<Vec<InterfaceProperty>> {
        self.call(Opcode::GetInterfaces.code(), CallArgs::Empty)
    }

    pub fn group_set(&self, interface: InterfaceId) -> PendingCall<Vec<(GroupUri, u32)>> {
        self.call(Opcode::GroupSet.code(), CallArgs::Interface(interface))
    }

    pub fn neighbor_set(&self, interface: InterfaceId) -> PendingCall<Vec<GroupUri>> {
        self.call(Opcode::NeighborSet.code(), CallArgs::Interface(interface))
    }

    pub fn children_set(&self, interface: InterfaceId, group: &str) -> PendingCall<Vec<GroupUri>> {
        self.call(
            Opcode::ChildrenSet.code(),
            CallArgs::InterfaceGroup {
                interface,
                group: group.to_owned(),
            },
        )
    }

    pub fn parent_set(&self, interface: InterfaceId, group: &str) -> PendingCall<Vec<GroupUri>> {
        self.call(
            Opcode::ParentSet.code(),
            CallArgs::InterfaceGroup {
                interface,
                group: group.to_owned(),
            },
        )
    }

    pub fn designated_host(&self, interface: InterfaceId, group: &str) -> PendingCall<bool> {
        self.call(
            Opcode::DesignatedHost.code(),
            CallArgs::InterfaceGroup {
                interface,
                group: group.to_owned(),
            },
        )
    }

    pub fn atomic_msg_size(&self) -> PendingCall<u32> {
        self.call(Opcode::AtomicMsgSize.code(), CallArgs::Empty)
    }

    /// Queues `payload` for the group bound to `stream`.
    ///
    /// Fails with [`ChannelError::WouldBlock`] while the shared send budget
    /// cannot hold the payload.
    pub fn send(&self, socket: SocketId, stream: StreamId, payload: &[u8]) -> ChannelResult<()> {
        let Some(reservation) = BudgetGuard::try_reserve(&self.send_budget, payload.len()) else {
            return Err(ChannelError::WouldBlock {
                requested: payload.len(),
                available: self.send_budget.available(),
            });
        };
        self.push(ChannelMsg::Outbound(OutboundPacket {
            socket,
            stream,
            payload: payload.into(),
            reservation,
        }))
    }

    /// Switches `socket` to blocking delivery into `target`.
    pub fn register_blocking_target(
        &self,
        socket: SocketId,
        target: BlockingTarget,
    ) -> ChannelResult<()> {
        self.push(ChannelMsg::RegisterBlockingTarget { socket, target })
    }

    /// Switches `socket` to callback delivery; `callback` runs on the channel thread.
    pub fn register_async_callback<F>(&self, socket: SocketId, callback: F) -> ChannelResult<()>
    where
        F: FnMut(&GroupUri, usize, &[u8]) + Send + 'static,
    {
        self.push(ChannelMsg::RegisterAsyncCallback {
            socket,
            callback: Box::new(callback),
        })
    }

    pub fn acknowledge(&self) -> ChannelResult<()> {
        self.push(ChannelMsg::Acknowledge)
    }

    pub fn send_budget(&self) -> &Arc<ByteBudget> {
        &self.send_budget
    }
}
