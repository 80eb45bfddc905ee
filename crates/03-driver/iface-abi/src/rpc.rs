//! Typed vocabulary of the channel's remote-procedure calls.

use crate::adapter::InterfaceProperty;
use crate::group::GroupUri;
use crate::ids::{InterfaceId, SocketId, StreamId};

/// Operation codes understood by the channel dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    CreateSocket = 0x0001,
    DestroySocket = 0x0002,
    CreateStream = 0x0003,
    Join = 0x0004,
    Leave = 0x0005,
    SetTtl = 0x0006,
    ListInterfaces = 0x0007,
    AttachInterface = 0x0008,
    DetachInterface = 0x0009,
    SetInterfaces = 0x000A,
    GetInterfaces = 0x0100,
    GroupSet = 0x0101,
    NeighborSet = 0x0102,
    ChildrenSet = 0x0103,
    ParentSet = 0x0104,
    DesignatedHost = 0x0105,
    AtomicMsgSize = 0x0202,
}

impl Opcode {
    pub const ALL: [Opcode; 17] = [
        Opcode::CreateSocket,
        Opcode::DestroySocket,
        Opcode::CreateStream,
        Opcode::Join,
        Opcode::Leave,
        Opcode::SetTtl,
        Opcode::ListInterfaces,
        Opcode::AttachInterface,
        Opcode::DetachInterface,
        Opcode::SetInterfaces,
        Opcode::GetInterfaces,
        Opcode::GroupSet,
        Opcode::NeighborSet,
        Opcode::ChildrenSet,
        Opcode::ParentSet,
        Opcode::DesignatedHost,
        Opcode::AtomicMsgSize,
    ];

    pub const fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.code() == code)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Opcode::CreateSocket => "create_socket",
            Opcode::DestroySocket => "destroy_socket",
            Opcode::CreateStream => "create_stream",
            Opcode::Join => "join",
            Opcode::Leave => "leave",
            Opcode::SetTtl => "set_ttl",
            Opcode::ListInterfaces => "list_interfaces",
            Opcode::AttachInterface => "attach_interface",
            Opcode::DetachInterface => "detach_interface",
            Opcode::SetInterfaces => "set_interfaces",
            Opcode::GetInterfaces => "get_interfaces",
            Opcode::GroupSet => "group_set",
            Opcode::NeighborSet => "neighbor_set",
            Opcode::ChildrenSet => "children_set",
            Opcode::ParentSet => "parent_set",
            Opcode::DesignatedHost => "designated_host",
            Opcode::AtomicMsgSize => "get_atomic_msg_size",
        }
    }
}

/// Call arguments. Group names stay raw text until a handler validates them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallArgs {
    Empty,
    Socket(SocketId),
    SocketGroup {
        socket: SocketId,
        group: String,
    },
    SocketTtl {
        socket: SocketId,
        ttl: u8,
    },
    SocketInterface {
        socket: SocketId,
        interface: InterfaceId,
    },
    SocketInterfaces {
        socket: SocketId,
        interfaces: Vec<InterfaceId>,
    },
    Interface(InterfaceId),
    InterfaceGroup {
        interface: InterfaceId,
        group: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    RequirementFailed = 1,
    InternalInterfaceError = 2,
    ChannelClosed = 3,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl CallFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallResult {
    Unit,
    Socket(SocketId),
    Stream(StreamId),
    InterfaceIds(Vec<InterfaceId>),
    Interfaces(Vec<InterfaceProperty>),
    Groups(Vec<GroupUri>),
    GroupSet(Vec<(GroupUri, u32)>),
    Flag(bool),
    Size(u32),
    Failed(CallFailure),
}

impl CallResult {
    /// Short variant name used in mismatch diagnostics.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            CallResult::Unit => "unit",
            CallResult::Socket(_) => "socket id",
            CallResult::Stream(_) => "stream id",
            CallResult::InterfaceIds(_) => "interface ids",
            CallResult::Interfaces(_) => "interface list",
            CallResult::Groups(_) => "group list",
            CallResult::GroupSet(_) => "group set",
            CallResult::Flag(_) => "flag",
            CallResult::Size(_) => "size",
            CallResult::Failed(_) => "failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_round_trip_through_their_codes() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_code(op.code()), Some(op));
        }
        assert_eq!(Opcode::from_code(0x0200), None);
        assert_eq!(Opcode::SetInterfaces.code(), 0x000A);
    }
}
