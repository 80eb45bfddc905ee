use std::panic::Location;

use iface_abi::{AdapterError, CallFailure, FailureKind, InterfaceId, SocketId};
use thiserror::Error;
use transport_fabric::FabricError;

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors raised on the channel side.
///
/// Precondition violations carry the source location that detected them and
/// are reported as fatal by [`ChannelError::is_fatal`]; the host loop is
/// expected to log them and terminate.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("unknown {socket} (at {location})")]
    UnknownSocket {
        socket: SocketId,
        location: &'static Location<'static>,
    },

    #[error("unknown {interface} (at {location})")]
    UnknownInterface {
        interface: InterfaceId,
        location: &'static Location<'static>,
    },

    #[error("invalid group uri {group:?} (at {location})")]
    InvalidGroup {
        group: String,
        location: &'static Location<'static>,
    },

    #[error("unknown operation code {opcode:#06x} (at {location})")]
    UnknownOpcode {
        opcode: u16,
        location: &'static Location<'static>,
    },

    #[error("arguments do not match operation {operation} (at {location})")]
    ArgumentMismatch {
        operation: &'static str,
        location: &'static Location<'static>,
    },

    #[error("requirement failed: {what} (at {location})")]
    Precondition {
        what: &'static str,
        location: &'static Location<'static>,
    },

    #[error("{technology} adapter skipped: {reason}")]
    AdapterInitFailed {
        technology: String,
        reason: String,
    },

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Codec(#[from] FabricError),

    #[error("send buffer full: {requested} bytes requested, {available} available")]
    WouldBlock { requested: usize, available: usize },

    #[error("channel closed")]
    Closed,
}

impl ChannelError {
    #[track_caller]
    pub fn unknown_socket(socket: SocketId) -> Self {
        ChannelError::UnknownSocket {
            socket,
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn unknown_interface(interface: InterfaceId) -> Self {
        ChannelError::UnknownInterface {
            interface,
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn invalid_group(group: impl Into<String>) -> Self {
        ChannelError::InvalidGroup {
            group: group.into(),
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn unknown_opcode(opcode: u16) -> Self {
        ChannelError::UnknownOpcode {
            opcode,
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn argument_mismatch(operation: &'static str) -> Self {
        ChannelError::ArgumentMismatch {
            operation,
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn precondition(what: &'static str) -> Self {
        ChannelError::Precondition {
            what,
            location: Location::caller(),
        }
    }

    /// `true` for precondition violations.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChannelError::UnknownSocket { .. }
                | ChannelError::UnknownInterface { .. }
                | ChannelError::InvalidGroup { .. }
                | ChannelError::UnknownOpcode { .. }
                | ChannelError::ArgumentMismatch { .. }
                | ChannelError::Precondition { .. }
        )
    }

    /// Failure reported on a synchronous caller's future.
    pub fn to_failure(&self) -> CallFailure {
        let kind = if self.is_fatal() {
            FailureKind::RequirementFailed
        } else if matches!(self, ChannelError::Closed) {
            FailureKind::ChannelClosed
        } else {
            FailureKind::InternalInterfaceError
        };
        CallFailure::new(kind, self.to_string())
    }
}

/// Errors observed by a synchronous caller.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("call failed ({kind:?}): {message}")]
    Failed { kind: FailureKind, message: String },

    #[error("protocol mismatch: expected {expected}, received {found}")]
    ProtocolMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Codec(FabricError),

    #[error("timed out waiting for the channel")]
    TimedOut,

    #[error("channel closed before answering")]
    Closed,
}

impl From<FabricError> for CallError {
    fn from(err: FabricError) -> Self {
        match err {
            FabricError::Closed => CallError::Closed,
            other => CallError::Codec(other),
        }
    }
}

impl From<CallFailure> for CallError {
    fn from(failure: CallFailure) -> Self {
        match failure.kind {
            FailureKind::ChannelClosed => CallError::Closed,
            kind => CallError::Failed {
                kind,
                message: failure.message,
            },
        }
    }
}
