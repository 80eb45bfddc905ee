//! Codec implementation for channel RPC calls.
//!
//! Translates the typed call vocabulary of `iface-abi` to and from the
//! archived schema V1 declared in `transport::schema`.

#![allow(missing_docs)]

use iface_abi::{
    CallArgs, CallFailure, CallResult, FailureKind, GroupUri, InterfaceId, InterfaceProperty,
    SocketId, StreamId,
};
use rkyv::{
    api::high::{access, to_bytes, HighSerializer, HighValidator},
    bytecheck::CheckBytes,
    rancor::Error,
    ser::allocator::ArenaHandle,
    util::AlignedVec,
    Archive, Serialize,
};
use transport::schema::*;
use transport::Envelope;
use transport_fabric::{Codec, Encoded, FabricError, FabricResult};

/// Codec for dispatcher call arguments and results.
#[derive(Clone, Copy, Debug, Default)]
pub struct RpcCodec;

impl Codec for RpcCodec {
    type Args = CallArgs;
    type Reply = CallResult;

    fn encode_args(&self, args: &Self::Args) -> FabricResult<Encoded> {
        let schema = match args {
            CallArgs::Empty => CallArgsV1::Empty,
            CallArgs::Socket(socket) => CallArgsV1::Socket { socket: socket.0 },
            CallArgs::SocketGroup { socket, group } => CallArgsV1::SocketGroup {
                socket: socket.0,
                group: group.clone(),
            },
            CallArgs::SocketTtl { socket, ttl } => CallArgsV1::SocketTtl {
                socket: socket.0,
                ttl: *ttl,
            },
            CallArgs::SocketInterface { socket, interface } => CallArgsV1::SocketInterface {
                socket: socket.0,
                interface: interface.0,
            },
            CallArgs::SocketInterfaces { socket, interfaces } => CallArgsV1::SocketInterfaces {
                socket: socket.0,
                interfaces: interfaces.iter().map(|id| id.0).collect(),
            },
            CallArgs::Interface(interface) => CallArgsV1::Interface {
                interface: interface.0,
            },
            CallArgs::InterfaceGroup { interface, group } => CallArgsV1::InterfaceGroup {
                interface: interface.0,
                group: group.clone(),
            },
        };
        let payload = serialize(&schema)?;
        Ok(Encoded::new(
            Envelope::new(TAG_RPC_ARGS, SCHEMA_VERSION_V1),
            payload,
        ))
    }

    fn decode_args(&self, envelope: Envelope, payload: &[u8]) -> FabricResult<Self::Args> {
        ensure_tag(envelope, TAG_RPC_ARGS)?;
        let archived = archived_root::<CallArgsV1>(payload)?;
        Ok(match archived {
            ArchivedCallArgsV1::Empty => CallArgs::Empty,
            ArchivedCallArgsV1::Socket { socket } => CallArgs::Socket(SocketId(socket.to_native())),
            ArchivedCallArgsV1::SocketGroup { socket, group } => CallArgs::SocketGroup {
                socket: SocketId(socket.to_native()),
                group: group.as_str().to_owned(),
            },
            ArchivedCallArgsV1::SocketTtl { socket, ttl } => CallArgs::SocketTtl {
                socket: SocketId(socket.to_native()),
                ttl: *ttl,
            },
            ArchivedCallArgsV1::SocketInterface { socket, interface } => {
                CallArgs::SocketInterface {
                    socket: SocketId(socket.to_native()),
                    interface: InterfaceId(interface.to_native()),
                }
            }
            ArchivedCallArgsV1::SocketInterfaces { socket, interfaces } => {
                CallArgs::SocketInterfaces {
                    socket: SocketId(socket.to_native()),
                    interfaces: interfaces
                        .iter()
                        .map(|id| InterfaceId(id.to_native()))
                        .collect(),
                }
            }
            ArchivedCallArgsV1::Interface { interface } => {
                CallArgs::Interface(InterfaceId(interface.to_native()))
            }
            ArchivedCallArgsV1::InterfaceGroup { interface, group } => CallArgs::InterfaceGroup {
                interface: InterfaceId(interface.to_native()),
                group: group.as_str().to_owned(),
            },
        })
    }

    fn encode_reply(&self, reply: &Self::Reply) -> FabricResult<Encoded> {
        let schema = match reply {
            CallResult::Unit => CallResultV1::Unit,
            CallResult::Socket(socket) => CallResultV1::Socket { socket: socket.0 },
            CallResult::Stream(stream) => CallResultV1::Stream { stream: stream.0 },
            CallResult::InterfaceIds(ids) => CallResultV1::InterfaceIds {
                ids: ids.iter().map(|id| id.0).collect(),
            },
            CallResult::Interfaces(entries) => CallResultV1::Interfaces {
                entries: entries
                    .iter()
                    .map(|entry| InterfacePropertyV1 {
                        id: entry.id.0,
                        name: entry.name.clone(),
                        address: entry.address.clone(),
                        technology: entry.technology.clone(),
                    })
                    .collect(),
            },
            CallResult::Groups(groups) => CallResultV1::Groups {
                groups: groups.iter().map(|g| g.as_str().to_owned()).collect(),
            },
            CallResult::GroupSet(entries) => CallResultV1::GroupSet {
                entries: entries
                    .iter()
                    .map(|(group, count)| GroupCountV1 {
                        group: group.as_str().to_owned(),
                        count: *count,
                    })
                    .collect(),
            },
            CallResult::Flag(value) => CallResultV1::Flag { value: *value },
            CallResult::Size(bytes) => CallResultV1::Size { bytes: *bytes },
            CallResult::Failed(failure) => CallResultV1::Failed {
                kind: match failure.kind {
                    FailureKind::RequirementFailed => FailureKindV1::RequirementFailed,
                    FailureKind::InternalInterfaceError => FailureKindV1::InternalInterfaceError,
                    FailureKind::ChannelClosed => FailureKindV1::ChannelClosed,
                },
                message: failure.message.clone(),
            },
        };
        let payload = serialize(&schema)?;
        Ok(Encoded::new(
            Envelope::new(TAG_RPC_RESULT, SCHEMA_VERSION_V1),
            payload,
        ))
    }

    fn decode_reply(&self, envelope: Envelope, payload: &[u8]) -> FabricResult<Self::Reply> {
        ensure_tag(envelope, TAG_RPC_RESULT)?;
        let archived = archived_root::<CallResultV1>(payload)?;
        Ok(match archived {
            ArchivedCallResultV1::Unit => CallResult::Unit,
            ArchivedCallResultV1::Socket { socket } => {
                CallResult::Socket(SocketId(socket.to_native()))
            }
            ArchivedCallResultV1::Stream { stream } => {
                CallResult::Stream(StreamId(stream.to_native()))
            }
            ArchivedCallResultV1::InterfaceIds { ids } => CallResult::InterfaceIds(
                ids.iter().map(|id| InterfaceId(id.to_native())).collect(),
            ),
            ArchivedCallResultV1::Interfaces { entries } => CallResult::Interfaces(
                entries
                    .iter()
                    .map(|entry| InterfaceProperty {
                        id: InterfaceId(entry.id.to_native()),
                        name: entry.name.as_str().to_owned(),
                        address: entry.address.as_str().to_owned(),
                        technology: entry.technology.as_str().to_owned(),
                    })
                    .collect(),
            ),
            ArchivedCallResultV1::Groups { groups } => CallResult::Groups(
                groups
                    .iter()
                    .map(|g| decode_group(g.as_str()))
                    .collect::<FabricResult<_>>()?,
            ),
            ArchivedCallResultV1::GroupSet { entries } => CallResult::GroupSet(
                entries
                    .iter()
                    .map(|entry| Ok((decode_group(entry.group.as_str())?, entry.count.to_native())))
                    .collect::<FabricResult<_>>()?,
            ),
            ArchivedCallResultV1::Flag { value } => CallResult::Flag(*value),
            ArchivedCallResultV1::Size { bytes } => CallResult::Size(bytes.to_native()),
            ArchivedCallResultV1::Failed { kind, message } => {
                CallResult::Failed(CallFailure::new(
                    match kind {
                        ArchivedFailureKindV1::RequirementFailed => FailureKind::RequirementFailed,
                        ArchivedFailureKindV1::InternalInterfaceError => {
                            FailureKind::InternalInterfaceError
                        }
                        ArchivedFailureKindV1::ChannelClosed => FailureKind::ChannelClosed,
                    },
                    message.as_str(),
                ))
            }
        })
    }
}

fn decode_group(raw: &str) -> FabricResult<GroupUri> {
    GroupUri::parse(raw).map_err(|err| FabricError::codec(err.to_string()))
}

fn serialize<T>(value: &T) -> FabricResult<Vec<u8>>
where
    T: Archive,
    T: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, Error>>,
{
    to_bytes::<Error>(value)
        .map(|aligned| aligned.into_vec())
        .map_err(|err| FabricError::codec(format!("serialize failure: {err}")))
}

fn ensure_tag(envelope: Envelope, expected: u8) -> FabricResult<()> {
    if envelope.tag != expected {
        return Err(FabricError::codec(format!(
            "unexpected envelope tag {} (expected {})",
            envelope.tag, expected
        )));
    }
    if envelope.ver != SCHEMA_VERSION_V1 {
        return Err(FabricError::codec(format!(
            "schema version mismatch: {} vs {}",
            envelope.ver, SCHEMA_VERSION_V1
        )));
    }
    Ok(())
}

fn archived_root<T>(payload: &[u8]) -> FabricResult<&rkyv::Archived<T>>
where
    T: Archive,
    T::Archived: for<'a> CheckBytes<HighValidator<'a, Error>>,
{
    access::<T::Archived, Error>(payload)
        .map_err(|err| FabricError::codec(format!("validation failure: {err}")))
}
