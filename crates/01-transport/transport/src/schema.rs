//! Channel RPC schema frozen for rkyv serialization.
//!
//! `rkyv` expands `Archive` derives into generated archived types that inherit
//! `#[allow(missing_docs)]`, so missing docs are permitted at the module level.
#![allow(missing_docs)]
//!
//! Types in this module define the stable, archived representation of call
//! arguments and call results exchanged between channel handles and the
//! channel thread. Any backward-incompatible change must bump the schema
//! version.

use rkyv::{Archive, Serialize};
use std::string::String;
use std::vec::Vec;

/// Schema version for channel RPC payloads.
pub const SCHEMA_VERSION_V1: u8 = 1;

/// Envelope tag for call arguments.
pub const TAG_RPC_ARGS: u8 = 0x01;
/// Envelope tag for call results.
pub const TAG_RPC_RESULT: u8 = 0x11;

/// Arguments of a dispatched call.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(allow(missing_docs), doc = "Archived representation of `CallArgsV1`."),
    bytecheck()
)]
pub enum CallArgsV1 {
    Empty,
    Socket { socket: u32 },
    SocketGroup { socket: u32, group: String },
    SocketTtl { socket: u32, ttl: u8 },
    SocketInterface { socket: u32, interface: u32 },
    SocketInterfaces { socket: u32, interfaces: Vec<u32> },
    Interface { interface: u32 },
    InterfaceGroup { interface: u32, group: String },
}

/// Name/address/technology triple describing one registered interface.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(
        allow(missing_docs),
        doc = "Archived representation of `InterfacePropertyV1`."
    ),
    bytecheck()
)]
pub struct InterfacePropertyV1 {
    pub id: u32,
    pub name: String,
    pub address: String,
    pub technology: String,
}

/// One entry of an interface group set.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(allow(missing_docs), doc = "Archived representation of `GroupCountV1`."),
    bytecheck()
)]
pub struct GroupCountV1 {
    pub group: String,
    pub count: u32,
}

/// Failure category reported back to a synchronous caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(allow(missing_docs), doc = "Archived representation of `FailureKindV1`."),
    bytecheck()
)]
pub enum FailureKindV1 {
    RequirementFailed,
    InternalInterfaceError,
    ChannelClosed,
}

/// Result of a dispatched call.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(allow(missing_docs), doc = "Archived representation of `CallResultV1`."),
    bytecheck()
)]
pub enum CallResultV1 {
    Unit,
    Socket { socket: u32 },
    Stream { stream: u16 },
    InterfaceIds { ids: Vec<u32> },
    Interfaces { entries: Vec<InterfacePropertyV1> },
    Groups { groups: Vec<String> },
    GroupSet { entries: Vec<GroupCountV1> },
    Flag { value: bool },
    Size { bytes: u32 },
    Failed { kind: FailureKindV1, message: String },
}
