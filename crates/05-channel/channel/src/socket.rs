//! Per-socket state.
//!
//! A socket's joined-group set is a view; the authoritative refcount for each
//! group lives in the attached [`Interface`](crate::registry::Interface)s.
//! Every membership change made here is mirrored onto the attached
//! interfaces so those counts stay exact across attach, detach and destroy.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use iface_abi::{AdapterResult, GroupUri, IdGenerator, InterfaceId, SocketId, StreamId};
use log::{debug, warn};

use crate::error::{ChannelError, ChannelResult};
use crate::registry::{Interface, InterfaceRegistry};

pub const DEFAULT_TTL: u8 = 1;

/// Packet handed to a blocking-mode socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MulticastPacket {
    pub source: GroupUri,
    pub payload: Box<[u8]>,
}

impl MulticastPacket {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Channel-side end of a blocking socket's receive buffer.
#[derive(Clone, Debug)]
pub struct BlockingTarget {
    tx: Sender<MulticastPacket>,
}

impl BlockingTarget {
    fn push(&self, packet: MulticastPacket) {
        if self.tx.send(packet).is_err() {
            warn!("blocking receiver dropped; discarding packet");
        }
    }
}

/// Application-side end of a blocking socket's receive buffer.
#[derive(Debug)]
pub struct PacketReceiver {
    rx: Receiver<MulticastPacket>,
}

impl PacketReceiver {
    pub fn try_recv(&self) -> Option<MulticastPacket> {
        match self.rx.try_recv() {
            Ok(packet) => Some(packet),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<MulticastPacket> {
        match self.rx.recv_timeout(timeout) {
            Ok(packet) => Some(packet),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Creates a receive buffer for blocking mode.
pub fn receive_buffer() -> (BlockingTarget, PacketReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (BlockingTarget { tx }, PacketReceiver { rx })
}

/// Async-mode callback: `(source, length, data)`.
pub type ReceiveCallback = Box<dyn FnMut(&GroupUri, usize, &[u8]) + Send>;

/// How inbound packets reach a socket. Selecting one mode replaces the other.
#[derive(Default)]
pub enum DeliveryMode {
    #[default]
    Unbound,
    Blocking(BlockingTarget),
    Async(ReceiveCallback),
}

impl DeliveryMode {
    fn deliver(&mut self, source: &GroupUri, payload: Payload<'_>) -> bool {
        match self {
            DeliveryMode::Unbound => false,
            DeliveryMode::Blocking(target) => {
                target.push(MulticastPacket {
                    source: source.clone(),
                    payload: payload.into_owned(),
                });
                true
            }
            DeliveryMode::Async(callback) => {
                let data = payload.as_slice();
                callback(source, data.len(), data);
                true
            }
        }
    }
}

impl fmt::Debug for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Unbound => f.write_str("Unbound"),
            DeliveryMode::Blocking(_) => f.write_str("Blocking"),
            DeliveryMode::Async(_) => f.write_str("Async"),
        }
    }
}

/// Payload on its way to one socket: shared for all but the last receiver,
/// which takes ownership.
enum Payload<'a> {
    Shared(&'a [u8]),
    Owned(Box<[u8]>),
}

impl Payload<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Payload::Shared(data) => data,
            Payload::Owned(data) => data,
        }
    }

    fn into_owned(self) -> Box<[u8]> {
        match self {
            Payload::Shared(data) => data.into(),
            Payload::Owned(data) => data,
        }
    }
}

#[derive(Debug)]
pub struct SocketState {
    ttl: u8,
    interfaces: BTreeSet<InterfaceId>,
    groups: BTreeSet<GroupUri>,
    streams: BTreeMap<StreamId, GroupUri>,
    stream_ids: IdGenerator<StreamId>,
    delivery: DeliveryMode,
}

impl SocketState {
    fn new(interfaces: BTreeSet<InterfaceId>) -> Self {
        Self {
            ttl: DEFAULT_TTL,
            interfaces,
            groups: BTreeSet::new(),
            streams: BTreeMap::new(),
            stream_ids: IdGenerator::new(),
            delivery: DeliveryMode::Unbound,
        }
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    pub fn interfaces(&self) -> &BTreeSet<InterfaceId> {
        &self.interfaces
    }

    pub fn groups(&self) -> &BTreeSet<GroupUri> {
        &self.groups
    }

    pub fn stream_group(&self, stream: StreamId) -> Option<&GroupUri> {
        self.streams.get(&stream)
    }

    pub fn delivery(&self) -> &DeliveryMode {
        &self.delivery
    }
}

/// Applies `op` on every listed interface, logging adapter failures.
fn for_each_interface<'a>(
    registry: &mut InterfaceRegistry,
    interfaces: impl IntoIterator<Item = &'a InterfaceId>,
    group: &GroupUri,
    op: &str,
    mut apply: impl FnMut(&mut Interface, &GroupUri) -> AdapterResult<()>,
) -> ChannelResult<()> {
    for id in interfaces {
        let iface = registry.get_mut(*id)?;
        if let Err(err) = apply(iface, group) {
            warn!("{id}: {op} {group} failed: {err}");
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct SocketTable {
    sockets: BTreeMap<SocketId, SocketState>,
    ids: IdGenerator<SocketId>,
}

impl SocketTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a socket attached to every currently registered interface.
    pub fn create(&mut self, registry: &InterfaceRegistry) -> ChannelResult<SocketId> {
        let id = self
            .ids
            .next_id()
            .ok_or_else(|| ChannelError::precondition("socket ids exhausted"))?;
        self.sockets
            .insert(id, SocketState::new(registry.ids().collect()));
        debug!("created {id}");
        Ok(id)
    }

    /// Removes a socket, leaving each of its groups on each attached interface.
    #[track_caller]
    pub fn destroy(&mut self, id: SocketId, registry: &mut InterfaceRegistry) -> ChannelResult<()> {
        let state = self
            .sockets
            .remove(&id)
            .ok_or_else(|| ChannelError::unknown_socket(id))?;
        for group in &state.groups {
            for_each_interface(registry, &state.interfaces, group, "leave", |iface, g| {
                iface.leave(g)
            })?;
        }
        debug!("destroyed {id}");
        Ok(())
    }

    #[track_caller]
    pub fn get(&self, id: SocketId) -> ChannelResult<&SocketState> {
        self.sockets
            .get(&id)
            .ok_or_else(|| ChannelError::unknown_socket(id))
    }

    #[track_caller]
    fn get_mut(&mut self, id: SocketId) -> ChannelResult<&mut SocketState> {
        self.sockets
            .get_mut(&id)
            .ok_or_else(|| ChannelError::unknown_socket(id))
    }

    pub fn contains(&self, id: SocketId) -> bool {
        self.sockets.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    #[track_caller]
    pub fn set_ttl(&mut self, id: SocketId, ttl: u8) -> ChannelResult<()> {
        self.get_mut(id)?.ttl = ttl;
        Ok(())
    }

    /// Joins `group`; a no-op when the socket already joined it.
    #[track_caller]
    pub fn join(
        &mut self,
        id: SocketId,
        group: &GroupUri,
        registry: &mut InterfaceRegistry,
    ) -> ChannelResult<()> {
        let state = self.get_mut(id)?;
        if state.groups.contains(group) {
            return Ok(());
        }
        for_each_interface(registry, &state.interfaces, group, "join", |iface, g| {
            iface.join(g)
        })?;
        state.groups.insert(group.clone());
        Ok(())
    }

    /// Leaves `group`; a no-op when the socket never joined it.
    #[track_caller]
    pub fn leave(
        &mut self,
        id: SocketId,
        group: &GroupUri,
        registry: &mut InterfaceRegistry,
    ) -> ChannelResult<()> {
        let state = self.get_mut(id)?;
        if !state.groups.remove(group) {
            return Ok(());
        }
        for_each_interface(registry, &state.interfaces, group, "leave", |iface, g| {
            iface.leave(g)
        })
    }

    /// Attaches a registered interface and joins the socket's groups on it.
    #[track_caller]
    pub fn attach_interface(
        &mut self,
        id: SocketId,
        iface: InterfaceId,
        registry: &mut InterfaceRegistry,
    ) -> ChannelResult<()> {
        let state = self.get_mut(id)?;
        if !registry.contains(iface) {
            return Err(ChannelError::unknown_interface(iface));
        }
        if !state.interfaces.insert(iface) {
            return Ok(());
        }
        for group in &state.groups {
            for_each_interface(registry, [&iface], group, "join", |i, g| i.join(g))?;
        }
        Ok(())
    }

    /// Detaches an interface and leaves the socket's groups on it.
    #[track_caller]
    pub fn detach_interface(
        &mut self,
        id: SocketId,
        iface: InterfaceId,
        registry: &mut InterfaceRegistry,
    ) -> ChannelResult<()> {
        let state = self.get_mut(id)?;
        if !registry.contains(iface) {
            return Err(ChannelError::unknown_interface(iface));
        }
        if !state.interfaces.remove(&iface) {
            return Ok(());
        }
        for group in &state.groups {
            for_each_interface(registry, [&iface], group, "leave", |i, g| i.leave(g))?;
        }
        Ok(())
    }

    /// Replaces the attachment set with `requested ∩ registered`; unknown ids
    /// are dropped silently.
    #[track_caller]
    pub fn set_interfaces(
        &mut self,
        id: SocketId,
        requested: &[InterfaceId],
        registry: &mut InterfaceRegistry,
    ) -> ChannelResult<()> {
        if requested.is_empty() {
            return Err(ChannelError::precondition("interface set must not be empty"));
        }
        let state = self.get_mut(id)?;
        let wanted: BTreeSet<InterfaceId> = requested
            .iter()
            .copied()
            .filter(|iface| registry.contains(*iface))
            .collect();
        let removed: Vec<InterfaceId> = state.interfaces.difference(&wanted).copied().collect();
        let added: Vec<InterfaceId> = wanted.difference(&state.interfaces).copied().collect();
        for group in &state.groups {
            for_each_interface(registry, &removed, group, "leave", |i, g| i.leave(g))?;
            for_each_interface(registry, &added, group, "join", |i, g| i.join(g))?;
        }
        state.interfaces = wanted;
        Ok(())
    }

    /// Binds a new stream of this socket to `group`.
    #[track_caller]
    pub fn create_stream(&mut self, id: SocketId, group: GroupUri) -> ChannelResult<StreamId> {
        let state = self.get_mut(id)?;
        let stream = state
            .stream_ids
            .next_id()
            .ok_or_else(|| ChannelError::precondition("stream ids exhausted"))?;
        state.streams.insert(stream, group);
        Ok(stream)
    }

    #[track_caller]
    pub fn list_interfaces(&self, id: SocketId) -> ChannelResult<Vec<InterfaceId>> {
        Ok(self.get(id)?.interfaces.iter().copied().collect())
    }

    #[track_caller]
    pub fn set_delivery(&mut self, id: SocketId, mode: DeliveryMode) -> ChannelResult<()> {
        self.get_mut(id)?.delivery = mode;
        Ok(())
    }

    /// Hands an inbound packet to every socket that joined `source`.
    ///
    /// Returns the number of sockets that received it.
    pub fn deliver(&mut self, source: &GroupUri, payload: Box<[u8]>) -> usize {
        let targets: smallvec::SmallVec<[SocketId; 8]> = self
            .sockets
            .iter()
            .filter(|(_, state)| state.groups.contains(source))
            .map(|(id, _)| *id)
            .collect();
        let mut owned = Some(payload);
        let mut delivered = 0;
        for (idx, id) in targets.iter().enumerate() {
            let Some(state) = self.sockets.get_mut(id) else {
                continue;
            };
            let payload = if idx + 1 == targets.len() {
                match owned.take() {
                    Some(data) => Payload::Owned(data),
                    None => break,
                }
            } else {
                match owned.as_deref() {
                    Some(data) => Payload::Shared(data),
                    None => break,
                }
            };
            if state.delivery.deliver(source, payload) {
                delivered += 1;
            } else {
                log::error!(
                    "{id} has neither a blocking target nor a callback; \
                     packet from {source} not delivered"
                );
            }
        }
        delivered
    }
}
