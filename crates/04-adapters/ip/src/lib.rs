//! Native IPv4 multicast technology.
//!
//! Groups use the `ip://<address>:<port>` form; any other scheme has no
//! mapping on this technology. Each joined group owns a receive socket and a
//! receive thread that hands datagrams to the channel's inbound path. Sends go
//! through one lazily created socket bound to the configured local address.

use iface_abi::{
    Adapter, AdapterError, AdapterFactory, AdapterHandle, AdapterResult, AdmitOutcome, GroupUri,
    InboundHandle, InterfaceId, InvalidGroup, ServiceDiscovery, TechOptions,
};
use log::{debug, trace, warn};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Configuration group served by this adapter.
pub const TECHNOLOGY: &str = "ip";

const SCHEME: &str = "ip";
const RECV_POLL: Duration = Duration::from_millis(100);
const MAX_DATAGRAM: usize = 64 * 1024;

/// Options read from the `ip` configuration group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IpOptions {
    /// Interface name published in discovery.
    pub name: String,
    /// Local address used for joins and as the multicast send interface.
    pub local: Ipv4Addr,
}

impl IpOptions {
    pub fn from_options(options: &TechOptions) -> AdapterResult<Self> {
        let local = options
            .get_or("addr", "0.0.0.0")
            .parse()
            .map_err(|err| AdapterError::init_failed(TECHNOLOGY, format!("addr: {err}")))?;
        Ok(Self {
            name: options.get_or("if", "any").to_owned(),
            local,
        })
    }
}

struct Receiver {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

pub struct IpAdapter {
    id: InterfaceId,
    options: IpOptions,
    inbound: InboundHandle,
    sender: Mutex<Option<Socket>>,
    receivers: Mutex<HashMap<GroupUri, Receiver>>,
}

impl IpAdapter {
    pub fn new(id: InterfaceId, options: IpOptions, inbound: InboundHandle) -> Self {
        Self {
            id,
            options,
            inbound,
            sender: Mutex::new(None),
            receivers: Mutex::new(HashMap::new()),
        }
    }

    fn group_addr(&self, group: &GroupUri) -> AdapterResult<SocketAddrV4> {
        let mapped = self
            .resolve(group)
            .ok_or_else(|| InvalidGroup(group.to_string()))?;
        parse_group_addr(&mapped).ok_or_else(|| InvalidGroup(group.to_string()).into())
    }

    fn open_receiver(&self, addr: SocketAddrV4) -> AdapterResult<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            addr.port(),
        )))?;
        socket.join_multicast_v4(addr.ip(), &self.options.local)?;
        socket.set_read_timeout(Some(RECV_POLL))?;
        Ok(socket.into())
    }

    fn open_sender(&self) -> AdapterResult<Socket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_multicast_if_v4(&self.options.local)?;
        socket.bind(&SockAddr::from(SocketAddrV4::new(self.options.local, 0)))?;
        Ok(socket)
    }
}

fn parse_group_addr(group: &GroupUri) -> Option<SocketAddrV4> {
    let ip: Ipv4Addr = group.host().parse().ok()?;
    let port = group.port()?;
    ip.is_multicast().then(|| SocketAddrV4::new(ip, port))
}

fn receive_loop(socket: UdpSocket, group: GroupUri, inbound: InboundHandle, stop: Arc<AtomicBool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while !stop.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                trace!("ip: {len} bytes for {group} from {from}");
                if inbound.deliver(&group, &buf[..len]) == AdmitOutcome::Closed {
                    break;
                }
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) => {
                warn!("ip: receive on {group} failed: {err}");
                break;
            }
        }
    }
}

impl Adapter for IpAdapter {
    fn id(&self) -> InterfaceId {
        self.id
    }

    fn join(&self, group: &GroupUri) -> AdapterResult<()> {
        let addr = self.group_addr(group)?;
        let socket = self.open_receiver(addr)?;
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let (group, inbound, stop) = (group.clone(), Arc::clone(&self.inbound), stop.clone());
            thread::Builder::new()
                .name(format!("ip-recv-{addr}"))
                .spawn(move || receive_loop(socket, group, inbound, stop))?
        };
        debug!("ip {}: joined {addr}", self.id);
        if let Some(previous) = self
            .receivers
            .lock()
            .insert(group.clone(), Receiver { stop, thread })
        {
            previous.stop.store(true, Ordering::Release);
        }
        Ok(())
    }

    fn leave(&self, group: &GroupUri) -> AdapterResult<()> {
        // The receive thread notices the flag within one poll interval and
        // drops its socket, which leaves the group.
        if let Some(receiver) = self.receivers.lock().remove(group) {
            receiver.stop.store(true, Ordering::Release);
            debug!("ip {}: left {group}", self.id);
        }
        Ok(())
    }

    fn send(&self, group: &GroupUri, payload: &[u8], ttl: u8) -> AdapterResult<()> {
        let addr = self.group_addr(group)?;
        let ttl = if ttl == 0 {
            warn!("ip: invalid ttl 0 for {group}, using 1");
            1
        } else {
            ttl
        };
        let mut sender = self.sender.lock();
        let socket = match sender.take() {
            Some(socket) => socket,
            None => self.open_sender()?,
        };
        let sent = socket
            .set_multicast_ttl_v4(u32::from(ttl))
            .and_then(|()| socket.send_to(payload, &SockAddr::from(addr)));
        *sender = Some(socket);
        sent?;
        Ok(())
    }

    fn resolve(&self, group: &GroupUri) -> Option<GroupUri> {
        (group.scheme() == SCHEME).then(|| group.clone())
    }

    fn service_discovery(&self) -> ServiceDiscovery {
        ServiceDiscovery::new(
            self.options.name.clone(),
            format!("ip://{}", self.options.local),
            "IP",
        )
    }

    fn shutdown(&self) {
        let receivers: Vec<Receiver> = self.receivers.lock().drain().map(|(_, r)| r).collect();
        for receiver in &receivers {
            receiver.stop.store(true, Ordering::Release);
        }
        for receiver in receivers {
            if receiver.thread.join().is_err() {
                warn!("ip: receive thread panicked");
            }
        }
        self.sender.lock().take();
    }
}

/// Factory registered under [`TECHNOLOGY`].
#[derive(Clone, Copy, Debug, Default)]
pub struct IpFactory;

impl AdapterFactory for IpFactory {
    fn technology(&self) -> &'static str {
        TECHNOLOGY
    }

    fn build(
        &self,
        id: InterfaceId,
        options: &TechOptions,
        inbound: InboundHandle,
    ) -> AdapterResult<AdapterHandle> {
        let options = IpOptions::from_options(options)?;
        Ok(Arc::new(IpAdapter::new(id, options, inbound)))
    }
}
