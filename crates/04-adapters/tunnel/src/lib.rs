//! Unicast UDP tunnel technology.
//!
//! Every send is wrapped in a frame and forwarded to one configured remote
//! endpoint; frames received on the local endpoint are unwrapped and handed
//! to the channel when their group is joined locally. The UDP socket is
//! opened on first use, so an idle tunnel holds no resources.
//!
//! Frame layout: `[u16 BE uri length][uri bytes][payload]`.

use iface_abi::{
    Adapter, AdapterError, AdapterFactory, AdapterHandle, AdapterResult, AdmitOutcome, GroupUri,
    InboundHandle, InterfaceId, ServiceDiscovery, TechOptions,
};
use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Configuration group served by this adapter.
pub const TECHNOLOGY: &str = "tunnel";

const RECV_POLL: Duration = Duration::from_millis(100);
const MAX_FRAME: usize = 64 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TunnelOptions {
    pub local: SocketAddrV4,
    pub remote: SocketAddrV4,
}

impl TunnelOptions {
    pub fn from_options(options: &TechOptions) -> AdapterResult<Self> {
        Ok(Self {
            local: endpoint(options, "local_addr", "0.0.0.0", "local_port", "1607")?,
            remote: endpoint(options, "remote_addr", "192.168.1.21", "remote_port", "8000")?,
        })
    }
}

fn endpoint(
    options: &TechOptions,
    addr_key: &str,
    addr_default: &str,
    port_key: &str,
    port_default: &str,
) -> AdapterResult<SocketAddrV4> {
    let addr: Ipv4Addr = options
        .get_or(addr_key, addr_default)
        .parse()
        .map_err(|err| AdapterError::init_failed(TECHNOLOGY, format!("{addr_key}: {err}")))?;
    let port: u16 = options
        .get_or(port_key, port_default)
        .parse()
        .map_err(|err| AdapterError::init_failed(TECHNOLOGY, format!("{port_key}: {err}")))?;
    Ok(SocketAddrV4::new(addr, port))
}

/// Wraps `payload` for transmission to the remote endpoint.
pub fn encode_frame(group: &GroupUri, payload: &[u8]) -> AdapterResult<Vec<u8>> {
    let uri = group.as_str().as_bytes();
    let len =
        u16::try_from(uri.len()).map_err(|_| AdapterError::Unsupported("group uri too long"))?;
    let mut frame = Vec::with_capacity(2 + uri.len() + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(uri);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Splits a received frame into its group and payload.
pub fn decode_frame(frame: &[u8]) -> Option<(GroupUri, &[u8])> {
    let (len, rest) = frame.split_first_chunk::<2>()?;
    let len = usize::from(u16::from_be_bytes(*len));
    if rest.len() < len {
        return None;
    }
    let (uri, payload) = rest.split_at(len);
    let group = GroupUri::parse(std::str::from_utf8(uri).ok()?).ok()?;
    Some((group, payload))
}

struct Link {
    socket: Arc<UdpSocket>,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

pub struct TunnelAdapter {
    id: InterfaceId,
    options: TunnelOptions,
    inbound: InboundHandle,
    joined: Arc<RwLock<BTreeSet<GroupUri>>>,
    link: Mutex<Option<Link>>,
}

impl TunnelAdapter {
    pub fn new(id: InterfaceId, options: TunnelOptions, inbound: InboundHandle) -> Self {
        Self {
            id,
            options,
            inbound,
            joined: Arc::new(RwLock::new(BTreeSet::new())),
            link: Mutex::new(None),
        }
    }

    fn socket(&self) -> AdapterResult<Arc<UdpSocket>> {
        let mut link = self.link.lock();
        if let Some(link) = link.as_ref() {
            return Ok(Arc::clone(&link.socket));
        }
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(self.options.local))?;
        socket.set_read_timeout(Some(RECV_POLL))?;
        let socket: Arc<UdpSocket> = Arc::new(socket.into());
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let socket = Arc::clone(&socket);
            let joined = Arc::clone(&self.joined);
            let inbound = Arc::clone(&self.inbound);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name(format!("tunnel-{}", self.options.local))
                .spawn(move || receive_loop(&socket, &joined, &inbound, &stop))?
        };
        debug!(
            "tunnel {}: {} <-> {}",
            self.id, self.options.local, self.options.remote
        );
        *link = Some(Link {
            socket: Arc::clone(&socket),
            stop,
            thread,
        });
        Ok(socket)
    }
}

fn receive_loop(
    socket: &UdpSocket,
    joined: &RwLock<BTreeSet<GroupUri>>,
    inbound: &InboundHandle,
    stop: &AtomicBool,
) {
    let mut buf = vec![0u8; MAX_FRAME];
    while !stop.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                let Some((group, payload)) = decode_frame(&buf[..len]) else {
                    warn!("tunnel: malformed frame from {from}");
                    continue;
                };
                if !joined.read().contains(&group) {
                    trace!("tunnel: ignoring frame for {group}");
                    continue;
                }
                if inbound.deliver(&group, payload) == AdmitOutcome::Closed {
                    break;
                }
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) => {
                warn!("tunnel: receive failed: {err}");
                break;
            }
        }
    }
}

impl Adapter for TunnelAdapter {
    fn id(&self) -> InterfaceId {
        self.id
    }

    fn join(&self, group: &GroupUri) -> AdapterResult<()> {
        self.socket()?;
        self.joined.write().insert(group.clone());
        Ok(())
    }

    fn leave(&self, group: &GroupUri) -> AdapterResult<()> {
        self.joined.write().remove(group);
        Ok(())
    }

    fn send(&self, group: &GroupUri, payload: &[u8], _ttl: u8) -> AdapterResult<()> {
        let frame = encode_frame(group, payload)?;
        self.socket()?.send_to(&frame, self.options.remote)?;
        Ok(())
    }

    fn service_discovery(&self) -> ServiceDiscovery {
        ServiceDiscovery::new(
            TECHNOLOGY,
            format!("tun://{}", self.options.local),
            TECHNOLOGY,
        )
    }

    fn shutdown(&self) {
        if let Some(link) = self.link.lock().take() {
            link.stop.store(true, Ordering::Release);
            if link.thread.join().is_err() {
                warn!("tunnel: receive thread panicked");
            }
        }
    }
}

/// Factory registered under [`TECHNOLOGY`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TunnelFactory;

impl AdapterFactory for TunnelFactory {
    fn technology(&self) -> &'static str {
        TECHNOLOGY
    }

    fn build(
        &self,
        id: InterfaceId,
        options: &TechOptions,
        inbound: InboundHandle,
    ) -> AdapterResult<AdapterHandle> {
        let options = TunnelOptions::from_options(options)?;
        Ok(Arc::new(TunnelAdapter::new(id, options, inbound)))
    }
}
