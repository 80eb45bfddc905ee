//! Channel driver: owns the socket table, the interface registry and the
//! consumer end of the queue, and makes bounded progress per poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use iface_abi::{AdapterFactory, InboundHandle};
use log::{debug, error, info, trace, warn};
use transport::{msg_queue, ByteBudget, QueueConsumer, QueueProducer};
use transport_fabric::{Encoded, PollEngine};

use crate::client::ChannelHandle;
use crate::config::ChannelConfig;
use crate::dispatch::Dispatcher;
use crate::error::{ChannelError, ChannelResult};
use crate::inbound::Admission;
use crate::msg::{CallReply, ChannelMsg, InboundPacket, OutboundPacket};
use crate::registry::InterfaceRegistry;
use crate::socket::{DeliveryMode, SocketTable};

/// State reachable from call handlers.
#[derive(Default)]
pub struct ChannelCore {
    pub(crate) sockets: SocketTable,
    pub(crate) registry: InterfaceRegistry,
}

impl ChannelCore {
    pub fn new(registry: InterfaceRegistry) -> Self {
        Self {
            sockets: SocketTable::new(),
            registry,
        }
    }

    pub fn sockets(&self) -> &SocketTable {
        &self.sockets
    }

    pub fn registry(&self) -> &InterfaceRegistry {
        &self.registry
    }
}

/// Assembles a [`Channel`] from configuration and adapter factories.
pub struct ChannelBuilder {
    config: ChannelConfig,
    factories: Vec<Box<dyn AdapterFactory>>,
}

impl ChannelBuilder {
    /// Starts with the tunnel, void and IP factories registered.
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            factories: vec![
                Box::new(adapters_tunnel::TunnelFactory),
                Box::new(adapters_void::VoidFactory),
                Box::new(adapters_ip::IpFactory),
            ],
        }
    }

    /// Registers `factory`, replacing any factory for the same technology.
    pub fn factory(mut self, factory: impl AdapterFactory + 'static) -> Self {
        let technology = factory.technology();
        self.factories.retain(|f| f.technology() != technology);
        self.factories.push(Box::new(factory));
        self
    }

    pub fn build(self) -> anyhow::Result<Channel> {
        let settings = self.config.channel.clone().sanitized();
        let budget = ByteBudget::new(settings.budget_bytes).context("inbound budget")?;
        let send_budget = ByteBudget::new(settings.send_budget_bytes).context("send budget")?;

        let (producer, consumer) = msg_queue();
        let admission = Admission::new(Arc::new(budget), producer.clone());
        let inbound: InboundHandle = Arc::new(admission.clone());
        let registry = InterfaceRegistry::populate(&self.config, &self.factories, &inbound);
        if registry.is_empty() {
            warn!("channel started without any interface");
        }
        info!(
            "channel ready with {} interface(s), budget {} bytes",
            registry.len(),
            settings.budget_bytes
        );

        Ok(Channel {
            core: ChannelCore::new(registry),
            dispatcher: Dispatcher::new(),
            consumer,
            producer,
            admission,
            send_budget: Arc::new(send_budget),
            drain_batch: settings.drain_batch,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

pub struct Channel {
    core: ChannelCore,
    dispatcher: Dispatcher,
    consumer: QueueConsumer<ChannelMsg>,
    producer: QueueProducer<ChannelMsg>,
    admission: Admission,
    send_budget: Arc<ByteBudget>,
    drain_batch: usize,
    closed: Arc<AtomicBool>,
}

impl Channel {
    pub fn builder(config: ChannelConfig) -> ChannelBuilder {
        ChannelBuilder::new(config)
    }

    /// New client handle sharing this channel's queue and send budget.
    pub fn handle(&self) -> ChannelHandle {
        ChannelHandle::new(
            self.producer.clone(),
            Arc::clone(&self.send_budget),
            Arc::clone(&self.closed),
        )
    }

    /// The inbound path adapters were given.
    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    pub fn core(&self) -> &ChannelCore {
        &self.core
    }

    pub fn pending(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Processes up to `drain_batch` messages.
    pub fn poll(&mut self) -> ChannelResult<usize> {
        self.step(self.drain_batch)
    }

    /// Processes up to `max` messages in FIFO order.
    ///
    /// Stops at the first fatal error; the caller that triggered it has
    /// already received a failed result.
    pub fn step(&mut self, max: usize) -> ChannelResult<usize> {
        let mut processed = 0;
        while processed < max {
            let Some(msg) = self.consumer.try_pop() else {
                break;
            };
            processed += 1;
            trace!("processing {}", msg.kind());
            self.process(msg)?;
        }
        Ok(processed)
    }

    /// Blocks until a message is queued or `timeout` elapses.
    pub fn wait_for_work(&mut self, timeout: Duration) -> bool {
        self.consumer.wait_timeout(timeout)
    }

    fn process(&mut self, msg: ChannelMsg) -> ChannelResult<()> {
        match msg {
            ChannelMsg::RegisterBlockingTarget { socket, target } => {
                self.register(socket, DeliveryMode::Blocking(target))
            }
            ChannelMsg::RegisterAsyncCallback { socket, callback } => {
                self.register(socket, DeliveryMode::Async(callback))
            }
            ChannelMsg::Outbound(packet) => {
                self.send_outbound(packet);
                Ok(())
            }
            ChannelMsg::SynchronousCall {
                opcode,
                args,
                reply,
            } => self.call(opcode, &args, reply),
            ChannelMsg::Acknowledge => Ok(()),
            ChannelMsg::Inbound(packet) => {
                self.deliver_inbound(packet);
                Ok(())
            }
        }
    }

    fn register(&mut self, socket: iface_abi::SocketId, mode: DeliveryMode) -> ChannelResult<()> {
        if !self.core.sockets.contains(socket) {
            warn!("delivery target for unknown {socket} ignored");
            return Ok(());
        }
        debug!("{socket} delivery mode {mode:?}");
        self.core.sockets.set_delivery(socket, mode)
    }

    fn send_outbound(&mut self, packet: OutboundPacket) {
        let OutboundPacket {
            socket,
            stream,
            payload,
            reservation,
        } = packet;
        let Some(state) = self.core.sockets.get(socket).ok() else {
            warn!("outbound packet for unknown {socket} dropped");
            return;
        };
        let Some(group) = state.stream_group(stream) else {
            warn!("outbound packet for unknown {stream} on {socket} dropped");
            return;
        };
        for id in state.interfaces() {
            let Ok(iface) = self.core.registry.get(*id) else {
                continue;
            };
            if let Err(err) = iface.send(group, &payload, state.ttl()) {
                warn!("{id}: send to {group} failed: {err}");
            }
        }
        trace!("sent {} bytes to {group}", reservation.bytes());
        drop(reservation);
    }

    fn call(&mut self, opcode: u16, args: &Encoded, reply: CallReply) -> ChannelResult<()> {
        let outcome = self.dispatcher.invoke(opcode, &mut self.core, args);
        if let Err(err) = &outcome {
            if err.is_fatal() {
                error!("{err}");
            } else {
                warn!("call {opcode:#06x} failed: {err}");
            }
        }
        if let CallReply::Sink(promise) = reply {
            match self.dispatcher.encode_outcome(&outcome) {
                Ok(encoded) => promise.fulfill(encoded),
                Err(err) => error!("cannot encode reply for {opcode:#06x}: {err}"),
            }
        }
        match outcome {
            Err(err) if err.is_fatal() => Err(err),
            _ => Ok(()),
        }
    }

    fn deliver_inbound(&mut self, packet: InboundPacket) {
        let InboundPacket {
            source,
            payload,
            reservation,
        } = packet;
        drop(reservation);
        let len = payload.len();
        let delivered = self.core.sockets.deliver(&source, payload);
        trace!("{len} bytes from {source} delivered to {delivered} socket(s)");
    }

    /// Cooperative teardown: adapters release their resources and every
    /// queued synchronous call is answered with a closed-channel failure.
    pub fn shutdown(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("channel shutting down");
        self.core.registry.shutdown();
        let closed: ChannelResult<_> = Err(ChannelError::Closed);
        let mut answered = 0;
        while let Some(msg) = self.consumer.try_pop() {
            let ChannelMsg::SynchronousCall {
                reply: CallReply::Sink(promise),
                ..
            } = msg
            else {
                continue;
            };
            match self.dispatcher.encode_outcome(&closed) {
                Ok(encoded) => promise.fulfill(encoded),
                Err(err) => error!("cannot encode closed reply: {err}"),
            }
            answered += 1;
        }
        debug!("answered {answered} pending call(s) at shutdown");
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PollEngine for Channel {
    fn poll(&mut self) -> anyhow::Result<usize> {
        Ok(Channel::poll(self)?)
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}
