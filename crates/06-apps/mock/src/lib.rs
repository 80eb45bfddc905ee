//! Recording adapter doubles for channel tests.
//!
//! [`RecordingFactory`] wraps a real factory (the void adapter by default)
//! and logs every underlying join, leave, send and shutdown into a shared
//! [`CallLog`], so tests can count how often the transport primitives fire.
//! [`OverlayBus`] connects overlay instances without a network.

use std::collections::BTreeMap;
use std::sync::Arc;

use adapters_void::VoidFactory;
use iface_abi::{
    Adapter, AdapterError, AdapterFactory, AdapterHandle, AdapterResult, GroupUri, InboundHandle,
    InterfaceId, ServiceDiscovery, TechOptions,
};
use parking_lot::Mutex;

mod overlay_bus;

pub use overlay_bus::OverlayBus;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdapterCall {
    Join {
        iface: InterfaceId,
        group: String,
    },
    Leave {
        iface: InterfaceId,
        group: String,
    },
    Send {
        iface: InterfaceId,
        group: String,
        payload: Vec<u8>,
        ttl: u8,
    },
    Shutdown {
        iface: InterfaceId,
    },
}

#[derive(Default)]
struct LogState {
    calls: Vec<AdapterCall>,
    inbound: BTreeMap<InterfaceId, InboundHandle>,
}

/// Shared, cloneable call journal.
#[derive(Clone, Default)]
pub struct CallLog {
    state: Arc<Mutex<LogState>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: AdapterCall) {
        self.state.lock().calls.push(call);
    }

    pub fn calls(&self) -> Vec<AdapterCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear(&self) {
        self.state.lock().calls.clear();
    }

    pub fn joins(&self, iface: InterfaceId, group: &str) -> usize {
        self.count(|call| {
            matches!(call, AdapterCall::Join { iface: i, group: g } if *i == iface && g == group)
        })
    }

    pub fn leaves(&self, iface: InterfaceId, group: &str) -> usize {
        self.count(|call| {
            matches!(call, AdapterCall::Leave { iface: i, group: g } if *i == iface && g == group)
        })
    }

    pub fn sends(&self) -> Vec<AdapterCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, AdapterCall::Send { .. }))
            .cloned()
            .collect()
    }

    /// Inbound handle the channel gave to interface `iface`.
    pub fn inbound(&self, iface: InterfaceId) -> Option<InboundHandle> {
        self.state.lock().inbound.get(&iface).cloned()
    }

    fn count(&self, pred: impl Fn(&AdapterCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| pred(call)).count()
    }
}

pub struct RecordingAdapter {
    inner: AdapterHandle,
    log: CallLog,
    max_message_size: Option<u32>,
}

impl Adapter for RecordingAdapter {
    fn id(&self) -> InterfaceId {
        self.inner.id()
    }

    fn join(&self, group: &GroupUri) -> AdapterResult<()> {
        self.log.record(AdapterCall::Join {
            iface: self.id(),
            group: group.to_string(),
        });
        self.inner.join(group)
    }

    fn leave(&self, group: &GroupUri) -> AdapterResult<()> {
        self.log.record(AdapterCall::Leave {
            iface: self.id(),
            group: group.to_string(),
        });
        self.inner.leave(group)
    }

    fn send(&self, group: &GroupUri, payload: &[u8], ttl: u8) -> AdapterResult<()> {
        self.log.record(AdapterCall::Send {
            iface: self.id(),
            group: group.to_string(),
            payload: payload.to_vec(),
            ttl,
        });
        self.inner.send(group, payload, ttl)
    }

    fn resolve(&self, group: &GroupUri) -> Option<GroupUri> {
        self.inner.resolve(group)
    }

    fn neighbors(&self) -> Vec<GroupUri> {
        self.inner.neighbors()
    }

    fn children(&self, group: &GroupUri) -> Vec<GroupUri> {
        self.inner.children(group)
    }

    fn parents(&self, group: &GroupUri) -> Vec<GroupUri> {
        self.inner.parents(group)
    }

    fn designated_host(&self, group: &GroupUri) -> bool {
        self.inner.designated_host(group)
    }

    fn service_discovery(&self) -> ServiceDiscovery {
        self.inner.service_discovery()
    }

    fn max_message_size(&self) -> u32 {
        self.max_message_size
            .unwrap_or_else(|| self.inner.max_message_size())
    }

    fn shutdown(&self) {
        self.log.record(AdapterCall::Shutdown { iface: self.id() });
        self.inner.shutdown();
    }
}

/// Factory that records every adapter it builds.
pub struct RecordingFactory {
    technology: &'static str,
    inner: Box<dyn AdapterFactory>,
    log: CallLog,
    max_message_size: Option<u32>,
}

impl RecordingFactory {
    pub fn new(
        technology: &'static str,
        inner: impl AdapterFactory + 'static,
        log: CallLog,
    ) -> Self {
        Self {
            technology,
            inner: Box::new(inner),
            log,
            max_message_size: None,
        }
    }

    /// Records a void adapter registered under `technology`.
    pub fn void(technology: &'static str, log: CallLog) -> Self {
        Self::new(technology, VoidFactory, log)
    }

    pub fn with_max_message_size(mut self, bytes: u32) -> Self {
        self.max_message_size = Some(bytes);
        self
    }
}

impl AdapterFactory for RecordingFactory {
    fn technology(&self) -> &'static str {
        self.technology
    }

    fn build(
        &self,
        id: InterfaceId,
        options: &TechOptions,
        inbound: InboundHandle,
    ) -> AdapterResult<AdapterHandle> {
        let inner = self.inner.build(id, options, InboundHandle::clone(&inbound))?;
        self.log.state.lock().inbound.insert(id, inbound);
        Ok(Arc::new(RecordingAdapter {
            inner,
            log: self.log.clone(),
            max_message_size: self.max_message_size,
        }))
    }
}

/// Factory whose adapters never come up.
pub struct FailingFactory {
    technology: &'static str,
}

impl FailingFactory {
    pub fn new(technology: &'static str) -> Self {
        Self { technology }
    }
}

impl AdapterFactory for FailingFactory {
    fn technology(&self) -> &'static str {
        self.technology
    }

    fn build(
        &self,
        _id: InterfaceId,
        _options: &TechOptions,
        _inbound: InboundHandle,
    ) -> AdapterResult<AdapterHandle> {
        Err(AdapterError::init_failed(self.technology, "driver refused to start"))
    }
}
