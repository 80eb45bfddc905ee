//! Technology adapter contract.
//!
//! One implementation exists per network technology. Adapters are shared
//! behind [`AdapterHandle`] and take `&self`; any state they mutate from
//! their own threads is theirs to synchronize. Inbound data flows back to the
//! channel only through the [`InboundHandle`] captured at construction.

use std::sync::Arc;

use crate::error::AdapterResult;
use crate::group::GroupUri;
use crate::ids::InterfaceId;
use crate::options::TechOptions;

/// Largest payload a single send is expected to carry when an adapter has no
/// tighter limit.
pub const DEFAULT_MAX_MSG_SIZE: u32 = 8 * 1024;

/// Self-description an adapter publishes for interface listings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceDiscovery {
    pub name: String,
    pub address: String,
    pub technology: String,
}

impl ServiceDiscovery {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        technology: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            technology: technology.into(),
        }
    }
}

/// Interface listing entry returned to applications.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceProperty {
    pub id: InterfaceId,
    pub name: String,
    pub address: String,
    pub technology: String,
}

/// Result of handing an inbound packet to the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// Copied and queued for delivery.
    Accepted,
    /// Budget exhausted; the packet was discarded.
    Dropped,
    /// The channel is gone; the adapter should stop producing.
    Closed,
}

/// Upcall path from adapter threads into the channel.
///
/// Implementations must not retain `payload` past the call.
pub trait InboundSink: Send + Sync {
    fn deliver(&self, source: &GroupUri, payload: &[u8]) -> AdmitOutcome;
}

pub type InboundHandle = Arc<dyn InboundSink>;

pub trait Adapter: Send + Sync {
    fn id(&self) -> InterfaceId;

    /// Underlying subscribe primitive. Called once per 0 -> 1 transition.
    fn join(&self, group: &GroupUri) -> AdapterResult<()>;

    /// Underlying unsubscribe primitive. Called once per 1 -> 0 transition.
    fn leave(&self, group: &GroupUri) -> AdapterResult<()>;

    fn send(&self, group: &GroupUri, payload: &[u8], ttl: u8) -> AdapterResult<()>;

    /// Technology-specific address mapping; `None` when the group cannot be
    /// expressed on this technology.
    fn resolve(&self, group: &GroupUri) -> Option<GroupUri> {
        Some(group.clone())
    }

    fn neighbors(&self) -> Vec<GroupUri> {
        Vec::new()
    }

    fn children(&self, _group: &GroupUri) -> Vec<GroupUri> {
        Vec::new()
    }

    fn parents(&self, _group: &GroupUri) -> Vec<GroupUri> {
        Vec::new()
    }

    fn designated_host(&self, _group: &GroupUri) -> bool {
        false
    }

    fn service_discovery(&self) -> ServiceDiscovery;

    fn max_message_size(&self) -> u32 {
        DEFAULT_MAX_MSG_SIZE
    }

    /// Releases threads and sockets. Called once at channel teardown.
    fn shutdown(&self) {}
}

pub type AdapterHandle = Arc<dyn Adapter>;

/// Builds adapters for one configuration group.
pub trait AdapterFactory: Send + Sync {
    /// Configuration group name this factory serves (e.g. `"ip"`).
    fn technology(&self) -> &'static str;

    fn build(
        &self,
        id: InterfaceId,
        options: &TechOptions,
        inbound: InboundHandle,
    ) -> AdapterResult<AdapterHandle>;
}
