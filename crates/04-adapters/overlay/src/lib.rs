//! Application-layer multicast technology.
//!
//! The routing and maintenance protocol lives in an external
//! [`OverlayDriver`]; this crate adapts a driver to the channel's adapter
//! contract and parses the overlay configuration group. Each adapter owns its
//! driver and inbound handle, so several overlay instances can run side by
//! side in one process.

use iface_abi::{
    Adapter, AdapterError, AdapterFactory, AdapterHandle, AdapterResult, GroupUri, InboundHandle,
    InterfaceId, ServiceDiscovery, TechOptions,
};
use log::{debug, info};
use std::sync::Arc;

/// Configuration group served by this adapter.
pub const TECHNOLOGY: &str = "overlay";

/// Parsed `overlay` configuration group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlayOptions {
    pub bootstrap_addr: String,
    pub bootstrap_port: u16,
    pub local_addr: String,
    pub local_port: u16,
    pub reliable: bool,
    pub maintenance: bool,
}

impl OverlayOptions {
    pub fn from_options(options: &TechOptions) -> AdapterResult<Self> {
        let bootstrap_addr = options
            .get("bootstrap.addr")
            .filter(|addr| !addr.is_empty())
            .ok_or_else(|| AdapterError::init_failed(TECHNOLOGY, "missing bootstrap.addr"))?;
        Ok(Self {
            bootstrap_addr: bootstrap_addr.to_owned(),
            bootstrap_port: port(options, "bootstrap.port")?,
            local_addr: options.get_or("local.addr", "0.0.0.0").to_owned(),
            local_port: port(options, "local.port")?,
            reliable: options.flag("reliable"),
            maintenance: options.flag("maintenance"),
        })
    }
}

fn port(options: &TechOptions, key: &str) -> AdapterResult<u16> {
    options
        .get_or(key, "0")
        .parse()
        .map_err(|err| AdapterError::init_failed(TECHNOLOGY, format!("{key}: {err}")))
}

/// Routing engine behind an overlay adapter.
///
/// Drivers deliver received data through the inbound handle given to
/// [`OverlayDriverFactory::start`].
pub trait OverlayDriver: Send + Sync {
    fn subscribe(&self, group: &GroupUri) -> AdapterResult<()>;
    fn unsubscribe(&self, group: &GroupUri) -> AdapterResult<()>;
    fn route(&self, group: &GroupUri, payload: &[u8], ttl: u8) -> AdapterResult<()>;
    fn neighbors(&self) -> Vec<GroupUri>;
    fn children(&self, group: &GroupUri) -> Vec<GroupUri>;
    fn parent(&self, group: &GroupUri) -> Option<GroupUri>;
    fn is_root(&self, group: &GroupUri) -> bool;
    fn stop(&self) {}
}

/// Starts overlay drivers; a failed start keeps the adapter out of the registry.
pub trait OverlayDriverFactory: Send + Sync {
    fn start(
        &self,
        options: &OverlayOptions,
        inbound: InboundHandle,
    ) -> AdapterResult<Box<dyn OverlayDriver>>;
}

impl<F> OverlayDriverFactory for F
where
    F: Fn(&OverlayOptions, InboundHandle) -> AdapterResult<Box<dyn OverlayDriver>> + Send + Sync,
{
    fn start(
        &self,
        options: &OverlayOptions,
        inbound: InboundHandle,
    ) -> AdapterResult<Box<dyn OverlayDriver>> {
        self(options, inbound)
    }
}

pub struct OverlayAdapter {
    id: InterfaceId,
    options: OverlayOptions,
    driver: Box<dyn OverlayDriver>,
}

impl OverlayAdapter {
    pub fn new(id: InterfaceId, options: OverlayOptions, driver: Box<dyn OverlayDriver>) -> Self {
        Self {
            id,
            options,
            driver,
        }
    }

    pub fn options(&self) -> &OverlayOptions {
        &self.options
    }
}

impl Adapter for OverlayAdapter {
    fn id(&self) -> InterfaceId {
        self.id
    }

    fn join(&self, group: &GroupUri) -> AdapterResult<()> {
        debug!("overlay {}: subscribe {group}", self.id);
        self.driver.subscribe(group)
    }

    fn leave(&self, group: &GroupUri) -> AdapterResult<()> {
        debug!("overlay {}: unsubscribe {group}", self.id);
        self.driver.unsubscribe(group)
    }

    fn send(&self, group: &GroupUri, payload: &[u8], ttl: u8) -> AdapterResult<()> {
        self.driver.route(group, payload, ttl)
    }

    fn neighbors(&self) -> Vec<GroupUri> {
        self.driver.neighbors()
    }

    fn children(&self, group: &GroupUri) -> Vec<GroupUri> {
        self.driver.children(group)
    }

    fn parents(&self, group: &GroupUri) -> Vec<GroupUri> {
        self.driver.parent(group).into_iter().collect()
    }

    fn designated_host(&self, group: &GroupUri) -> bool {
        self.driver.is_root(group)
    }

    fn service_discovery(&self) -> ServiceDiscovery {
        ServiceDiscovery::new(
            TECHNOLOGY,
            format!("alm://{}:{}", self.options.local_addr, self.options.local_port),
            "ALM",
        )
    }

    fn shutdown(&self) {
        self.driver.stop();
    }
}

/// Factory registered under [`TECHNOLOGY`]; wraps the driver factory that
/// supplies the routing engine.
pub struct OverlayFactory {
    drivers: Arc<dyn OverlayDriverFactory>,
}

impl OverlayFactory {
    pub fn new(drivers: impl OverlayDriverFactory + 'static) -> Self {
        Self {
            drivers: Arc::new(drivers),
        }
    }
}

impl AdapterFactory for OverlayFactory {
    fn technology(&self) -> &'static str {
        TECHNOLOGY
    }

    fn build(
        &self,
        id: InterfaceId,
        options: &TechOptions,
        inbound: InboundHandle,
    ) -> AdapterResult<AdapterHandle> {
        let options = OverlayOptions::from_options(options)?;
        let driver = self.drivers.start(&options, inbound)?;
        info!(
            "overlay {id}: bootstrap {}:{} (reliable={}, maintenance={})",
            options.bootstrap_addr, options.bootstrap_port, options.reliable, options.maintenance
        );
        Ok(Arc::new(OverlayAdapter::new(id, options, driver)))
    }
}
