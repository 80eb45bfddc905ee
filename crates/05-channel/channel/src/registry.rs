//! Interface registry and per-interface join refcounting.

use std::collections::BTreeMap;

use iface_abi::{
    AdapterFactory, AdapterHandle, AdapterResult, GroupUri, IdGenerator, InboundHandle,
    InterfaceId, InterfaceProperty, TechOptions, DEFAULT_MAX_MSG_SIZE,
};
use log::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, ChannelResult};

/// Technologies visited first, in this order, when populating a registry.
pub const TECHNOLOGY_ORDER: [&str; 4] = ["overlay", "tunnel", "void", "ip"];

/// Technology instantiated when nothing else could be.
pub const DEFAULT_TECHNOLOGY: &str = "ip";

/// A registered adapter plus its group refcounts.
///
/// The underlying adapter join fires on the 0 -> 1 transition of a group's
/// count and the underlying leave on 1 -> 0; everything in between only moves
/// the counter.
pub struct Interface {
    adapter: AdapterHandle,
    joins: BTreeMap<GroupUri, u32>,
}

impl Interface {
    pub fn new(adapter: AdapterHandle) -> Self {
        Self {
            adapter,
            joins: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> InterfaceId {
        self.adapter.id()
    }

    pub fn adapter(&self) -> &AdapterHandle {
        &self.adapter
    }

    /// Counts one more joiner. The count is kept even when the underlying
    /// join fails, so the matching leave stays balanced.
    pub fn join(&mut self, group: &GroupUri) -> AdapterResult<()> {
        if let Some(count) = self.joins.get_mut(group) {
            *count += 1;
            return Ok(());
        }
        self.joins.insert(group.clone(), 1);
        debug!("{}: first joiner for {group}", self.id());
        self.adapter.join(group)
    }

    /// Counts one joiner less. Leaving a group that was never joined is a no-op.
    pub fn leave(&mut self, group: &GroupUri) -> AdapterResult<()> {
        let Some(count) = self.joins.get_mut(group) else {
            return Ok(());
        };
        *count -= 1;
        if *count > 0 {
            return Ok(());
        }
        self.joins.remove(group);
        debug!("{}: last joiner left {group}", self.id());
        self.adapter.leave(group)
    }

    pub fn join_count(&self, group: &GroupUri) -> u32 {
        self.joins.get(group).copied().unwrap_or(0)
    }

    /// Joined groups with their joiner counts.
    pub fn group_set(&self) -> Vec<(GroupUri, u32)> {
        self.joins
            .iter()
            .map(|(group, count)| (group.clone(), *count))
            .collect()
    }

    pub fn send(&self, group: &GroupUri, payload: &[u8], ttl: u8) -> AdapterResult<()> {
        self.adapter.send(group, payload, ttl)
    }

    pub fn property(&self) -> InterfaceProperty {
        let discovery = self.adapter.service_discovery();
        InterfaceProperty {
            id: self.id(),
            name: discovery.name,
            address: discovery.address,
            technology: discovery.technology,
        }
    }
}

#[derive(Default)]
pub struct InterfaceRegistry {
    interfaces: BTreeMap<InterfaceId, Interface>,
    ids: IdGenerator<InterfaceId>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds registries from configuration.
    ///
    /// Groups listed in [`TECHNOLOGY_ORDER`] come first, then any other
    /// configured group that has a factory. A failing technology is logged
    /// and skipped; if nothing could be registered, the default IP adapter is
    /// built with empty options.
    pub fn populate(
        config: &ChannelConfig,
        factories: &[Box<dyn AdapterFactory>],
        inbound: &InboundHandle,
    ) -> Self {
        let mut registry = Self::new();
        let mut order: Vec<&str> = TECHNOLOGY_ORDER.to_vec();
        order.extend(
            config
                .technology_names()
                .filter(|name| TECHNOLOGY_ORDER.iter().all(|known| known != name)),
        );
        for name in order {
            let Some(options) = config.technology(name) else {
                continue;
            };
            let Some(factory) = factories.iter().find(|f| f.technology() == name) else {
                warn!("no adapter available for technology {name}, skipping");
                continue;
            };
            if let Err(err) = registry.register_with(factory.as_ref(), options, inbound) {
                warn!("{err}");
            }
        }
        if registry.is_empty() {
            match factories
                .iter()
                .find(|f| f.technology() == DEFAULT_TECHNOLOGY)
            {
                Some(factory) => {
                    if let Err(err) =
                        registry.register_with(factory.as_ref(), &TechOptions::new(), inbound)
                    {
                        warn!("{err}");
                    }
                }
                None => warn!("no default {DEFAULT_TECHNOLOGY} adapter available"),
            }
        }
        registry
    }

    /// Builds an adapter under the next id. A failed build leaves the
    /// registry untouched apart from the consumed id.
    pub fn register_with(
        &mut self,
        factory: &dyn AdapterFactory,
        options: &TechOptions,
        inbound: &InboundHandle,
    ) -> ChannelResult<InterfaceId> {
        let id = self
            .ids
            .next_id()
            .ok_or_else(|| ChannelError::precondition("interface ids exhausted"))?;
        let adapter = factory
            .build(id, options, InboundHandle::clone(inbound))
            .map_err(|err| ChannelError::AdapterInitFailed {
                technology: factory.technology().to_owned(),
                reason: err.to_string(),
            })?;
        info!(
            "registered {id} ({})",
            adapter.service_discovery().technology
        );
        self.interfaces.insert(id, Interface::new(adapter));
        Ok(id)
    }

    #[track_caller]
    pub fn get(&self, id: InterfaceId) -> ChannelResult<&Interface> {
        self.interfaces
            .get(&id)
            .ok_or_else(|| ChannelError::unknown_interface(id))
    }

    #[track_caller]
    pub fn get_mut(&mut self, id: InterfaceId) -> ChannelResult<&mut Interface> {
        self.interfaces
            .get_mut(&id)
            .ok_or_else(|| ChannelError::unknown_interface(id))
    }

    pub fn contains(&self, id: InterfaceId) -> bool {
        self.interfaces.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = InterfaceId> + '_ {
        self.interfaces.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.values()
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Smallest atomic message size across registered adapters.
    pub fn atomic_msg_size(&self) -> u32 {
        self.iter()
            .map(|iface| iface.adapter().max_message_size())
            .min()
            .unwrap_or(DEFAULT_MAX_MSG_SIZE)
    }

    /// Asks every adapter to release its resources.
    pub fn shutdown(&self) {
        for iface in self.iter() {
            debug!("shutting down {}", iface.id());
            iface.adapter().shutdown();
        }
    }
}
