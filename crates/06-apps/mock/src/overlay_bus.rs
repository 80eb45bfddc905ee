//! In-process stand-in for an overlay network.

use std::collections::BTreeSet;
use std::sync::Arc;

use adapters_overlay::{OverlayDriver, OverlayFactory, OverlayOptions};
use iface_abi::{AdapterResult, GroupUri, InboundHandle, TechOptions};
use parking_lot::Mutex;

/// Routes every overlay send to the other bus members that subscribed to
/// the group. Each member keeps the inbound handle its adapter was built with.
#[derive(Default)]
pub struct OverlayBus {
    members: Mutex<Vec<Arc<Member>>>,
}

struct Member {
    port: u16,
    inbound: InboundHandle,
    groups: Mutex<BTreeSet<GroupUri>>,
}

struct BusDriver {
    bus: Arc<OverlayBus>,
    me: Arc<Member>,
}

impl OverlayBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Overlay factory whose instances join this bus.
    pub fn factory(self: &Arc<Self>) -> OverlayFactory {
        let bus = Arc::clone(self);
        OverlayFactory::new(
            move |options: &OverlayOptions,
                  inbound: InboundHandle|
                  -> AdapterResult<Box<dyn OverlayDriver>> {
                let me = Arc::new(Member {
                    port: options.local_port,
                    inbound,
                    groups: Mutex::new(BTreeSet::new()),
                });
                bus.members.lock().push(Arc::clone(&me));
                Ok(Box::new(BusDriver {
                    bus: Arc::clone(&bus),
                    me,
                }))
            },
        )
    }

    /// Overlay options for a member listening on `local_port`.
    pub fn options(local_port: u16) -> TechOptions {
        TechOptions::new()
            .with("bootstrap.addr", "127.0.0.1")
            .with("bootstrap.port", "5000")
            .with("local.addr", "127.0.0.1")
            .with("local.port", local_port.to_string())
            .with("reliable", "true")
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OverlayDriver for BusDriver {
    fn subscribe(&self, group: &GroupUri) -> AdapterResult<()> {
        self.me.groups.lock().insert(group.clone());
        Ok(())
    }

    fn unsubscribe(&self, group: &GroupUri) -> AdapterResult<()> {
        self.me.groups.lock().remove(group);
        Ok(())
    }

    fn route(&self, group: &GroupUri, payload: &[u8], _ttl: u8) -> AdapterResult<()> {
        let members = self.bus.members.lock().clone();
        for member in members.iter().filter(|m| !Arc::ptr_eq(m, &self.me)) {
            if member.groups.lock().contains(group) {
                member.inbound.deliver(group, payload);
            }
        }
        Ok(())
    }

    fn neighbors(&self) -> Vec<GroupUri> {
        self.bus
            .members
            .lock()
            .iter()
            .filter(|m| !Arc::ptr_eq(m, &self.me))
            .filter_map(|m| GroupUri::parse(format!("alm://127.0.0.1:{}", m.port)).ok())
            .collect()
    }

    fn children(&self, _group: &GroupUri) -> Vec<GroupUri> {
        Vec::new()
    }

    fn parent(&self, _group: &GroupUri) -> Option<GroupUri> {
        None
    }

    fn is_root(&self, group: &GroupUri) -> bool {
        self.me.groups.lock().contains(group)
    }
}
