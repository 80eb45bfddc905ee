//! No-op placeholder technology.
//!
//! Sends go nowhere and topology queries are empty. Joining the `jo:ker`
//! group starts a generator thread that floods the channel with a fixed
//! quote until the group is left, which makes the adapter a convenient load
//! source for the inbound backpressure path.

use iface_abi::{
    Adapter, AdapterFactory, AdapterHandle, AdapterResult, AdmitOutcome, GroupUri, InboundHandle,
    InterfaceId, ServiceDiscovery, TechOptions,
};
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Configuration group served by this adapter.
pub const TECHNOLOGY: &str = "void";

/// Group that turns on the quote generator.
pub const GENERATOR_GROUP: &str = "jo:ker";

/// Payload emitted by the generator.
pub const QUOTE: &[u8] = b"Ever danced with the devil in the pale moonlight?";

const BACKOFF: Duration = Duration::from_millis(1);

struct Generator {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl Generator {
    fn spawn(group: GroupUri, inbound: InboundHandle) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("void-generator".into())
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    match inbound.deliver(&group, QUOTE) {
                        AdmitOutcome::Accepted => {}
                        AdmitOutcome::Dropped => thread::sleep(BACKOFF),
                        AdmitOutcome::Closed => break,
                    }
                }
                trace!("void generator stopped");
            })?;
        Ok(Self { stop, thread })
    }

    fn stop(self) {
        self.stop.store(true, Ordering::Release);
        if self.thread.join().is_err() {
            warn!("void generator thread panicked");
        }
    }
}

pub struct VoidAdapter {
    id: InterfaceId,
    inbound: InboundHandle,
    generator: Mutex<Option<Generator>>,
}

impl VoidAdapter {
    pub fn new(id: InterfaceId, inbound: InboundHandle) -> Self {
        Self {
            id,
            inbound,
            generator: Mutex::new(None),
        }
    }

    fn is_generator_group(group: &GroupUri) -> bool {
        group.as_str() == GENERATOR_GROUP
    }
}

impl Adapter for VoidAdapter {
    fn id(&self) -> InterfaceId {
        self.id
    }

    fn join(&self, group: &GroupUri) -> AdapterResult<()> {
        debug!("void {}: join {group}", self.id);
        if Self::is_generator_group(group) {
            let mut generator = self.generator.lock();
            if generator.is_none() {
                *generator = Some(Generator::spawn(group.clone(), Arc::clone(&self.inbound))?);
            }
        }
        Ok(())
    }

    fn leave(&self, group: &GroupUri) -> AdapterResult<()> {
        debug!("void {}: leave {group}", self.id);
        if Self::is_generator_group(group) {
            if let Some(generator) = self.generator.lock().take() {
                generator.stop();
            }
        }
        Ok(())
    }

    fn send(&self, _group: &GroupUri, _payload: &[u8], _ttl: u8) -> AdapterResult<()> {
        Ok(())
    }

    fn service_discovery(&self) -> ServiceDiscovery {
        ServiceDiscovery::new(TECHNOLOGY, "void://", TECHNOLOGY)
    }

    fn shutdown(&self) {
        if let Some(generator) = self.generator.lock().take() {
            generator.stop();
        }
    }
}

/// Factory registered under [`TECHNOLOGY`].
#[derive(Clone, Copy, Debug, Default)]
pub struct VoidFactory;

impl AdapterFactory for VoidFactory {
    fn technology(&self) -> &'static str {
        TECHNOLOGY
    }

    fn build(
        &self,
        id: InterfaceId,
        _options: &TechOptions,
        inbound: InboundHandle,
    ) -> AdapterResult<AdapterHandle> {
        Ok(Arc::new(VoidAdapter::new(id, inbound)))
    }
}
