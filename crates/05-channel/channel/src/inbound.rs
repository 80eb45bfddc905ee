//! Inbound admission: the only path adapter threads use to reach the channel.

use std::sync::Arc;

use iface_abi::{AdmitOutcome, GroupUri, InboundSink};
use log::{trace, warn};
use transport::{BudgetGuard, ByteBudget, QueueProducer};

use crate::msg::{ChannelMsg, InboundPacket};

/// Budget-checked producer handed to every adapter.
///
/// A packet is copied into an owned buffer only after its bytes were
/// reserved; an exhausted budget drops the packet without blocking. Empty
/// packets reserve nothing and are dropped.
#[derive(Clone)]
pub struct Admission {
    budget: Arc<ByteBudget>,
    queue: QueueProducer<ChannelMsg>,
}

impl Admission {
    pub fn new(budget: Arc<ByteBudget>, queue: QueueProducer<ChannelMsg>) -> Self {
        Self { budget, queue }
    }

    pub fn budget(&self) -> &Arc<ByteBudget> {
        &self.budget
    }

    pub fn admit(&self, source: &GroupUri, payload: &[u8]) -> AdmitOutcome {
        if payload.is_empty() {
            warn!("empty packet from {source} dropped");
            return AdmitOutcome::Dropped;
        }
        let Some(reservation) = BudgetGuard::try_reserve(&self.budget, payload.len()) else {
            warn!(
                "packet dropped (inbound queue full): {} bytes from {source}, {} of {} available",
                payload.len(),
                self.budget.available(),
                self.budget.capacity()
            );
            return AdmitOutcome::Dropped;
        };
        let packet = InboundPacket {
            source: source.clone(),
            payload: payload.into(),
            reservation,
        };
        match self.queue.push(ChannelMsg::Inbound(packet)) {
            Ok(()) => {
                trace!("admitted {} bytes from {source}", payload.len());
                AdmitOutcome::Accepted
            }
            Err(_) => AdmitOutcome::Closed,
        }
    }
}

impl InboundSink for Admission {
    fn deliver(&self, source: &GroupUri, payload: &[u8]) -> AdmitOutcome {
        self.admit(source, payload)
    }
}
