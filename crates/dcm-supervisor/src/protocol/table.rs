// crates/dcm-supervisor/src/protocol/table.rs
use super::queue::{ProtocolQueue, QueueState};
use super::state::ProtocolState;
use crate::config::SupervisorConfig;
use crate::types::{ProtocolId, RequestType, RxConnectionId, StackNumber};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Run state of a protocol together with the request it currently processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ProtocolStatus {
    pub state: ProtocolState,
    pub rx: Option<RxConnectionId>,
    pub request_type: Option<RequestType>,
}

/// Status and queue tables of all configured protocols.
///
/// Stack lookups take the configuration as a parameter; the table itself
/// only carries the mutable part.
#[derive(Debug, Clone)]
pub struct ProtocolTable {
    status: Vec<ProtocolStatus>,
    queues: Vec<ProtocolQueue>,
    latest_external_uds: Option<ProtocolId>,
    /// Set while a presumptive request waits for the main function.
    presumptive_pending: bool,
}

impl ProtocolTable {
    pub fn new(num_protocols: usize) -> Self {
        Self {
            status: vec![ProtocolStatus::default(); num_protocols],
            queues: vec![ProtocolQueue::default(); num_protocols],
            latest_external_uds: None,
            presumptive_pending: false,
        }
    }

    /// Every protocol stopped and idle, no presumptive requests.
    pub fn reset(&mut self) {
        let num_protocols = self.status.len();
        *self = Self::new(num_protocols);
    }

    pub fn protocols(&self) -> impl Iterator<Item = ProtocolId> + use<> {
        (0..self.status.len()).map(|i| ProtocolId(i as u8))
    }

    pub fn status(&self, protocol: ProtocolId) -> &ProtocolStatus {
        &self.status[protocol.index()]
    }

    pub fn status_mut(&mut self, protocol: ProtocolId) -> &mut ProtocolStatus {
        &mut self.status[protocol.index()]
    }

    pub fn state(&self, protocol: ProtocolId) -> ProtocolState {
        self.status[protocol.index()].state
    }

    pub fn set_state(&mut self, protocol: ProtocolId, state: ProtocolState) {
        self.status[protocol.index()].state = state;
    }

    pub fn queue(&self, protocol: ProtocolId) -> &ProtocolQueue {
        &self.queues[protocol.index()]
    }

    pub fn queue_mut(&mut self, protocol: ProtocolId) -> &mut ProtocolQueue {
        &mut self.queues[protocol.index()]
    }

    pub fn queue_state(&self, protocol: ProtocolId) -> QueueState {
        self.queues[protocol.index()].state
    }

    pub fn latest_external_uds(&self) -> Option<ProtocolId> {
        self.latest_external_uds
    }

    pub fn set_latest_external_uds(&mut self, protocol: ProtocolId) {
        self.latest_external_uds = Some(protocol);
    }

    pub fn presumptive_pending(&self) -> bool {
        self.presumptive_pending
    }

    pub fn mark_presumptive_pending(&mut self) {
        self.presumptive_pending = true;
    }

    /// Recomputes the pending flag after a presumptive request was cleared.
    pub fn refresh_presumptive_pending(&mut self) {
        self.presumptive_pending = self.queues.iter().any(ProtocolQueue::is_presumptive);
    }

    // --- Stack lookups ---

    pub fn protocols_on_stack<'a>(
        &'a self,
        config: &'a SupervisorConfig,
        stack: StackNumber,
    ) -> impl Iterator<Item = ProtocolId> + 'a {
        self.protocols()
            .filter(move |&p| config.stack_of(p) == stack)
    }

    /// The protocol holding the current-protocol slot of `stack`.
    pub fn current_protocol_on_stack(
        &self,
        config: &SupervisorConfig,
        stack: StackNumber,
    ) -> Option<ProtocolId> {
        self.protocols_on_stack(config, stack)
            .find(|&p| self.state(p).is_current())
    }

    /// The protocol holding a TYPE1 presumptive request on `stack`.
    pub fn type1_presumptive_on_stack(
        &self,
        config: &SupervisorConfig,
        stack: StackNumber,
    ) -> Option<ProtocolId> {
        self.protocols_on_stack(config, stack)
            .find(|&p| self.queue_state(p).is_type1())
    }

    /// The first protocol holding a TYPE2 presumptive request on `stack`.
    pub fn type2_presumptive_on_stack(
        &self,
        config: &SupervisorConfig,
        stack: StackNumber,
    ) -> Option<ProtocolId> {
        self.protocols_on_stack(config, stack)
            .find(|&p| self.queue_state(p).is_type2())
    }

    /// No protocol on `stack` keeps a TYPE1 request from being started or
    /// dispatched.
    pub fn stack_can_accept_type1(&self, config: &SupervisorConfig, stack: StackNumber) -> bool {
        !self
            .protocols_on_stack(config, stack)
            .any(|p| self.state(p).blocks_type1())
    }
}
