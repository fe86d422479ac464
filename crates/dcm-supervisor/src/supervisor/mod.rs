// crates/dcm-supervisor/src/supervisor/mod.rs
//! The protocol handling supervisor.
//!
//! [`Supervisor`] owns the protocol tables behind a single lock. Every entry
//! point takes `&self`, so the cyclic task and the callers running in other
//! contexts (P2 timer expiry, service completion, reception) can share one
//! instance. The lock is never held while a collaborator is called.

mod acceptance;
mod actions;
mod arbitration;
mod p2;
mod tick;
mod transitions;

#[cfg(test)]
pub(crate) mod mock;

use crate::config::{ProtocolConfig, SupervisorConfig};
use crate::error::SupervisorError;
use crate::hal::{SessionHandler, SupervisorServices};
use crate::log::{ProtocolLogContext, sv_info};
use crate::protocol::{ProtocolQueue, ProtocolState, ProtocolStatus, ProtocolTable, QueueState};
use crate::types::{
    ArbitrationResult, ProtocolGroup, ProtocolId, RequestBuffer, RequestOrigin, RequestType,
    RxConnectionId, SessionLevel, SessionSwitchPermission,
};
use actions::SupervisorAction;
use parking_lot::Mutex;

/// Locked view of the tables, collecting the collaborator calls a
/// transition needs.
pub(crate) struct SupervisorContext<'a> {
    pub config: &'a SupervisorConfig,
    pub table: &'a mut ProtocolTable,
    actions: Vec<SupervisorAction>,
}

impl<'a> SupervisorContext<'a> {
    pub fn new(config: &'a SupervisorConfig, table: &'a mut ProtocolTable) -> Self {
        Self {
            config,
            table,
            actions: Vec::new(),
        }
    }

    pub fn push(&mut self, action: SupervisorAction) {
        self.actions.push(action);
    }

    pub fn into_actions(self) -> Vec<SupervisorAction> {
        self.actions
    }

    pub fn log_ctx(&self, protocol: ProtocolId) -> ProtocolLogContext {
        ProtocolLogContext::new(protocol, self.config.stack_of(protocol))
    }
}

/// Arbitrates, preempts and dispatches diagnostic protocols.
///
/// Protocol ids passed to the entry points must come from the configuration
/// the supervisor was built with; unknown ids panic.
pub struct Supervisor {
    config: SupervisorConfig,
    table: Mutex<ProtocolTable>,
}

impl Supervisor {
    /// Creates the supervisor with every protocol stopped and idle.
    pub fn new(config: SupervisorConfig) -> Self {
        let table = ProtocolTable::new(config.num_protocols());
        sv_info!(
            "Protocol handling initialised for {} protocols.",
            config.num_protocols()
        );
        Self {
            config,
            table: Mutex::new(table),
        }
    }

    /// Returns every protocol to stopped/idle and drops all presumptive
    /// requests without notifying anybody.
    pub fn init(&self) {
        self.table.lock().reset();
        sv_info!("Protocol handling reset.");
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Runs `f` on the locked tables and returns the calls it recorded.
    fn transact<R>(
        &self,
        f: impl FnOnce(&mut SupervisorContext<'_>) -> R,
    ) -> (R, Vec<SupervisorAction>) {
        let mut table = self.table.lock();
        let mut ctx = SupervisorContext::new(&self.config, &mut *table);
        let result = f(&mut ctx);
        let actions = ctx.into_actions();
        drop(table);
        (result, actions)
    }

    /// Like [`transact`](Self::transact), then issues the recorded calls.
    fn run<S, R>(&self, services: &mut S, f: impl FnOnce(&mut SupervisorContext<'_>) -> R) -> R
    where
        S: SupervisorServices + ?Sized,
    {
        let (result, actions) = self.transact(f);
        actions::execute(services, actions);
        result
    }

    /// Read-only access to the locked tables.
    fn inspect<R>(&self, f: impl FnOnce(&SupervisorContext<'_>) -> R) -> R {
        let (result, _) = self.transact(|ctx| f(ctx));
        result
    }

    // --- Arbitration ---

    /// Assesses whether a TYPE1 request for `protocol` may be accepted.
    pub fn type1_request_priority_assessment<S>(
        &self,
        services: &S,
        protocol: ProtocolId,
        origin: RequestOrigin,
    ) -> ArbitrationResult
    where
        S: SessionHandler + ?Sized,
    {
        let session = services.current_session();
        self.inspect(|ctx| {
            arbitration::type1_request_priority_assessment(ctx, protocol, origin, session)
        })
    }

    /// Assesses whether a TYPE2 request for `protocol` may be accepted.
    pub fn type2_request_priority_assessment(&self, protocol: ProtocolId) -> ArbitrationResult {
        self.inspect(|ctx| arbitration::type2_request_priority_assessment(ctx, protocol))
    }

    /// Whether accepting a request for `next` requires the current protocol
    /// of its stack to give up the stack.
    pub fn preemption_necessary_on_stack(&self, next: ProtocolId) -> bool {
        self.inspect(|ctx| arbitration::preemption_necessary(ctx, next))
    }

    /// A protocol of the same group holds or runs a TYPE1 request on
    /// another stack.
    pub fn protocol_of_same_type_running_on_different_stack(&self, protocol: ProtocolId) -> bool {
        self.inspect(|ctx| arbitration::same_type_protocol_busy_on_different_stack(ctx, protocol))
    }

    pub fn protocol_of_different_type_running_on_different_stack(
        &self,
        protocol: ProtocolId,
    ) -> bool {
        self.inspect(|ctx| {
            arbitration::different_type_protocol_busy_on_different_stack(ctx, protocol)
        })
    }

    /// Whether the session may be switched to `new_session` now.
    pub fn is_session_cleared_to_switch(&self, new_session: SessionLevel) -> SessionSwitchPermission {
        self.inspect(|ctx| arbitration::is_session_cleared_to_switch(ctx, new_session))
    }

    // --- Transitions ---

    /// Stores an accepted request as the presumptive request of `protocol`.
    ///
    /// The caller must have received [`ArbitrationResult::Accept`] for it.
    /// The supervisor owns `buffer` from now on.
    pub fn enqueue_as_presumptive<S>(
        &self,
        services: &mut S,
        protocol: ProtocolId,
        rx: RxConnectionId,
        request_type: RequestType,
        buffer: RequestBuffer,
        preemption_needed: bool,
    ) -> Result<(), SupervisorError>
    where
        S: SupervisorServices + ?Sized,
    {
        self.config.rx_connection(rx)?;
        self.run(services, |ctx| {
            transitions::enqueue_as_presumptive(
                ctx,
                protocol,
                rx,
                request_type,
                buffer,
                preemption_needed,
            )
        });
        Ok(())
    }

    /// Makes the current protocol on the stack of `next` give up the stack.
    pub fn terminate_current_protocol_on_same_stack<S>(&self, services: &mut S, next: ProtocolId)
    where
        S: SupervisorServices + ?Sized,
    {
        self.run(services, |ctx| {
            transitions::terminate_current_protocol_on_same_stack(ctx, next)
        });
    }

    /// Called by the service layer once the work of `protocol` is finished.
    pub fn protocol_free<S>(&self, services: &mut S, protocol: ProtocolId)
    where
        S: SupervisorServices + ?Sized,
    {
        self.run(services, |ctx| transitions::protocol_free(ctx, protocol));
    }

    pub fn cancel_roe_processing_on_all_protocols<S>(&self, services: &mut S)
    where
        S: SupervisorServices + ?Sized,
    {
        self.run(services, transitions::cancel_roe_processing_on_all_protocols);
    }

    pub fn cancel_uds_protocols_in_non_default_session<S>(&self, services: &mut S)
    where
        S: SupervisorServices + ?Sized,
    {
        self.run(services, transitions::cancel_uds_protocols_in_non_default_session);
    }

    pub fn cancel_presumptive_uds_protocols_in_non_default_session<S>(&self, services: &mut S)
    where
        S: SupervisorServices + ?Sized,
    {
        self.run(
            services,
            transitions::cancel_presumptive_uds_protocols_in_non_default_session,
        );
    }

    /// Ends the presumptive request of `protocol` without dispatching it.
    ///
    /// Does nothing if the protocol has no presumptive request.
    pub fn presumptive_protocol_end<S>(&self, services: &mut S, protocol: ProtocolId)
    where
        S: SupervisorServices + ?Sized,
    {
        self.run(services, |ctx| {
            if ctx.table.queue(protocol).is_presumptive() {
                transitions::presumptive_protocol_end(ctx, protocol);
            }
        });
    }

    // --- Queries ---

    pub fn protocol_state(&self, protocol: ProtocolId) -> ProtocolState {
        self.table.lock().state(protocol)
    }

    pub fn protocol_status(&self, protocol: ProtocolId) -> ProtocolStatus {
        *self.table.lock().status(protocol)
    }

    pub fn queue_state(&self, protocol: ProtocolId) -> QueueState {
        self.table.lock().queue_state(protocol)
    }

    pub fn queue_snapshot(&self, protocol: ProtocolId) -> ProtocolQueue {
        self.table.lock().queue(protocol).clone()
    }

    /// Whether a presumptive request waits for the main function.
    pub fn presumptive_pending(&self) -> bool {
        self.table.lock().presumptive_pending()
    }

    /// Request type of the work `protocol` is processing, if any.
    pub fn protocol_request_type(&self, protocol: ProtocolId) -> Option<RequestType> {
        self.table.lock().status(protocol).request_type
    }

    pub fn protocol_group(&self, protocol: ProtocolId) -> ProtocolGroup {
        self.config.group_of(protocol)
    }

    pub fn protocol_is_busy_with_type1_roe(&self, protocol: ProtocolId) -> bool {
        self.inspect(|ctx| arbitration::protocol_is_busy_with_type1_roe(ctx, protocol))
    }

    pub fn is_type2_roe_present(&self, protocol: ProtocolId) -> bool {
        self.inspect(|ctx| arbitration::is_type2_roe_present(ctx, protocol))
    }

    /// The UDS protocol that most recently received a dispatched request.
    pub fn latest_external_uds_protocol(&self) -> Result<ProtocolId, SupervisorError> {
        self.table
            .lock()
            .latest_external_uds()
            .ok_or(SupervisorError::NoExternalUdsProtocol)
    }

    pub fn latest_external_uds_protocol_config(&self) -> Result<&ProtocolConfig, SupervisorError> {
        let protocol = self.latest_external_uds_protocol()?;
        Ok(self.config.protocol(protocol))
    }
}
