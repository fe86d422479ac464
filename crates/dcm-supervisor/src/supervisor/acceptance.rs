// crates/dcm-supervisor/src/supervisor/acceptance.rs
//! Acceptance of TYPE1 and TYPE2 requests.
//!
//! A TYPE1 request that wins arbitration clears its way first: other TYPE1
//! presumptives on the stack are withdrawn, the current protocol is told to
//! go, lower-priority receptions and ROE work are cancelled. Only then is it
//! stored as the presumptive request of its protocol.

use super::actions::SupervisorAction;
use super::{Supervisor, SupervisorContext, arbitration, transitions};
use crate::error::SupervisorError;
use crate::hal::SupervisorServices;
use crate::log::sv_debug;
use crate::types::{
    ArbitrationResult, InvalidValueError, ProtocolGroup, ProtocolId, RequestBuffer, RequestType,
    RxConnectionId, SessionLevel, TimerValue,
};

/// Inputs of the TYPE1 acceptance sequence sampled before the lock is taken.
struct Type1Request {
    protocol: ProtocolId,
    rx: RxConnectionId,
    request_type: RequestType,
    buffer: RequestBuffer,
    session: SessionLevel,
    receptions_to_cancel: Vec<RxConnectionId>,
    p2_max_time: TimerValue,
}

fn accept_type1(ctx: &mut SupervisorContext<'_>, request: Type1Request) -> ArbitrationResult {
    let Type1Request {
        protocol,
        rx,
        request_type,
        buffer,
        session,
        receptions_to_cancel,
        p2_max_time,
    } = request;
    let Some(origin) = request_type.origin() else {
        unreachable!("TYPE1 acceptance of {:?}", request_type);
    };

    let verdict = arbitration::type1_request_priority_assessment(ctx, protocol, origin, session);
    if verdict != ArbitrationResult::Accept {
        sv_debug!(ctx.log_ctx(protocol), "{:?} request rejected: {:?}", request_type, verdict);
        return verdict;
    }

    transitions::cancel_type1_presumptives_on_same_stack(ctx, protocol);

    let preemption = arbitration::preemption_necessary(ctx, protocol);
    if preemption {
        transitions::terminate_current_protocol_on_same_stack(ctx, protocol);
    }

    // ROE requests never interrupt a tester.
    if !request_type.is_type1_roe() {
        for other in receptions_to_cancel {
            ctx.push(SupervisorAction::CancelRxConnection(other));
        }
    }
    if !request_type.is_type1_roe() && request_type != RequestType::PeriodicType1 {
        transitions::cancel_roe_processing_on_all_protocols(ctx);
    }

    if ctx.config.group_of(protocol) == ProtocolGroup::Obd && !session.is_default() {
        transitions::cancel_uds_protocols_in_non_default_session(ctx);
        // A preemption resets the session when the new protocol starts.
        if !preemption {
            ctx.push(SupervisorAction::EnqueueSessionReset);
        }
    }

    if request_type.is_normal() || request_type.is_jump_from_bootloader() {
        ctx.push(SupervisorAction::ProcessingBegin {
            rx,
            sending_busy_repeat_request: false,
        });
    }

    transitions::enqueue_as_presumptive(ctx, protocol, rx, request_type, buffer, preemption);

    if request_type.is_normal() {
        let adjust = ctx.config.protocol(protocol).p2_server_adjust;
        ctx.push(SupervisorAction::AllocateP2Timer(protocol));
        ctx.push(SupervisorAction::StartP2Timer(
            protocol,
            p2_max_time.saturating_sub(adjust),
        ));
    }
    ArbitrationResult::Accept
}

impl Supervisor {
    /// Rx connections on the stack of `rx` that belong to protocols with the
    /// same or a lower priority and are still receiving.
    fn lower_priority_receptions<S>(
        &self,
        services: &S,
        rx: RxConnectionId,
        protocol: ProtocolId,
    ) -> Vec<RxConnectionId>
    where
        S: SupervisorServices + ?Sized,
    {
        let stack = self.config.stack_of(protocol);
        let priority = self.config.priority_of(protocol);
        self.config
            .rx_connections()
            .filter(|&(other, binding)| {
                other != rx
                    && self.config.stack_of(binding.protocol) == stack
                    && self.config.priority_of(binding.protocol) >= priority
                    && services.is_receiving(other)
            })
            .map(|(other, _)| other)
            .collect()
    }

    /// Cancels receptions on the stack of `rx` whose protocols do not have a
    /// higher priority than the protocol of `rx`. `rx` itself is kept.
    pub fn cancel_ongoing_receptions_on_lower_priority_protocols_of_same_stack<S>(
        &self,
        services: &mut S,
        rx: RxConnectionId,
    ) -> Result<(), SupervisorError>
    where
        S: SupervisorServices + ?Sized,
    {
        let protocol = self.config.rx_connection(rx)?.protocol;
        for other in self.lower_priority_receptions(services, rx, protocol) {
            services.cancel_rx_connection(other);
        }
        Ok(())
    }

    /// Arbitrates a TYPE1 request received on `rx` and, if it is accepted,
    /// makes it the presumptive request of the rx connection's protocol.
    ///
    /// On acceptance the supervisor owns `buffer`. On rejection nothing is
    /// changed and the caller keeps the buffer to answer the request.
    pub fn enqueue_type1_request<S>(
        &self,
        services: &mut S,
        rx: RxConnectionId,
        request_type: RequestType,
        buffer: RequestBuffer,
    ) -> Result<ArbitrationResult, SupervisorError>
    where
        S: SupervisorServices + ?Sized,
    {
        if request_type.is_type2() {
            return Err(InvalidValueError::RequestType(request_type as u8).into());
        }
        let protocol = self.config.rx_connection(rx)?.protocol;

        let request = Type1Request {
            protocol,
            rx,
            request_type,
            buffer,
            session: services.current_session(),
            receptions_to_cancel: self.lower_priority_receptions(services, rx, protocol),
            p2_max_time: services.p2_max_time(protocol),
        };
        Ok(self.run(services, |ctx| accept_type1(ctx, request)))
    }

    /// Arbitrates a TYPE2 ROE or periodic request and, if it is accepted,
    /// makes it the presumptive request of the rx connection's protocol.
    ///
    /// A rejected request's buffer is released.
    pub fn enqueue_type2_request<S>(
        &self,
        services: &mut S,
        rx: RxConnectionId,
        request_type: RequestType,
        buffer: RequestBuffer,
    ) -> Result<ArbitrationResult, SupervisorError>
    where
        S: SupervisorServices + ?Sized,
    {
        if !request_type.is_type2() {
            return Err(InvalidValueError::RequestType(request_type as u8).into());
        }
        let protocol = self.config.rx_connection(rx)?.protocol;

        Ok(self.run(services, |ctx| {
            let verdict = arbitration::type2_request_priority_assessment(ctx, protocol);
            if verdict == ArbitrationResult::Accept {
                transitions::enqueue_as_presumptive(ctx, protocol, rx, request_type, buffer, false);
            } else {
                sv_debug!(ctx.log_ctx(protocol), "{:?} request rejected: {:?}", request_type, verdict);
                ctx.push(SupervisorAction::BufferFree(buffer.id));
            }
            verdict
        }))
    }
}
