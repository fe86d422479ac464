// crates/dcm-supervisor/src/supervisor/transitions.rs
//! State-transition actions over the protocol tables.
//!
//! Every function here runs with the table lock held. Collaborator calls are
//! only recorded on the context and issued once the lock is released.

use super::SupervisorContext;
use super::actions::{NrcTimeout, SupervisorAction};
use crate::log::{sv_debug, sv_warn};
use crate::protocol::{
    CancelIntent, ProtocolState, QueueState, RequestKind, StartedActivity, StoppedActivity,
    StoppingActivity, Type2Kind,
};
use crate::types::{
    NegativeResponseCode, ProtocolGroup, ProtocolId, RequestBuffer, RequestType, RxConnectionId,
};

/// Moves `protocol` to `next`, logging the change.
pub(crate) fn set_state(ctx: &mut SupervisorContext<'_>, protocol: ProtocolId, next: ProtocolState) {
    let previous = ctx.table.state(protocol);
    if previous != next {
        sv_debug!(ctx.log_ctx(protocol), "{:?} -> {:?}", previous, next);
        ctx.table.set_state(protocol, next);
    }
}

/// Rx connection and buffer of a presumptive request.
///
/// Panics if the queue is idle; a presumptive always carries both.
pub(crate) fn presumptive_request(
    ctx: &SupervisorContext<'_>,
    protocol: ProtocolId,
) -> (RxConnectionId, RequestBuffer, RequestType) {
    let queue = ctx.table.queue(protocol);
    match (queue.rx, queue.buffer, queue.request_type) {
        (Some(rx), Some(buffer), Some(request_type)) => (rx, buffer, request_type),
        _ => panic!(
            "Protocol {} has no presumptive request (queue {:?})",
            protocol.0, queue.state
        ),
    }
}

/// Makes room on the stack of `next`.
///
/// Does nothing if the stack has no current protocol or the current protocol
/// is already on its way out. Calling it twice equals calling it once.
pub(crate) fn terminate_current_protocol_on_same_stack(
    ctx: &mut SupervisorContext<'_>,
    next: ProtocolId,
) {
    let stack = ctx.config.stack_of(next);
    let Some(current) = ctx.table.current_protocol_on_stack(ctx.config, stack) else {
        return;
    };

    let next_state = match ctx.table.state(current) {
        ProtocolState::Started(StartedActivity::PostBoot) => panic!(
            "Protocol {} is processing a post-boot request and cannot be terminated",
            current.0
        ),
        ProtocolState::Started(StartedActivity::Active(kind)) => match kind.type2() {
            // TYPE2 work continues in the background.
            Some(type2) => ProtocolState::Stopping(StoppingActivity::Active(type2)),
            None => {
                ctx.push(SupervisorAction::ProtocolCancel(current));
                ProtocolState::started_cancelling(kind, CancelIntent::Stop)
            }
        },
        ProtocolState::Started(StartedActivity::Cancelling(kind, _)) => {
            ProtocolState::started_cancelling(kind, CancelIntent::Stop)
        }
        ProtocolState::Started(StartedActivity::Idle) => ProtocolState::STOPPING_IDLE,
        state @ ProtocolState::Stopping(_) => state,
        state @ ProtocolState::Stopped(_) => {
            unreachable!("Stopped protocol {} reported as current ({:?})", current.0, state)
        }
    };
    set_state(ctx, current, next_state);
}

/// The service layer finished (or cancelled) the work of `protocol`.
pub(crate) fn protocol_free(ctx: &mut SupervisorContext<'_>, protocol: ProtocolId) {
    let status = *ctx.table.status(protocol);

    let (next, resets_main_connection, ends_session) = match status.state {
        ProtocolState::Started(StartedActivity::PostBoot) => {
            ctx.push(SupervisorAction::DisinhibitRequestProcessing);
            (ProtocolState::STARTED_IDLE, true, true)
        }
        ProtocolState::Started(StartedActivity::Active(kind)) => (
            ProtocolState::STARTED_IDLE,
            kind.owns_main_connection(),
            kind == RequestKind::External,
        ),
        ProtocolState::Started(StartedActivity::Cancelling(kind, intent)) => {
            let next = match intent {
                CancelIntent::StayStarted => ProtocolState::STARTED_IDLE,
                CancelIntent::Stop => ProtocolState::STOPPING_IDLE,
            };
            (next, kind.owns_main_connection(), kind == RequestKind::External)
        }
        ProtocolState::Stopped(StoppedActivity::Active(_) | StoppedActivity::Cancelling(_)) => {
            (ProtocolState::STOPPED_IDLE, false, false)
        }
        ProtocolState::Stopping(StoppingActivity::Active(_) | StoppingActivity::CancellingRoe) => {
            (ProtocolState::STOPPING_IDLE, false, false)
        }
        ProtocolState::Started(StartedActivity::Idle)
        | ProtocolState::Stopped(StoppedActivity::Idle)
        | ProtocolState::Stopping(StoppingActivity::Idle) => panic!(
            "Protocol {} freed while idle ({:?})",
            protocol.0, status.state
        ),
    };

    if let Some(rx) = status.rx {
        if ends_session {
            ctx.push(SupervisorAction::EndOfCommunicationSession(rx));
        }
        if resets_main_connection {
            let main = ctx.config.main_connection_of(rx);
            ctx.push(SupervisorAction::ClearMainConnection(main));
        }
    }
    set_state(ctx, protocol, next);

    let status = ctx.table.status_mut(protocol);
    status.rx = None;
    status.request_type = None;
}

/// Drops the presumptive request of `protocol`.
///
/// Unless the request was dispatched, its buffer goes back to the pool.
pub(crate) fn clear_presumptive(ctx: &mut SupervisorContext<'_>, protocol: ProtocolId, dispatched: bool) {
    let queue = ctx.table.queue(protocol).clone();
    if !dispatched {
        if let Some(buffer) = queue.buffer {
            ctx.push(SupervisorAction::BufferFree(buffer.id));
        }
        if queue.state == QueueState::PostBootQueued {
            ctx.push(SupervisorAction::DisinhibitRequestProcessing);
        }
    }
    ctx.table.queue_mut(protocol).reset();
    ctx.table.refresh_presumptive_pending();
}

/// Withdraws a presumptive request, answering the tester where one waits.
pub(crate) fn cancel_presumptive(ctx: &mut SupervisorContext<'_>, protocol: ProtocolId) {
    let queue = ctx.table.queue(protocol).clone();
    let (rx, buffer, _) = presumptive_request(ctx, protocol);
    let main = ctx.config.main_connection_of(rx);
    sv_debug!(ctx.log_ctx(protocol), "Cancelling presumptive request ({:?})", queue.state);

    match queue.state {
        QueueState::PostBootQueued | QueueState::ExternalQueued => {
            if queue.rcrrps_confirmed != 0 || ctx.config.respond_with_busy_repeat_request() {
                ctx.push(SupervisorAction::InitiateNrc {
                    rx,
                    buffer,
                    nrc: NegativeResponseCode::BusyRepeatRequest,
                    timeout: NrcTimeout::P2Remaining(protocol),
                });
            } else {
                ctx.push(SupervisorAction::EndOfCommunicationSession(rx));
                ctx.push(SupervisorAction::ProcessingEnd(rx));
                ctx.push(SupervisorAction::ClearMainConnection(main));
            }
            clear_presumptive(ctx, protocol, false);
            if queue.holds_normal_request() {
                ctx.push(SupervisorAction::StopP2Timer(protocol));
                ctx.push(SupervisorAction::FreeP2Timer(protocol));
            }
        }
        QueueState::ExternalQueuedRcrrpQueued | QueueState::ExternalQueuedRcrrpTransmitting => {
            ctx.push(SupervisorAction::InitiateNrc {
                rx,
                buffer,
                nrc: NegativeResponseCode::BusyRepeatRequest,
                timeout: NrcTimeout::MainConnection(protocol),
            });
            clear_presumptive(ctx, protocol, false);
        }
        QueueState::Type1RoeQueued | QueueState::Type1PeriodicQueued => {
            clear_presumptive(ctx, protocol, false);
            ctx.push(SupervisorAction::ClearMainConnection(main));
        }
        QueueState::Type2RoeQueued | QueueState::Type2PeriodicQueued => {
            clear_presumptive(ctx, protocol, false);
        }
        QueueState::Idle => unreachable!("checked by presumptive_request"),
    }
}

/// Cancels every TYPE1 presumptive request on the stack of `protocol`.
pub(crate) fn cancel_type1_presumptives_on_same_stack(
    ctx: &mut SupervisorContext<'_>,
    protocol: ProtocolId,
) {
    let stack = ctx.config.stack_of(protocol);
    let presumptives: Vec<ProtocolId> = ctx
        .table
        .protocols_on_stack(ctx.config, stack)
        .filter(|&p| ctx.table.queue_state(p).is_type1())
        .collect();
    for p in presumptives {
        cancel_presumptive(ctx, p);
    }
}

/// Stores an accepted request as the presumptive request of `protocol`.
pub(crate) fn enqueue_as_presumptive(
    ctx: &mut SupervisorContext<'_>,
    protocol: ProtocolId,
    rx: RxConnectionId,
    request_type: RequestType,
    buffer: RequestBuffer,
    preemption_needed: bool,
) {
    let timeout = ctx.config.protocol(protocol).preemption_timeout;
    let waits_for_roe_cancellation = ctx.table.state(protocol)
        == ProtocolState::started_cancelling(RequestKind::Type2Roe, CancelIntent::StayStarted);
    let main = ctx.config.main_connection_of(rx);

    let queue = ctx.table.queue_mut(protocol);
    queue.preemption_timeout = if preemption_needed { timeout } else { 0 };
    queue.processing_cancelling_timeout = if !preemption_needed && waits_for_roe_cancellation {
        timeout
    } else {
        0
    };
    queue.rx = Some(rx);
    queue.state = QueueState::for_request(request_type);
    queue.request_type = Some(request_type);
    queue.buffer = Some(buffer);
    queue.rcrrps_sent = 0;
    queue.rcrrps_confirmed = 0;
    let state = queue.state;

    if request_type.is_type1() {
        ctx.push(SupervisorAction::MainConnectionBusyWithRequest(main, rx));
    }
    ctx.table.mark_presumptive_pending();
    sv_debug!(
        ctx.log_ctx(protocol),
        "Enqueued {:?} as presumptive ({:?}, preemption: {})",
        request_type,
        state,
        preemption_needed
    );
}

/// Cancels all queued and running ROE work on every protocol.
pub(crate) fn cancel_roe_processing_on_all_protocols(ctx: &mut SupervisorContext<'_>) {
    for p in ctx.table.protocols() {
        if ctx.table.queue_state(p).is_roe() {
            cancel_presumptive(ctx, p);
        }
    }

    for p in ctx.table.protocols() {
        let next = match ctx.table.state(p) {
            ProtocolState::Stopped(StoppedActivity::Active(Type2Kind::Roe)) => {
                ProtocolState::Stopped(StoppedActivity::Cancelling(Type2Kind::Roe))
            }
            ProtocolState::Started(StartedActivity::Active(
                kind @ (RequestKind::Type1Roe | RequestKind::Type2Roe),
            )) => ProtocolState::started_cancelling(kind, CancelIntent::StayStarted),
            ProtocolState::Stopping(StoppingActivity::Active(Type2Kind::Roe)) => {
                ProtocolState::Stopping(StoppingActivity::CancellingRoe)
            }
            _ => continue,
        };
        ctx.push(SupervisorAction::ProtocolCancel(p));
        set_state(ctx, p, next);
    }
}

/// Cancels every presumptive request of a UDS protocol.
pub(crate) fn cancel_presumptive_uds_protocols_in_non_default_session(
    ctx: &mut SupervisorContext<'_>,
) {
    for p in ctx.table.protocols() {
        if ctx.config.group_of(p) == ProtocolGroup::Uds && ctx.table.queue(p).is_presumptive() {
            cancel_presumptive(ctx, p);
        }
    }
}

/// Cancels queued and running work of every UDS protocol.
pub(crate) fn cancel_uds_protocols_in_non_default_session(ctx: &mut SupervisorContext<'_>) {
    cancel_presumptive_uds_protocols_in_non_default_session(ctx);

    for p in ctx.table.protocols() {
        if ctx.config.group_of(p) != ProtocolGroup::Uds {
            continue;
        }
        let next = match ctx.table.state(p) {
            ProtocolState::Started(StartedActivity::Active(kind)) => {
                ProtocolState::started_cancelling(kind, CancelIntent::StayStarted)
            }
            ProtocolState::Stopped(StoppedActivity::Active(kind)) => {
                ProtocolState::Stopped(StoppedActivity::Cancelling(kind))
            }
            _ => continue,
        };
        ctx.push(SupervisorAction::ProtocolCancel(p));
        set_state(ctx, p, next);
    }
}

/// Ends a presumptive request that will never be dispatched.
pub(crate) fn presumptive_protocol_end(ctx: &mut SupervisorContext<'_>, protocol: ProtocolId) {
    if ctx.table.queue(protocol).holds_normal_request() {
        ctx.push(SupervisorAction::StopP2Timer(protocol));
        ctx.push(SupervisorAction::FreeP2Timer(protocol));
    }
    clear_presumptive(ctx, protocol, false);
}

/// Rejects a presumptive request whose protocol could not be started, or
/// whose stack could not be freed, with ConditionsNotCorrect.
pub(crate) fn refuse_presumptive(ctx: &mut SupervisorContext<'_>, protocol: ProtocolId) {
    let (rx, buffer, request_type) = presumptive_request(ctx, protocol);
    if request_type == RequestType::PeriodicType1 {
        let main = ctx.config.main_connection_of(rx);
        ctx.push(SupervisorAction::ClearMainConnection(main));
    } else {
        sv_warn!(
            ctx.log_ctx(protocol),
            "Rejecting presumptive {:?} request with ConditionsNotCorrect",
            request_type
        );
        ctx.push(SupervisorAction::InitiateNrc {
            rx,
            buffer,
            nrc: NegativeResponseCode::ConditionsNotCorrect,
            timeout: NrcTimeout::P2Remaining(protocol),
        });
    }
    presumptive_protocol_end(ctx, protocol);
}

/// The preemption (or ROE cancellation) countdown of `protocol` expired.
pub(crate) fn preemption_pending(ctx: &mut SupervisorContext<'_>, protocol: ProtocolId) {
    let (rx, buffer, request_type) = presumptive_request(ctx, protocol);
    let queue = ctx.table.queue(protocol).clone();
    let main = ctx.config.main_connection_of(rx);
    // Periodic and ROE requests have no tester waiting for an answer.
    let internal = request_type == RequestType::PeriodicType1 || request_type.is_type1_roe();

    if (queue.rcrrps_sent != 0 || ctx.config.respond_with_busy_repeat_request()) && !internal {
        sv_warn!(ctx.log_ctx(protocol), "Preemption timed out, answering BusyRepeatRequest");
        ctx.push(SupervisorAction::InitiateNrc {
            rx,
            buffer,
            nrc: NegativeResponseCode::BusyRepeatRequest,
            timeout: NrcTimeout::P2Remaining(protocol),
        });
        ctx.push(SupervisorAction::StopP2Timer(protocol));
        // The P2 timer stays allocated until the last RCRRP is confirmed.
        if queue.rcrrps_sent == queue.rcrrps_confirmed {
            ctx.push(SupervisorAction::FreeP2Timer(protocol));
            clear_presumptive(ctx, protocol, false);
        }
    } else {
        sv_warn!(ctx.log_ctx(protocol), "Preemption timed out, dropping {:?}", request_type);
        if request_type.is_normal() || request_type.is_jump_from_bootloader() {
            if request_type.is_normal() {
                ctx.push(SupervisorAction::StopP2Timer(protocol));
                ctx.push(SupervisorAction::FreeP2Timer(protocol));
            }
            ctx.push(SupervisorAction::EndOfCommunicationSession(rx));
            ctx.push(SupervisorAction::ProcessingEnd(rx));
        }
        ctx.push(SupervisorAction::ClearMainConnection(main));
        clear_presumptive(ctx, protocol, false);
    }
}

/// Counts down the preemption or ROE cancellation timeout of a presumptive
/// request that could not be dispatched this tick.
pub(crate) fn count_down_preemption(ctx: &mut SupervisorContext<'_>, protocol: ProtocolId) {
    let queue = ctx.table.queue_mut(protocol);
    let expired = if queue.preemption_timeout > 0 {
        queue.preemption_timeout -= 1;
        queue.preemption_timeout == 0
    } else if queue.processing_cancelling_timeout > 0 {
        queue.processing_cancelling_timeout -= 1;
        queue.processing_cancelling_timeout == 0
    } else {
        false
    };
    if expired {
        preemption_pending(ctx, protocol);
    }
}
