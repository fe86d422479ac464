// crates/dcm-supervisor/src/supervisor/tick.rs
//! The cyclic main function.
//!
//! Each tick first lets stopping protocols finish stopping, then, per stack,
//! starts a presumptive protocol if the stack has no current protocol and
//! dispatches the presumptive TYPE1 and TYPE2 requests.

use super::actions::SupervisorAction;
use super::transitions::{self, presumptive_request, set_state};
use super::{Supervisor, SupervisorContext};
use crate::hal::{ProtocolCallbacks, ProtocolStartRequest, SupervisorServices};
use crate::log::{ProtocolLogContext, sv_error, sv_info, sv_trace, sv_warn};
use crate::protocol::{
    ProtocolState, QueueState, RequestKind, StartedActivity, StoppedActivity, StoppingActivity,
    Type2Kind,
};
use crate::types::{
    BufferState, CallbackResult, ProtocolGroup, ProtocolId, ProtocolType, RcrrpTransmission,
    RxConnectionId, SessionLevel, StackNumber,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallbackPhase {
    Start,
    Stop,
}

/// Runs every configured start or stop callback for `protocol_type`.
///
/// All callbacks run even after one failed. Returns true if all succeeded.
fn call_protocol_callbacks<S>(
    services: &mut S,
    log_ctx: &ProtocolLogContext,
    protocol_type: ProtocolType,
    phase: CallbackPhase,
) -> bool
where
    S: ProtocolCallbacks + ?Sized,
{
    let mut all_ok = true;
    for index in 0..services.callback_count() {
        let result = match phase {
            CallbackPhase::Start => services.start_protocol(index, protocol_type),
            CallbackPhase::Stop => services.stop_protocol(index, protocol_type),
        };
        match result {
            CallbackResult::Ok => {}
            CallbackResult::NotOk => all_ok = false,
            CallbackResult::ProtocolNotAllowed if phase == CallbackPhase::Start => all_ok = false,
            other => {
                sv_error!(
                    *log_ctx,
                    "{:?} callback {} returned {:?}",
                    phase,
                    index,
                    other
                );
                all_ok = false;
            }
        }
    }
    all_ok
}

/// Applies the outcome of the stop callbacks of a stopping protocol.
fn finish_stop(ctx: &mut SupervisorContext<'_>, protocol: ProtocolId, stopped: bool) {
    let ProtocolState::Stopping(activity) = ctx.table.state(protocol) else {
        return;
    };

    if stopped {
        let next = match activity {
            StoppingActivity::Idle => ProtocolState::STOPPED_IDLE,
            StoppingActivity::Active(kind) => ProtocolState::Stopped(StoppedActivity::Active(kind)),
            StoppingActivity::CancellingRoe => {
                ProtocolState::Stopped(StoppedActivity::Cancelling(Type2Kind::Roe))
            }
        };
        set_state(ctx, protocol, next);
        sv_info!(ctx.log_ctx(protocol), "Protocol stopped");
        return;
    }

    // The stack stays blocked, so the request waiting for it gets refused.
    let stack = ctx.config.stack_of(protocol);
    sv_warn!(ctx.log_ctx(protocol), "Stop callbacks failed, protocol remains stopping");
    if let Some(presumptive) = ctx.table.type1_presumptive_on_stack(ctx.config, stack) {
        transitions::refuse_presumptive(ctx, presumptive);
    }
}

/// Applies the outcome of the start callbacks of a presumptive protocol.
fn finish_start(ctx: &mut SupervisorContext<'_>, protocol: ProtocolId, started: bool) {
    if started {
        ctx.push(SupervisorAction::LockSecurityLevel);
        set_state(ctx, protocol, ProtocolState::STARTED_IDLE);
        ctx.push(SupervisorAction::ResetToDefaultSession);
        sv_info!(ctx.log_ctx(protocol), "Protocol started");
    } else {
        sv_warn!(ctx.log_ctx(protocol), "Start callbacks failed");
        if ctx.table.queue_state(protocol).is_type1() {
            transitions::refuse_presumptive(ctx, protocol);
        }
    }
}

/// Hands the presumptive TYPE1 request of `protocol` to the service layer.
fn dispatch_type1(
    ctx: &mut SupervisorContext<'_>,
    protocol: ProtocolId,
    session: SessionLevel,
    session_owner: Option<ProtocolId>,
) {
    let state = ctx.table.state(protocol);
    if state != ProtocolState::STARTED_IDLE {
        panic!(
            "Protocol {} must be started and idle to dispatch, found {:?}",
            protocol.0, state
        );
    }
    if ctx.config.group_of(protocol) == ProtocolGroup::Uds {
        ctx.table.set_latest_external_uds(protocol);
    }

    let (rx, buffer, request_type) = presumptive_request(ctx, protocol);
    let queue = ctx.table.queue(protocol).clone();
    let active = match queue.state {
        QueueState::PostBootQueued => ProtocolState::Started(StartedActivity::PostBoot),
        QueueState::ExternalQueued
        | QueueState::ExternalQueuedRcrrpQueued
        | QueueState::ExternalQueuedRcrrpTransmitting => {
            ProtocolState::started_active(RequestKind::External)
        }
        QueueState::Type1RoeQueued => ProtocolState::started_active(RequestKind::Type1Roe),
        QueueState::Type1PeriodicQueued => ProtocolState::started_active(RequestKind::Type1Periodic),
        other => unreachable!("{:?} is not a TYPE1 presumptive", other),
    };
    set_state(ctx, protocol, active);

    let main = ctx.config.main_connection_of(rx);
    let tx = ctx.config.main_connection(main).confirmation_tx;

    if queue.state.is_external() {
        ctx.push(SupervisorAction::BufferChangeState(buffer.id, BufferState::ProcessingNormal));
    } else if queue.state == QueueState::Type1RoeQueued {
        ctx.push(SupervisorAction::BufferChangeState(buffer.id, BufferState::ProcessingRoe));
    }
    ctx.push(SupervisorAction::BufferGive {
        owner: protocol,
        buffer: buffer.id,
    });

    let rcrrp = match queue.state {
        QueueState::ExternalQueued => RcrrpTransmission::NoRcrrpOnEntry,
        QueueState::ExternalQueuedRcrrpQueued => RcrrpTransmission::BeginToTransmitRcrrpOnEntry,
        QueueState::ExternalQueuedRcrrpTransmitting => RcrrpTransmission::TransmittingRcrrpOnEntry,
        _ => RcrrpTransmission::Invalid,
    };
    if rcrrp != RcrrpTransmission::Invalid {
        ctx.push(SupervisorAction::GiveP2Timer(protocol));
    }

    let status = ctx.table.status_mut(protocol);
    status.request_type = Some(request_type);
    status.rx = Some(rx);

    ctx.push(SupervisorAction::MainConnectionRequestDispatched(main));
    ctx.push(SupervisorAction::ProtocolStart(ProtocolStartRequest {
        protocol,
        rx,
        tx,
        buffer,
        request_type,
        rcrrp,
        rcrrps_sent: queue.rcrrps_sent,
        rcrrps_confirmed: queue.rcrrps_confirmed,
    }));
    sv_info!(ctx.log_ctx(protocol), "Dispatched {:?} request", request_type);

    // A session entered through another stack does not survive a request
    // arriving here.
    if request_type.is_normal() && !session.is_default() {
        if let Some(owner) = session_owner {
            if owner.index() < ctx.config.num_protocols()
                && ctx.config.stack_of(owner) != ctx.config.stack_of(protocol)
            {
                ctx.push(SupervisorAction::EnqueueSessionReset);
            }
        }
    }

    transitions::clear_presumptive(ctx, protocol, true);
}

/// Hands the presumptive TYPE2 request of `protocol` to the service layer.
fn dispatch_type2(ctx: &mut SupervisorContext<'_>, protocol: ProtocolId) {
    let (rx, buffer, request_type) = presumptive_request(ctx, protocol);
    let queue = ctx.table.queue(protocol).clone();
    let kind = match queue.state {
        QueueState::Type2RoeQueued => Type2Kind::Roe,
        QueueState::Type2PeriodicQueued => Type2Kind::Periodic,
        other => unreachable!("{:?} is not a TYPE2 presumptive", other),
    };
    let active = match ctx.table.state(protocol) {
        ProtocolState::Stopped(StoppedActivity::Idle) => {
            ProtocolState::Stopped(StoppedActivity::Active(kind))
        }
        ProtocolState::Started(StartedActivity::Idle) => {
            ProtocolState::started_active(RequestKind::from(kind))
        }
        other => unreachable!("TYPE2 dispatch on protocol {} in {:?}", protocol.0, other),
    };
    set_state(ctx, protocol, active);

    let main = ctx.config.main_connection_of(rx);
    let connection = ctx.config.main_connection(main);
    let tx = match kind {
        Type2Kind::Roe => connection.roe_tx,
        Type2Kind::Periodic => connection.periodic_tx,
    }
    .unwrap_or_else(|| {
        sv_warn!(
            ctx.log_ctx(protocol),
            "No {:?} tx connection configured, using the confirmation tx",
            kind
        );
        connection.confirmation_tx
    });

    if kind == Type2Kind::Roe {
        ctx.push(SupervisorAction::BufferChangeState(buffer.id, BufferState::ProcessingRoe));
    }
    ctx.push(SupervisorAction::BufferGive {
        owner: protocol,
        buffer: buffer.id,
    });
    ctx.push(SupervisorAction::ProtocolStart(ProtocolStartRequest {
        protocol,
        rx,
        tx,
        buffer,
        request_type,
        rcrrp: RcrrpTransmission::Invalid,
        rcrrps_sent: queue.rcrrps_sent,
        rcrrps_confirmed: queue.rcrrps_confirmed,
    }));
    sv_info!(ctx.log_ctx(protocol), "Dispatched {:?} request", request_type);

    let status = ctx.table.status_mut(protocol);
    status.request_type = Some(request_type);
    status.rx = Some(rx);

    transitions::clear_presumptive(ctx, protocol, true);
}

impl Supervisor {
    /// Cyclic driver. Must be called periodically from a single task.
    pub fn main_function<S>(&self, services: &mut S)
    where
        S: SupervisorServices + ?Sized,
    {
        self.attempt_to_stop_stopping_protocols(services);

        if !self.table.lock().presumptive_pending() {
            return;
        }
        for stack in 0..self.config.num_stacks() {
            let stack = StackNumber(stack as u8);
            self.attempt_to_start_presumptive_type1_protocol(services, stack);
            self.attempt_to_dispatch_presumptive_type1_protocol(services, stack);
            self.attempt_to_dispatch_presumptive_type2_protocol(services, stack);
        }
    }

    fn attempt_to_stop_stopping_protocols<S>(&self, services: &mut S)
    where
        S: SupervisorServices + ?Sized,
    {
        let stopping: Vec<ProtocolId> = {
            let table = self.table.lock();
            table
                .protocols()
                .filter(|&p| matches!(table.state(p), ProtocolState::Stopping(_)))
                .collect()
        };

        for protocol in stopping {
            let log_ctx = ProtocolLogContext::new(protocol, self.config.stack_of(protocol));
            let protocol_type = self.config.protocol(protocol).protocol_type;
            let stopped =
                call_protocol_callbacks(services, &log_ctx, protocol_type, CallbackPhase::Stop);
            self.run(services, |ctx| finish_stop(ctx, protocol, stopped));
        }
    }

    fn attempt_to_start_presumptive_type1_protocol<S>(&self, services: &mut S, stack: StackNumber)
    where
        S: SupervisorServices + ?Sized,
    {
        let candidate = {
            let table = self.table.lock();
            if table.current_protocol_on_stack(&self.config, stack).is_some() {
                None
            } else {
                table
                    .type1_presumptive_on_stack(&self.config, stack)
                    .filter(|_| table.stack_can_accept_type1(&self.config, stack))
                    .inspect(|&p| {
                        let state = table.state(p);
                        if state != ProtocolState::STOPPED_IDLE {
                            panic!(
                                "Presumptive protocol {} must be stopped and idle to start, found {:?}",
                                p.0, state
                            );
                        }
                    })
            }
        };
        let Some(protocol) = candidate else {
            return;
        };

        let log_ctx = ProtocolLogContext::new(protocol, stack);
        let protocol_type = self.config.protocol(protocol).protocol_type;
        let started =
            call_protocol_callbacks(services, &log_ctx, protocol_type, CallbackPhase::Start);
        self.run(services, |ctx| finish_start(ctx, protocol, started));
    }

    fn attempt_to_dispatch_presumptive_type1_protocol<S>(&self, services: &mut S, stack: StackNumber)
    where
        S: SupervisorServices + ?Sized,
    {
        let candidate = {
            let table = self.table.lock();
            table
                .type1_presumptive_on_stack(&self.config, stack)
                .and_then(|p| table.queue(p).rx.map(|rx| (p, rx)))
                .map(|(p, rx)| (p, rx, table.stack_can_accept_type1(&self.config, stack)))
        };
        let Some((protocol, rx, stack_free)) = candidate else {
            return;
        };

        let busy_with_nrc = services.is_busy_with_nrc(rx);
        if stack_free && !busy_with_nrc {
            self.fetch_meta_data(services, protocol, rx);
        }
        let session = services.current_session();
        let session_owner = services.non_default_session_protocol();

        self.run(services, |ctx| {
            // Skip the tick if the presumptive changed while unlocked.
            if ctx.table.type1_presumptive_on_stack(ctx.config, stack) != Some(protocol)
                || ctx.table.queue(protocol).rx != Some(rx)
            {
                return;
            }
            if ctx.table.stack_can_accept_type1(ctx.config, stack) && !busy_with_nrc {
                dispatch_type1(ctx, protocol, session, session_owner);
            } else {
                sv_trace!(
                    ctx.log_ctx(protocol),
                    "Stack busy, {} preemption ticks left",
                    ctx.table.queue(protocol).preemption_timeout
                );
                transitions::count_down_preemption(ctx, protocol);
            }
        });
    }

    fn attempt_to_dispatch_presumptive_type2_protocol<S>(&self, services: &mut S, stack: StackNumber)
    where
        S: SupervisorServices + ?Sized,
    {
        let candidate = {
            let table = self.table.lock();
            table
                .type2_presumptive_on_stack(&self.config, stack)
                .filter(|&p| table.state(p).can_accept_type2())
                .and_then(|p| table.queue(p).rx.map(|rx| (p, rx)))
        };
        if let Some((protocol, rx)) = candidate {
            self.fetch_meta_data(services, protocol, rx);
        }

        self.run(services, |ctx| {
            let Some(protocol) = ctx.table.type2_presumptive_on_stack(ctx.config, stack) else {
                return;
            };
            if ctx.table.state(protocol).can_accept_type2() {
                dispatch_type2(ctx, protocol);
            } else {
                // The TYPE2 scheduler keeps the buffer.
                sv_warn!(ctx.log_ctx(protocol), "Dropping TYPE2 presumptive, protocol busy");
                transitions::clear_presumptive(ctx, protocol, true);
            }
        });
    }

    /// Fetches the generic connection metadata of `rx` if its main connection
    /// has any configured. A failed lookup is reported and the dispatch goes on.
    fn fetch_meta_data<S>(&self, services: &mut S, protocol: ProtocolId, rx: RxConnectionId)
    where
        S: SupervisorServices + ?Sized,
    {
        let main = self.config.main_connection_of(rx);
        if !self.config.main_connection(main).meta_data_configured {
            return;
        }
        match services.ecuc_meta_data_info(rx) {
            CallbackResult::Ok => {}
            other => sv_error!(
                ProtocolLogContext::new(protocol, self.config.stack_of(protocol)),
                "Fetching metadata of rx connection {} failed: {:?}",
                rx.0,
                other
            ),
        }
    }
}
