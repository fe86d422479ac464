// crates/dcm-supervisor/src/supervisor/arbitration.rs
//! Priority assessment of incoming requests.
//!
//! Only one UDS and one OBD conversation may run across all stacks, and only
//! one current protocol may occupy a stack. A lower priority value means a
//! higher priority.

use super::SupervisorContext;
use crate::log::sv_trace;
use crate::protocol::{ProtocolState, QueueState, RequestKind, StartedActivity, StoppingActivity};
use crate::types::{
    ArbitrationResult, ProtocolGroup, ProtocolId, RequestOrigin, SessionLevel,
    SessionSwitchPermission,
};

/// Whether any protocol of `group` (or of any other group, if `same_group`
/// is false) on a stack other than the one of `protocol` is processing or
/// holds a TYPE1 request. TYPE2 work is ignored.
fn type1_activity_on_different_stack(
    ctx: &SupervisorContext<'_>,
    protocol: ProtocolId,
    same_group: bool,
) -> bool {
    let stack = ctx.config.stack_of(protocol);
    let group = ctx.config.group_of(protocol);
    ctx.table.protocols().any(|other| {
        ctx.config.stack_of(other) != stack
            && (ctx.config.group_of(other) == group) == same_group
            && (ctx.table.state(other).is_processing_type1()
                || ctx.table.queue_state(other).is_type1())
    })
}

pub(crate) fn same_type_protocol_busy_on_different_stack(
    ctx: &SupervisorContext<'_>,
    protocol: ProtocolId,
) -> bool {
    type1_activity_on_different_stack(ctx, protocol, true)
}

pub(crate) fn different_type_protocol_busy_on_different_stack(
    ctx: &SupervisorContext<'_>,
    protocol: ProtocolId,
) -> bool {
    type1_activity_on_different_stack(ctx, protocol, false)
}

/// Assesses a TYPE1 request for `protocol` coming from `origin`.
pub(crate) fn type1_request_priority_assessment(
    ctx: &SupervisorContext<'_>,
    protocol: ProtocolId,
    origin: RequestOrigin,
    session: SessionLevel,
) -> ArbitrationResult {
    let queue = ctx.table.queue(protocol);
    let state = ctx.table.state(protocol);

    // External and post-boot requests may displace pure ROE activity.
    let (presumptive, busy) = if origin.overrides_roe() {
        (queue.is_presumptive_with_non_roe(), state.is_busy_with_non_roe())
    } else {
        (queue.is_presumptive(), state.is_busy())
    };

    if presumptive
        || busy
        || (origin == RequestOrigin::InternalRoe
            && different_type_protocol_busy_on_different_stack(ctx, protocol))
    {
        return ArbitrationResult::RejectPriority;
    }

    if same_type_protocol_busy_on_different_stack(ctx, protocol) {
        return ArbitrationResult::RejectSameProtocolType;
    }

    let stack = ctx.config.stack_of(protocol);
    let priority = ctx.config.priority_of(protocol);

    if let Some(presumptive) = ctx.table.type1_presumptive_on_stack(ctx.config, stack) {
        let presumptive_state = ctx.table.queue_state(presumptive);
        let verdict = if ctx.config.priority_of(presumptive) > priority {
            match origin {
                RequestOrigin::InternalRoe if presumptive_state.is_external_or_post_boot() => {
                    ArbitrationResult::RejectPriority
                }
                _ => ArbitrationResult::Accept,
            }
        } else if presumptive_state == QueueState::Type1RoeQueued && origin.overrides_roe() {
            ArbitrationResult::Accept
        } else {
            ArbitrationResult::RejectPriority
        };
        sv_trace!(
            ctx.log_ctx(protocol),
            "Request against presumptive {} ({:?}): {:?}",
            presumptive.0,
            presumptive_state,
            verdict
        );
        return verdict;
    }

    let Some(current) = ctx.table.current_protocol_on_stack(ctx.config, stack) else {
        return ArbitrationResult::Accept;
    };
    let current_priority = ctx.config.priority_of(current);
    // The running protocol does not have a lower priority than the requester.
    let not_outranked = current_priority <= priority;

    let reject = match ctx.table.state(current) {
        ProtocolState::Started(
            StartedActivity::PostBoot
            | StartedActivity::Active(RequestKind::External)
            | StartedActivity::Cancelling(RequestKind::External, _),
        ) => not_outranked || origin == RequestOrigin::InternalRoe,
        ProtocolState::Started(
            StartedActivity::Active(RequestKind::Type1Periodic)
            | StartedActivity::Cancelling(RequestKind::Type1Periodic, _),
        ) => not_outranked,
        ProtocolState::Started(
            StartedActivity::Active(RequestKind::Type1Roe)
            | StartedActivity::Cancelling(RequestKind::Type1Roe, _),
        ) => {
            if origin.overrides_roe() {
                !(session.is_default() || current_priority > priority)
            } else {
                not_outranked
            }
        }
        ProtocolState::Started(
            StartedActivity::Idle
            | StartedActivity::Active(RequestKind::Type2Roe | RequestKind::Type2Periodic)
            | StartedActivity::Cancelling(RequestKind::Type2Roe | RequestKind::Type2Periodic, _),
        )
        | ProtocolState::Stopping(StoppingActivity::Idle | StoppingActivity::Active(_)) => {
            not_outranked && current != protocol && !session.is_default()
        }
        state @ (ProtocolState::Stopped(_)
        | ProtocolState::Stopping(StoppingActivity::CancellingRoe)) => {
            unreachable!("Protocol {} in {:?} reported as current", current.0, state)
        }
    };

    if reject {
        ArbitrationResult::RejectPriority
    } else {
        ArbitrationResult::Accept
    }
}

/// Assesses a TYPE2 request: it only ever claims an idle protocol.
pub(crate) fn type2_request_priority_assessment(
    ctx: &SupervisorContext<'_>,
    protocol: ProtocolId,
) -> ArbitrationResult {
    if ctx.table.queue(protocol).is_presumptive() || !ctx.table.state(protocol).can_accept_type2() {
        ArbitrationResult::RejectPriority
    } else {
        ArbitrationResult::Accept
    }
}

/// Accepting a request for `protocol` requires the current protocol of its
/// stack to give up the stack first.
pub(crate) fn preemption_necessary(ctx: &SupervisorContext<'_>, protocol: ProtocolId) -> bool {
    let stack = ctx.config.stack_of(protocol);
    ctx.table.current_protocol_on_stack(ctx.config, stack) != Some(protocol)
}

/// Whether the session handler may switch to `new_session`.
///
/// An OBD protocol holding the session only allows a switch back to the
/// default session.
pub(crate) fn is_session_cleared_to_switch(
    ctx: &SupervisorContext<'_>,
    new_session: SessionLevel,
) -> SessionSwitchPermission {
    let obd_holds_session = ctx.table.protocols().any(|p| {
        (ctx.table.state(p).holds_session() || ctx.table.queue(p).is_presumptive())
            && ctx.config.group_of(p) == ProtocolGroup::Obd
    });
    if obd_holds_session && !new_session.is_default() {
        SessionSwitchPermission::BusyDiscard
    } else {
        SessionSwitchPermission::Accept
    }
}

pub(crate) fn protocol_is_busy_with_type1_roe(ctx: &SupervisorContext<'_>, protocol: ProtocolId) -> bool {
    ctx.table.state(protocol) == ProtocolState::started_active(RequestKind::Type1Roe)
}

pub(crate) fn is_type2_roe_present(ctx: &SupervisorContext<'_>, protocol: ProtocolId) -> bool {
    ctx.table.state(protocol).has_type2_roe()
}
