// crates/dcm-supervisor/src/supervisor/p2.rs
//! P2 expiry of presumptive requests and the response-pending bookkeeping
//! that follows it.

use super::actions::{NrcTimeout, SupervisorAction};
use super::transitions::{self, presumptive_request};
use super::{Supervisor, SupervisorContext};
use crate::hal::{SessionHandler, SupervisorServices};
use crate::log::{sv_debug, sv_warn};
use crate::protocol::QueueState;
use crate::types::{
    NegativeResponseCode, OBD_SERVICES_WITHOUT_RCRRP, ProtocolId, RcrrpLimit, SID_OBD_CLEAR_DTC,
    SID_OBD_REQUEST_VEHICLE_INFORMATION,
};

fn p2_timeout(ctx: &mut SupervisorContext<'_>, protocol: ProtocolId, limit: RcrrpLimit) {
    let queue = ctx.table.queue(protocol).clone();
    if !queue.holds_normal_request() {
        panic!(
            "P2 timeout on protocol {} without a presumptive external request ({:?})",
            protocol.0, queue.state
        );
    }
    let (rx, buffer, _) = presumptive_request(ctx, protocol);

    if OBD_SERVICES_WITHOUT_RCRRP.contains(&buffer.service_id) {
        sv_warn!(
            ctx.log_ctx(protocol),
            "P2 expired for OBD service {:#04x}, discarding request",
            buffer.service_id
        );
        let main = ctx.config.main_connection_of(rx);
        ctx.push(SupervisorAction::EndMainConnection(main));
        transitions::clear_presumptive(ctx, protocol, false);
        ctx.push(SupervisorAction::FreeP2Timer(protocol));
        return;
    }

    if limit.is_exhausted_by(queue.rcrrps_sent) {
        let nrc = match buffer.service_id {
            SID_OBD_CLEAR_DTC | SID_OBD_REQUEST_VEHICLE_INFORMATION => {
                NegativeResponseCode::ConditionsNotCorrect
            }
            _ => NegativeResponseCode::GeneralReject,
        };
        sv_warn!(
            ctx.log_ctx(protocol),
            "Response pending limit reached after {} RCRRPs, answering {:?}",
            queue.rcrrps_sent,
            nrc
        );
        // The timer already expired, only its slot is released.
        ctx.push(SupervisorAction::FreeP2Timer(protocol));
        ctx.push(SupervisorAction::InitiateNrc {
            rx,
            buffer,
            nrc,
            timeout: NrcTimeout::Immediate,
        });
        transitions::clear_presumptive(ctx, protocol, false);
        return;
    }

    sv_debug!(
        ctx.log_ctx(protocol),
        "P2 expired, queueing RCRRP {}",
        queue.rcrrps_sent.saturating_add(1)
    );
    ctx.push(SupervisorAction::InitiateNrc {
        rx,
        buffer,
        nrc: NegativeResponseCode::ResponsePending,
        timeout: NrcTimeout::Immediate,
    });
    ctx.table.queue_mut(protocol).state = QueueState::ExternalQueuedRcrrpQueued;
    ctx.table.mark_presumptive_pending();
}

impl Supervisor {
    /// The P2 timer of a presumptive external request expired.
    ///
    /// Sends another response-pending NRC, or gives up on the request once
    /// the session's RCRRP limit is used up. Panics if the protocol holds no
    /// presumptive external request.
    pub fn p2_timer_timeout<S>(&self, services: &mut S, protocol: ProtocolId)
    where
        S: SupervisorServices + ?Sized,
    {
        let limit = services.max_rcrrp(protocol);
        self.run(services, |ctx| p2_timeout(ctx, protocol, limit));
    }

    /// The main connection handed the queued RCRRP of `protocol` to the
    /// lower layer.
    pub fn rcrrp_sent(&self, protocol: ProtocolId) {
        let mut table = self.table.lock();
        let queue = table.queue_mut(protocol);
        if queue.state != QueueState::ExternalQueuedRcrrpQueued {
            panic!(
                "RCRRP sent for protocol {} without a queued RCRRP ({:?})",
                protocol.0, queue.state
            );
        }
        queue.rcrrps_sent = queue.rcrrps_sent.saturating_add(1);
        queue.state = QueueState::ExternalQueuedRcrrpTransmitting;
    }

    /// Transmission of an RCRRP of `protocol` completed.
    ///
    /// Ignored unless an RCRRP is in transmission, which is the case once the
    /// request was cancelled or dispatched in the meantime.
    pub fn rcrrp_transmission_finished<S>(&self, services: &S, protocol: ProtocolId)
    where
        S: SessionHandler + ?Sized,
    {
        let limit = services.max_rcrrp(protocol);
        let mut table = self.table.lock();
        let queue = table.queue_mut(protocol);
        if queue.state != QueueState::ExternalQueuedRcrrpTransmitting {
            return;
        }
        // An unbounded sender counts confirmations by stepping back from
        // saturation so that `confirmed <= sent` holds.
        if limit == RcrrpLimit::Unbounded && queue.rcrrps_sent == u16::MAX {
            queue.rcrrps_sent -= 1;
        } else {
            queue.rcrrps_confirmed = queue.rcrrps_confirmed.saturating_add(1);
        }
        queue.state = QueueState::ExternalQueued;
        table.mark_presumptive_pending();
    }
}
