// crates/dcm-supervisor/src/supervisor/actions.rs
//! Collaborator calls recorded inside the table lock and issued after it has
//! been released.

use crate::hal::{ProtocolStartRequest, SupervisorServices};
use crate::types::{
    BufferId, BufferState, MainConnectionId, NegativeResponseCode, ProtocolId, RequestBuffer,
    RxConnectionId, TimerValue,
};

/// Time budget of an NRC, resolved when the NRC is initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NrcTimeout {
    Immediate,
    /// Whatever is left of the protocol's P2 timer.
    P2Remaining(ProtocolId),
    /// The main connection handler's own timeout for the protocol.
    MainConnection(ProtocolId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SupervisorAction {
    BufferGive {
        owner: ProtocolId,
        buffer: BufferId,
    },
    BufferFree(BufferId),
    BufferChangeState(BufferId, BufferState),
    InitiateNrc {
        rx: RxConnectionId,
        buffer: RequestBuffer,
        nrc: NegativeResponseCode,
        timeout: NrcTimeout,
    },
    ClearMainConnection(MainConnectionId),
    MainConnectionBusyWithRequest(MainConnectionId, RxConnectionId),
    MainConnectionRequestDispatched(MainConnectionId),
    EndMainConnection(MainConnectionId),
    ResetToDefaultSession,
    LockSecurityLevel,
    AllocateP2Timer(ProtocolId),
    StartP2Timer(ProtocolId, TimerValue),
    GiveP2Timer(ProtocolId),
    StopP2Timer(ProtocolId),
    FreeP2Timer(ProtocolId),
    ProtocolStart(ProtocolStartRequest),
    ProtocolCancel(ProtocolId),
    ProcessingBegin {
        rx: RxConnectionId,
        sending_busy_repeat_request: bool,
    },
    EndOfCommunicationSession(RxConnectionId),
    ProcessingEnd(RxConnectionId),
    CancelRxConnection(RxConnectionId),
    DisinhibitRequestProcessing,
    EnqueueSessionReset,
}

/// Issues the recorded calls in order.
pub(crate) fn execute<S>(services: &mut S, actions: Vec<SupervisorAction>)
where
    S: SupervisorServices + ?Sized,
{
    for action in actions {
        match action {
            SupervisorAction::BufferGive { owner, buffer } => services.give(owner, buffer),
            SupervisorAction::BufferFree(buffer) => services.free(buffer),
            SupervisorAction::BufferChangeState(buffer, state) => {
                services.change_state(buffer, state)
            }
            SupervisorAction::InitiateNrc {
                rx,
                buffer,
                nrc,
                timeout,
            } => {
                let timeout = match timeout {
                    NrcTimeout::Immediate => 0,
                    NrcTimeout::P2Remaining(protocol) => services.p2_timer_value(protocol),
                    NrcTimeout::MainConnection(protocol) => services.nrc_timeout(protocol),
                };
                services.initiate_nrc(rx, buffer, nrc, timeout);
            }
            SupervisorAction::ClearMainConnection(main) => services.clear(main),
            SupervisorAction::MainConnectionBusyWithRequest(main, rx) => {
                services.busy_with_request(main, rx)
            }
            SupervisorAction::MainConnectionRequestDispatched(main) => {
                services.request_dispatched(main)
            }
            SupervisorAction::EndMainConnection(main) => services.end(main),
            SupervisorAction::ResetToDefaultSession => services.reset_to_default_session(),
            SupervisorAction::LockSecurityLevel => services.lock_security_level(),
            SupervisorAction::AllocateP2Timer(p) => services.allocate_p2_timer(p),
            SupervisorAction::StartP2Timer(p, timeout) => services.start_p2_timer(p, timeout),
            SupervisorAction::GiveP2Timer(p) => services.give_p2_timer(p),
            SupervisorAction::StopP2Timer(p) => services.stop_p2_timer(p),
            SupervisorAction::FreeP2Timer(p) => services.free_p2_timer(p),
            SupervisorAction::ProtocolStart(request) => services.protocol_start(request),
            SupervisorAction::ProtocolCancel(p) => services.protocol_cancel(p),
            SupervisorAction::ProcessingBegin {
                rx,
                sending_busy_repeat_request,
            } => services.processing_begin(rx, sending_busy_repeat_request),
            SupervisorAction::EndOfCommunicationSession(rx) => {
                services.end_of_communication_session(rx)
            }
            SupervisorAction::ProcessingEnd(rx) => services.processing_end(rx),
            SupervisorAction::CancelRxConnection(rx) => services.cancel_rx_connection(rx),
            SupervisorAction::DisinhibitRequestProcessing => {
                services.disinhibit_request_processing()
            }
            SupervisorAction::EnqueueSessionReset => services.enqueue_session_reset(),
        }
    }
}
