// crates/dcm-supervisor/src/supervisor/mock.rs
//! Recording collaborator used by the unit tests.

use crate::hal::{
    BufferManager, CommunicationSession, MainConnectionHandler, ProtocolCallbacks,
    ProtocolStartRequest, ServiceDispatcher, SessionHandler, SupervisorHooks,
};
use crate::types::{
    BufferId, BufferState, CallbackResult, MainConnectionId, NegativeResponseCode, ProtocolId,
    ProtocolType, RcrrpLimit, RequestBuffer, RxConnectionId, SessionLevel, TimerValue,
};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    BufferGive(ProtocolId, BufferId),
    BufferFree(BufferId),
    BufferChangeState(BufferId, BufferState),
    InitiateNrc(RxConnectionId, RequestBuffer, NegativeResponseCode, TimerValue),
    ClearMainConnection(MainConnectionId),
    BusyWithRequest(MainConnectionId, RxConnectionId),
    RequestDispatched(MainConnectionId),
    EndMainConnection(MainConnectionId),
    ResetToDefaultSession,
    AllocateP2Timer(ProtocolId),
    StartP2Timer(ProtocolId, TimerValue),
    GiveP2Timer(ProtocolId),
    StopP2Timer(ProtocolId),
    FreeP2Timer(ProtocolId),
    LockSecurityLevel,
    ProtocolStart(ProtocolStartRequest),
    ProtocolCancel(ProtocolId),
    ProcessingBegin(RxConnectionId, bool),
    EndOfCommunicationSession(RxConnectionId),
    ProcessingEnd(RxConnectionId),
    CancelRxConnection(RxConnectionId),
    EcucMetaDataInfo(RxConnectionId),
    StartProtocol(usize, ProtocolType),
    StopProtocol(usize, ProtocolType),
    DisinhibitRequestProcessing,
    EnqueueSessionReset,
}

pub(crate) struct MockServices {
    pub calls: Vec<Call>,
    pub session: SessionLevel,
    pub max_rcrrp: RcrrpLimit,
    pub p2_max_time: TimerValue,
    pub p2_remaining: TimerValue,
    pub nrc_timeout: TimerValue,
    pub busy_with_nrc: HashSet<RxConnectionId>,
    pub receiving: HashSet<RxConnectionId>,
    pub non_default_session_protocol: Option<ProtocolId>,
    pub start_results: Vec<CallbackResult>,
    pub stop_results: Vec<CallbackResult>,
    pub meta_data_result: CallbackResult,
}

impl Default for MockServices {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            session: SessionLevel::DEFAULT,
            max_rcrrp: RcrrpLimit::Bounded(2),
            p2_max_time: 50,
            p2_remaining: 25,
            nrc_timeout: 5,
            busy_with_nrc: HashSet::new(),
            receiving: HashSet::new(),
            non_default_session_protocol: None,
            start_results: vec![CallbackResult::Ok],
            stop_results: vec![CallbackResult::Ok],
            meta_data_result: CallbackResult::Ok,
        }
    }
}

impl MockServices {
    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }
}

impl BufferManager for MockServices {
    fn give(&mut self, new_owner: ProtocolId, buffer: BufferId) {
        self.calls.push(Call::BufferGive(new_owner, buffer));
    }

    fn free(&mut self, buffer: BufferId) {
        self.calls.push(Call::BufferFree(buffer));
    }

    fn change_state(&mut self, buffer: BufferId, state: BufferState) {
        self.calls.push(Call::BufferChangeState(buffer, state));
    }
}

impl MainConnectionHandler for MockServices {
    fn initiate_nrc(
        &mut self,
        rx: RxConnectionId,
        buffer: RequestBuffer,
        nrc: NegativeResponseCode,
        timeout: TimerValue,
    ) {
        self.calls.push(Call::InitiateNrc(rx, buffer, nrc, timeout));
    }

    fn clear(&mut self, main_connection: MainConnectionId) {
        self.calls.push(Call::ClearMainConnection(main_connection));
    }

    fn busy_with_request(&mut self, main_connection: MainConnectionId, rx: RxConnectionId) {
        self.calls.push(Call::BusyWithRequest(main_connection, rx));
    }

    fn request_dispatched(&mut self, main_connection: MainConnectionId) {
        self.calls.push(Call::RequestDispatched(main_connection));
    }

    fn end(&mut self, main_connection: MainConnectionId) {
        self.calls.push(Call::EndMainConnection(main_connection));
    }

    fn is_busy_with_nrc(&self, rx: RxConnectionId) -> bool {
        self.busy_with_nrc.contains(&rx)
    }

    fn nrc_timeout(&self, _protocol: ProtocolId) -> TimerValue {
        self.nrc_timeout
    }
}

impl SessionHandler for MockServices {
    fn current_session(&self) -> SessionLevel {
        self.session
    }

    fn reset_to_default_session(&mut self) {
        self.calls.push(Call::ResetToDefaultSession);
    }

    fn max_rcrrp(&self, _protocol: ProtocolId) -> RcrrpLimit {
        self.max_rcrrp
    }

    fn p2_max_time(&self, _protocol: ProtocolId) -> TimerValue {
        self.p2_max_time
    }

    fn allocate_p2_timer(&mut self, protocol: ProtocolId) {
        self.calls.push(Call::AllocateP2Timer(protocol));
    }

    fn start_p2_timer(&mut self, protocol: ProtocolId, timeout: TimerValue) {
        self.calls.push(Call::StartP2Timer(protocol, timeout));
    }

    fn give_p2_timer(&mut self, protocol: ProtocolId) {
        self.calls.push(Call::GiveP2Timer(protocol));
    }

    fn stop_p2_timer(&mut self, protocol: ProtocolId) {
        self.calls.push(Call::StopP2Timer(protocol));
    }

    fn free_p2_timer(&mut self, protocol: ProtocolId) {
        self.calls.push(Call::FreeP2Timer(protocol));
    }

    fn p2_timer_value(&self, _protocol: ProtocolId) -> TimerValue {
        self.p2_remaining
    }

    fn non_default_session_protocol(&self) -> Option<ProtocolId> {
        self.non_default_session_protocol
    }

    fn lock_security_level(&mut self) {
        self.calls.push(Call::LockSecurityLevel);
    }
}

impl ServiceDispatcher for MockServices {
    fn protocol_start(&mut self, request: ProtocolStartRequest) {
        self.calls.push(Call::ProtocolStart(request));
    }

    fn protocol_cancel(&mut self, protocol: ProtocolId) {
        self.calls.push(Call::ProtocolCancel(protocol));
    }
}

impl CommunicationSession for MockServices {
    fn processing_begin(&mut self, rx: RxConnectionId, sending_busy_repeat_request: bool) {
        self.calls.push(Call::ProcessingBegin(rx, sending_busy_repeat_request));
    }

    fn end_of_communication_session(&mut self, rx: RxConnectionId) {
        self.calls.push(Call::EndOfCommunicationSession(rx));
    }

    fn processing_end(&mut self, rx: RxConnectionId) {
        self.calls.push(Call::ProcessingEnd(rx));
    }

    fn cancel_rx_connection(&mut self, rx: RxConnectionId) {
        self.calls.push(Call::CancelRxConnection(rx));
    }

    fn is_receiving(&self, rx: RxConnectionId) -> bool {
        self.receiving.contains(&rx)
    }

    fn ecuc_meta_data_info(&mut self, rx: RxConnectionId) -> CallbackResult {
        self.calls.push(Call::EcucMetaDataInfo(rx));
        self.meta_data_result
    }
}

impl ProtocolCallbacks for MockServices {
    fn callback_count(&self) -> usize {
        self.start_results.len().max(self.stop_results.len())
    }

    fn start_protocol(&mut self, index: usize, protocol_type: ProtocolType) -> CallbackResult {
        self.calls.push(Call::StartProtocol(index, protocol_type));
        self.start_results
            .get(index)
            .copied()
            .unwrap_or(CallbackResult::Ok)
    }

    fn stop_protocol(&mut self, index: usize, protocol_type: ProtocolType) -> CallbackResult {
        self.calls.push(Call::StopProtocol(index, protocol_type));
        self.stop_results
            .get(index)
            .copied()
            .unwrap_or(CallbackResult::Ok)
    }
}

impl SupervisorHooks for MockServices {
    fn disinhibit_request_processing(&mut self) {
        self.calls.push(Call::DisinhibitRequestProcessing);
    }

    fn enqueue_session_reset(&mut self) {
        self.calls.push(Call::EnqueueSessionReset);
    }
}
