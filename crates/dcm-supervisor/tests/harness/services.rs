// crates/dcm-supervisor/tests/harness/services.rs
use dcm_supervisor::hal::{
    BufferManager, CommunicationSession, MainConnectionHandler, ProtocolCallbacks,
    ProtocolStartRequest, ServiceDispatcher, SessionHandler, SupervisorHooks,
};
use dcm_supervisor::types::{
    BufferId, BufferState, CallbackResult, MainConnectionId, NegativeResponseCode, ProtocolId,
    ProtocolType, RcrrpLimit, RequestBuffer, RxConnectionId, SessionLevel, TimerValue,
};
use std::collections::HashSet;

/// One call made by the supervisor into its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    BufferGive(ProtocolId, BufferId),
    BufferFree(BufferId),
    BufferChangeState(BufferId, BufferState),
    Nrc {
        rx: RxConnectionId,
        buffer: RequestBuffer,
        nrc: NegativeResponseCode,
        timeout: TimerValue,
    },
    MainConnectionClear(MainConnectionId),
    MainConnectionBusy(MainConnectionId, RxConnectionId),
    MainConnectionDispatched(MainConnectionId),
    MainConnectionEnd(MainConnectionId),
    ResetToDefaultSession,
    P2Allocate(ProtocolId),
    P2Start(ProtocolId, TimerValue),
    P2Give(ProtocolId),
    P2Stop(ProtocolId),
    P2Free(ProtocolId),
    LockSecurityLevel,
    ProtocolStart(ProtocolStartRequest),
    ProtocolCancel(ProtocolId),
    ProcessingBegin(RxConnectionId),
    EndOfCommunicationSession(RxConnectionId),
    ProcessingEnd(RxConnectionId),
    CancelRx(RxConnectionId),
    MetaDataInfo(RxConnectionId),
    StartCallback(usize, ProtocolType),
    StopCallback(usize, ProtocolType),
    DisinhibitRequestProcessing,
    EnqueueSessionReset,
}

/// Collaborators backed by plain fields, recording every call in order.
pub struct RecordingServices {
    pub events: Vec<Event>,
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

impl Default for RecordingServices {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            session: SessionLevel::DEFAULT,
            max_rcrrp: RcrrpLimit::Bounded(3),
            p2_max_time: 50,
            p2_remaining: 20,
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

impl RecordingServices {
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(e)).count()
    }

    /// NRCs initiated so far, in order.
    pub fn nrcs(&self) -> Vec<NegativeResponseCode> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Nrc { nrc, .. } => Some(*nrc),
                _ => None,
            })
            .collect()
    }
}

impl BufferManager for RecordingServices {
    fn give(&mut self, new_owner: ProtocolId, buffer: BufferId) {
        self.events.push(Event::BufferGive(new_owner, buffer));
    }

    fn free(&mut self, buffer: BufferId) {
        self.events.push(Event::BufferFree(buffer));
    }

    fn change_state(&mut self, buffer: BufferId, state: BufferState) {
        self.events.push(Event::BufferChangeState(buffer, state));
    }
}

impl MainConnectionHandler for RecordingServices {
    fn initiate_nrc(
        &mut self,
        rx: RxConnectionId,
        buffer: RequestBuffer,
        nrc: NegativeResponseCode,
        timeout: TimerValue,
    ) {
        self.events.push(Event::Nrc {
            rx,
            buffer,
            nrc,
            timeout,
        });
    }

    fn clear(&mut self, main_connection: MainConnectionId) {
        self.events.push(Event::MainConnectionClear(main_connection));
    }

    fn busy_with_request(&mut self, main_connection: MainConnectionId, rx: RxConnectionId) {
        self.events.push(Event::MainConnectionBusy(main_connection, rx));
    }

    fn request_dispatched(&mut self, main_connection: MainConnectionId) {
        self.events.push(Event::MainConnectionDispatched(main_connection));
    }

    fn end(&mut self, main_connection: MainConnectionId) {
        self.events.push(Event::MainConnectionEnd(main_connection));
    }

    fn is_busy_with_nrc(&self, rx: RxConnectionId) -> bool {
        self.busy_with_nrc.contains(&rx)
    }

    fn nrc_timeout(&self, _protocol: ProtocolId) -> TimerValue {
        self.nrc_timeout
    }
}

impl SessionHandler for RecordingServices {
    fn current_session(&self) -> SessionLevel {
        self.session
    }

    fn reset_to_default_session(&mut self) {
        self.events.push(Event::ResetToDefaultSession);
    }

    fn max_rcrrp(&self, _protocol: ProtocolId) -> RcrrpLimit {
        self.max_rcrrp
    }

    fn p2_max_time(&self, _protocol: ProtocolId) -> TimerValue {
        self.p2_max_time
    }

    fn allocate_p2_timer(&mut self, protocol: ProtocolId) {
        self.events.push(Event::P2Allocate(protocol));
    }

    fn start_p2_timer(&mut self, protocol: ProtocolId, timeout: TimerValue) {
        self.events.push(Event::P2Start(protocol, timeout));
    }

    fn give_p2_timer(&mut self, protocol: ProtocolId) {
        self.events.push(Event::P2Give(protocol));
    }

    fn stop_p2_timer(&mut self, protocol: ProtocolId) {
        self.events.push(Event::P2Stop(protocol));
    }

    fn free_p2_timer(&mut self, protocol: ProtocolId) {
        self.events.push(Event::P2Free(protocol));
    }

    fn p2_timer_value(&self, _protocol: ProtocolId) -> TimerValue {
        self.p2_remaining
    }

    fn non_default_session_protocol(&self) -> Option<ProtocolId> {
        self.non_default_session_protocol
    }

    fn lock_security_level(&mut self) {
        self.events.push(Event::LockSecurityLevel);
    }
}

impl ServiceDispatcher for RecordingServices {
    fn protocol_start(&mut self, request: ProtocolStartRequest) {
        self.events.push(Event::ProtocolStart(request));
    }

    fn protocol_cancel(&mut self, protocol: ProtocolId) {
        self.events.push(Event::ProtocolCancel(protocol));
    }
}

impl CommunicationSession for RecordingServices {
    fn processing_begin(&mut self, rx: RxConnectionId, _sending_busy_repeat_request: bool) {
        self.events.push(Event::ProcessingBegin(rx));
    }

    fn end_of_communication_session(&mut self, rx: RxConnectionId) {
        self.events.push(Event::EndOfCommunicationSession(rx));
    }

    fn processing_end(&mut self, rx: RxConnectionId) {
        self.events.push(Event::ProcessingEnd(rx));
    }

    fn cancel_rx_connection(&mut self, rx: RxConnectionId) {
        self.events.push(Event::CancelRx(rx));
    }

    fn is_receiving(&self, rx: RxConnectionId) -> bool {
        self.receiving.contains(&rx)
    }

    fn ecuc_meta_data_info(&mut self, rx: RxConnectionId) -> CallbackResult {
        self.events.push(Event::MetaDataInfo(rx));
        self.meta_data_result
    }
}

impl ProtocolCallbacks for RecordingServices {
    fn callback_count(&self) -> usize {
        self.start_results.len().max(self.stop_results.len())
    }

    fn start_protocol(&mut self, index: usize, protocol_type: ProtocolType) -> CallbackResult {
        self.events.push(Event::StartCallback(index, protocol_type));
        self.start_results.get(index).copied().unwrap_or(CallbackResult::Ok)
    }

    fn stop_protocol(&mut self, index: usize, protocol_type: ProtocolType) -> CallbackResult {
        self.events.push(Event::StopCallback(index, protocol_type));
        self.stop_results.get(index).copied().unwrap_or(CallbackResult::Ok)
    }
}

impl SupervisorHooks for RecordingServices {
    fn disinhibit_request_processing(&mut self) {
        self.events.push(Event::DisinhibitRequestProcessing);
    }

    fn enqueue_session_reset(&mut self) {
        self.events.push(Event::EnqueueSessionReset);
    }
}
