// crates/dcm-supervisor/src/hal.rs
//! Interfaces of the units the supervisor collaborates with.
//!
//! The supervisor decides *when* buffers change owner, NRCs are sent or a
//! protocol is started or cancelled. How that happens is up to these
//! collaborators. None of them is ever called while the supervisor holds its
//! table lock.

use crate::types::{
    BufferId, BufferState, CallbackResult, MainConnectionId, NegativeResponseCode, ProtocolId,
    ProtocolType, RcrrpLimit, RcrrpTransmission, RequestBuffer, RequestType, RxConnectionId,
    SessionLevel, TimerValue, TxConnectionId,
};

/// Ownership and state transfer of request buffers.
pub trait BufferManager {
    /// Hands the buffer over to the protocol.
    fn give(&mut self, new_owner: ProtocolId, buffer: BufferId);

    /// Releases the buffer back to the pool.
    fn free(&mut self, buffer: BufferId);

    /// Moves the buffer into a processing state before it is handed over.
    fn change_state(&mut self, buffer: BufferId, state: BufferState);
}

/// The tester-facing conversation channel of an rx connection.
pub trait MainConnectionHandler {
    /// Queues a negative response for the request received on `rx`.
    ///
    /// `timeout` is the time left for the transmission; zero means the
    /// response must go out immediately.
    fn initiate_nrc(
        &mut self,
        rx: RxConnectionId,
        buffer: RequestBuffer,
        nrc: NegativeResponseCode,
        timeout: TimerValue,
    );

    /// Returns the main connection to its idle state.
    fn clear(&mut self, main_connection: MainConnectionId);

    /// Marks the main connection as waiting for the request received on `rx`.
    fn busy_with_request(&mut self, main_connection: MainConnectionId, rx: RxConnectionId);

    /// The waiting request has been handed to its protocol.
    fn request_dispatched(&mut self, main_connection: MainConnectionId);

    /// Ends the conversation without sending any response.
    fn end(&mut self, main_connection: MainConnectionId);

    /// True while the main connection of `rx` still has to send an NRC.
    fn is_busy_with_nrc(&self, rx: RxConnectionId) -> bool;

    /// Time left for an NRC which follows a pending RCRRP of `protocol`.
    fn nrc_timeout(&self, protocol: ProtocolId) -> TimerValue;
}

/// Diagnostic session, P2 timer and security level handling.
pub trait SessionHandler {
    fn current_session(&self) -> SessionLevel;

    fn reset_to_default_session(&mut self);

    /// Maximum number of RCRRPs allowed for `protocol` in the current session.
    fn max_rcrrp(&self, protocol: ProtocolId) -> RcrrpLimit;

    fn p2_max_time(&self, protocol: ProtocolId) -> TimerValue;

    fn allocate_p2_timer(&mut self, protocol: ProtocolId);

    fn start_p2_timer(&mut self, protocol: ProtocolId, timeout: TimerValue);

    /// Hands the P2 timer of a dispatched request to the protocol.
    fn give_p2_timer(&mut self, protocol: ProtocolId);

    fn stop_p2_timer(&mut self, protocol: ProtocolId);

    fn free_p2_timer(&mut self, protocol: ProtocolId);

    /// Remaining time of the P2 timer of `protocol`.
    fn p2_timer_value(&self, protocol: ProtocolId) -> TimerValue;

    /// The protocol that switched into the current non-default session, if any.
    fn non_default_session_protocol(&self) -> Option<ProtocolId>;

    fn lock_security_level(&mut self);
}

/// Everything a protocol needs to start processing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolStartRequest {
    pub protocol: ProtocolId,
    pub rx: RxConnectionId,
    pub tx: TxConnectionId,
    pub buffer: RequestBuffer,
    pub request_type: RequestType,
    pub rcrrp: RcrrpTransmission,
    pub rcrrps_sent: u16,
    pub rcrrps_confirmed: u16,
}

/// The service processing layer.
pub trait ServiceDispatcher {
    fn protocol_start(&mut self, request: ProtocolStartRequest);

    /// Signals cancellation. Completion is reported later through
    /// `Supervisor::protocol_free`.
    fn protocol_cancel(&mut self, protocol: ProtocolId);
}

/// Communication session bookkeeping (ComM channels, S3 timer).
pub trait CommunicationSession {
    fn processing_begin(&mut self, rx: RxConnectionId, sending_busy_repeat_request: bool);

    fn end_of_communication_session(&mut self, rx: RxConnectionId);

    fn processing_end(&mut self, rx: RxConnectionId);

    /// Requests cancellation of an ongoing reception, in sync with the main function.
    fn cancel_rx_connection(&mut self, rx: RxConnectionId);

    fn is_receiving(&self, rx: RxConnectionId) -> bool;

    /// Fetches the generic connection metadata of `rx` ahead of a dispatch.
    fn ecuc_meta_data_info(&mut self, rx: RxConnectionId) -> CallbackResult;
}

/// Application `StartProtocol`/`StopProtocol` callbacks.
pub trait ProtocolCallbacks {
    fn callback_count(&self) -> usize;

    fn start_protocol(&mut self, index: usize, protocol_type: ProtocolType) -> CallbackResult;

    fn stop_protocol(&mut self, index: usize, protocol_type: ProtocolType) -> CallbackResult;
}

/// Hooks into the surrounding supervisor.
pub trait SupervisorHooks {
    /// Lifts the request inhibition installed for a post-boot response.
    fn disinhibit_request_processing(&mut self);

    /// Schedules a reset to the default session for the next main function.
    fn enqueue_session_reset(&mut self);
}

/// All collaborators of the supervisor.
pub trait SupervisorServices:
    BufferManager
    + MainConnectionHandler
    + SessionHandler
    + ServiceDispatcher
    + CommunicationSession
    + ProtocolCallbacks
    + SupervisorHooks
{
}

impl<T> SupervisorServices for T where
    T: BufferManager
        + MainConnectionHandler
        + SessionHandler
        + ServiceDispatcher
        + CommunicationSession
        + ProtocolCallbacks
        + SupervisorHooks
{
}
