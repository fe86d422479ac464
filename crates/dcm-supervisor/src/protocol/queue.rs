// crates/dcm-supervisor/src/protocol/queue.rs
//! The presumptive request of a protocol.

use crate::types::{RequestBuffer, RequestType, RxConnectionId, Ticks};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Stage of the presumptive request held by a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum QueueState {
    #[default]
    Idle,
    PostBootQueued,
    ExternalQueued,
    /// A response-pending NRC waits to be sent for the queued request.
    ExternalQueuedRcrrpQueued,
    /// A response-pending NRC is being sent for the queued request.
    ExternalQueuedRcrrpTransmitting,
    Type1RoeQueued,
    Type1PeriodicQueued,
    Type2RoeQueued,
    Type2PeriodicQueued,
}

impl QueueState {
    pub const ALL: [QueueState; 9] = [
        QueueState::Idle,
        QueueState::PostBootQueued,
        QueueState::ExternalQueued,
        QueueState::ExternalQueuedRcrrpQueued,
        QueueState::ExternalQueuedRcrrpTransmitting,
        QueueState::Type1RoeQueued,
        QueueState::Type1PeriodicQueued,
        QueueState::Type2RoeQueued,
        QueueState::Type2PeriodicQueued,
    ];

    /// Queue state a freshly enqueued request of `request_type` starts in.
    pub fn for_request(request_type: RequestType) -> Self {
        match request_type {
            RequestType::NormalPhysical | RequestType::NormalFunctional => Self::ExternalQueued,
            RequestType::JumpFromBlResponse | RequestType::JumpFromBlNoResponse => {
                Self::PostBootQueued
            }
            RequestType::RoeType1Physical | RequestType::RoeType1Functional => Self::Type1RoeQueued,
            RequestType::PeriodicType1 => Self::Type1PeriodicQueued,
            RequestType::RoeType2Physical | RequestType::RoeType2Functional => Self::Type2RoeQueued,
            RequestType::PeriodicType2 => Self::Type2PeriodicQueued,
        }
    }

    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }

    /// An external request, with or without a pending RCRRP.
    pub fn is_external(self) -> bool {
        matches!(
            self,
            Self::ExternalQueued
                | Self::ExternalQueuedRcrrpQueued
                | Self::ExternalQueuedRcrrpTransmitting
        )
    }

    pub fn is_external_or_post_boot(self) -> bool {
        self.is_external() || self == Self::PostBootQueued
    }

    /// A request waiting to become the current request of its stack.
    pub fn is_type1(self) -> bool {
        self.is_external_or_post_boot()
            || matches!(self, Self::Type1RoeQueued | Self::Type1PeriodicQueued)
    }

    pub fn is_type2(self) -> bool {
        matches!(self, Self::Type2RoeQueued | Self::Type2PeriodicQueued)
    }

    pub fn is_roe(self) -> bool {
        matches!(self, Self::Type1RoeQueued | Self::Type2RoeQueued)
    }
}

/// Presumptive request slot of one protocol.
///
/// While the slot is not idle, the supervisor owns `buffer`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ProtocolQueue {
    pub state: QueueState,
    pub request_type: Option<RequestType>,
    pub rx: Option<RxConnectionId>,
    pub buffer: Option<RequestBuffer>,
    /// Ticks left for the current protocol to give up the stack.
    pub preemption_timeout: Ticks,
    /// Ticks left for a TYPE2 ROE cancellation to complete.
    pub processing_cancelling_timeout: Ticks,
    pub rcrrps_sent: u16,
    pub rcrrps_confirmed: u16,
}

impl ProtocolQueue {
    pub fn is_presumptive(&self) -> bool {
        !self.state.is_idle()
    }

    pub fn is_presumptive_with_non_roe(&self) -> bool {
        self.is_presumptive() && !self.state.is_roe()
    }

    /// Normal (external tester) request queued.
    pub fn holds_normal_request(&self) -> bool {
        self.request_type.is_some_and(RequestType::is_normal)
    }

    /// Returns the slot to idle. Ownership of the buffer is the caller's
    /// business.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
