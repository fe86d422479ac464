// crates/dcm-supervisor/src/error.rs
use crate::types::{InvalidValueError, MainConnectionId, ProtocolId, RxConnectionId};
use core::fmt;

/// Error type for the supervisor.
///
/// Arbitration rejections are not errors; they are reported through
/// [`ArbitrationResult`](crate::types::ArbitrationResult). This type covers
/// configuration problems and lookups that can legitimately fail at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorError {
    /// The configuration does not contain a single protocol.
    NoProtocolsConfigured,
    /// More protocols are configured than a `ProtocolId` can address.
    TooManyProtocols(usize),
    /// A protocol's preemption timeout is outside 0..=1000 ticks.
    PreemptionTimeoutOutOfRange { protocol: ProtocolId, ticks: u16 },
    /// An rx connection refers to a protocol which is not configured.
    UnknownProtocol(ProtocolId),
    /// An rx connection refers to a main connection which is not configured.
    UnknownMainConnection(MainConnectionId),
    /// The given rx connection is not configured.
    UnknownRxConnection(RxConnectionId),
    /// No external UDS request has been dispatched since initialisation.
    NoExternalUdsProtocol,
    /// A raw configuration value could not be converted.
    InvalidValue(InvalidValueError),
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoProtocolsConfigured => write!(f, "At least one protocol must be configured"),
            Self::TooManyProtocols(n) => write!(f, "Too many protocols configured: {n}"),
            Self::PreemptionTimeoutOutOfRange { protocol, ticks } => write!(
                f,
                "Preemption timeout of protocol {} out of range: {ticks} (max 1000)",
                protocol.0
            ),
            Self::UnknownProtocol(p) => write!(f, "Unknown protocol index: {}", p.0),
            Self::UnknownMainConnection(m) => write!(f, "Unknown main connection index: {}", m.0),
            Self::UnknownRxConnection(rx) => write!(f, "Unknown rx connection id: {}", rx.0),
            Self::NoExternalUdsProtocol => {
                write!(f, "No external UDS request has been dispatched yet")
            }
            Self::InvalidValue(e) => write!(f, "Invalid configuration value: {e}"),
        }
    }
}

impl std::error::Error for SupervisorError {}

// --- From Implementations for Error Conversion ---

impl From<InvalidValueError> for SupervisorError {
    fn from(e: InvalidValueError) -> Self {
        SupervisorError::InvalidValue(e)
    }
}
