// crates/dcm-supervisor/src/types.rs
use core::convert::TryFrom;
use core::fmt;

#[cfg(feature = "serde")]
use serde::Serialize;

// --- Identifiers ---

/// Index of a configured diagnostic protocol.
///
/// Protocols are fixed at configuration time; the index addresses both the
/// status table and the queue table of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ProtocolId(pub u8);

impl ProtocolId {
    /// Position of this protocol in the supervisor tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Number of the communication stack a protocol is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct StackNumber(pub u8);

/// Identifier of an inbound (reception) connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RxConnectionId(pub u16);

impl RxConnectionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of an outbound (transmission) connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TxConnectionId(pub u16);

/// Identifier of a main connection (the tester-facing conversation channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MainConnectionId(pub u16);

impl MainConnectionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a buffer held by the buffer manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BufferId(pub u16);

/// Opaque handle to a request buffer.
///
/// The supervisor never reads the payload; `service_id` carries the first
/// request byte, which is the only part the P2 timeout handling inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RequestBuffer {
    pub id: BufferId,
    pub service_id: u8,
}

impl RequestBuffer {
    pub fn new(id: BufferId, service_id: u8) -> Self {
        Self { id, service_id }
    }
}

/// Diagnostic session control level as reported by the session handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SessionLevel(pub u8);

impl SessionLevel {
    /// The default diagnostic session (0x01).
    pub const DEFAULT: Self = Self(0x01);

    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }
}

impl Default for SessionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Protocol priority. A lower value means a higher priority.
pub type Priority = u8;

/// Countdown measured in supervisor main-function ticks.
pub type Ticks = u16;

/// Timer value as handled by the session handler (milliseconds).
pub type TimerValue = u32;

// --- Service identifiers inspected on P2 expiry ---

/// OBD services which never receive a response-pending NRC.
pub const OBD_SERVICES_WITHOUT_RCRRP: [u8; 7] = [0x01, 0x02, 0x03, 0x06, 0x07, 0x08, 0x0A];

/// OBD ClearDiagnosticInformation (0x04).
pub const SID_OBD_CLEAR_DTC: u8 = 0x04;

/// OBD RequestVehicleInformation (0x09).
pub const SID_OBD_REQUEST_VEHICLE_INFORMATION: u8 = 0x09;

// --- Protocol classification ---

/// The transport/protocol kind of a configured protocol.
/// (Reference: AUTOSAR SWS Dcm, Dcm_ProtocolType)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ProtocolType {
    ObdOnCan,
    ObdOnFlexray,
    ObdOnIp,
    UdsOnCan,
    UdsOnFlexray,
    UdsOnIp,
    RoeOnCan,
    RoeOnFlexray,
    RoeOnIp,
    PeriodicOnCan,
    PeriodicOnFlexray,
    PeriodicOnIp,
    UdsOnLin,
    /// Supplier specific protocol (0xF0..=0xFE).
    Supplier(u8),
}

impl ProtocolType {
    /// OBD on CAN, FlexRay or IP belongs to the OBD group; everything else is UDS.
    pub fn group(self) -> ProtocolGroup {
        match self {
            ProtocolType::ObdOnCan | ProtocolType::ObdOnFlexray | ProtocolType::ObdOnIp => {
                ProtocolGroup::Obd
            }
            _ => ProtocolGroup::Uds,
        }
    }
}

/// Error type for invalid enum conversions from raw configuration values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidValueError {
    ProtocolType(u8),
    RequestType(u8),
}

impl fmt::Display for InvalidValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolType(v) => write!(f, "Invalid protocol type value: {v:#04x}"),
            Self::RequestType(v) => write!(f, "Invalid request type value: {v:#04x}"),
        }
    }
}

impl std::error::Error for InvalidValueError {}

impl TryFrom<u8> for ProtocolType {
    type Error = InvalidValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::ObdOnCan),
            0x01 => Ok(Self::ObdOnFlexray),
            0x02 => Ok(Self::ObdOnIp),
            0x03 => Ok(Self::UdsOnCan),
            0x04 => Ok(Self::UdsOnFlexray),
            0x05 => Ok(Self::UdsOnIp),
            0x06 => Ok(Self::RoeOnCan),
            0x07 => Ok(Self::RoeOnFlexray),
            0x08 => Ok(Self::RoeOnIp),
            0x09 => Ok(Self::PeriodicOnCan),
            0x0A => Ok(Self::PeriodicOnFlexray),
            0x0B => Ok(Self::PeriodicOnIp),
            0x0D => Ok(Self::UdsOnLin),
            0xF0..=0xFE => Ok(Self::Supplier(value)),
            _ => Err(InvalidValueError::ProtocolType(value)),
        }
    }
}

/// Protocol group used for cross-stack arbitration: only one UDS and one OBD
/// conversation may be in flight at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ProtocolGroup {
    Uds,
    Obd,
}

// --- Requests ---

/// Kind of request handed to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[repr(u8)]
pub enum RequestType {
    NormalPhysical = 1,
    NormalFunctional = 2,
    JumpFromBlResponse = 8,
    JumpFromBlNoResponse = 9,
    RoeType1Physical = 10,
    RoeType1Functional = 11,
    RoeType2Physical = 12,
    RoeType2Functional = 13,
    PeriodicType1 = 14,
    PeriodicType2 = 15,
}

impl RequestType {
    /// An external tester request (physical or functional addressing).
    pub fn is_normal(self) -> bool {
        matches!(self, Self::NormalPhysical | Self::NormalFunctional)
    }

    /// Post-boot request generated after a jump from the bootloader.
    pub fn is_jump_from_bootloader(self) -> bool {
        matches!(self, Self::JumpFromBlResponse | Self::JumpFromBlNoResponse)
    }

    pub fn is_type1_roe(self) -> bool {
        matches!(self, Self::RoeType1Physical | Self::RoeType1Functional)
    }

    pub fn is_type2_roe(self) -> bool {
        matches!(self, Self::RoeType2Physical | Self::RoeType2Functional)
    }

    /// TYPE2 requests run in the background and never occupy the current
    /// protocol slot of a stack.
    pub fn is_type2(self) -> bool {
        self.is_type2_roe() || self == Self::PeriodicType2
    }

    pub fn is_type1(self) -> bool {
        !self.is_type2()
    }

    /// Origin used for arbitration of a TYPE1 request of this type.
    pub fn origin(self) -> Option<RequestOrigin> {
        match self {
            Self::NormalPhysical | Self::NormalFunctional => Some(RequestOrigin::External),
            Self::JumpFromBlResponse => Some(RequestOrigin::InternalPostBootWithAnswer),
            Self::JumpFromBlNoResponse => Some(RequestOrigin::InternalPostBootNoAnswer),
            Self::RoeType1Physical | Self::RoeType1Functional => Some(RequestOrigin::InternalRoe),
            Self::PeriodicType1 => Some(RequestOrigin::InternalPeriodic),
            Self::RoeType2Physical | Self::RoeType2Functional | Self::PeriodicType2 => None,
        }
    }
}

impl TryFrom<u8> for RequestType {
    type Error = InvalidValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::NormalPhysical),
            2 => Ok(Self::NormalFunctional),
            8 => Ok(Self::JumpFromBlResponse),
            9 => Ok(Self::JumpFromBlNoResponse),
            10 => Ok(Self::RoeType1Physical),
            11 => Ok(Self::RoeType1Functional),
            12 => Ok(Self::RoeType2Physical),
            13 => Ok(Self::RoeType2Functional),
            14 => Ok(Self::PeriodicType1),
            15 => Ok(Self::PeriodicType2),
            _ => Err(InvalidValueError::RequestType(value)),
        }
    }
}

/// Where a TYPE1 request comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum RequestOrigin {
    External,
    InternalRoe,
    InternalPeriodic,
    InternalPostBootNoAnswer,
    InternalPostBootWithAnswer,
}

impl RequestOrigin {
    /// External and post-boot requests ignore pure ROE activity when judging
    /// whether a protocol is busy.
    pub fn overrides_roe(self) -> bool {
        matches!(
            self,
            Self::External | Self::InternalPostBootNoAnswer | Self::InternalPostBootWithAnswer
        )
    }
}

// --- Outcomes ---

/// Verdict of a request priority assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ArbitrationResult {
    Accept,
    RejectPriority,
    RejectSameProtocolType,
}

/// Whether the session handler may switch to a requested session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum SessionSwitchPermission {
    Accept,
    BusyDiscard,
}

/// Negative response codes generated by the supervisor.
/// (Reference: ISO 14229-1, Table A.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[repr(u8)]
pub enum NegativeResponseCode {
    GeneralReject = 0x10,
    BusyRepeatRequest = 0x21,
    ConditionsNotCorrect = 0x22,
    ResponsePending = 0x78,
}

/// How the protocol must treat RCRRP transmission when it is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[repr(u8)]
pub enum RcrrpTransmission {
    Invalid = 0x00,
    NoRcrrpOnEntry = 0x01,
    BeginToTransmitRcrrpOnEntry = 0x02,
    TransmittingRcrrpOnEntry = 0x03,
}

/// Processing state a request buffer is moved into before hand-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BufferState {
    ProcessingNormal = 15,
    ProcessingRoe = 16,
}

/// Maximum number of response-pending NRCs allowed in the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcrrpLimit {
    Bounded(u16),
    Unbounded,
}

impl RcrrpLimit {
    /// True once `sent` response-pending NRCs use up a bounded limit.
    pub fn is_exhausted_by(self, sent: u16) -> bool {
        match self {
            RcrrpLimit::Bounded(max) => sent >= max,
            RcrrpLimit::Unbounded => false,
        }
    }
}

/// Result reported by an application callback or a metadata lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackResult {
    Ok,
    NotOk,
    ProtocolNotAllowed,
    /// Any value outside the callback contract.
    Other(u8),
}
