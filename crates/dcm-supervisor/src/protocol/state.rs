// crates/dcm-supervisor/src/protocol/state.rs
//! Run state of a protocol.
//!
//! The state is a phase (stopped, started, stopping) combined with what the
//! protocol is doing inside that phase. Only combinations that can actually
//! occur are representable.

#[cfg(feature = "serde")]
use serde::Serialize;

/// Background (TYPE2) activity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Type2Kind {
    Roe,
    Periodic,
}

/// Kinds of work a started protocol can be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum RequestKind {
    External,
    Type1Roe,
    Type1Periodic,
    Type2Roe,
    Type2Periodic,
}

impl RequestKind {
    pub const ALL: [RequestKind; 5] = [
        RequestKind::External,
        RequestKind::Type1Roe,
        RequestKind::Type1Periodic,
        RequestKind::Type2Roe,
        RequestKind::Type2Periodic,
    ];

    pub fn is_type1(self) -> bool {
        matches!(self, Self::External | Self::Type1Roe | Self::Type1Periodic)
    }

    pub fn type2(self) -> Option<Type2Kind> {
        match self {
            Self::Type2Roe => Some(Type2Kind::Roe),
            Self::Type2Periodic => Some(Type2Kind::Periodic),
            _ => None,
        }
    }

    /// Whether the kind owns a main connection while it runs.
    pub fn owns_main_connection(self) -> bool {
        self.is_type1()
    }
}

impl From<Type2Kind> for RequestKind {
    fn from(kind: Type2Kind) -> Self {
        match kind {
            Type2Kind::Roe => RequestKind::Type2Roe,
            Type2Kind::Periodic => RequestKind::Type2Periodic,
        }
    }
}

/// What a started protocol does once its cancellation completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum CancelIntent {
    /// Remains the current protocol of its stack.
    StayStarted,
    /// Moves on to the stopping phase.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum StoppedActivity {
    Idle,
    Active(Type2Kind),
    Cancelling(Type2Kind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum StartedActivity {
    Idle,
    /// Processing the response to a jump from the bootloader.
    PostBoot,
    Active(RequestKind),
    Cancelling(RequestKind, CancelIntent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum StoppingActivity {
    Idle,
    Active(Type2Kind),
    /// TYPE2 ROE cancellation issued while stopping.
    CancellingRoe,
}

/// Run state of one protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ProtocolState {
    /// Not the current protocol of its stack. TYPE2 work may still run.
    Stopped(StoppedActivity),
    /// The current protocol of its stack.
    Started(StartedActivity),
    /// Preempted; waiting for the stop callbacks to succeed.
    Stopping(StoppingActivity),
}

impl Default for ProtocolState {
    fn default() -> Self {
        Self::STOPPED_IDLE
    }
}

impl ProtocolState {
    pub const STOPPED_IDLE: Self = Self::Stopped(StoppedActivity::Idle);
    pub const STARTED_IDLE: Self = Self::Started(StartedActivity::Idle);
    pub const STOPPING_IDLE: Self = Self::Stopping(StoppingActivity::Idle);

    pub fn started_active(kind: RequestKind) -> Self {
        Self::Started(StartedActivity::Active(kind))
    }

    pub fn started_cancelling(kind: RequestKind, intent: CancelIntent) -> Self {
        Self::Started(StartedActivity::Cancelling(kind, intent))
    }

    /// Every reachable state, for exhaustive checks.
    pub fn all() -> Vec<ProtocolState> {
        let mut states = vec![Self::STOPPED_IDLE];
        for kind in [Type2Kind::Roe, Type2Kind::Periodic] {
            states.push(Self::Stopped(StoppedActivity::Active(kind)));
            states.push(Self::Stopped(StoppedActivity::Cancelling(kind)));
        }
        states.push(Self::STARTED_IDLE);
        states.push(Self::Started(StartedActivity::PostBoot));
        for kind in RequestKind::ALL {
            states.push(Self::started_active(kind));
            states.push(Self::started_cancelling(kind, CancelIntent::StayStarted));
            states.push(Self::started_cancelling(kind, CancelIntent::Stop));
        }
        states.push(Self::STOPPING_IDLE);
        states.push(Self::Stopping(StoppingActivity::Active(Type2Kind::Roe)));
        states.push(Self::Stopping(StoppingActivity::Active(Type2Kind::Periodic)));
        states.push(Self::Stopping(StoppingActivity::CancellingRoe));
        states
    }

    /// Whether the protocol holds the current-protocol slot of its stack.
    ///
    /// A stopping protocol keeps the slot until its stop callbacks succeed,
    /// except while it cancels TYPE2 ROE work.
    pub fn is_current(self) -> bool {
        match self {
            Self::Started(_) => true,
            Self::Stopping(StoppingActivity::Idle | StoppingActivity::Active(_)) => true,
            Self::Stopping(StoppingActivity::CancellingRoe) | Self::Stopped(_) => false,
        }
    }

    /// Whether a protocol in this state keeps its stack from starting or
    /// dispatching a TYPE1 request.
    pub fn blocks_type1(self) -> bool {
        match self {
            Self::Stopping(_) => true,
            Self::Stopped(StoppedActivity::Cancelling(_)) => true,
            Self::Stopped(_) => false,
            Self::Started(StartedActivity::PostBoot) => true,
            Self::Started(StartedActivity::Active(kind)) => kind.is_type1(),
            Self::Started(StartedActivity::Cancelling(..)) => true,
            Self::Started(StartedActivity::Idle) => false,
        }
    }

    /// TYPE2 requests only claim an idle protocol.
    pub fn can_accept_type2(self) -> bool {
        matches!(self, Self::STOPPED_IDLE | Self::STARTED_IDLE)
    }

    /// Whether the protocol is running any request.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            Self::Started(StartedActivity::PostBoot | StartedActivity::Active(_))
                | Self::Stopping(StoppingActivity::Active(_))
                | Self::Stopped(StoppedActivity::Active(_))
        )
    }

    /// Like [`is_busy`](Self::is_busy), ignoring ROE work.
    pub fn is_busy_with_non_roe(self) -> bool {
        self.is_busy()
            && !matches!(
                self,
                Self::Started(StartedActivity::Active(
                    RequestKind::Type1Roe | RequestKind::Type2Roe
                )) | Self::Stopped(StoppedActivity::Active(Type2Kind::Roe))
                    | Self::Stopping(StoppingActivity::Active(Type2Kind::Roe))
            )
    }

    /// Running or cancelling a TYPE1 request (post-boot included).
    pub fn is_processing_type1(self) -> bool {
        match self {
            Self::Started(StartedActivity::PostBoot) => true,
            Self::Started(StartedActivity::Active(kind))
            | Self::Started(StartedActivity::Cancelling(kind, _)) => kind.is_type1(),
            _ => false,
        }
    }

    /// Whether a protocol in this state keeps the diagnostic session from
    /// being switched by a different protocol group.
    pub fn holds_session(self) -> bool {
        self.is_processing_type1()
            || matches!(
                self,
                Self::Stopping(StoppingActivity::Idle | StoppingActivity::Active(_))
            )
    }

    /// Whether TYPE2 ROE work is running or being cancelled.
    pub fn has_type2_roe(self) -> bool {
        matches!(
            self,
            Self::Started(StartedActivity::Active(RequestKind::Type2Roe))
                | Self::Started(StartedActivity::Cancelling(RequestKind::Type2Roe, _))
                | Self::Stopped(StoppedActivity::Active(Type2Kind::Roe))
                | Self::Stopped(StoppedActivity::Cancelling(Type2Kind::Roe))
                | Self::Stopping(StoppingActivity::Active(Type2Kind::Roe))
                | Self::Stopping(StoppingActivity::CancellingRoe)
        )
    }
}
