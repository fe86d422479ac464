// crates/dcm-supervisor/src/config.rs
//! Static configuration of the supervisor: protocols, main connections and
//! rx connections. The configuration is validated once and never changes
//! afterwards.

use crate::error::SupervisorError;
use crate::types::{
    MainConnectionId, Priority, ProtocolGroup, ProtocolId, ProtocolType, RxConnectionId,
    StackNumber, Ticks, TimerValue, TxConnectionId,
};
use crate::log::{sv_error, sv_info};

/// Largest preemption timeout a protocol may be configured with (ticks).
pub const MAX_PREEMPTION_TIMEOUT: Ticks = 1000;

/// Configuration of one diagnostic protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub stack: StackNumber,
    /// Lower value means higher priority.
    pub priority: Priority,
    pub protocol_type: ProtocolType,
    /// Number of main-function ticks a presumptive request may wait for a
    /// preemption (or a TYPE2 ROE cancellation) to complete.
    pub preemption_timeout: Ticks,
    /// Subtracted from the session's P2 max time when the P2 timer starts.
    pub p2_server_adjust: TimerValue,
}

impl ProtocolConfig {
    pub fn new(
        stack: StackNumber,
        priority: Priority,
        protocol_type: ProtocolType,
        preemption_timeout: Ticks,
    ) -> Self {
        Self {
            stack,
            priority,
            protocol_type,
            preemption_timeout,
            p2_server_adjust: 0,
        }
    }

    pub fn with_p2_server_adjust(mut self, adjust: TimerValue) -> Self {
        self.p2_server_adjust = adjust;
        self
    }

    pub fn group(&self) -> ProtocolGroup {
        self.protocol_type.group()
    }
}

/// Transmission paths owned by one main connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainConnectionConfig {
    /// Tx connection used for responses to TYPE1 requests.
    pub confirmation_tx: TxConnectionId,
    /// Tx connection used by TYPE2 ROE responses, if configured.
    pub roe_tx: Option<TxConnectionId>,
    /// Tx connection of the first periodic connection, if configured.
    pub periodic_tx: Option<TxConnectionId>,
    /// Generic connection metadata (addressing) is configured for this
    /// main connection and must be fetched before dispatching on it.
    pub meta_data_configured: bool,
}

impl MainConnectionConfig {
    pub fn new(confirmation_tx: TxConnectionId) -> Self {
        Self {
            confirmation_tx,
            roe_tx: None,
            periodic_tx: None,
            meta_data_configured: false,
        }
    }
}

/// Binding of an rx connection to its protocol and main connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxConnectionConfig {
    pub protocol: ProtocolId,
    pub main_connection: MainConnectionId,
}

/// Validated supervisor configuration.
///
/// Protocols, main connections and rx connections are addressed by their
/// position in the vectors handed to [`SupervisorConfig::new`].
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    protocols: Vec<ProtocolConfig>,
    main_connections: Vec<MainConnectionConfig>,
    rx_connections: Vec<RxConnectionConfig>,
    respond_with_busy_repeat_request: bool,
    num_stacks: usize,
}

impl SupervisorConfig {
    pub fn new(
        protocols: Vec<ProtocolConfig>,
        main_connections: Vec<MainConnectionConfig>,
        rx_connections: Vec<RxConnectionConfig>,
        respond_with_busy_repeat_request: bool,
    ) -> Result<Self, SupervisorError> {
        if protocols.is_empty() {
            sv_error!("Supervisor configuration contains no protocols");
            return Err(SupervisorError::NoProtocolsConfigured);
        }
        if protocols.len() > u8::MAX as usize {
            return Err(SupervisorError::TooManyProtocols(protocols.len()));
        }
        for (index, protocol) in protocols.iter().enumerate() {
            if protocol.preemption_timeout > MAX_PREEMPTION_TIMEOUT {
                return Err(SupervisorError::PreemptionTimeoutOutOfRange {
                    protocol: ProtocolId(index as u8),
                    ticks: protocol.preemption_timeout,
                });
            }
        }
        for rx in &rx_connections {
            if rx.protocol.index() >= protocols.len() {
                return Err(SupervisorError::UnknownProtocol(rx.protocol));
            }
            if rx.main_connection.index() >= main_connections.len() {
                return Err(SupervisorError::UnknownMainConnection(rx.main_connection));
            }
        }

        let num_stacks = protocols
            .iter()
            .map(|p| p.stack.0 as usize + 1)
            .max()
            .unwrap_or(1);

        sv_info!(
            "Supervisor configured with {} protocols on {} stacks ({} main connections, {} rx connections).",
            protocols.len(),
            num_stacks,
            main_connections.len(),
            rx_connections.len(),
        );

        Ok(Self {
            protocols,
            main_connections,
            rx_connections,
            respond_with_busy_repeat_request,
            num_stacks,
        })
    }

    pub fn num_protocols(&self) -> usize {
        self.protocols.len()
    }

    pub fn num_stacks(&self) -> usize {
        self.num_stacks
    }

    /// Whether a cancelled or timed-out presumptive always gets a
    /// BusyRepeatRequest, even if no RCRRP was sent for it.
    pub fn respond_with_busy_repeat_request(&self) -> bool {
        self.respond_with_busy_repeat_request
    }

    /// Configuration of a protocol.
    ///
    /// Panics if the protocol index is not configured; protocol indices are
    /// only ever produced from this configuration.
    pub fn protocol(&self, protocol: ProtocolId) -> &ProtocolConfig {
        &self.protocols[protocol.index()]
    }

    pub fn protocols(&self) -> impl Iterator<Item = (ProtocolId, &ProtocolConfig)> {
        self.protocols
            .iter()
            .enumerate()
            .map(|(i, p)| (ProtocolId(i as u8), p))
    }

    pub fn stack_of(&self, protocol: ProtocolId) -> StackNumber {
        self.protocol(protocol).stack
    }

    pub fn group_of(&self, protocol: ProtocolId) -> ProtocolGroup {
        self.protocol(protocol).group()
    }

    pub fn priority_of(&self, protocol: ProtocolId) -> Priority {
        self.protocol(protocol).priority
    }

    pub fn rx_connection(&self, rx: RxConnectionId) -> Result<&RxConnectionConfig, SupervisorError> {
        self.rx_connections
            .get(rx.index())
            .ok_or(SupervisorError::UnknownRxConnection(rx))
    }

    pub fn rx_connections(&self) -> impl Iterator<Item = (RxConnectionId, &RxConnectionConfig)> {
        self.rx_connections
            .iter()
            .enumerate()
            .map(|(i, rx)| (RxConnectionId(i as u16), rx))
    }

    /// Main connection the rx connection belongs to.
    ///
    /// Panics on an unconfigured rx connection. Rx connection ids stored in
    /// the supervisor tables are validated when the request is accepted.
    pub fn main_connection_of(&self, rx: RxConnectionId) -> MainConnectionId {
        self.rx_connections[rx.index()].main_connection
    }

    pub fn main_connection(&self, main: MainConnectionId) -> &MainConnectionConfig {
        &self.main_connections[main.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uds(stack: u8, priority: u8) -> ProtocolConfig {
        ProtocolConfig::new(StackNumber(stack), priority, ProtocolType::UdsOnCan, 10)
    }

    #[test]
    fn test_stack_count_is_derived() {
        let config = SupervisorConfig::new(
            vec![uds(0, 1), uds(2, 3), uds(1, 2)],
            vec![MainConnectionConfig::new(TxConnectionId(0))],
            vec![RxConnectionConfig {
                protocol: ProtocolId(1),
                main_connection: MainConnectionId(0),
            }],
            false,
        )
        .unwrap();
        assert_eq!(config.num_stacks(), 3);
        assert_eq!(config.num_protocols(), 3);
        assert_eq!(config.stack_of(ProtocolId(1)), StackNumber(2));
        assert_eq!(config.main_connection_of(RxConnectionId(0)), MainConnectionId(0));
    }

    #[test]
    fn test_rejects_empty_configuration() {
        let result = SupervisorConfig::new(vec![], vec![], vec![], false);
        assert_eq!(result.unwrap_err(), SupervisorError::NoProtocolsConfigured);
    }

    #[test]
    fn test_rejects_preemption_timeout_above_limit() {
        let mut protocol = uds(0, 1);
        protocol.preemption_timeout = MAX_PREEMPTION_TIMEOUT + 1;
        let result = SupervisorConfig::new(vec![protocol], vec![], vec![], false);
        assert_eq!(
            result.unwrap_err(),
            SupervisorError::PreemptionTimeoutOutOfRange {
                protocol: ProtocolId(0),
                ticks: 1001
            }
        );
    }

    #[test]
    fn test_rejects_dangling_rx_connection() {
        let result = SupervisorConfig::new(
            vec![uds(0, 1)],
            vec![MainConnectionConfig::new(TxConnectionId(0))],
            vec![RxConnectionConfig {
                protocol: ProtocolId(4),
                main_connection: MainConnectionId(0),
            }],
            false,
        );
        assert_eq!(result.unwrap_err(), SupervisorError::UnknownProtocol(ProtocolId(4)));

        let result = SupervisorConfig::new(
            vec![uds(0, 1)],
            vec![],
            vec![RxConnectionConfig {
                protocol: ProtocolId(0),
                main_connection: MainConnectionId(0),
            }],
            false,
        );
        assert_eq!(
            result.unwrap_err(),
            SupervisorError::UnknownMainConnection(MainConnectionId(0))
        );
    }

    #[test]
    fn test_unknown_rx_connection_lookup() {
        let config = SupervisorConfig::new(vec![uds(0, 1)], vec![], vec![], true).unwrap();
        assert!(config.respond_with_busy_repeat_request());
        assert_eq!(
            config.rx_connection(RxConnectionId(0)).unwrap_err(),
            SupervisorError::UnknownRxConnection(RxConnectionId(0))
        );
    }
}
