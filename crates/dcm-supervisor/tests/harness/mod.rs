// crates/dcm-supervisor/tests/harness/mod.rs
#![allow(dead_code)]
pub mod services;

pub use services::{Event, RecordingServices};

use dcm_supervisor::config::{
    MainConnectionConfig, ProtocolConfig, RxConnectionConfig, SupervisorConfig,
};
use dcm_supervisor::protocol::{ProtocolQueue, ProtocolState};
use dcm_supervisor::types::{
    ArbitrationResult, BufferId, MainConnectionId, ProtocolId, ProtocolType, RequestBuffer,
    RequestType, RxConnectionId, StackNumber, Ticks, TxConnectionId,
};
use dcm_supervisor::Supervisor;
use std::collections::HashMap;

/// UDS on CAN, stack 0, priority 3.
pub const UDS_LOW: ProtocolId = ProtocolId(0);
/// UDS on IP, stack 0, priority 1.
pub const UDS_HIGH: ProtocolId = ProtocolId(1);
/// OBD on CAN, stack 1, priority 2.
pub const OBD: ProtocolId = ProtocolId(2);
/// UDS on FlexRay, stack 1, priority 4.
pub const UDS_REMOTE: ProtocolId = ProtocolId(3);

/// Rx connection `i` belongs to protocol `i` and main connection `i`.
pub fn rx_of(protocol: ProtocolId) -> RxConnectionId {
    RxConnectionId(protocol.0 as u16)
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Four protocols on two stacks. Main connection `i` transmits confirmations
/// on tx `i`, ROE on tx `10 + i` and periodic responses on tx `20 + i`.
pub fn two_stack_config(preemption_timeout: Ticks, respond_with_brr: bool) -> SupervisorConfig {
    two_stack_config_with_meta_data(preemption_timeout, respond_with_brr, &[])
}

/// Like `two_stack_config`, with connection metadata configured on the main
/// connections of `meta_data`.
pub fn two_stack_config_with_meta_data(
    preemption_timeout: Ticks,
    respond_with_brr: bool,
    meta_data: &[ProtocolId],
) -> SupervisorConfig {
    let protocols = vec![
        ProtocolConfig::new(StackNumber(0), 3, ProtocolType::UdsOnCan, preemption_timeout),
        ProtocolConfig::new(StackNumber(0), 1, ProtocolType::UdsOnIp, preemption_timeout),
        ProtocolConfig::new(StackNumber(1), 2, ProtocolType::ObdOnCan, preemption_timeout),
        ProtocolConfig::new(StackNumber(1), 4, ProtocolType::UdsOnFlexray, preemption_timeout),
    ];
    let main_connections = (0..4)
        .map(|i| MainConnectionConfig {
            confirmation_tx: TxConnectionId(i),
            roe_tx: Some(TxConnectionId(10 + i)),
            periodic_tx: Some(TxConnectionId(20 + i)),
            meta_data_configured: meta_data.contains(&ProtocolId(i as u8)),
        })
        .collect();
    let rx_connections = (0..4)
        .map(|i| RxConnectionConfig {
            protocol: ProtocolId(i),
            main_connection: MainConnectionId(i as u16),
        })
        .collect();
    SupervisorConfig::new(protocols, main_connections, rx_connections, respond_with_brr)
        .expect("valid test configuration")
}

/// Drives a supervisor against recording collaborators.
pub struct SupervisorHarness {
    pub supervisor: Supervisor,
    pub services: RecordingServices,
    /// Events already taken out of `services`.
    history: Vec<Event>,
    next_buffer: u16,
}

impl SupervisorHarness {
    pub fn new(preemption_timeout: Ticks, respond_with_brr: bool) -> Self {
        Self::with_config(two_stack_config(preemption_timeout, respond_with_brr))
    }

    pub fn with_config(config: SupervisorConfig) -> Self {
        init_logging();
        Self {
            supervisor: Supervisor::new(config),
            services: RecordingServices::default(),
            history: Vec::new(),
            next_buffer: 1,
        }
    }

    fn buffer(&mut self, service_id: u8) -> RequestBuffer {
        let buffer = RequestBuffer::new(BufferId(self.next_buffer), service_id);
        self.next_buffer += 1;
        buffer
    }

    /// Offers a TYPE1 request with service `service_id` on the rx
    /// connection of `protocol`.
    pub fn request(
        &mut self,
        protocol: ProtocolId,
        request_type: RequestType,
        service_id: u8,
    ) -> ArbitrationResult {
        let buffer = self.buffer(service_id);
        self.supervisor
            .enqueue_type1_request(&mut self.services, rx_of(protocol), request_type, buffer)
            .expect("configured rx connection")
    }

    pub fn request_type2(&mut self, protocol: ProtocolId, request_type: RequestType) -> ArbitrationResult {
        let buffer = self.buffer(0x86);
        self.supervisor
            .enqueue_type2_request(&mut self.services, rx_of(protocol), request_type, buffer)
            .expect("configured rx connection")
    }

    pub fn tick(&mut self) {
        self.supervisor.main_function(&mut self.services);
        self.check_invariants();
    }

    pub fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    pub fn free(&mut self, protocol: ProtocolId) {
        self.supervisor.protocol_free(&mut self.services, protocol);
        self.check_invariants();
    }

    pub fn state(&self, protocol: ProtocolId) -> ProtocolState {
        self.supervisor.protocol_state(protocol)
    }

    pub fn queue(&self, protocol: ProtocolId) -> ProtocolQueue {
        self.supervisor.queue_snapshot(protocol)
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        let events = self.services.take_events();
        self.history.extend(events.iter().cloned());
        events
    }

    /// Checks the properties that hold between any two supervisor calls.
    pub fn check_invariants(&self) {
        let config = self.supervisor.config();
        let protocols: Vec<ProtocolId> = config.protocols().map(|(p, _)| p).collect();

        for stack in 0..config.num_stacks() {
            let on_stack: Vec<ProtocolId> = protocols
                .iter()
                .copied()
                .filter(|&p| config.stack_of(p) == StackNumber(stack as u8))
                .collect();
            let current = on_stack
                .iter()
                .filter(|&&p| self.state(p).is_current())
                .count();
            assert!(current <= 1, "stack {stack} has {current} current protocols");
            let type1_presumptives = on_stack
                .iter()
                .filter(|&&p| self.queue(p).state.is_type1())
                .count();
            assert!(
                type1_presumptives <= 1,
                "stack {stack} has {type1_presumptives} TYPE1 presumptives"
            );
        }

        let mut any_presumptive = false;
        for &p in &protocols {
            let queue = self.queue(p);
            if queue.state.is_idle() {
                assert_eq!(queue, ProtocolQueue::default(), "idle queue of {p:?} not reset");
            } else {
                any_presumptive = true;
                assert!(queue.buffer.is_some(), "presumptive of {p:?} without buffer");
                assert!(queue.rx.is_some(), "presumptive of {p:?} without rx connection");
                assert!(queue.request_type.is_some());
            }
            assert!(queue.rcrrps_confirmed <= queue.rcrrps_sent);
        }
        if any_presumptive {
            assert!(self.supervisor.presumptive_pending());
        }

        // A buffer changes hands at most once and never while it is queued.
        let mut released: HashMap<BufferId, usize> = HashMap::new();
        for event in self.history.iter().chain(self.services.events.iter()) {
            if let Event::BufferGive(_, id) | Event::BufferFree(id) = event {
                *released.entry(*id).or_default() += 1;
            }
        }
        for (id, count) in &released {
            assert_eq!(*count, 1, "buffer {id:?} released {count} times");
        }
        for &p in &protocols {
            if let Some(buffer) = self.queue(p).buffer {
                assert!(
                    !released.contains_key(&buffer.id),
                    "queued buffer {:?} of {p:?} already released",
                    buffer.id
                );
            }
        }
    }
}
