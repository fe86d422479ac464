// crates/dcm-supervisor/src/lib.rs
//! Protocol handling of a diagnostic communication manager supervisor.
//!
//! Decides which diagnostic protocol may run on each communication stack,
//! preempts and cancels running protocols, and dispatches queued
//! ("presumptive") requests from a cyclic main function.

// --- Foundation Modules ---
pub mod types;
pub mod error;
pub mod config;
pub mod hal;
pub mod log;

// --- Protocol Tables ---
pub mod protocol;

// --- Engine ---
pub mod supervisor;

// --- Top-level Exports ---
pub use config::{MainConnectionConfig, ProtocolConfig, RxConnectionConfig, SupervisorConfig};
pub use error::SupervisorError;
pub use hal::{
    BufferManager, CommunicationSession, MainConnectionHandler, ProtocolCallbacks,
    ProtocolStartRequest, ServiceDispatcher, SessionHandler, SupervisorHooks, SupervisorServices,
};
pub use protocol::{ProtocolQueue, ProtocolState, ProtocolStatus, QueueState};
pub use supervisor::Supervisor;
pub use types::{
    ArbitrationResult, ProtocolId, RequestBuffer, RequestType, RxConnectionId, SessionLevel,
    StackNumber,
};
