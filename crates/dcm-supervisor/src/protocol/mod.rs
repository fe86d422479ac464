//! Per-protocol data: run state, presumptive queue and the tables holding them.

pub mod queue;
pub mod state;
pub mod table;

pub use queue::{ProtocolQueue, QueueState};
pub use state::{
    CancelIntent, ProtocolState, RequestKind, StartedActivity, StoppedActivity, StoppingActivity,
    Type2Kind,
};
pub use table::{ProtocolStatus, ProtocolTable};
