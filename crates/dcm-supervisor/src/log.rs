use crate::types::{ProtocolId, StackNumber};

/// Trait for structs that provide metadata for logging
pub trait LogMetadata {
    fn meta(&self) -> String;
}

/// Identifies the protocol slot a log line is about.
pub struct ProtocolLogContext {
    pub protocol: ProtocolId,
    pub stack: StackNumber,
}

impl ProtocolLogContext {
    pub fn new(protocol: ProtocolId, stack: StackNumber) -> Self {
        Self { protocol, stack }
    }
}

impl LogMetadata for ProtocolLogContext {
    fn meta(&self) -> String {
        format!("protocol={}, stack={}", self.protocol.0, self.stack.0)
    }
}

// =============================================
// Logging Macros (namespaced under crate::log)
// =============================================
// Each macro takes an optional leading context. Without one the line is
// logged unprefixed, for messages not tied to a protocol slot.

// ===== sv_info! =====
macro_rules! sv_info {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        ::log::info!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        ::log::info!($fmt $(, $($arg)+)?);
    }};
}

// ===== sv_warn! =====
macro_rules! sv_warn {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        ::log::warn!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        ::log::warn!($fmt $(, $($arg)+)?);
    }};
}

// ===== sv_error! =====
macro_rules! sv_error {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        ::log::error!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        ::log::error!($fmt $(, $($arg)+)?);
    }};
}

// ===== sv_debug! =====
macro_rules! sv_debug {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        ::log::debug!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        ::log::debug!($fmt $(, $($arg)+)?);
    }};
}

// ===== sv_trace! =====
macro_rules! sv_trace {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        ::log::trace!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        ::log::trace!($fmt $(, $($arg)+)?);
    }};
}

// Re-export macros for use in other files
pub(crate) use sv_debug;
pub(crate) use sv_error;
pub(crate) use sv_info;
pub(crate) use sv_trace;
pub(crate) use sv_warn;
