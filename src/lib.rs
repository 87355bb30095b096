//! aoo-core: peer-to-peer Audio over OSC streaming core.
//!
//! A `Source` encodes interleaved audio, fragments it across UDP-sized
//! packets, and fans it out to registered sinks; a `Sink` receives those
//! packets, reorders and resends as needed, resamples to its own host
//! clock, and decodes into the host's output buffer. Both are plain
//! structs driven by host-invoked `process`/`send`/`handle_message` calls
//! — no threads, no FFI boundary, and no network transport of its own
//! beyond the optional `UdpEndpoint` convenience wrapper.
//!
//! Host bindings (PD/Max), peer discovery/registration, and concrete
//! payload formats beyond PCM/Opus live in crates layered on top of this
//! one.

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod format;
pub mod history;
pub mod jitter;
pub mod memory_pool;
pub mod options;
pub mod packet;
pub mod protocol;
pub mod queue;
pub mod resample;
pub mod sink;
pub mod source;
pub mod time;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

pub use codec::CodecRegistry;
pub use endpoint::{Endpoint, Id, SendFn};
pub use error::{AooError, AooResult};
pub use event::Event;
pub use format::Format;
pub use memory_pool::MemoryPool;
pub use options::{Option_, OptionValue, Settings};
pub use protocol::{Version, PROTOCOL_VERSION};
pub use sink::Sink;
pub use source::Source;

/// AOO wire-protocol version this crate speaks. Distinct from the crate's
/// own `Cargo.toml` version: this is what `check_version` compares against
/// a remote peer's announced `Version`.
pub const AOO_VERSION: Version = PROTOCOL_VERSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warning,
    Verbose,
    Debug,
}

pub type LogCallback = fn(LogLevel, &str);

static LOG_FN: OnceLock<LogCallback> = OnceLock::new();
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static MEMORY_POOL: OnceLock<MemoryPool> = OnceLock::new();

/// Process-wide setup, guarded by a `OnceLock`: a second call is a no-op
/// rather than an error, since hosts that statically link this crate into
/// more than one plugin entry point may call it more than once.
#[derive(Debug, Clone, Copy)]
pub struct InitSettings {
    /// Byte size of each block the RT memory pool hands out.
    pub memory_pool_block_size: usize,
    /// Number of blocks the RT memory pool pre-allocates.
    pub memory_pool_capacity: usize,
    pub log_fn: Option<LogCallback>,
}

impl Default for InitSettings {
    fn default() -> Self {
        Self {
            memory_pool_block_size: 4096,
            memory_pool_capacity: 64,
            log_fn: None,
        }
    }
}

pub fn initialize(settings: InitSettings) {
    if INITIALIZED.swap(true, Ordering::AcqRel) {
        return;
    }
    if let Some(log_fn) = settings.log_fn {
        let _ = LOG_FN.set(log_fn);
    }
    let _ = MEMORY_POOL.set(MemoryPool::new(settings.memory_pool_block_size, settings.memory_pool_capacity));
    log(LogLevel::Verbose, "aoo-core initialized");
}

pub fn terminate() {
    INITIALIZED.store(false, Ordering::Release);
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

/// The process-wide memory pool set up by `initialize`, or `None` if the
/// crate hasn't been initialized yet.
pub fn memory_pool() -> Option<&'static MemoryPool> {
    MEMORY_POOL.get()
}

pub fn log(level: LogLevel, message: &str) {
    if let Some(log_fn) = LOG_FN.get() {
        log_fn(level, message);
    }
}

#[macro_export]
macro_rules! aoo_log {
    ($level:expr, $($arg:tt)*) => {
        $crate::log($level, &format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_initialize_is_idempotent() {
        terminate();
        initialize(InitSettings::default());
        assert!(is_initialized());
        initialize(InitSettings::default());
        assert!(is_initialized());
    }

    #[test]
    fn version_check_matches_protocol_constant() {
        assert_eq!(AOO_VERSION, PROTOCOL_VERSION);
    }
}
