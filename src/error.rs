//! Error kinds surfaced by the public API.
//!
//! Every entry point returns a `Result<_, AooError>`; nothing here is meant
//! to propagate across an FFI boundary (there is none in this crate) — a
//! thin FFI-facing layer built on top of this crate would map each variant
//! to the flat status code it already names.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AooError {
    /// An argument failed validation (bad format, invalid channel count...).
    BadArgument,
    /// The requested operation is not implemented for this build/config.
    NotImplemented,
    /// Nothing to do; caller may skip this call without it being an error.
    Idle,
    /// A fixed-capacity buffer or queue is full.
    Overflow,
    /// The RT memory pool is exhausted.
    OutOfMemory,
    /// Unknown sink/source id.
    NotFound,
    /// Caller-supplied buffer is too small to hold the result.
    InsufficientBuffer,
}

impl std::fmt::Display for AooError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AooError::BadArgument => write!(f, "bad argument"),
            AooError::NotImplemented => write!(f, "not implemented"),
            AooError::Idle => write!(f, "idle"),
            AooError::Overflow => write!(f, "buffer or queue overflow"),
            AooError::OutOfMemory => write!(f, "out of memory"),
            AooError::NotFound => write!(f, "not found"),
            AooError::InsufficientBuffer => write!(f, "insufficient buffer"),
        }
    }
}

impl std::error::Error for AooError {}

pub type AooResult<T> = Result<T, AooError>;
