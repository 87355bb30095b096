//! Codec abstraction.
//!
//! A codec is a named factory exposing encoder/decoder construction plus
//! stateless format (de)serialization. The registry is process-wide and
//! immutable after `initialize()` — registration is a one-time operation,
//! resolved by name at runtime instead of a fixed payload-type `match`.

pub mod opus;
pub mod pcm;

use std::collections::HashMap;
use std::sync::RwLock;

/// Codec-local error type: a plain enum with a manual `Display`/`Error`
/// impl, no derive-macro crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    NotInitialized,
    InvalidInput,
    BufferTooSmall,
    LibraryError(i32),
    Other(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::NotInitialized => write!(f, "codec not initialized"),
            CodecError::InvalidInput => write!(f, "invalid input data"),
            CodecError::BufferTooSmall => write!(f, "output buffer too small"),
            CodecError::LibraryError(code) => write!(f, "codec library error: {code}"),
            CodecError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Samples are interleaved float throughout the core; a codec's job is
/// purely to turn that into/from encoded bytes.
pub trait Encoder: Send {
    /// Encode `samples` (length `channels * block_size`) into `output`.
    /// Must either fill `output` and return the byte count, or fail with
    /// `BufferTooSmall`.
    fn encode(&mut self, samples: &[f32], output: &mut [u8]) -> Result<usize, CodecError>;
    fn reset(&mut self);
}

pub trait Decoder: Send {
    /// Decode `data` into `output` (interleaved float). `data` of `None`
    /// means "concealed/dropped block — produce silence".
    fn decode(&mut self, data: Option<&[u8]>, output: &mut [f32]) -> Result<usize, CodecError>;
    fn reset(&mut self);
}

/// A codec factory: knows how to build encoders/decoders for a given
/// format and how to (de)serialize its format tail bytes.
pub trait CodecFactory: Send + Sync {
    fn name(&self) -> &'static str;
    fn encoder_new(&self, channels: u16, sample_rate: u32, block_size: u32) -> Result<Box<dyn Encoder>, CodecError>;
    fn decoder_new(&self, channels: u16, sample_rate: u32, block_size: u32) -> Result<Box<dyn Decoder>, CodecError>;
    /// Serialize any codec-specific parameters beyond (channels, rate,
    /// block size) into the format header's tail bytes.
    fn serialize_format(&self) -> Vec<u8> {
        Vec::new()
    }
    fn deserialize_format(&self, _tail: &[u8]) -> Result<(), CodecError> {
        Ok(())
    }
}

/// Process-wide codec registry. Registration happens once, typically from
/// `initialize()`; lookups happen from the audio/network threads, hence
/// the `RwLock` rather than requiring exclusive access for reads.
pub struct CodecRegistry {
    factories: RwLock<HashMap<&'static str, Box<dyn CodecFactory>>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, factory: Box<dyn CodecFactory>) {
        let mut map = self.factories.write().unwrap();
        map.insert(factory.name(), factory);
    }

    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Box::new(pcm::PcmCodec::int16()));
        registry.register(Box::new(pcm::PcmCodec::int24()));
        registry.register(Box::new(pcm::PcmCodec::float32()));
        registry.register(Box::new(pcm::PcmCodec::float64()));
        registry.register(Box::new(opus::OpusCodec::new()));
        registry
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().unwrap().contains_key(name)
    }

    pub fn encoder_new(
        &self,
        name: &str,
        channels: u16,
        sample_rate: u32,
        block_size: u32,
    ) -> Result<Box<dyn Encoder>, CodecError> {
        let map = self.factories.read().unwrap();
        let factory = map
            .get(name)
            .ok_or_else(|| CodecError::Other(format!("unknown codec: {name}")))?;
        factory.encoder_new(channels, sample_rate, block_size)
    }

    pub fn decoder_new(
        &self,
        name: &str,
        channels: u16,
        sample_rate: u32,
        block_size: u32,
    ) -> Result<Box<dyn Decoder>, CodecError> {
        let map = self.factories.read().unwrap();
        let factory = map
            .get(name)
            .ok_or_else(|| CodecError::Other(format!("unknown codec: {name}")))?;
        factory.decoder_new(channels, sample_rate, block_size)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_builtins() {
        let r = CodecRegistry::with_builtins();
        assert!(r.contains("pcm_int16"));
        assert!(r.contains("pcm_int24"));
        assert!(r.contains("pcm_float32"));
        assert!(r.contains("pcm_float64"));
        assert!(r.contains("opus"));
    }

    #[test]
    fn unknown_codec_errors() {
        let r = CodecRegistry::with_builtins();
        assert!(r.encoder_new("nope", 2, 48000, 64).is_err());
    }
}
