//! Concurrent pixel decompression
//!
//! The decode pool runs one decompression task per frame in a bounded set
//! of worker threads, off the caller's thread; everything else in the
//! pipeline stays synchronous.

pub mod codec;
pub mod pool;
pub mod rle;

pub use codec::{Algorithm, PixelMeta};
pub use pool::{AbortHandle, DecodeItem, DecodePool, DecodeTask, PixelBufferDecoder, PoolMessage};

use thiserror::Error;

/// Errors raised by pixel decompression; fatal to the file being loaded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported decompression algorithm '{name}'")]
    UnsupportedAlgorithm { name: String },

    #[error("malformed {algorithm} stream: {reason}")]
    Malformed {
        algorithm: &'static str,
        reason: String,
    },

    #[error("decoded frame size mismatch: got {got} bytes, expected {expected}")]
    SizeMismatch { got: usize, expected: usize },
}
