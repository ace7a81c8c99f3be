//! Codecs between cached objects and stored blobs
//!
//! The cache stores opaque bytes; a codec decides what those bytes mean.
//! [`JpegCodec`] stores images as fixed-quality JPEG, [`BytesCodec`] stores
//! byte vectors as-is.

mod error;
mod jpeg;

pub use error::{CodecError, Result};
pub use jpeg::JpegCodec;

/// Converts objects to and from the bytes kept in the store.
///
/// `encode` may be lossy but must be deterministic for a given input;
/// `decode` must fail with an error, never panic, on malformed bytes.
pub trait ObjectCodec<T>: Send + Sync {
    fn encode(&self, object: &T) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// Identity codec for raw byte blobs
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesCodec;

impl ObjectCodec<Vec<u8>> for BytesCodec {
    fn encode(&self, object: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(object.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}
