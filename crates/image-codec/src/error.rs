//! Error types for the codecs

use std::fmt;

#[derive(Debug)]
pub enum CodecError {
    Encode(Box<image::ImageError>),
    Decode(Box<image::ImageError>),
    InvalidQuality(u8),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encode(err) => write!(f, "Failed to encode image: {}", err),
            CodecError::Decode(err) => write!(f, "Failed to decode image: {}", err),
            CodecError::InvalidQuality(q) => {
                write!(f, "JPEG quality must be between 1 and 100, got {}", q)
            }
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Encode(err) | CodecError::Decode(err) => Some(err.as_ref()),
            CodecError::InvalidQuality(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
