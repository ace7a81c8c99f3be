//! Error types for cached image loading

use file_blob_cache::CacheError;
use image_codec::CodecError;
use std::fmt;

/// Why a fetch produced no object
#[derive(Debug)]
pub enum FetchError {
    Http(Box<reqwest::Error>),
    Status(u16),
    InvalidUrl(String),
    Decode(CodecError),
    /// The completion handed to a loader was dropped without being called
    Abandoned,
    Other(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Http(err) => write!(f, "HTTP error: {}", err),
            FetchError::Status(status) => write!(f, "Server returned status {}", status),
            FetchError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            FetchError::Decode(err) => write!(f, "Fetched data is not an image: {}", err),
            FetchError::Abandoned => write!(f, "Loader finished without a result"),
            FetchError::Other(msg) => write!(f, "Fetch failed: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Http(err) => Some(err.as_ref()),
            FetchError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(Box::new(err))
    }
}

impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        FetchError::InvalidUrl(err.to_string())
    }
}

impl From<CodecError> for FetchError {
    fn from(err: CodecError) -> Self {
        FetchError::Decode(err)
    }
}

/// Failure of a direct cache operation such as saving an image
#[derive(Debug)]
pub enum ImageCacheError {
    Cache(CacheError),
    Codec(CodecError),
}

impl fmt::Display for ImageCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageCacheError::Cache(err) => write!(f, "Cache error: {}", err),
            ImageCacheError::Codec(err) => write!(f, "Codec error: {}", err),
        }
    }
}

impl std::error::Error for ImageCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImageCacheError::Cache(err) => Some(err),
            ImageCacheError::Codec(err) => Some(err),
        }
    }
}

impl From<CacheError> for ImageCacheError {
    fn from(err: CacheError) -> Self {
        ImageCacheError::Cache(err)
    }
}

impl From<CodecError> for ImageCacheError {
    fn from(err: CodecError) -> Self {
        ImageCacheError::Codec(err)
    }
}

pub type Result<T> = std::result::Result<T, ImageCacheError>;
