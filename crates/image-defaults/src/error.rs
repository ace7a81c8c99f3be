//! Error types for the image-defaults command

use cached_image::{FetchError, ImageCacheError};
use std::fmt;

#[derive(Debug)]
pub enum ImageDefaultsError {
    Cache(ImageCacheError),
    Fetch(FetchError),
    Image(Box<image::ImageError>),
    Json(Box<serde_json::Error>),
    Config(String),
}

impl fmt::Display for ImageDefaultsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageDefaultsError::Cache(err) => write!(f, "{}", err),
            ImageDefaultsError::Fetch(err) => write!(f, "{}", err),
            ImageDefaultsError::Image(err) => write!(f, "Image error: {}", err),
            ImageDefaultsError::Json(err) => write!(f, "JSON error: {}", err),
            ImageDefaultsError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ImageDefaultsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImageDefaultsError::Cache(err) => Some(err),
            ImageDefaultsError::Fetch(err) => Some(err),
            ImageDefaultsError::Image(err) => Some(err.as_ref()),
            ImageDefaultsError::Json(err) => Some(err.as_ref()),
            ImageDefaultsError::Config(_) => None,
        }
    }
}

impl From<ImageCacheError> for ImageDefaultsError {
    fn from(err: ImageCacheError) -> Self {
        ImageDefaultsError::Cache(err)
    }
}

impl From<file_blob_cache::CacheError> for ImageDefaultsError {
    fn from(err: file_blob_cache::CacheError) -> Self {
        ImageDefaultsError::Cache(err.into())
    }
}

impl From<image_codec::CodecError> for ImageDefaultsError {
    fn from(err: image_codec::CodecError) -> Self {
        ImageDefaultsError::Cache(err.into())
    }
}

impl From<FetchError> for ImageDefaultsError {
    fn from(err: FetchError) -> Self {
        ImageDefaultsError::Fetch(err)
    }
}

impl From<image::ImageError> for ImageDefaultsError {
    fn from(err: image::ImageError) -> Self {
        ImageDefaultsError::Image(Box::new(err))
    }
}

impl From<serde_json::Error> for ImageDefaultsError {
    fn from(err: serde_json::Error) -> Self {
        ImageDefaultsError::Json(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ImageDefaultsError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ImageDefaultsError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ImageDefaultsError>;
