//! Configuration for the image-defaults command

use crate::error::{ImageDefaultsError, Result};
use cached_image::RefreshPolicy;
use file_blob_cache::default_cache_root;
use image_codec::JpegCodec;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ImageDefaultsConfig {
    pub cache_dir: PathBuf,
    pub jpeg_quality: u8,
    pub refresh_policy: RefreshPolicy,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ImageDefaultsConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_root(),
            jpeg_quality: JpegCodec::DEFAULT_QUALITY,
            refresh_policy: RefreshPolicy::default(),
            fetch_timeout_secs: 30,
            user_agent: concat!("image-defaults/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ImageDefaultsConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let cache_dir = lookup("IMAGE_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let jpeg_quality = lookup("JPEG_QUALITY")
            .and_then(|s| s.parse::<u8>().ok())
            .unwrap_or(defaults.jpeg_quality);

        let refresh_policy = match lookup("REFRESH_POLICY") {
            Some(s) => s.parse().map_err(ImageDefaultsError::Config)?,
            None => defaults.refresh_policy,
        };

        let fetch_timeout_secs = lookup("FETCH_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.fetch_timeout_secs);

        let user_agent = lookup("USER_AGENT").unwrap_or(defaults.user_agent);

        Ok(Self {
            cache_dir,
            jpeg_quality,
            refresh_policy,
            fetch_timeout_secs,
            user_agent,
        })
    }
}
