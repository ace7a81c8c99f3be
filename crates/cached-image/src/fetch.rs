//! Fetching fresh objects
//!
//! A loader is any future resolving to a [`FetchResult`]. A future completes
//! exactly once, which is the contract the refresh logic relies on. Loaders
//! written in callback style can use [`completion`] to get a single-use
//! [`Completion`] plus the future to hand to the cache.

use crate::error::FetchError;
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use url::Url;

pub type FetchResult<T> = std::result::Result<T, FetchError>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_USER_AGENT: &str = concat!("image-defaults/", env!("CARGO_PKG_VERSION"));

/// Single-use completion callback for a loader
#[derive(Debug)]
pub struct Completion<T> {
    tx: oneshot::Sender<FetchResult<T>>,
}

impl<T> Completion<T> {
    /// Deliver the loader's result. Consumes the completion, so it can only
    /// be called once.
    pub fn complete(self, result: FetchResult<T>) {
        // The receiving refresh may already be cancelled
        let _ = self.tx.send(result);
    }
}

/// Create a completion and the future that resolves when it is called.
///
/// Dropping the completion without calling it resolves the future with
/// [`FetchError::Abandoned`].
pub fn completion<T>() -> (Completion<T>, impl Future<Output = FetchResult<T>> + Send)
where
    T: Send,
{
    let (tx, rx) = oneshot::channel();
    let future = async move { rx.await.unwrap_or(Err(FetchError::Abandoned)) };
    (Completion { tx }, future)
}

/// HTTP client for the default URL loader
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build configured HTTP client, using defaults");
            Self {
                client: reqwest::Client::new(),
            }
        })
    }

    pub fn with_config(timeout: Duration, user_agent: &str) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// Download the body at `url`
    pub async fn fetch(&self, url: &str) -> FetchResult<Vec<u8>> {
        let url = Url::parse(url)?;
        debug!(url = %url, "Downloading");

        let response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), url = %url, "Failed to download");
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let data = response.bytes().await?.to_vec();
        debug!(url = %url, size = data.len(), "Downloaded");

        Ok(data)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}
