//! Observability port
//!
//! Every component reports through a single [`EventSink`] instead of logging
//! directly, so tests can assert on what happened.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Something observable that happened inside the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A caller passed an empty key; the operation was skipped
    EmptyKey,
    /// Path separators were replaced in a key
    KeyEscaped { raw: String, escaped: String },
    DirectoryCreated { path: PathBuf },
    DirectoryCreateFailed { path: PathBuf, error: String },
    ReadFailed { key: String, error: String },
    Stored { key: String, size: usize },
    WriteFailed { key: String, error: String },
    Removed { key: String },
    RemoveFailed { key: String, error: String },
    /// Delete was asked for a key that has nothing stored
    NotPresent { key: String },
    Cleared { count: usize },
    ClearFailed { error: String },
    CacheHit { key: String },
    CacheMiss { key: String },
    DecodeFailed { key: String, error: String },
    EncodeFailed { key: String, error: String },
    FetchStarted { key: String },
    FetchSucceeded { key: String },
    FetchFailed { key: String, error: String },
    /// A refresh result arrived for a request that was replaced by a newer one
    Superseded { key: String },
}

/// Receiver of cache events. Must never affect control flow.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: CacheEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: CacheEvent) {
        match event {
            CacheEvent::EmptyKey => error!("Image key cannot be empty"),
            CacheEvent::KeyEscaped { raw, escaped } => warn!(
                raw = %raw,
                escaped = %escaped,
                "Key contains '/' characters, storing under escaped key"
            ),
            CacheEvent::DirectoryCreated { path } => {
                info!(path = ?path, "Created cache directory")
            }
            CacheEvent::DirectoryCreateFailed { path, error } => {
                error!(path = ?path, error = %error, "Failed to create cache directory")
            }
            CacheEvent::ReadFailed { key, error } => {
                error!(key = %key, error = %error, "Failed to read cached blob")
            }
            CacheEvent::Stored { key, size } => {
                debug!(key = %key, size, "Wrote blob to cache")
            }
            CacheEvent::WriteFailed { key, error } => {
                error!(key = %key, error = %error, "Failed to write blob")
            }
            CacheEvent::Removed { key } => debug!(key = %key, "Removed cached blob"),
            CacheEvent::RemoveFailed { key, error } => {
                error!(key = %key, error = %error, "Failed to delete cached blob")
            }
            CacheEvent::NotPresent { key } => {
                warn!(key = %key, "Could not remove blob as it does not exist")
            }
            CacheEvent::Cleared { count } => info!(count, "Removed all blobs from storage"),
            CacheEvent::ClearFailed { error } => {
                error!(error = %error, "Failed to remove blobs")
            }
            CacheEvent::CacheHit { key } => debug!(key = %key, "Cache hit"),
            CacheEvent::CacheMiss { key } => debug!(key = %key, "Cache miss"),
            CacheEvent::DecodeFailed { key, error } => {
                warn!(key = %key, error = %error, "Failed to decode cached blob")
            }
            CacheEvent::EncodeFailed { key, error } => {
                error!(key = %key, error = %error, "Failed to encode object for cache")
            }
            CacheEvent::FetchStarted { key } => debug!(key = %key, "Fetching"),
            CacheEvent::FetchSucceeded { key } => {
                info!(key = %key, "Fetched fresh copy, saving to cache")
            }
            CacheEvent::FetchFailed { key, error } => {
                warn!(key = %key, error = %error, "Fetch failed")
            }
            CacheEvent::Superseded { key } => {
                debug!(key = %key, "Dropping result of superseded request")
            }
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<CacheEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far
    pub fn events(&self) -> Vec<CacheEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, event: &CacheEvent) -> bool {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(event)
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: CacheEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.emit(CacheEvent::EmptyKey);
        sink.emit(CacheEvent::Cleared { count: 2 });

        assert_eq!(
            sink.events(),
            vec![CacheEvent::EmptyKey, CacheEvent::Cleared { count: 2 }]
        );
        assert!(sink.contains(&CacheEvent::EmptyKey));

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_tracing_sink_accepts_every_event() {
        // No subscriber installed; emitting must still be a silent no-op.
        let sink = TracingSink;
        sink.emit(CacheEvent::Stored {
            key: "k".to_string(),
            size: 3,
        });
        sink.emit(CacheEvent::ClearFailed {
            error: "denied".to_string(),
        });
    }
}
