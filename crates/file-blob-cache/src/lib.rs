//! File-based blob cache
//!
//! Stores opaque binary blobs as individual files in one flat directory.
//! Keys are escaped into single path segments before they touch the
//! filesystem, and every operation reports what it did through an
//! injected [`EventSink`].

mod error;
mod events;
mod key;
mod store;
mod types;

pub use error::{CacheError, Result};
pub use events::{CacheEvent, EventSink, RecordingSink, TracingSink};
pub use key::{escape, sanitize, SafeKey, ESCAPE_CHAR, PATH_SEPARATOR};
pub use store::{default_cache_root, BlobStore, IMAGES_DIR};
pub use types::{CacheEntry, CacheStats};
