//! Cached image loading
//!
//! Serves objects from a disk cache immediately and refreshes them in the
//! background. Build one [`ImageCache`] at startup, then create a
//! [`CachedSlot`] for each consumer that displays an object.

mod cache;
mod context;
mod error;
mod fetch;
mod policy;
mod slot;

pub use cache::ImageCache;
pub use context::{ConsumerContext, ContextLoop, InlineContext, QueueContext, Task};
pub use error::{FetchError, ImageCacheError, Result};
pub use fetch::{completion, Completion, FetchResult, HttpFetcher};
pub use policy::RefreshPolicy;
pub use slot::{CachedSlot, Consumer, LoadOutcome, RefreshHandle, RefreshOutcome};

pub use file_blob_cache as store;
pub use image_codec as codec;

/// Image cache storing `DynamicImage`s as JPEG
pub type ImageDefaults = ImageCache<image::DynamicImage>;
