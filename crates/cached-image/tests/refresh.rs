//! End-to-end load/refresh behavior against a real on-disk cache

use cached_image::store::{BlobStore, CacheEvent, RecordingSink, IMAGES_DIR};
use cached_image::codec::JpegCodec;
use cached_image::{
    completion, CachedSlot, FetchError, ImageCache, InlineContext, LoadOutcome, QueueContext,
    RefreshOutcome, RefreshPolicy,
};
use image::{DynamicImage, Rgb, RgbImage};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::runtime::Handle;

type Seen = Arc<Mutex<Vec<DynamicImage>>>;

fn solid(color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb(color)))
}

fn same_color(image: &DynamicImage, color: [u8; 3]) -> bool {
    let pixel = image.to_rgb8().get_pixel(8, 8).0;
    pixel.iter().zip(color).all(|(a, b)| a.abs_diff(b) <= 4)
}

const A: [u8; 3] = [200, 30, 30];
const B: [u8; 3] = [30, 200, 30];
const C: [u8; 3] = [30, 30, 200];

fn create_cache(root: &Path, policy: RefreshPolicy) -> (Arc<ImageCache<DynamicImage>>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let store = BlobStore::new(root.join(IMAGES_DIR), sink.clone());
    let cache = ImageCache::new(store, JpegCodec::new(), Handle::current()).with_policy(policy);
    (Arc::new(cache), sink)
}

fn recording_slot(cache: &Arc<ImageCache<DynamicImage>>) -> (CachedSlot<DynamicImage>, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let slot = cache.slot(
        move |image: DynamicImage| sink.lock().unwrap().push(image),
        InlineContext,
    );
    (slot, seen)
}

fn colors_seen(seen: &Seen, expected: &[[u8; 3]]) -> bool {
    let seen = seen.lock().unwrap();
    seen.len() == expected.len()
        && seen
            .iter()
            .zip(expected)
            .all(|(image, color)| same_color(image, *color))
}

#[tokio::test]
async fn test_hit_without_refresh() {
    let dir = tempdir().unwrap();
    let (cache, _events) = create_cache(dir.path(), RefreshPolicy::default());
    cache.set_image(&solid(A), "k1").unwrap();
    let (slot, seen) = recording_slot(&cache);

    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    let outcome = slot.load_with_key_and_loader("k1", false, move || {
        flag.store(true, Ordering::SeqCst);
        async { Ok(solid(B)) }
    });

    assert!(matches!(outcome, LoadOutcome::Hit));
    assert!(colors_seen(&seen, &[A]));
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_hit_with_refresh_success() {
    let dir = tempdir().unwrap();
    let (cache, events) = create_cache(dir.path(), RefreshPolicy::default());
    cache.set_image(&solid(A), "k1").unwrap();
    let (slot, seen) = recording_slot(&cache);

    let outcome = slot.load_with_key_and_loader("k1", true, || async { Ok(solid(B)) });
    assert!(matches!(outcome, LoadOutcome::HitRefreshing(_)));

    // The cached value is visible before the refresh finishes
    assert!(colors_seen(&seen, &[A]));

    let result = outcome.refresh().unwrap().wait().await;
    assert!(matches!(result, RefreshOutcome::Updated { stored: true }));
    assert!(colors_seen(&seen, &[A, B]));
    assert!(same_color(&cache.image("k1").unwrap(), B));

    let events = events.events();
    assert!(events.contains(&CacheEvent::CacheHit {
        key: "k1".to_string()
    }));
    assert!(events.contains(&CacheEvent::FetchSucceeded {
        key: "k1".to_string()
    }));
}

#[tokio::test]
async fn test_miss_assigns_only_after_fetch() {
    for check_for_updates in [false, true] {
        let dir = tempdir().unwrap();
        let (cache, _events) = create_cache(dir.path(), RefreshPolicy::default());
        let (context, mut context_loop) = QueueContext::channel();
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let slot = cache.slot(
            move |image: DynamicImage| sink.lock().unwrap().push(image),
            context,
        );

        let (done, fetched) = completion::<DynamicImage>();
        let outcome = slot.load_with_key_and_loader("k2", check_for_updates, move || fetched);
        assert!(matches!(outcome, LoadOutcome::Miss(_)));

        // Nothing to show until the fetch completes
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(context_loop.run_pending(), 0);
        assert!(seen.lock().unwrap().is_empty());

        done.complete(Ok(solid(C)));
        let result = outcome.refresh().unwrap().wait().await;
        assert!(result.is_updated());

        assert_eq!(context_loop.run_pending(), 1);
        assert!(colors_seen(&seen, &[C]));
        assert!(same_color(&cache.image("k2").unwrap(), C));
    }
}

#[tokio::test]
async fn test_fetch_failure_keeps_cached_value() {
    let dir = tempdir().unwrap();
    let (cache, events) = create_cache(dir.path(), RefreshPolicy::default());
    cache.set_image(&solid(A), "k3").unwrap();
    let before = std::fs::read(cache.store().root().join("k3")).unwrap();
    let (slot, seen) = recording_slot(&cache);

    let outcome = slot.load_with_key_and_loader("k3", true, || async {
        Err(FetchError::Other("offline".to_string()))
    });
    let result = outcome.refresh().unwrap().wait().await;

    assert!(matches!(result, RefreshOutcome::Failed(FetchError::Other(_))));
    assert!(colors_seen(&seen, &[A]));
    assert_eq!(std::fs::read(cache.store().root().join("k3")).unwrap(), before);
    assert!(events
        .events()
        .iter()
        .any(|e| matches!(e, CacheEvent::FetchFailed { .. })));
}

#[tokio::test]
async fn test_unwritable_store_still_assigns_fetched_image() {
    let dir = tempdir().unwrap();
    // A plain file where the cache directory should be
    std::fs::write(dir.path().join(IMAGES_DIR), b"not a directory").unwrap();
    let (cache, events) = create_cache(dir.path(), RefreshPolicy::default());
    let (slot, seen) = recording_slot(&cache);

    let outcome = slot.load_with_key_and_loader("k", false, || async { Ok(solid(B)) });
    assert!(matches!(outcome, LoadOutcome::Miss(_)));
    let result = outcome.refresh().unwrap().wait().await;

    assert!(matches!(result, RefreshOutcome::Updated { stored: false }));
    assert!(colors_seen(&seen, &[B]));
    assert!(events
        .events()
        .iter()
        .any(|e| matches!(e, CacheEvent::DirectoryCreateFailed { .. })));
    assert!(!events
        .events()
        .iter()
        .any(|e| matches!(e, CacheEvent::Stored { .. })));
    assert!(cache.image("k").is_none());
}

#[tokio::test]
async fn test_abandoned_completion_is_a_failure() {
    let dir = tempdir().unwrap();
    let (cache, _events) = create_cache(dir.path(), RefreshPolicy::default());
    let (slot, seen) = recording_slot(&cache);

    let (done, fetched) = completion::<DynamicImage>();
    let outcome = slot.load_with_key_and_loader("k", false, move || fetched);
    drop(done);

    let result = outcome.refresh().unwrap().wait().await;
    assert!(matches!(result, RefreshOutcome::Failed(FetchError::Abandoned)));
    assert!(seen.lock().unwrap().is_empty());
    assert!(cache.image("k").is_none());
}

#[tokio::test]
async fn test_empty_key_touches_nothing() {
    let dir = tempdir().unwrap();
    let (cache, events) = create_cache(dir.path(), RefreshPolicy::default());
    let (slot, seen) = recording_slot(&cache);

    let outcome = slot.load_with_key_and_loader("", true, || async { Ok(solid(A)) });

    assert!(matches!(outcome, LoadOutcome::EmptyKey));
    assert!(seen.lock().unwrap().is_empty());
    assert!(!dir.path().join(IMAGES_DIR).exists());
    assert!(cache.set_image(&solid(A), "").is_err());
    assert!(!dir.path().join(IMAGES_DIR).exists());
    assert!(events.events().iter().all(|e| *e == CacheEvent::EmptyKey));
}

#[tokio::test]
async fn test_corrupt_blob_counts_as_miss() {
    let dir = tempdir().unwrap();
    let (cache, _events) = create_cache(dir.path(), RefreshPolicy::default());
    std::fs::create_dir_all(cache.store().root()).unwrap();
    std::fs::write(cache.store().root().join("k"), b"not a jpeg").unwrap();
    let (slot, seen) = recording_slot(&cache);

    let outcome = slot.load_with_key_and_loader("k", false, || async { Ok(solid(B)) });
    assert!(matches!(outcome, LoadOutcome::Miss(_)));

    outcome.refresh().unwrap().wait().await;
    assert!(colors_seen(&seen, &[B]));
    assert!(same_color(&cache.image("k").unwrap(), B));
}

#[tokio::test]
async fn test_url_key_is_escaped_on_disk() {
    let dir = tempdir().unwrap();
    let (cache, _events) = create_cache(dir.path(), RefreshPolicy::default());
    let (slot, seen) = recording_slot(&cache);
    let url = "https://example.com/images/logo.png";

    let outcome = slot.load_with_key_and_loader(url, false, || async { Ok(solid(C)) });
    outcome.refresh().unwrap().wait().await;

    assert!(colors_seen(&seen, &[C]));
    let names: Vec<String> = cache
        .store()
        .entries()
        .unwrap()
        .into_iter()
        .map(|e| e.key)
        .collect();
    assert_eq!(names, vec!["https:\\\\example.com\\images\\logo.png".to_string()]);
}

#[tokio::test]
async fn test_last_write_wins_applies_stale_result() {
    let dir = tempdir().unwrap();
    let (cache, _events) = create_cache(dir.path(), RefreshPolicy::LastWriteWins);
    let (slot, seen) = recording_slot(&cache);

    let (slow, slow_fetch) = completion::<DynamicImage>();
    let first = slot
        .load_with_key_and_loader("k", false, move || slow_fetch)
        .refresh()
        .unwrap();

    let second = slot
        .load_with_key_and_loader("k", false, || async { Ok(solid(B)) })
        .refresh()
        .unwrap();
    assert!(second.wait().await.is_updated());

    slow.complete(Ok(solid(A)));
    assert!(first.wait().await.is_updated());

    assert!(colors_seen(&seen, &[B, A]));
    assert!(same_color(&cache.image("k").unwrap(), A));
}

#[tokio::test]
async fn test_supersede_previous_drops_stale_result() {
    let dir = tempdir().unwrap();
    let (cache, events) = create_cache(dir.path(), RefreshPolicy::SupersedePrevious);
    let (slot, seen) = recording_slot(&cache);

    let (slow, slow_fetch) = completion::<DynamicImage>();
    let first = slot
        .load_with_key_and_loader("k", false, move || slow_fetch)
        .refresh()
        .unwrap();

    let second = slot
        .load_with_key_and_loader("k", false, || async { Ok(solid(B)) })
        .refresh()
        .unwrap();
    assert!(second.wait().await.is_updated());

    slow.complete(Ok(solid(A)));
    assert!(matches!(first.wait().await, RefreshOutcome::Superseded));

    assert!(colors_seen(&seen, &[B]));
    assert!(same_color(&cache.image("k").unwrap(), B));
    assert!(!events
        .events()
        .iter()
        .any(|e| matches!(e, CacheEvent::FetchFailed { .. })));
}

#[tokio::test]
async fn test_supersede_previous_drops_queued_assignment() {
    let dir = tempdir().unwrap();
    let (cache, _events) = create_cache(dir.path(), RefreshPolicy::SupersedePrevious);
    cache.set_image(&solid(A), "old").unwrap();
    cache.set_image(&solid(B), "new").unwrap();

    let (context, mut context_loop) = QueueContext::channel();
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let slot = cache.slot(
        move |image: DynamicImage| sink.lock().unwrap().push(image),
        context,
    );

    // Both hits are queued before the consumer context gets to run
    assert!(slot
        .load_with_key_and_loader("old", false, || async { Ok(solid(C)) })
        .is_hit());
    assert!(slot
        .load_with_key_and_loader("new", false, || async { Ok(solid(C)) })
        .is_hit());

    assert_eq!(context_loop.run_pending(), 2);
    assert!(colors_seen(&seen, &[B]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_serialize_per_key_never_overlaps_fetches() {
    let dir = tempdir().unwrap();
    let (cache, _events) = create_cache(dir.path(), RefreshPolicy::SerializePerKey);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    let mut slots = Vec::new();
    for color in [A, B, C] {
        let (slot, _seen) = recording_slot(&cache);
        let active = active.clone();
        let peak = peak.clone();
        let outcome = slot.load_with_key_and_loader("shared", true, move || async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(solid(color))
        });
        handles.push(outcome.refresh().unwrap());
        slots.push(slot);
    }

    for handle in handles {
        assert!(handle.wait().await.is_updated());
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(cache.image("shared").is_some());
}

#[tokio::test]
async fn test_clear_then_every_load_misses() {
    let dir = tempdir().unwrap();
    let (cache, _events) = create_cache(dir.path(), RefreshPolicy::default());
    for key in ["a", "b/c", "d"] {
        cache.set_image(&solid(A), key).unwrap();
    }

    assert_eq!(cache.remove_images().unwrap(), 3);

    let (slot, seen) = recording_slot(&cache);
    for key in ["a", "b/c", "d"] {
        let outcome = slot.load_with_key_and_loader(key, false, || async {
            Err(FetchError::Other("offline".to_string()))
        });
        assert!(matches!(outcome, LoadOutcome::Miss(_)));
        outcome.refresh().unwrap().wait().await;
    }
    assert!(seen.lock().unwrap().is_empty());
}
