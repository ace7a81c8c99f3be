//! Flat-directory blob storage

use crate::error::{CacheError, Result};
use crate::events::{CacheEvent, EventSink};
use crate::key::SafeKey;
use crate::types::{CacheEntry, CacheStats};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Name of the directory holding all cached blobs
pub const IMAGES_DIR: &str = "UIImageDefaultsImages";

/// Default cache root: the per-user documents directory joined with [`IMAGES_DIR`]
pub fn default_cache_root() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(IMAGES_DIR)
}

/// A blob store backed by one flat directory, one file per key.
///
/// The directory is created on the first write, never by reads. Operations on
/// the same key are serialized; different keys never block each other.
pub struct BlobStore {
    /// Directory where blobs are stored
    root: PathBuf,
    events: Arc<dyn EventSink>,
    /// Locks of keys with an operation in progress
    locks: Mutex<HashMap<SafeKey, Arc<Mutex<()>>>>,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>, events: Arc<dyn EventSink>) -> Self {
        Self {
            root: root.into(),
            events,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Location of the file backing `key`
    pub fn path_for(&self, key: &SafeKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// Every caller drops its handle on the lock while holding the map, so the
    /// last one out sees itself as the only user and removes the entry. The
    /// map only ever holds keys with an operation in progress.
    fn with_key_lock<R>(&self, key: &SafeKey, f: impl FnOnce() -> R) -> R {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.clone()).or_default().clone()
        };

        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(key);
        }
        result
    }

    /// Read the blob stored under `key`, distinguishing absence from failure
    pub fn try_read(&self, key: &SafeKey) -> Result<Option<Vec<u8>>> {
        self.with_key_lock(key, || match fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::Read(key.to_string(), Box::new(e))),
        })
    }

    /// Read the blob stored under `key`.
    ///
    /// Unreadable files are reported and treated the same as missing ones.
    pub fn read(&self, key: &SafeKey) -> Option<Vec<u8>> {
        match self.try_read(key) {
            Ok(data) => data,
            Err(e) => {
                self.events.emit(CacheEvent::ReadFailed {
                    key: key.to_string(),
                    error: e.to_string(),
                });
                None
            }
        }
    }

    fn ensure_root(&self) -> Result<()> {
        if self.root.is_dir() {
            return Ok(());
        }

        match fs::create_dir_all(&self.root) {
            Ok(()) => {
                self.events.emit(CacheEvent::DirectoryCreated {
                    path: self.root.clone(),
                });
                Ok(())
            }
            Err(e) => {
                self.events.emit(CacheEvent::DirectoryCreateFailed {
                    path: self.root.clone(),
                    error: e.to_string(),
                });
                Err(CacheError::DirectoryCreate(self.root.clone(), Box::new(e)))
            }
        }
    }

    /// Store `data` under `key`, replacing any previous blob.
    ///
    /// The old file is removed before the new one is written, so a crash in
    /// between leaves the key empty.
    pub fn write(&self, key: &SafeKey, data: &[u8]) -> Result<()> {
        self.ensure_root()?;
        self.with_key_lock(key, || self.replace(key, data))
    }

    fn replace(&self, key: &SafeKey, data: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                // The write below still gets its chance to replace the file.
                self.events.emit(CacheEvent::RemoveFailed {
                    key: key.to_string(),
                    error: e.to_string(),
                });
            }
        }

        if let Err(e) = fs::write(&path, data) {
            self.events.emit(CacheEvent::WriteFailed {
                key: key.to_string(),
                error: e.to_string(),
            });
            return Err(CacheError::Write(key.to_string(), Box::new(e)));
        }

        self.events.emit(CacheEvent::Stored {
            key: key.to_string(),
            size: data.len(),
        });
        Ok(())
    }

    /// Delete the blob under `key`. Returns whether anything was removed.
    pub fn delete(&self, key: &SafeKey) -> Result<bool> {
        self.with_key_lock(key, || match fs::remove_file(self.path_for(key)) {
            Ok(()) => {
                self.events.emit(CacheEvent::Removed {
                    key: key.to_string(),
                });
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.events.emit(CacheEvent::NotPresent {
                    key: key.to_string(),
                });
                Ok(false)
            }
            Err(e) => {
                self.events.emit(CacheEvent::RemoveFailed {
                    key: key.to_string(),
                    error: e.to_string(),
                });
                Err(CacheError::Delete(key.to_string(), Box::new(e)))
            }
        })
    }

    /// Delete every entry in the cache directory, one at a time in name order.
    ///
    /// Stops at the first failure; entries removed before it stay removed.
    pub fn clear(&self) -> Result<usize> {
        self.clear_with(|path, is_dir| {
            if is_dir {
                fs::remove_dir_all(path)
            } else {
                fs::remove_file(path)
            }
        })
    }

    fn clear_with(
        &self,
        mut remove: impl FnMut(&Path, bool) -> io::Result<()>,
    ) -> Result<usize> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.events.emit(CacheEvent::Cleared { count: 0 });
                return Ok(0);
            }
            Err(e) => {
                let err = CacheError::List(self.root.clone(), Box::new(e));
                return Err(self.clear_failed(err));
            }
        };

        let mut listed = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| {
                self.clear_failed(CacheError::List(self.root.clone(), Box::new(e)))
            })?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            listed.push((SafeKey::from_file_name(name), entry.path(), is_dir));
        }
        listed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut count = 0;
        for (key, path, is_dir) in listed {
            match self.with_key_lock(&key, || remove(&path, is_dir)) {
                Ok(()) => count += 1,
                // Deleted concurrently
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    let err = CacheError::Delete(key.to_string(), Box::new(e));
                    return Err(self.clear_failed(err));
                }
            }
        }

        self.events.emit(CacheEvent::Cleared { count });
        Ok(count)
    }

    fn clear_failed(&self, err: CacheError) -> CacheError {
        self.events.emit(CacheEvent::ClearFailed {
            error: err.to_string(),
        });
        err
    }

    /// List stored blobs, sorted by key
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::List(self.root.clone(), Box::new(e))),
        };

        let mut entries = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| CacheError::List(self.root.clone(), Box::new(e)))?;
            let metadata = match entry.metadata() {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                // Deleted between listing and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(CacheError::List(self.root.clone(), Box::new(e))),
            };

            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            entries.push(CacheEntry {
                key: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                size: metadata.len(),
                modified,
            });
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Entry count and total size of the stored blobs
    pub fn stats(&self) -> Result<CacheStats> {
        let entries = self.entries()?;
        Ok(CacheStats {
            entries: entries.len(),
            total_size: entries.iter().map(|e| e.size).sum(),
            ..CacheStats::default()
        })
    }
}
