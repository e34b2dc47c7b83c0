//! # Shared File Cache
//!
//! Process-wide registry mapping a normalized absolute file path to one
//! [`FileCache`]: the loaded table buffers, the storage file manager, the
//! per-file write queue, and a commit gate, all shared by every context open
//! on that path.
//!
//! ## Why process-wide
//!
//! Multiple contexts on one file must agree on one authoritative in-memory
//! state; reloading per context would duplicate memory and miss writes made
//! through sibling contexts. The cache therefore outlives any single context:
//! it is created when the first context on a path opens and torn down only by
//! an explicit [`release_shared_cache`] (or [`release_all`]) once the
//! reference count reaches zero. Dropping a context never releases it.
//!
//! ## Lifetime
//!
//! `acquire` creates-or-returns the cache and increments its reference count;
//! `release_shared_cache` decrements it, and at zero flushes the write queue,
//! shuts it down, and drops the cache. Host programs call `release_all` at
//! process shutdown.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use hashbrown::HashMap;
use log::debug;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{Result, StoreError};
use crate::schema::StoreSchema;
use crate::storage::{FileWriteQueue, StorageFileManager};

/// Type-erased table buffer slot. The typed buffer lives in the database
/// layer; the cache only stores and hands it back.
pub(crate) struct TableSlot {
    pub(crate) buffer: Box<dyn Any + Send + Sync>,
}

/// The shared in-memory state of one store file.
pub struct FileCache {
    path: PathBuf,
    manager: Mutex<StorageFileManager>,
    tables: RwLock<HashMap<String, TableSlot>>,
    commit_gate: AsyncMutex<()>,
    queue: FileWriteQueue,
    refs: AtomicUsize,
}

impl FileCache {
    /// The normalized path this cache is keyed by.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits until every write submitted so far has finished.
    pub fn flush(&self) -> Result<()> {
        self.queue.flush()
    }

    pub(crate) fn manager(&self) -> &Mutex<StorageFileManager> {
        &self.manager
    }

    pub(crate) fn tables(&self) -> &RwLock<HashMap<String, TableSlot>> {
        &self.tables
    }

    /// Serializes commits: the holder of this gate is the only commit in
    /// flight for the file.
    pub(crate) fn commit_gate(&self) -> &AsyncMutex<()> {
        &self.commit_gate
    }

    pub(crate) fn queue(&self) -> &FileWriteQueue {
        &self.queue
    }
}

fn registry() -> &'static Mutex<HashMap<PathBuf, Arc<FileCache>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Arc<FileCache>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Resolves a path to its canonical absolute form. For files that do not
/// exist yet, the parent directory is canonicalized and the file name
/// re-attached, so sibling contexts agree on the key before the file is
/// first written.
pub(crate) fn normalize_path(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| StoreError::config(format!("path {:?} has no file name", path)))?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.canonicalize()?,
        _ => std::env::current_dir()?,
    };

    Ok(parent.join(file_name))
}

/// Returns the cache for a path, creating and opening it on first use, and
/// increments its reference count.
pub(crate) fn acquire(path: &Path, schema: &StoreSchema) -> Result<Arc<FileCache>> {
    let normalized = normalize_path(path)?;
    let mut map = registry().lock();

    if let Some(cache) = map.get(&normalized) {
        cache.refs.fetch_add(1, Ordering::SeqCst);
        debug!("joined shared cache for {:?}", normalized);
        return Ok(Arc::clone(cache));
    }

    let manager = StorageFileManager::open(&normalized, schema)?;
    let label = normalized
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    let queue = FileWriteQueue::start(&label)?;

    let cache = Arc::new(FileCache {
        path: normalized.clone(),
        manager: Mutex::new(manager),
        tables: RwLock::new(HashMap::new()),
        commit_gate: AsyncMutex::new(()),
        queue,
        refs: AtomicUsize::new(1),
    });

    debug!("created shared cache for {:?}", normalized);
    map.insert(normalized, Arc::clone(&cache));
    Ok(cache)
}

/// Decrements the reference count for a path's cache. At zero, flushes the
/// write queue, shuts it down, and drops the cache. Releasing a path with no
/// cache is a no-op.
pub fn release_shared_cache(path: &Path) -> Result<()> {
    let normalized = normalize_path(path)?;

    let torn_down = {
        let mut map = registry().lock();
        let Some(cache) = map.get(&normalized) else {
            return Ok(());
        };
        // Reference counts only change under the registry lock, so an entry
        // always has at least one reference here.
        if cache.refs.fetch_sub(1, Ordering::SeqCst) == 1 {
            map.remove(&normalized)
        } else {
            None
        }
    };

    if let Some(cache) = torn_down {
        debug!("releasing shared cache for {:?}", cache.path);
        let flushed = cache.queue.flush();
        cache.queue.shutdown();
        flushed?;
    }

    Ok(())
}

/// Releases every remaining cache regardless of reference counts. Intended
/// for host programs at process shutdown.
pub fn release_all() -> Result<()> {
    let caches: Vec<Arc<FileCache>> = {
        let mut map = registry().lock();
        map.drain().map(|(_, cache)| cache).collect()
    };

    let mut first_error = None;
    for cache in caches {
        debug!("releasing shared cache for {:?}", cache.path);
        if let Err(e) = cache.queue.flush() {
            first_error.get_or_insert(e);
        }
        cache.queue.shutdown();
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableDef;
    use tempfile::tempdir;

    fn schema() -> StoreSchema {
        StoreSchema::new(vec![TableDef::new("T", 9)]).unwrap()
    }

    #[test]
    fn acquire_twice_returns_the_same_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");

        let a = acquire(&path, &schema()).unwrap();
        let b = acquire(&path, &schema()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        release_shared_cache(&path).unwrap();
        release_shared_cache(&path).unwrap();
    }

    #[test]
    fn release_tears_down_at_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");

        let first = acquire(&path, &schema()).unwrap();
        release_shared_cache(&path).unwrap();

        // A fresh acquire after teardown builds a new cache object.
        let second = acquire(&path, &schema()).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        release_shared_cache(&path).unwrap();
    }

    #[test]
    fn release_of_unknown_path_is_a_no_op() {
        let dir = tempdir().unwrap();
        release_shared_cache(&dir.path().join("nothing.db")).unwrap();
    }

    #[test]
    fn normalization_unifies_spellings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let dotted = dir.path().join(".").join("store.db");

        let a = acquire(&path, &schema()).unwrap();
        let b = acquire(&dotted, &schema()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        release_shared_cache(&path).unwrap();
        release_shared_cache(&dotted).unwrap();
    }
}
