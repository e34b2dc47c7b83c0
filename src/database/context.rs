//! # Context Façade
//!
//! A [`Context`] binds a declared schema (an ordered list of table-name /
//! entity-type pairs) to one store file. On open it normalizes the path,
//! acquires the process-wide shared cache (creating and validating the file
//! on first use), loads any table buffers not yet in the cache, and hands
//! out typed [`TableHandle`]s bound to its own change tracker.
//!
//! ## Commit
//!
//! `save_changes` / `save_changes_async` are the only mutation points of the
//! file. One commit at a time runs per file (the cache's commit gate); for
//! each declared table with tracked changes, the commit drains the tracker
//! atomically with building the encoded batch, submits one `apply_changes`
//! job to the write queue, and waits for it before moving to the next table.
//! On success the tracker stays empty; on failure or cancellation the
//! drained changes are merged back, so the caller can inspect and retry. The
//! in-memory buffers already reflect the user's calls either way.
//!
//! ## Lifecycle
//!
//! `close` is explicit and idempotent; any operation afterwards fails with
//! `Disposed`. Neither closing nor dropping a context releases the shared
//! cache: call [`release_shared_cache`](crate::cache::release_shared_cache)
//! once no context on the path will be reopened.

use std::any::TypeId;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::trace;
use smallvec::SmallVec;
use tokio_util::sync::CancellationToken;

use crate::cache::{self, FileCache};
use crate::database::change_tracker::ChangeTracker;
use crate::database::table::{load_table_into_cache, TableHandle};
use crate::error::{Result, StoreError};
use crate::records::RecordCodec;
use crate::schema::{Entity, EntityLayout, StoreSchema, TableDef};

/// One table's encoded changes, ready for the write queue.
struct TableBatch {
    table: String,
    added: Vec<(i32, Vec<u8>)>,
    modified: Vec<(i32, Vec<u8>)>,
    deleted: Vec<i32>,
}

type RestoreFn = Box<dyn FnOnce(&ChangeTracker) + Send>;
type LoadFn = Box<dyn Fn(&FileCache) -> Result<()> + Send + Sync>;
type BatchFn =
    Box<dyn Fn(&FileCache, &ChangeTracker) -> Result<Option<(TableBatch, RestoreFn)>> + Send + Sync>;

struct TableDecl {
    name: String,
    entity_type: TypeId,
    layout: fn() -> Result<Arc<EntityLayout>>,
    load: LoadFn,
    batch: BatchFn,
}

/// Drains a table's tracked changes and encodes them into a write batch,
/// under the buffer write lock so no add or remove interleaves. Returns the
/// batch together with the closure that undoes the drain if the commit
/// fails.
fn build_batch<E: Entity>(
    cache: &FileCache,
    tracker: &ChangeTracker,
    name: &str,
) -> Result<Option<(TableBatch, RestoreFn)>> {
    let codec = RecordCodec::new(EntityLayout::of::<E>()?);

    let _buffers = cache.tables().write();
    let changes = tracker.take_table::<E>(name)?;
    if changes.is_empty() {
        return Ok(None);
    }

    let encode_all = |list: &[crate::database::tracked::Tracked<E>]| {
        list.iter()
            .map(|tracked| {
                let entity = tracked.read();
                Ok((entity.id(), codec.encode_entity(&*entity)?))
            })
            .collect::<Result<Vec<_>>>()
    };

    let encoded: Result<TableBatch> = (|| {
        let added = encode_all(changes.added())?;
        let modified = encode_all(changes.modified())?;
        let deleted = changes
            .deleted()
            .iter()
            .map(|tracked| tracked.id())
            .filter(|id| *id >= 1)
            .collect();
        Ok(TableBatch {
            table: name.to_string(),
            added,
            modified,
            deleted,
        })
    })();

    match encoded {
        Ok(batch) => {
            let table = name.to_string();
            let restore: RestoreFn =
                Box::new(move |tracker| tracker.restore_table::<E>(&table, changes));
            Ok(Some((batch, restore)))
        }
        Err(e) => {
            tracker.restore_table::<E>(name, changes);
            Err(e)
        }
    }
}

/// Builder for a [`Context`]: the file path plus the declared tables.
pub struct ContextBuilder {
    path: Option<PathBuf>,
    decls: Vec<TableDecl>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            path: None,
            decls: Vec::new(),
        }
    }

    /// The store file this context binds to. Created on first open.
    pub fn path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Declares a table. Declaration order is the on-disk layout order.
    pub fn table<E: Entity>(mut self, name: &str) -> Self {
        let load_name = name.to_string();
        let batch_name = name.to_string();

        self.decls.push(TableDecl {
            name: name.to_string(),
            entity_type: TypeId::of::<E>(),
            layout: EntityLayout::of::<E>,
            load: Box::new(move |cache| load_table_into_cache::<E>(cache, &load_name)),
            batch: Box::new(move |cache, tracker| build_batch::<E>(cache, tracker, &batch_name)),
        });
        self
    }

    /// Opens the context: validates the schema, acquires the shared cache
    /// (creating the file on first use), and loads the declared tables.
    pub fn open(self) -> Result<Context> {
        let path = self
            .path
            .ok_or_else(|| StoreError::config("no file path configured"))?;

        let mut tables = Vec::with_capacity(self.decls.len());
        for decl in &self.decls {
            let layout = (decl.layout)()?;
            tables.push(TableDef::new(decl.name.clone(), layout.record_width()));
        }
        let schema = StoreSchema::new(tables)?;

        let cache = cache::acquire(&path, &schema)?;

        let opened = Self::bind(&cache, &schema, &self.decls);
        match opened {
            Ok(()) => Ok(Context {
                path: cache.path().to_path_buf(),
                cache,
                tracker: ChangeTracker::new(),
                decls: self.decls,
                closed: AtomicBool::new(false),
            }),
            Err(e) => {
                // Undo this context's reference; sibling contexts keep theirs.
                let _ = cache::release_shared_cache(&path);
                Err(e)
            }
        }
    }

    /// Validates the declarations against the (possibly pre-existing) cache
    /// and loads missing table buffers.
    fn bind(cache: &FileCache, schema: &StoreSchema, decls: &[TableDecl]) -> Result<()> {
        {
            let manager = cache.manager().lock();
            for def in schema.tables() {
                let state = manager.table(def.name()).ok_or_else(|| {
                    StoreError::config(format!(
                        "table '{}' is not present in the store file",
                        def.name()
                    ))
                })?;
                if state.record_width() != def.record_width() as i32 {
                    return Err(StoreError::config(format!(
                        "table '{}' has record width {} on disk but {} in the schema",
                        def.name(),
                        state.record_width(),
                        def.record_width()
                    )));
                }
            }
        }

        for decl in decls {
            (decl.load)(cache)?;
        }
        Ok(())
    }
}

/// Façade over one store file: typed table handles plus commit.
pub struct Context {
    path: PathBuf,
    cache: Arc<FileCache>,
    tracker: ChangeTracker,
    decls: Vec<TableDecl>,
    closed: AtomicBool,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// The normalized path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Disposed)
        } else {
            Ok(())
        }
    }

    /// The typed handle for a declared table.
    pub fn table<E: Entity>(&self, name: &str) -> Result<TableHandle<'_, E>> {
        self.ensure_open()?;

        let decl = self
            .decls
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| StoreError::config(format!("table '{}' is not declared", name)))?;
        if decl.entity_type != TypeId::of::<E>() {
            return Err(StoreError::config(format!(
                "table '{}' is declared with a different entity type",
                name
            )));
        }

        Ok(TableHandle::new(
            &decl.name,
            &self.cache,
            &self.tracker,
            &self.closed,
        ))
    }

    /// Waits until every write submitted to this file so far has finished.
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        self.cache.flush()
    }

    /// Persists all tracked changes.
    ///
    /// Blocks on the commit gate and the write queue; call
    /// [`save_changes_async`](Self::save_changes_async) from async code
    /// instead.
    pub fn save_changes(&self) -> Result<()> {
        self.ensure_open()?;
        let _gate = self.cache.commit_gate().blocking_lock();

        let work = self.prepare_commit()?;
        let mut pending = work.into_iter();
        while let Some((batch, restore)) = pending.next() {
            let outcome = match self.submit_batch(batch, CancellationToken::new()) {
                Ok(ticket) => ticket.wait(),
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                restore(&self.tracker);
                for (_, restore) in pending {
                    restore(&self.tracker);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Persists all tracked changes, yielding on the commit gate and the
    /// write queue. Cancellation aborts the commit: jobs not yet running are
    /// skipped, a running job stops between its phases, and the unpersisted
    /// changes are merged back into the tracker. Partial file writes may
    /// remain, matching the crash story of the format.
    pub async fn save_changes_async(&self, cancel: CancellationToken) -> Result<()> {
        self.ensure_open()?;
        let _gate = self.cache.commit_gate().lock().await;

        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let work = self.prepare_commit()?;
        let mut pending = work.into_iter();
        while let Some((batch, restore)) = pending.next() {
            let outcome = match self.submit_batch(batch, cancel.clone()) {
                Ok(ticket) => tokio::select! {
                    result = ticket.join() => result,
                    _ = cancel.cancelled() => Err(StoreError::Cancelled),
                },
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                restore(&self.tracker);
                for (_, restore) in pending {
                    restore(&self.tracker);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Builds the encoded batches for every declared table with changes, in
    /// declaration order. An error restores everything drained so far.
    fn prepare_commit(&self) -> Result<SmallVec<[(TableBatch, RestoreFn); 4]>> {
        let mut work: SmallVec<[(TableBatch, RestoreFn); 4]> = SmallVec::new();
        for decl in &self.decls {
            match (decl.batch)(&self.cache, &self.tracker) {
                Ok(Some(pair)) => work.push(pair),
                Ok(None) => {}
                Err(e) => {
                    for (_, restore) in work {
                        restore(&self.tracker);
                    }
                    return Err(e);
                }
            }
        }
        trace!(
            "prepared commit for {:?}: {} table batches",
            self.path,
            work.len()
        );
        Ok(work)
    }

    fn submit_batch(
        &self,
        batch: TableBatch,
        cancel: CancellationToken,
    ) -> Result<crate::storage::WriteTicket> {
        let cache = Arc::clone(&self.cache);
        self.cache.queue().submit(cancel, move |token| {
            let mut manager = cache.manager().lock();
            manager.apply_changes(
                &batch.table,
                &batch.added,
                &batch.modified,
                &batch.deleted,
                token,
            )
        })
    }

    /// Marks the context closed. Idempotent; does not release the shared
    /// cache.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
