//! Typed per-table access.
//!
//! A [`TableHandle`] is the public surface of one table: add, update,
//! remove, snapshot iteration, and count. It reads and mutates the shared
//! table buffer inside the file cache and records intent in its context's
//! change tracker.
//!
//! The buffer keeps the table's live records in slot order (new records
//! append), a live-id set for duplicate-key checks, and the table's highest
//! id ever assigned, which seeds id assignment for inserts. `max_id` starts
//! at the on-disk record count, which by construction equals the highest id
//! ever written, so tombstoned slots keep their ids reserved.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};

use crate::cache::{FileCache, TableSlot};
use crate::database::change_tracker::ChangeTracker;
use crate::database::tracked::Tracked;
use crate::error::{Result, StoreError};
use crate::records::RecordCodec;
use crate::schema::{Entity, EntityLayout};

/// The in-memory image of one table: live records in slot order.
pub(crate) struct TableBuffer<E: Entity> {
    pub rows: Vec<Tracked<E>>,
    pub live_ids: HashSet<i32>,
    pub max_id: i32,
}

pub(crate) fn buffer_ref<'m, E: Entity>(
    tables: &'m HashMap<String, TableSlot>,
    name: &str,
) -> Result<&'m TableBuffer<E>> {
    let slot = tables
        .get(name)
        .ok_or_else(|| StoreError::config(format!("table '{}' is not loaded", name)))?;
    slot.buffer.downcast_ref::<TableBuffer<E>>().ok_or_else(|| {
        StoreError::config(format!(
            "table '{}' is cached under a different entity type",
            name
        ))
    })
}

pub(crate) fn buffer_mut<'m, E: Entity>(
    tables: &'m mut HashMap<String, TableSlot>,
    name: &str,
) -> Result<&'m mut TableBuffer<E>> {
    let slot = tables
        .get_mut(name)
        .ok_or_else(|| StoreError::config(format!("table '{}' is not loaded", name)))?;
    slot.buffer.downcast_mut::<TableBuffer<E>>().ok_or_else(|| {
        StoreError::config(format!(
            "table '{}' is cached under a different entity type",
            name
        ))
    })
}

/// Loads a table's records into the shared cache if they are not there yet.
///
/// Runs on the read path: it opens the file directly and never touches the
/// write queue.
pub(crate) fn load_table_into_cache<E: Entity>(cache: &FileCache, name: &str) -> Result<()> {
    if cache.tables().read().contains_key(name) {
        return Ok(());
    }

    let codec = RecordCodec::new(EntityLayout::of::<E>()?);

    let (raw, record_count) = {
        let manager = cache.manager().lock();
        let state = manager
            .table(name)
            .ok_or_else(|| StoreError::config(format!("unknown table '{}'", name)))?;
        let record_count = state.record_count();
        (manager.load_table(name)?, record_count)
    };

    let mut rows = Vec::with_capacity(raw.len());
    let mut live_ids = HashSet::with_capacity(raw.len());
    for bytes in &raw {
        let entity = codec.decode_entity::<E>(bytes)?;
        live_ids.insert(entity.id());
        rows.push(Tracked::new(entity));
    }

    let buffer = TableBuffer {
        rows,
        live_ids,
        max_id: record_count,
    };

    // A sibling context may have loaded the table while this one was
    // decoding; the first buffer in wins.
    let mut tables = cache.tables().write();
    tables
        .entry(name.to_string())
        .or_insert_with(|| TableSlot {
            buffer: Box::new(buffer),
        });

    Ok(())
}

/// Public handle for one table, bound to a context's change tracker.
pub struct TableHandle<'ctx, E: Entity> {
    name: &'ctx str,
    cache: &'ctx Arc<FileCache>,
    tracker: &'ctx ChangeTracker,
    closed: &'ctx AtomicBool,
    _entity: PhantomData<fn() -> E>,
}

impl<'ctx, E: Entity> TableHandle<'ctx, E> {
    pub(crate) fn new(
        name: &'ctx str,
        cache: &'ctx Arc<FileCache>,
        tracker: &'ctx ChangeTracker,
        closed: &'ctx AtomicBool,
    ) -> Self {
        Self {
            name,
            cache,
            tracker,
            closed,
            _entity: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Inserts a record.
    ///
    /// An id of `0` is assigned as the table's highest id ever + 1; an
    /// explicit id that collides with a live record fails with
    /// [`StoreError::DuplicateKey`]. Returns the tracked handle to the
    /// entity, which is now part of the shared in-memory table.
    pub fn add(&self, entity: E) -> Result<Tracked<E>> {
        self.ensure_open()?;

        if entity.id() < 0 {
            return Err(StoreError::config(format!(
                "record id {} must not be negative",
                entity.id()
            )));
        }

        let tracked = Tracked::new(entity);
        let mut tables = self.cache.tables().write();
        let buffer = buffer_mut::<E>(&mut tables, self.name)?;

        let id = tracked.id();
        let assigned = if id == 0 {
            let next = buffer.max_id + 1;
            tracked.write().set_id(next);
            next
        } else {
            if buffer.live_ids.contains(&id) {
                return Err(StoreError::DuplicateKey {
                    table: self.name.to_string(),
                    id,
                });
            }
            id
        };

        if assigned > buffer.max_id {
            buffer.max_id = assigned;
        }
        buffer.live_ids.insert(assigned);
        buffer.rows.push(tracked.clone());

        self.tracker
            .with_table::<E, _>(self.name, |changes| changes.track_added(&tracked))?;

        Ok(tracked)
    }

    /// Marks an entity as modified so the next commit persists its current
    /// state. The entity is expected to already be part of this table.
    pub fn update(&self, entity: &Tracked<E>) -> Result<()> {
        self.ensure_open()?;
        self.tracker
            .with_table::<E, _>(self.name, |changes| changes.track_modified(entity))
    }

    /// Removes an entity from the table and marks it deleted. Removing an
    /// entity that was added but never committed cancels the add.
    pub fn remove(&self, entity: &Tracked<E>) -> Result<()> {
        self.ensure_open()?;

        let mut tables = self.cache.tables().write();
        let buffer = buffer_mut::<E>(&mut tables, self.name)?;

        let track_id = entity.track_id();
        if let Some(pos) = buffer.rows.iter().position(|r| r.track_id() == track_id) {
            let removed = buffer.rows.remove(pos);
            buffer.live_ids.remove(&removed.id());
        }

        self.tracker
            .with_table::<E, _>(self.name, |changes| changes.track_deleted(entity))
    }

    /// Iterates a snapshot of the table taken under the read lock; the
    /// iterator never observes mutations made after this call.
    pub fn iter(&self) -> Result<std::vec::IntoIter<Tracked<E>>> {
        self.ensure_open()?;
        let tables = self.cache.tables().read();
        let buffer = buffer_ref::<E>(&tables, self.name)?;
        Ok(buffer.rows.clone().into_iter())
    }

    /// Finds the live record with the given id, if any.
    pub fn find(&self, id: i32) -> Result<Option<Tracked<E>>> {
        self.ensure_open()?;
        let tables = self.cache.tables().read();
        let buffer = buffer_ref::<E>(&tables, self.name)?;
        Ok(buffer.rows.iter().find(|r| r.id() == id).cloned())
    }

    /// Number of live records.
    pub fn count(&self) -> Result<usize> {
        self.ensure_open()?;
        let tables = self.cache.tables().read();
        let buffer = buffer_ref::<E>(&tables, self.name)?;
        Ok(buffer.rows.len())
    }
}
