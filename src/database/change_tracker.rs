//! Per-context change tracking.
//!
//! A context records the intent behind every mutation in three
//! identity-keyed sets per table: added, modified, deleted. The conflict
//! rules between them:
//!
//! - modifying an added entity is a no-op (the pending insert already writes
//!   the latest state),
//! - deleting an added entity cancels the add outright (nothing to persist),
//! - deleting anything else drops a pending modify and records the delete.
//!
//! Identity is the tracking id of the [`Tracked`] handle, never value
//! equality: entities are mutable, and two logically equal records must not
//! collapse.
//!
//! Commit drains a table's changes atomically with batch building; a failed
//! commit merges the drained changes back in front of whatever was tracked
//! meanwhile, so the caller can inspect and retry.

use std::any::Any;

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;

use crate::database::tracked::Tracked;
use crate::error::{Result, StoreError};
use crate::schema::Entity;

/// The tracked changes of one table, in insertion order.
pub(crate) struct TableChanges<E: Entity> {
    added: Vec<Tracked<E>>,
    added_ids: HashSet<u64>,
    modified: Vec<Tracked<E>>,
    modified_ids: HashSet<u64>,
    deleted: Vec<Tracked<E>>,
    deleted_ids: HashSet<u64>,
}

impl<E: Entity> Default for TableChanges<E> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            added_ids: HashSet::new(),
            modified: Vec::new(),
            modified_ids: HashSet::new(),
            deleted: Vec::new(),
            deleted_ids: HashSet::new(),
        }
    }
}

impl<E: Entity> TableChanges<E> {
    pub fn track_added(&mut self, entity: &Tracked<E>) {
        if self.added_ids.insert(entity.track_id()) {
            self.added.push(entity.clone());
        }
    }

    pub fn track_modified(&mut self, entity: &Tracked<E>) {
        let id = entity.track_id();
        if self.added_ids.contains(&id) {
            return;
        }
        if self.modified_ids.insert(id) {
            self.modified.push(entity.clone());
        }
    }

    pub fn track_deleted(&mut self, entity: &Tracked<E>) {
        let id = entity.track_id();
        if self.added_ids.remove(&id) {
            self.added.retain(|e| e.track_id() != id);
            return;
        }
        if self.modified_ids.remove(&id) {
            self.modified.retain(|e| e.track_id() != id);
        }
        if self.deleted_ids.insert(id) {
            self.deleted.push(entity.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn added(&self) -> &[Tracked<E>] {
        &self.added
    }

    pub fn modified(&self) -> &[Tracked<E>] {
        &self.modified
    }

    pub fn deleted(&self) -> &[Tracked<E>] {
        &self.deleted
    }

    /// Rebuilds this set as `earlier` followed by a replay of the changes
    /// currently held, used to undo a drain after a failed commit.
    pub fn merge_earlier(&mut self, earlier: TableChanges<E>) {
        let mut merged = earlier;
        for entity in self.added.drain(..) {
            merged.track_added(&entity);
        }
        for entity in self.modified.drain(..) {
            merged.track_modified(&entity);
        }
        for entity in self.deleted.drain(..) {
            merged.track_deleted(&entity);
        }
        *self = merged;
    }
}

/// Identity-keyed change sets for every table of one context.
///
/// Thread-safe: handles on the same context may track from multiple threads.
pub(crate) struct ChangeTracker {
    tables: Mutex<HashMap<String, Box<dyn Any + Send>>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `f` against the change set of one table, creating it on first
    /// touch.
    pub fn with_table<E: Entity, R>(
        &self,
        table: &str,
        f: impl FnOnce(&mut TableChanges<E>) -> R,
    ) -> Result<R> {
        let mut map = self.tables.lock();
        let slot = map
            .entry(table.to_string())
            .or_insert_with(|| Box::new(TableChanges::<E>::default()) as Box<dyn Any + Send>);
        let changes = slot.downcast_mut::<TableChanges<E>>().ok_or_else(|| {
            StoreError::config(format!(
                "table '{}' is tracked under a different entity type",
                table
            ))
        })?;
        Ok(f(changes))
    }

    /// Drains a table's changes, leaving an empty set behind.
    pub fn take_table<E: Entity>(&self, table: &str) -> Result<TableChanges<E>> {
        self.with_table::<E, _>(table, std::mem::take)
    }

    /// Puts drained changes back in front of anything tracked since.
    pub fn restore_table<E: Entity>(&self, table: &str, earlier: TableChanges<E>) {
        let _ = self.with_table::<E, _>(table, |current| current.merge_earlier(earlier));
    }

    /// Empties every change set.
    pub fn clear(&self) {
        self.tables.lock().clear();
    }
}
