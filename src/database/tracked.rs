//! Shared, identity-carrying entity handles.
//!
//! Entities in a table buffer are shared between every context open on the
//! file and mutable by the user, so they live behind `Arc<RwLock>`. Each
//! handle carries a process-unique tracking id assigned when the handle is
//! created; change tracking keys its sets by that id, so two value-equal
//! records never collapse into one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::schema::Entity;

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct TrackedInner<E> {
    track_id: u64,
    cell: RwLock<E>,
}

/// A shared handle to one stored entity.
///
/// Cloning the handle shares the same underlying record; the engine's
/// identity-based change tracking treats every clone as the same entity.
#[derive(Debug)]
pub struct Tracked<E> {
    inner: Arc<TrackedInner<E>>,
}

impl<E> Clone for Tracked<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity> Tracked<E> {
    pub(crate) fn new(entity: E) -> Self {
        Self {
            inner: Arc::new(TrackedInner {
                track_id: NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed),
                cell: RwLock::new(entity),
            }),
        }
    }

    /// Read access to the entity.
    pub fn read(&self) -> RwLockReadGuard<'_, E> {
        self.inner.cell.read()
    }

    /// Write access to the entity. Mutations become durable once the entity
    /// is passed to `update` on its table handle and the context commits.
    pub fn write(&self) -> RwLockWriteGuard<'_, E> {
        self.inner.cell.write()
    }

    /// The entity's current primary key.
    pub fn id(&self) -> i32 {
        self.read().id()
    }

    /// The process-unique identity used by change tracking.
    pub(crate) fn track_id(&self) -> u64 {
        self.inner.track_id
    }
}
