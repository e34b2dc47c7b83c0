//! Per-entity-type record layout.
//!
//! An `EntityLayout` pre-computes the byte offset and width of every declared
//! field so the codec addresses a record slot with plain arithmetic. One
//! layout is computed per entity type for the lifetime of the process and
//! shared from a `TypeId`-keyed cache; it is never recomputed.

use std::any::TypeId;
use std::sync::{Arc, OnceLock};

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::error::Result;
use crate::schema::Entity;
use crate::types::FieldDef;

/// Width of the tombstone byte at the start of every record slot.
pub const TOMBSTONE_SIZE: usize = 1;

/// Width of the id that follows the tombstone byte.
pub const ID_SIZE: usize = 4;

/// Computed field layout for one entity type.
#[derive(Debug)]
pub struct EntityLayout {
    fields: Vec<FieldDef>,
    offsets: Vec<usize>,
    widths: Vec<usize>,
    record_width: usize,
}

impl EntityLayout {
    /// Computes the layout for an explicit field list.
    ///
    /// Field order is the declared order; offsets start after the tombstone
    /// byte and the id. Fails with a configuration error for invalid field
    /// definitions (text without a maximum byte length).
    pub fn compute(fields: Vec<FieldDef>) -> Result<Self> {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut widths = Vec::with_capacity(fields.len());
        let mut offset = TOMBSTONE_SIZE + ID_SIZE;

        for field in &fields {
            let width = field.width()?;
            offsets.push(offset);
            widths.push(width);
            offset += width;
        }

        Ok(Self {
            fields,
            offsets,
            widths,
            record_width: offset,
        })
    }

    /// Returns the cached layout for an entity type, computing it on first
    /// use.
    pub fn of<E: Entity>() -> Result<Arc<EntityLayout>> {
        static CACHE: OnceLock<RwLock<HashMap<TypeId, Arc<EntityLayout>>>> = OnceLock::new();
        let cache = CACHE.get_or_init(|| RwLock::new(HashMap::new()));

        let key = TypeId::of::<E>();
        if let Some(layout) = cache.read().get(&key) {
            return Ok(Arc::clone(layout));
        }

        let layout = Arc::new(Self::compute(E::fields())?);
        let mut guard = cache.write();
        Ok(Arc::clone(
            guard.entry(key).or_insert_with(|| Arc::clone(&layout)),
        ))
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Byte offset of a field within the record slot.
    pub fn offset(&self, idx: usize) -> usize {
        self.offsets[idx]
    }

    /// Stored width of a field, including its null flag byte if nullable.
    pub fn width(&self, idx: usize) -> usize {
        self.widths[idx]
    }

    /// Total record width: tombstone + id + all field widths.
    pub fn record_width(&self) -> usize {
        self.record_width
    }
}
