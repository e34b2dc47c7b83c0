//! # Schema Module
//!
//! The schema layer describes what a store file contains: which tables exist,
//! which entity type backs each table, and how an entity's declared fields
//! map onto a fixed-width record.
//!
//! - [`Entity`]: the trait user record types implement
//! - [`EntityLayout`]: the per-type field layout, computed once per process
//! - [`StoreSchema`]: the ordered table list handed to the storage layer

mod entity;
mod layout;

use crate::error::{Result, StoreError};
use crate::storage::TABLE_NAME_SIZE;

pub use entity::Entity;
pub use layout::EntityLayout;

/// One table declaration: its name and the fixed record width of its rows.
#[derive(Debug, Clone)]
pub struct TableDef {
    name: String,
    record_width: usize,
}

impl TableDef {
    pub fn new(name: impl Into<String>, record_width: usize) -> Self {
        Self {
            name: name.into(),
            record_width,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_width(&self) -> usize {
        self.record_width
    }
}

/// The ordered set of tables a context binds to one file.
///
/// Declaration order is significant: table metadata records and data regions
/// are laid out in this order on disk.
#[derive(Debug, Clone)]
pub struct StoreSchema {
    tables: Vec<TableDef>,
}

impl StoreSchema {
    /// Validates table names (UTF-8 length within the metadata slot, no
    /// duplicates) and record widths.
    pub fn new(tables: Vec<TableDef>) -> Result<Self> {
        for (idx, table) in tables.iter().enumerate() {
            if table.name.is_empty() {
                return Err(StoreError::config("table name must not be empty"));
            }
            if table.name.len() > TABLE_NAME_SIZE {
                return Err(StoreError::config(format!(
                    "table name '{}' exceeds {} UTF-8 bytes",
                    table.name, TABLE_NAME_SIZE
                )));
            }
            if tables[..idx].iter().any(|t| t.name == table.name) {
                return Err(StoreError::config(format!(
                    "duplicate table name '{}'",
                    table.name
                )));
            }
            if table.record_width == 0 {
                return Err(StoreError::config(format!(
                    "table '{}' has a zero record width",
                    table.name
                )));
            }
        }

        Ok(Self { tables })
    }

    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn get(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
