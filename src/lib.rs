//! # flatdb - Single-File Embedded Storage Engine
//!
//! flatdb maps a user-declared schema of tables-of-records onto one
//! fixed-length binary file. The authoritative copy of the data lives in a
//! process-wide shared in-memory cache; contexts record their mutations in a
//! change tracker and flush them through a serialized per-file write queue,
//! so every context on the same path observes a single consistent state.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────────┐  ┌────────────┐
//! │ Context A  │  │ Context B  │        (per-handle change trackers)
//! └─────┬──────┘  └─────┬──────┘
//!       │               │
//! ┌─────▼───────────────▼──────┐
//! │      Shared File Cache      │       (one per normalized path:
//! │  table buffers · RwLock ·   │        reference-counted, released
//! │  commit gate · write queue  │        explicitly, never by drop)
//! └─────┬───────────────┬──────┘
//!       │ reads         │ writes (FIFO, single consumer)
//! ┌─────▼───────────────▼──────┐
//! │    Storage File Manager     │       (header, metadata, record slots)
//! └─────────────┬──────────────┘
//!               ▼
//!          store file
//! ```
//!
//! ## File Layout
//!
//! ```text
//! offset 0    "MDB1" magic, version, table count     (256-byte header)
//! offset 256  one 128-byte metadata record per table
//! then        table data regions in declaration order,
//!             fixed-width slots: [tombstone][id][fields]
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use flatdb::{Context, Entity, FieldDef, Values, Result};
//!
//! struct User { id: i32, name: String, age: i32 }
//!
//! impl Entity for User {
//!     fn fields() -> Vec<FieldDef> {
//!         vec![FieldDef::text("name", 50), FieldDef::int4("age")]
//!     }
//!     fn id(&self) -> i32 { self.id }
//!     fn set_id(&mut self, id: i32) { self.id = id; }
//!     fn write_values(&self, out: &mut Values) {
//!         out.push_text(self.name.clone()).push_int4(self.age);
//!     }
//!     fn read_values(id: i32, values: &mut Values) -> Result<Self> {
//!         Ok(Self { id, name: values.take_text()?, age: values.take_int4()? })
//!     }
//! }
//!
//! let ctx = Context::builder()
//!     .path("./crm.db")
//!     .table::<User>("Users")
//!     .open()?;
//!
//! let users = ctx.table::<User>("Users")?;
//! users.add(User { id: 0, name: "Alice".into(), age: 30 })?;
//! ctx.save_changes()?;
//!
//! // Once no context on the path will be reopened:
//! flatdb::release_shared_cache(ctx.path())?;
//! ```
//!
//! ## Module Overview
//!
//! - [`types`]: field kinds, widths, and the typed value cursor
//! - [`schema`]: the `Entity` trait and per-type record layouts
//! - [`records`]: the fixed-width record codec
//! - [`storage`]: file format, file manager, and the write queue
//! - [`cache`]: the process-wide path-to-cache registry
//! - [`database`]: contexts, table handles, and change tracking

#[macro_use]
mod macros;

pub mod cache;
pub mod database;
pub mod error;
pub mod records;
pub mod schema;
pub mod storage;
pub mod types;

pub use cache::{release_all, release_shared_cache};
pub use database::{Context, ContextBuilder, TableHandle, Tracked};
pub use error::{Result, StoreError};
pub use schema::{Entity, EntityLayout};
pub use types::{FieldDef, FieldType, FieldValue, Values};

// Cancellation on the async commit path uses the tokio ecosystem's token.
pub use tokio_util::sync::CancellationToken;

/// Current version of flatdb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
