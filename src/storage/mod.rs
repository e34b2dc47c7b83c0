//! # Storage Module
//!
//! This module owns the on-disk representation of a store file and every
//! write that reaches it.
//!
//! ## File Layout
//!
//! One file per store, little-endian throughout:
//!
//! ```text
//! +--------------------------+
//! | File header (256B)       |  magic "MDB1", version, table count
//! +--------------------------+
//! | Table metadata (128B * n)|  name, record count, width, data start
//! +--------------------------+
//! | Table data regions       |  declaration order, each region
//! |                          |  record_count * record_width bytes
//! +--------------------------+
//! ```
//!
//! Each data slot is `[tombstone][id][fields]`; slots are addressed by
//! `data_start + (id - 1) * record_width`. Regions grow at write time and
//! stay contiguous in declaration order, so growing a non-final region moves
//! the file tail behind it.
//!
//! ## Module Organization
//!
//! - `headers`: zerocopy structs for the file header and metadata records
//! - `file_manager`: create/open/validate, table loads, change application
//! - `write_queue`: the per-file single-consumer FIFO all writes go through
//!
//! ## Thread Safety
//!
//! `StorageFileManager` is not synchronized; the shared file cache wraps it
//! in a mutex and routes every mutation through the write queue, which is the
//! sole writer for its file.

mod file_manager;
mod headers;
mod write_queue;

pub use file_manager::{StorageFileManager, TableState};
pub use headers::{
    FileHeader, TableMetaRecord, CURRENT_VERSION, FILE_HEADER_SIZE, MAGIC, TABLE_META_SIZE,
    TABLE_NAME_SIZE,
};
pub use write_queue::{FileWriteQueue, WriteTicket};
