//! # File Header Definitions
//!
//! Type-safe, zerocopy-based structs for the two fixed-size header shapes in
//! a store file: the 256-byte file header at offset 0 and the 128-byte table
//! metadata records that follow it.
//!
//! ## Layouts
//!
//! ### File header (256 bytes)
//! ```text
//! Offset  Size  Description
//! 0       4     Magic: "MDB1"
//! 4       2     Format version (i16, currently 1)
//! 6       2     Table count (i16)
//! 8       248   Reserved (zero)
//! ```
//!
//! ### Table metadata record (128 bytes)
//! ```text
//! Offset  Size  Description
//! 0       64    Table name, UTF-8, zero-padded
//! 64      4     Record count (i32)
//! 68      4     Record width (i32)
//! 72      8     Data start offset (i64)
//! 80      48    Reserved (zero)
//! ```
//!
//! ## Zerocopy Safety
//!
//! Both structs use zerocopy traits for safe serialization without copies:
//! `FromBytes`, `IntoBytes`, `Immutable`, `KnownLayout`, and `Unaligned`.
//! Multi-byte fields use the `little_endian` wrapper types, so the in-memory
//! representation is the wire representation on every platform.

use zerocopy::little_endian::{I16, I32, I64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{Result, StoreError};

/// Magic bytes at offset 0 of every store file.
pub const MAGIC: &[u8; 4] = b"MDB1";

/// The only format version this engine reads or writes.
pub const CURRENT_VERSION: i16 = 1;

/// Size of the file header.
pub const FILE_HEADER_SIZE: usize = 256;

/// Size of one table metadata record.
pub const TABLE_META_SIZE: usize = 128;

/// Bytes reserved for a table name inside its metadata record.
pub const TABLE_NAME_SIZE: usize = 64;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FileHeader {
    magic: [u8; 4],
    version: I16,
    table_count: I16,
    reserved: [u8; 248],
}

const _: () = assert!(std::mem::size_of::<FileHeader>() == FILE_HEADER_SIZE);

impl FileHeader {
    pub fn new(table_count: i16) -> Self {
        Self {
            magic: *MAGIC,
            version: I16::new(CURRENT_VERSION),
            table_count: I16::new(table_count),
            reserved: [0u8; 248],
        }
    }

    /// Parses and validates a header.
    ///
    /// Fails with [`StoreError::InvalidFormat`] on a magic mismatch and
    /// [`StoreError::UnsupportedVersion`] on any version other than 1.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(StoreError::InvalidFormat);
        }

        let header = Self::read_from_bytes(&bytes[..FILE_HEADER_SIZE])
            .map_err(|_| StoreError::InvalidFormat)?;

        if &header.magic != MAGIC {
            return Err(StoreError::InvalidFormat);
        }

        if header.version.get() != CURRENT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: header.version.get(),
            });
        }

        Ok(header)
    }

    le_accessors! {
        version / set_version: I16 as i16,
        table_count / set_table_count: I16 as i16,
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct TableMetaRecord {
    name: [u8; TABLE_NAME_SIZE],
    record_count: I32,
    record_width: I32,
    data_start: I64,
    reserved: [u8; 48],
}

const _: () = assert!(std::mem::size_of::<TableMetaRecord>() == TABLE_META_SIZE);

impl TableMetaRecord {
    /// Builds a metadata record. The name must fit in 64 UTF-8 bytes, which
    /// the schema layer validates before anything reaches this point; longer
    /// names are clipped at the slot boundary rather than overrunning it.
    pub fn new(name: &str, record_count: i32, record_width: i32, data_start: i64) -> Self {
        let bytes = name.as_bytes();
        let len = bytes.len().min(TABLE_NAME_SIZE);
        let mut name_buf = [0u8; TABLE_NAME_SIZE];
        name_buf[..len].copy_from_slice(&bytes[..len]);

        Self {
            name: name_buf,
            record_count: I32::new(record_count),
            record_width: I32::new(record_width),
            data_start: I64::new(data_start),
            reserved: [0u8; 48],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < TABLE_META_SIZE {
            return Err(StoreError::InvalidFormat);
        }

        Self::read_from_bytes(&bytes[..TABLE_META_SIZE]).map_err(|_| StoreError::InvalidFormat)
    }

    /// The table name, decoded up to the first NUL byte.
    pub fn name(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(TABLE_NAME_SIZE);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// File offset of the metadata slot at the given declaration index.
    pub fn slot_offset(index: usize) -> u64 {
        (FILE_HEADER_SIZE + index * TABLE_META_SIZE) as u64
    }

    le_accessors! {
        record_count / set_record_count: I32 as i32,
        record_width / set_record_width: I32 as i32,
        data_start / set_data_start: I64 as i64,
    }
}
