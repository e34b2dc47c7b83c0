//! # Storage File Manager
//!
//! Owns the binary header + table-metadata layout of one store file: creates
//! or validates the file, loads whole table images, and applies per-table
//! add/modify/delete batches at their slot offsets.
//!
//! ## Slot Addressing
//!
//! Ids are 1-based and map straight to slots: a record with id `n` lives at
//! `data_start + (n - 1) * record_width`. Record count in the metadata equals
//! the highest slot ever written + 1; tombstoned slots still count.
//!
//! ## Region Growth
//!
//! Data regions sit back-to-back in declaration order. Growing any region but
//! the last one moves the file tail behind it forward and bumps the
//! `data_start` of every following table; the affected metadata slots are
//! rewritten after the data flush. Files are small (tens of megabytes at
//! most), so the tail move is a bounded in-memory copy.
//!
//! ## Write Ordering
//!
//! `apply_changes` writes record data first, syncs, then rewrites metadata
//! and syncs again. A crash between the two syncs leaves trailing record
//! bytes the header does not claim; the next open ignores them.
//!
//! ## Thread Safety
//!
//! Not synchronized. The file cache wraps the manager in a mutex and funnels
//! every call to `apply_changes` through the per-file write queue.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use hashbrown::{HashMap, HashSet};
use log::{debug, trace};
use tokio_util::sync::CancellationToken;
use zerocopy::IntoBytes;

use crate::error::{Result, StoreError};
use crate::records::{TOMBSTONE_DELETED, TOMBSTONE_LIVE};
use crate::schema::StoreSchema;
use crate::storage::headers::{FileHeader, TableMetaRecord, FILE_HEADER_SIZE, TABLE_META_SIZE};

/// In-memory metadata for one table.
#[derive(Debug, Clone)]
pub struct TableState {
    record_count: i32,
    record_width: i32,
    data_start: i64,
    meta_index: usize,
    meta_dirty: bool,
}

impl TableState {
    pub fn record_count(&self) -> i32 {
        self.record_count
    }

    pub fn record_width(&self) -> i32 {
        self.record_width
    }

    pub fn data_start(&self) -> i64 {
        self.data_start
    }
}

/// Manager for the on-disk image of one store file.
#[derive(Debug)]
pub struct StorageFileManager {
    path: PathBuf,
    tables: HashMap<String, TableState>,
    order: Vec<String>,
}

impl StorageFileManager {
    /// Creates the file if it does not exist, otherwise validates it and
    /// reads its table metadata.
    pub fn open(path: &Path, schema: &StoreSchema) -> Result<Self> {
        if path.exists() {
            Self::open_existing(path, schema)
        } else {
            Self::create_new(path, schema)
        }
    }

    fn create_new(path: &Path, schema: &StoreSchema) -> Result<Self> {
        let table_count = schema.len();
        if table_count > i16::MAX as usize {
            return Err(StoreError::config(format!(
                "{} tables exceed the format's table count field",
                table_count
            )));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(path)?;

        let header = FileHeader::new(table_count as i16);
        file.write_all(header.as_bytes())?;

        // Every region is empty at creation, so they all start where the
        // metadata ends.
        let data_start = (FILE_HEADER_SIZE + table_count * TABLE_META_SIZE) as i64;

        let mut tables = HashMap::with_capacity(table_count);
        let mut order = Vec::with_capacity(table_count);

        for (idx, table) in schema.tables().iter().enumerate() {
            let meta = TableMetaRecord::new(table.name(), 0, table.record_width() as i32, data_start);
            file.write_all(meta.as_bytes())?;

            tables.insert(
                table.name().to_string(),
                TableState {
                    record_count: 0,
                    record_width: table.record_width() as i32,
                    data_start,
                    meta_index: idx,
                    meta_dirty: false,
                },
            );
            order.push(table.name().to_string());
        }

        file.sync_all()?;
        debug!(
            "created store file {:?} with {} tables",
            path, table_count
        );

        Ok(Self {
            path: path.to_path_buf(),
            tables,
            order,
        })
    }

    fn open_existing(path: &Path, schema: &StoreSchema) -> Result<Self> {
        let mut file = File::open(path)?;

        let mut header_buf = [0u8; FILE_HEADER_SIZE];
        let filled = read_up_to(&mut file, &mut header_buf)?;
        let header = FileHeader::from_bytes(&header_buf[..filled])?;

        let table_count = header.table_count();
        if table_count < 0 {
            return Err(StoreError::InvalidFormat);
        }

        let mut tables = HashMap::with_capacity(table_count as usize);
        let mut order = Vec::with_capacity(table_count as usize);
        let mut meta_buf = [0u8; TABLE_META_SIZE];

        for idx in 0..table_count as usize {
            let filled = read_up_to(&mut file, &mut meta_buf)?;
            let meta = TableMetaRecord::from_bytes(&meta_buf[..filled])?;

            let name = meta.name();
            tables.insert(
                name.clone(),
                TableState {
                    record_count: meta.record_count(),
                    record_width: meta.record_width(),
                    data_start: meta.data_start(),
                    meta_index: idx,
                    meta_dirty: false,
                },
            );
            order.push(name);
        }

        for table in schema.tables() {
            let state = tables.get(table.name()).ok_or_else(|| {
                StoreError::config(format!(
                    "table '{}' is not present in {:?}",
                    table.name(),
                    path
                ))
            })?;
            if state.record_width != table.record_width() as i32 {
                return Err(StoreError::config(format!(
                    "table '{}' has record width {} on disk but {} in the schema",
                    table.name(),
                    state.record_width,
                    table.record_width()
                )));
            }
        }

        debug!(
            "opened store file {:?} with {} tables",
            path, table_count
        );

        Ok(Self {
            path: path.to_path_buf(),
            tables,
            order,
        })
    }

    /// Metadata for one table.
    pub fn table(&self, name: &str) -> Option<&TableState> {
        self.tables.get(name)
    }

    fn table_state(&self, name: &str) -> Result<&TableState> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::config(format!("unknown table '{}'", name)))
    }

    /// Reads the table's data region and returns the raw bytes of every live
    /// slot, in slot order. Tombstoned slots are skipped entirely; a
    /// truncated trailing slot (from an interrupted write) is discarded.
    pub fn load_table(&self, name: &str) -> Result<Vec<Vec<u8>>> {
        let state = self.table_state(name)?;
        if state.record_count == 0 {
            return Ok(Vec::new());
        }

        let width = state.record_width as usize;
        let total = state.record_count as usize * width;

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(state.data_start as u64))?;

        let mut buf = vec![0u8; total];
        let filled = read_up_to(&mut file, &mut buf)?;
        let complete_slots = filled / width;

        let mut records = Vec::new();
        for slot in 0..complete_slots {
            let bytes = &buf[slot * width..(slot + 1) * width];
            if bytes[0] == TOMBSTONE_LIVE {
                records.push(bytes.to_vec());
            }
        }

        trace!(
            "loaded table '{}': {} live of {} slots",
            name,
            records.len(),
            complete_slots
        );

        Ok(records)
    }

    /// Applies one commit's worth of changes for a single table.
    ///
    /// Added records are written at their id's slot (growing the region and
    /// tombstoning any skipped gap slots); modified records overwrite their
    /// slot; deleted ids get a single tombstone byte. Record data is flushed
    /// before the affected metadata slots are rewritten and flushed.
    ///
    /// Modified or deleted ids outside the table's region fail with
    /// [`StoreError::NotFound`] and leave the remaining steps unapplied.
    pub fn apply_changes(
        &mut self,
        name: &str,
        added: &[(i32, Vec<u8>)],
        modified: &[(i32, Vec<u8>)],
        deleted: &[i32],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (mut count, width, data_start) = {
            let state = self.table_state(name)?;
            (
                state.record_count,
                i64::from(state.record_width),
                state.data_start,
            )
        };

        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        for (_, bytes) in added.iter().chain(modified.iter()) {
            if bytes.len() as i64 != width {
                return Err(StoreError::codec(format!(
                    "encoded record of {} bytes does not match width {} of table '{}'",
                    bytes.len(),
                    width,
                    name
                )));
            }
        }
        for (id, _) in added {
            if *id < 1 {
                return Err(StoreError::codec(format!(
                    "record id {} is not a valid slot in table '{}'",
                    id, name
                )));
            }
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;

        if !added.is_empty() {
            let max_id = added.iter().map(|(id, _)| *id).max().unwrap_or(0);
            let new_count = count.max(max_id);

            if new_count > count {
                let new_region_end = data_start + i64::from(new_count) * width;
                self.make_room(&mut file, name, new_region_end)?;

                // Slots skipped by an explicit id must not read back as live
                // records, so they are written out as tombstoned blanks.
                let added_ids: HashSet<i32> = added.iter().map(|(id, _)| *id).collect();
                let mut blank = vec![0u8; width as usize];
                blank[0] = TOMBSTONE_DELETED;
                for slot in count..new_count {
                    if !added_ids.contains(&(slot + 1)) {
                        file.seek(SeekFrom::Start(
                            (data_start + i64::from(slot) * width) as u64,
                        ))?;
                        file.write_all(&blank)?;
                    }
                }
            }

            for (id, bytes) in added {
                file.seek(SeekFrom::Start(
                    (data_start + i64::from(id - 1) * width) as u64,
                ))?;
                file.write_all(bytes)?;
            }

            count = new_count;
        }

        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        for (id, bytes) in modified {
            if *id < 1 || *id > count {
                return Err(StoreError::NotFound {
                    table: name.to_string(),
                    id: *id,
                });
            }
            file.seek(SeekFrom::Start(
                (data_start + i64::from(id - 1) * width) as u64,
            ))?;
            file.write_all(bytes)?;
        }

        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        for id in deleted {
            if *id < 1 || *id > count {
                return Err(StoreError::NotFound {
                    table: name.to_string(),
                    id: *id,
                });
            }
            file.seek(SeekFrom::Start(
                (data_start + i64::from(id - 1) * width) as u64,
            ))?;
            file.write_all(&[TOMBSTONE_DELETED])?;
        }

        file.sync_all()?;

        if let Some(state) = self.tables.get_mut(name) {
            state.record_count = count;
            state.meta_dirty = true;
        }
        self.rewrite_dirty_metadata(&mut file)?;
        file.sync_all()?;

        debug!(
            "applied changes to table '{}': {} added, {} modified, {} deleted, count now {}",
            name,
            added.len(),
            modified.len(),
            deleted.len(),
            count
        );

        Ok(())
    }

    /// Moves the regions that follow `table` forward until the first of them
    /// starts at or after `new_region_end`, bumping their `data_start`
    /// metadata in memory. Returns without touching the file when the
    /// following regions already leave enough room.
    fn make_room(&mut self, file: &mut File, table: &str, new_region_end: i64) -> Result<()> {
        let this_index = self.table_state(table)?.meta_index;

        let tail_start = self
            .tables
            .values()
            .filter(|s| s.meta_index > this_index)
            .map(|s| s.data_start)
            .min();

        let Some(tail_start) = tail_start else {
            return Ok(());
        };
        let delta = new_region_end - tail_start;
        if delta <= 0 {
            return Ok(());
        }

        let file_len = file.metadata()?.len() as i64;
        if tail_start < file_len {
            let mut tail = vec![0u8; (file_len - tail_start) as usize];
            file.seek(SeekFrom::Start(tail_start as u64))?;
            file.read_exact(&mut tail)?;
            file.seek(SeekFrom::Start((tail_start + delta) as u64))?;
            file.write_all(&tail)?;
        }

        for state in self.tables.values_mut() {
            if state.meta_index > this_index {
                state.data_start += delta;
                state.meta_dirty = true;
            }
        }

        trace!(
            "moved {} tail bytes of {:?} forward by {}",
            file_len.saturating_sub(tail_start),
            self.path,
            delta
        );

        Ok(())
    }

    fn rewrite_dirty_metadata(&mut self, file: &mut File) -> Result<()> {
        for name in &self.order {
            let Some(state) = self.tables.get_mut(name) else {
                continue;
            };
            if !state.meta_dirty {
                continue;
            }
            let meta = TableMetaRecord::new(
                name,
                state.record_count,
                state.record_width,
                state.data_start,
            );
            file.seek(SeekFrom::Start(TableMetaRecord::slot_offset(
                state.meta_index,
            )))?;
            file.write_all(meta.as_bytes())?;
            state.meta_dirty = false;
        }
        Ok(())
    }
}

/// Reads until the buffer is full or the file ends, tolerating short reads.
fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableDef;
    use tempfile::tempdir;

    fn schema(tables: &[(&str, usize)]) -> StoreSchema {
        StoreSchema::new(
            tables
                .iter()
                .map(|(name, width)| TableDef::new(*name, *width))
                .collect(),
        )
        .unwrap()
    }

    fn record(id: i32, width: usize, fill: u8) -> (i32, Vec<u8>) {
        let mut bytes = vec![fill; width];
        bytes[0] = TOMBSTONE_LIVE;
        bytes[1..5].copy_from_slice(&id.to_le_bytes());
        (id, bytes)
    }

    #[test]
    fn create_then_reopen_preserves_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let schema = schema(&[("Users", 59), ("Orders", 13)]);

        {
            let mgr = StorageFileManager::open(&path, &schema).unwrap();
            let users = mgr.table("Users").unwrap();
            assert_eq!(users.record_count(), 0);
            assert_eq!(users.record_width(), 59);
            assert_eq!(users.data_start(), 256 + 2 * 128);
        }

        let mgr = StorageFileManager::open(&path, &schema).unwrap();
        assert_eq!(mgr.table("Orders").unwrap().record_width(), 13);
    }

    #[test]
    fn open_rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        std::fs::write(&path, b"not a store file, definitely long enough to hold a header? no").unwrap();

        let result = StorageFileManager::open(&path, &schema(&[("T", 9)]));
        assert!(matches!(result, Err(StoreError::InvalidFormat)));
    }

    #[test]
    fn open_rejects_width_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        StorageFileManager::open(&path, &schema(&[("T", 9)])).unwrap();

        let result = StorageFileManager::open(&path, &schema(&[("T", 11)]));
        assert!(matches!(result, Err(StoreError::Configuration(_))));
    }

    #[test]
    fn open_rejects_missing_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        StorageFileManager::open(&path, &schema(&[("T", 9)])).unwrap();

        let result = StorageFileManager::open(&path, &schema(&[("Other", 9)]));
        assert!(matches!(result, Err(StoreError::Configuration(_))));
    }

    #[test]
    fn apply_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let schema = schema(&[("T", 9)]);
        let mut mgr = StorageFileManager::open(&path, &schema).unwrap();

        let cancel = CancellationToken::new();
        mgr.apply_changes(
            "T",
            &[record(1, 9, 0xAA), record(2, 9, 0xBB)],
            &[],
            &[],
            &cancel,
        )
        .unwrap();

        assert_eq!(mgr.table("T").unwrap().record_count(), 2);

        let records = mgr.load_table("T").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0][5], 0xAA);
        assert_eq!(records[1][5], 0xBB);

        // Reopen picks the count up from the metadata slot.
        let mgr = StorageFileManager::open(&path, &schema).unwrap();
        assert_eq!(mgr.table("T").unwrap().record_count(), 2);
        assert_eq!(mgr.load_table("T").unwrap().len(), 2);
    }

    #[test]
    fn delete_writes_one_tombstone_byte_and_keeps_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let mut mgr = StorageFileManager::open(&path, &schema(&[("T", 9)])).unwrap();
        let cancel = CancellationToken::new();

        mgr.apply_changes("T", &[record(1, 9, 1), record(2, 9, 2)], &[], &[], &cancel)
            .unwrap();
        let len_before = std::fs::metadata(&path).unwrap().len();

        mgr.apply_changes("T", &[], &[], &[2], &cancel).unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), len_before);
        assert_eq!(mgr.table("T").unwrap().record_count(), 2);

        let records = mgr.load_table("T").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0][5], 1);
    }

    #[test]
    fn modify_of_unknown_slot_is_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let mut mgr = StorageFileManager::open(&path, &schema(&[("T", 9)])).unwrap();
        let cancel = CancellationToken::new();

        let (_, bytes) = record(3, 9, 0);
        let result = mgr.apply_changes("T", &[], &[(3, bytes)], &[], &cancel);
        assert!(matches!(
            result,
            Err(StoreError::NotFound { id: 3, .. })
        ));
    }

    #[test]
    fn modify_revives_a_tombstoned_slot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let mut mgr = StorageFileManager::open(&path, &schema(&[("T", 9)])).unwrap();
        let cancel = CancellationToken::new();

        mgr.apply_changes("T", &[record(1, 9, 7)], &[], &[], &cancel)
            .unwrap();
        mgr.apply_changes("T", &[], &[], &[1], &cancel).unwrap();
        assert!(mgr.load_table("T").unwrap().is_empty());

        mgr.apply_changes("T", &[], &[record(1, 9, 8)], &[], &cancel)
            .unwrap();
        let records = mgr.load_table("T").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0][5], 8);
    }

    #[test]
    fn explicit_id_gap_slots_are_tombstoned() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let mut mgr = StorageFileManager::open(&path, &schema(&[("T", 9)])).unwrap();
        let cancel = CancellationToken::new();

        mgr.apply_changes("T", &[record(5, 9, 0xEE)], &[], &[], &cancel)
            .unwrap();

        assert_eq!(mgr.table("T").unwrap().record_count(), 5);
        let records = mgr.load_table("T").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0][5], 0xEE);
    }

    #[test]
    fn growing_a_non_final_region_moves_the_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let schema = schema(&[("A", 9), ("B", 9)]);
        let mut mgr = StorageFileManager::open(&path, &schema).unwrap();
        let cancel = CancellationToken::new();

        // Populate B first so that growing A has a tail to move.
        mgr.apply_changes("B", &[record(1, 9, 0xB1), record(2, 9, 0xB2)], &[], &[], &cancel)
            .unwrap();
        mgr.apply_changes("A", &[record(1, 9, 0xA1)], &[], &[], &cancel)
            .unwrap();
        mgr.apply_changes("A", &[record(2, 9, 0xA2)], &[], &[], &cancel)
            .unwrap();

        let a = mgr.load_table("A").unwrap();
        let b = mgr.load_table("B").unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert_eq!(a[1][5], 0xA2);
        assert_eq!(b[0][5], 0xB1);

        // The same holds after a reopen, proving the metadata was rewritten.
        let mgr = StorageFileManager::open(&path, &schema).unwrap();
        assert_eq!(mgr.load_table("A").unwrap().len(), 2);
        assert_eq!(mgr.load_table("B").unwrap().len(), 2);
        let a = mgr.table("A").unwrap();
        assert_eq!(mgr.table("B").unwrap().data_start(), a.data_start() + 2 * 9);
    }

    #[test]
    fn unclaimed_trailing_bytes_are_ignored_on_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let schema = schema(&[("T", 9)]);
        let mut mgr = StorageFileManager::open(&path, &schema).unwrap();
        let cancel = CancellationToken::new();
        mgr.apply_changes("T", &[record(1, 9, 1)], &[], &[], &cancel)
            .unwrap();

        // Simulate a crash after data was appended but before the metadata
        // slot was rewritten: extra record bytes past the claimed count.
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::End(0)).unwrap();
        file.write_all(&record(2, 9, 2).1).unwrap();
        drop(file);

        let mgr = StorageFileManager::open(&path, &schema).unwrap();
        assert_eq!(mgr.table("T").unwrap().record_count(), 1);
        assert_eq!(mgr.load_table("T").unwrap().len(), 1);
    }

    #[test]
    fn truncated_trailing_slot_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let schema = schema(&[("T", 9)]);
        let mut mgr = StorageFileManager::open(&path, &schema).unwrap();
        let cancel = CancellationToken::new();
        mgr.apply_changes("T", &[record(1, 9, 1), record(2, 9, 2)], &[], &[], &cancel)
            .unwrap();

        // Chop the file mid-slot.
        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 4).unwrap();
        drop(file);

        let mgr = StorageFileManager::open(&path, &schema).unwrap();
        let records = mgr.load_table("T").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0][5], 1);
    }

    #[test]
    fn cancelled_token_aborts_the_batch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let mut mgr = StorageFileManager::open(&path, &schema(&[("T", 9)])).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = mgr.apply_changes("T", &[record(1, 9, 1)], &[], &[], &cancel);
        assert!(matches!(result, Err(StoreError::Cancelled)));
        // The metadata slot was never rewritten, so the count stays at zero.
        let reopened = StorageFileManager::open(&path, &schema(&[("T", 9)])).unwrap();
        assert_eq!(reopened.table("T").unwrap().record_count(), 0);
    }
}
