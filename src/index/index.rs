//! Storage Index
//!
//! Concurrent mapping from key to entry plus the offset allocator for the
//! single backing file.
//!
//! ## Concurrency:
//! - `entries`: Protected by RwLock (many concurrent readers, exclusive writer)
//! - `cursor`: Mutex-guarded allocation cursor; the commit critical section
//!   serializes allocation so no two entries ever share bytes
//! - Lock order is always cursor → entries; nothing acquires them the other
//!   way around

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::codec::{ContentHash, CHECKSUM_LEN};
use crate::error::{Result, StoreError};

use super::{EntryMeta, FileRegion, IndexEntry};

/// Thread-safe bookkeeping of keys, metadata, and byte-range allocation
pub struct StorageIndex {
    /// Key → entry mapping; keys are unique and never reused
    entries: RwLock<HashMap<String, Arc<IndexEntry>>>,

    /// Next free offset in the backing file (monotonically increasing)
    cursor: Mutex<u64>,

    /// Ceiling on the serialized size of all metadata
    max_index_size: u64,
}

impl StorageIndex {
    /// Create an empty index with the given serialized-size ceiling
    pub fn new(max_index_size: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            cursor: Mutex::new(0),
            max_index_size,
        }
    }

    // =========================================================================
    // Reservation & Commit
    // =========================================================================

    /// Reserve a key before its payload is known
    ///
    /// Inserts a fresh pending entry; atomic with respect to concurrent
    /// reservation of the same key.
    pub fn reserve(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(key) {
            return Err(StoreError::DuplicateKey(key.to_string()));
        }
        entries.insert(key.to_string(), Arc::new(IndexEntry::new()));
        Ok(())
    }

    /// Finalize an entry's metadata and allocate its byte range
    ///
    /// Runs the dedup scan and the allocation under one critical section so
    /// allocation order defines a total order for writes. The serialized-size
    /// ceiling is checked after leaving the critical section: on
    /// `IndexSizeExceeded` the byte range stays reserved and the caller is
    /// responsible for removing the entry.
    pub fn commit(
        &self,
        key: &str,
        stored_len: u32,
        content_hash: ContentHash,
        checksum: [u8; CHECKSUM_LEN],
        is_compressed: bool,
    ) -> Result<u32> {
        let offset;
        {
            let mut cursor = self.cursor.lock();
            let entries = self.entries.read();

            if self.contains_hash(&entries, &content_hash) {
                return Err(StoreError::DuplicateData);
            }

            // The entry may already be gone if a concurrent failure removed it
            let entry = entries.get(key).cloned().ok_or(StoreError::KeyNotFound)?;

            let end = *cursor + stored_len as u64;
            offset = u32::try_from(*cursor).map_err(|_| StoreError::StorageFileSizeExceeded {
                offset: *cursor,
                size: stored_len as u64,
                limit: u32::MAX as u64,
            })?;
            if end > u32::MAX as u64 {
                // Regions are addressed with fixed-width 4-byte offsets
                return Err(StoreError::StorageFileSizeExceeded {
                    offset: *cursor,
                    size: stored_len as u64,
                    limit: u32::MAX as u64,
                });
            }

            entry.set_meta(EntryMeta {
                content_hash,
                checksum,
                is_compressed,
                region: FileRegion::new(offset, stored_len),
            });
            *cursor = end;
        }

        let size = self.estimated_size()?;
        if size > self.max_index_size {
            return Err(StoreError::IndexSizeExceeded {
                size,
                limit: self.max_index_size,
            });
        }

        Ok(offset)
    }

    /// Linear content-hash dedup scan; first match wins
    ///
    /// O(current key count) per commit. Acceptable at the target scale;
    /// isolated here so a secondary hash index could replace it without
    /// changing observable behavior.
    fn contains_hash(
        &self,
        entries: &HashMap<String, Arc<IndexEntry>>,
        content_hash: &ContentHash,
    ) -> bool {
        entries
            .values()
            .any(|entry| entry.content_hash().as_ref() == Some(content_hash))
    }

    // =========================================================================
    // Completion & Removal
    // =========================================================================

    /// Mark an entry's bytes as durably written and wake waiting readers
    ///
    /// No-op if the key was removed in the meantime.
    pub fn complete(&self, key: &str) {
        if let Some(entry) = self.get(key) {
            entry.signal_completed();
        }
    }

    /// Evict a key after a failed write
    ///
    /// Signals the removed event first so any reader already waiting on the
    /// entry is released with a not-found outcome, then deletes the mapping.
    /// No-op if the key is absent.
    pub fn remove(&self, key: &str) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            entry.signal_removed();
            entries.remove(key);
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Whether the key is present
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Entry for a key, absent rather than failing on a missing key
    pub fn get(&self, key: &str) -> Option<Arc<IndexEntry>> {
        self.entries.read().get(key).cloned()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Total bytes allocated in the backing file so far
    ///
    /// Freed bytes from removed entries are never reclaimed.
    pub fn allocated(&self) -> u64 {
        *self.cursor.lock()
    }

    /// Approximate serialized size of all metadata
    pub fn estimated_size(&self) -> Result<u64> {
        let entries = self.entries.read();
        let snapshot: Vec<(&String, Option<EntryMeta>)> = entries
            .iter()
            .map(|(key, entry)| (key, entry.meta()))
            .collect();
        bincode::serialized_size(&snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::index::WriteState;
    use std::thread;

    fn commit_payload(index: &StorageIndex, key: &str, payload: &[u8]) -> Result<u32> {
        index.commit(
            key,
            payload.len() as u32,
            codec::content_hash(payload),
            codec::crc16_bytes(payload),
            false,
        )
    }

    #[test]
    fn test_reserve_rejects_duplicate_key() {
        let index = StorageIndex::new(u64::MAX);
        index.reserve("a").unwrap();
        assert!(matches!(
            index.reserve("a"),
            Err(StoreError::DuplicateKey(_))
        ));
    }

    #[test]
    fn test_commit_allocates_sequential_regions() {
        let index = StorageIndex::new(u64::MAX);
        index.reserve("a").unwrap();
        index.reserve("b").unwrap();

        let first = commit_payload(&index, "a", b"0123456789").unwrap();
        let second = commit_payload(&index, "b", b"abcdef").unwrap();

        assert_eq!(first, 0);
        assert_eq!(second, 10);
        assert_eq!(index.allocated(), 16);
    }

    #[test]
    fn test_commit_rejects_duplicate_content() {
        let index = StorageIndex::new(u64::MAX);
        index.reserve("a").unwrap();
        index.reserve("b").unwrap();

        commit_payload(&index, "a", b"same bytes").unwrap();
        assert!(matches!(
            commit_payload(&index, "b", b"same bytes"),
            Err(StoreError::DuplicateData)
        ));
    }

    #[test]
    fn test_commit_missing_key() {
        let index = StorageIndex::new(u64::MAX);
        assert!(matches!(
            commit_payload(&index, "ghost", b"data"),
            Err(StoreError::KeyNotFound)
        ));
    }

    #[test]
    fn test_index_size_ceiling_leaves_range_reserved() {
        let index = StorageIndex::new(1);
        index.reserve("a").unwrap();

        let err = commit_payload(&index, "a", b"payload").unwrap_err();
        assert!(matches!(err, StoreError::IndexSizeExceeded { .. }));

        // Allocation happened before the ceiling check
        assert_eq!(index.allocated(), 7);
    }

    #[test]
    fn test_complete_signals_waiters() {
        let index = Arc::new(StorageIndex::new(u64::MAX));
        index.reserve("a").unwrap();
        commit_payload(&index, "a", b"bytes").unwrap();

        let entry = index.get("a").unwrap();
        assert!(!entry.is_completed());
        let waiter = thread::spawn(move || entry.wait_settled());

        thread::sleep(std::time::Duration::from_millis(20));
        index.complete("a");

        assert_eq!(waiter.join().unwrap(), WriteState::Completed);
        assert!(index.get("a").unwrap().is_completed());
    }

    #[test]
    fn test_complete_absent_key_is_noop() {
        let index = StorageIndex::new(u64::MAX);
        index.complete("nothing");
        assert!(index.is_empty());
    }

    #[test]
    fn test_remove_signals_waiters() {
        let index = Arc::new(StorageIndex::new(u64::MAX));
        index.reserve("a").unwrap();

        let entry = index.get("a").unwrap();
        let waiter = thread::spawn(move || entry.wait_settled());

        thread::sleep(std::time::Duration::from_millis(20));
        index.remove("a");

        assert_eq!(waiter.join().unwrap(), WriteState::Removed);
        assert!(!index.contains("a"));
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let index = StorageIndex::new(u64::MAX);
        index.remove("nothing");
        assert!(index.is_empty());
    }

    #[test]
    fn test_concurrent_commits_never_overlap() {
        let index = Arc::new(StorageIndex::new(u64::MAX));
        let mut handles = Vec::new();

        for worker in 0..8 {
            let index = Arc::clone(&index);
            handles.push(thread::spawn(move || {
                let mut regions = Vec::new();
                for i in 0..16 {
                    let key = format!("key-{worker}-{i}");
                    // Distinct payloads so dedup never fires
                    let payload = format!("payload {worker} {i}").into_bytes();
                    index.reserve(&key).unwrap();
                    commit_payload(&index, &key, &payload).unwrap();
                    let region = index.get(&key).unwrap().meta().unwrap().region;
                    regions.push((region.offset() as u64, region.end()));
                }
                regions
            }));
        }

        let mut all: Vec<(u64, u64)> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();

        for pair in all.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "regions overlap: {pair:?}");
        }
    }
}
