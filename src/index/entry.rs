//! Index entry
//!
//! Per-key metadata plus the cross-thread signals that let a reader wait
//! for an in-flight write of the same key.
//!
//! ## Lifecycle
//! An entry is created empty at reservation time, filled in exactly once at
//! commit time, and then either completed (bytes landed on disk) or removed
//! (the write pipeline failed). Entries are never reused; removal deletes
//! the mapping outright.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;

use crate::codec::{self, ContentHash, CHECKSUM_LEN, FIXED_INT_LEN};

// =============================================================================
// Write Signal
// =============================================================================

/// Outcome of an entry's write pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// Reserved; bytes not yet durably written
    Pending,

    /// Bytes landed on disk; the file region is valid
    Completed,

    /// The write failed and the entry was evicted
    Removed,
}

/// One-shot broadcast primitive for the completed/removed race
///
/// The state moves out of `Pending` exactly once and never changes again.
/// All current waiters are woken on that transition; late subscribers see
/// the settled state immediately. Waiting holds no lock other than the
/// signal's own mutex, so unrelated keys are never blocked.
#[derive(Debug)]
pub struct WriteSignal {
    state: Mutex<WriteState>,
    settled: Condvar,
}

impl WriteSignal {
    fn new() -> Self {
        Self {
            state: Mutex::new(WriteState::Pending),
            settled: Condvar::new(),
        }
    }

    /// Current state without waiting
    pub fn state(&self) -> WriteState {
        *self.state.lock()
    }

    /// Block until the signal settles, returning the final state
    pub fn wait(&self) -> WriteState {
        let mut state = self.state.lock();
        while *state == WriteState::Pending {
            self.settled.wait(&mut state);
        }
        *state
    }

    /// Settle as completed; no-op if already settled
    pub fn complete(&self) {
        self.settle(WriteState::Completed);
    }

    /// Settle as removed; no-op if already settled
    pub fn remove(&self) {
        self.settle(WriteState::Removed);
    }

    fn settle(&self, outcome: WriteState) {
        let mut state = self.state.lock();
        if *state == WriteState::Pending {
            *state = outcome;
            self.settled.notify_all();
        }
    }
}

// =============================================================================
// File Region
// =============================================================================

/// Reference to `[offset, offset + size)` in the backing file
///
/// Stored in encoded fixed-width form; assigned once at commit time and
/// immutable afterwards.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FileRegion {
    offset: [u8; FIXED_INT_LEN],
    size: [u8; FIXED_INT_LEN],
}

impl FileRegion {
    pub fn new(offset: u32, size: u32) -> Self {
        Self {
            offset: codec::encode_u32(offset),
            size: codec::encode_u32(size),
        }
    }

    /// Byte offset into the backing file
    pub fn offset(&self) -> u32 {
        codec::decode_u32(self.offset)
    }

    /// Length of the stored bytes
    pub fn size(&self) -> u32 {
        codec::decode_u32(self.size)
    }

    /// One past the last byte of the region
    pub fn end(&self) -> u64 {
        self.offset() as u64 + self.size() as u64
    }
}

// =============================================================================
// Entry Metadata
// =============================================================================

/// Commit-time metadata for one stored key
///
/// Serializable so the index can estimate its total serialized size
/// against the configured ceiling.
#[derive(Debug, Clone, Serialize)]
pub struct EntryMeta {
    /// Hash of the raw (pre-compression) payload
    pub content_hash: ContentHash,

    /// CRC16 over the bytes actually stored on disk
    pub checksum: [u8; CHECKSUM_LEN],

    /// Whether stored bytes must be decompressed on read
    pub is_compressed: bool,

    /// Where the stored bytes live in the backing file
    pub region: FileRegion,
}

// =============================================================================
// Index Entry
// =============================================================================

/// The metadata and state record for one stored key
#[derive(Debug)]
pub struct IndexEntry {
    /// Set exactly once at commit time, `None` while pending
    meta: RwLock<Option<EntryMeta>>,

    /// Completion/removal broadcast for readers racing the write
    signal: WriteSignal,

    /// Completed reads since creation (saturating)
    fetch_count: AtomicU32,

    /// Opportunistic in-memory copy of the stored bytes, set at most once
    cached: OnceLock<Bytes>,
}

impl IndexEntry {
    pub(crate) fn new() -> Self {
        Self {
            meta: RwLock::new(None),
            signal: WriteSignal::new(),
            fetch_count: AtomicU32::new(0),
            cached: OnceLock::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Metadata
    // -------------------------------------------------------------------------

    /// Commit-time metadata, `None` while the entry is still pending
    pub fn meta(&self) -> Option<EntryMeta> {
        self.meta.read().clone()
    }

    /// Content hash if committed
    pub fn content_hash(&self) -> Option<ContentHash> {
        self.meta.read().as_ref().map(|m| m.content_hash)
    }

    pub(crate) fn set_meta(&self, meta: EntryMeta) {
        *self.meta.write() = Some(meta);
    }

    // -------------------------------------------------------------------------
    // Signals
    // -------------------------------------------------------------------------

    /// Whether the backing bytes are durably written
    pub fn is_completed(&self) -> bool {
        self.signal.state() == WriteState::Completed
    }

    /// Block until the entry settles as completed or removed
    pub fn wait_settled(&self) -> WriteState {
        self.signal.wait()
    }

    pub(crate) fn signal_completed(&self) {
        self.signal.complete();
    }

    pub(crate) fn signal_removed(&self) {
        self.signal.remove();
    }

    // -------------------------------------------------------------------------
    // Fetch Tracking & Cache Slot
    // -------------------------------------------------------------------------

    /// Record a completed read, returning the new count (saturating)
    pub fn record_fetch(&self) -> u32 {
        let previous = self
            .fetch_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                Some(count.saturating_add(1))
            })
            .unwrap_or(u32::MAX);
        previous.saturating_add(1)
    }

    /// Number of completed reads since creation
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Promote stored bytes into the cache slot; first caller wins
    pub fn cache(&self, bytes: Bytes) {
        let _ = self.cached.set(bytes);
    }

    /// Cached stored bytes, if promoted
    pub fn cached(&self) -> Option<Bytes> {
        self.cached.get().cloned()
    }
}
