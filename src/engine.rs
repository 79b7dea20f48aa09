//! Engine Module
//!
//! The storage engine that coordinates the index, the backing file, and the
//! write/read pipelines.
//!
//! ## Responsibilities
//! - Validate and reserve keys, then drive the write pipeline
//! - Serve reads, including reads that race an in-flight write
//! - Own the backing file and the background writer thread
//! - Trigger memory reclamation around read operations
//!
//! ## Concurrency Model
//!
//! - **add**: validation and metadata reservation run on the caller's
//!   thread; hashing and compression/checksumming for one payload run
//!   concurrently with each other and are joined before offset allocation.
//!   The positioned write itself is handed to the writer thread, so `add`
//!   returns before bytes are durably on disk.
//! - **get**: a read against a pending key parks on the entry's
//!   completed/removed signal without holding any lock, so unrelated keys
//!   are never blocked. Reads of completed entries go straight to the
//!   backing file (or the entry's cache slot).
//! - The backing file is opened per operation; concurrent positioned reads
//!   and writes are safe because allocated regions never overlap.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::codec::{self, ContentHash, CHECKSUM_LEN};
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::index::{EntryMeta, FileRegion, IndexEntry, StorageIndex, WriteState};
use crate::memory::MemoryReclaimer;

// =============================================================================
// Caller-Supplied Info
// =============================================================================

/// Optional expectations supplied alongside an `add`
///
/// A default value carries no expectations.
#[derive(Debug, Clone, Default)]
pub struct StreamInfo {
    /// Expected source length; `add` fails with `LengthMismatch` if it
    /// disagrees with the data handle's length
    pub length: Option<u64>,

    /// Expected content hash; `add` fails with `HashMismatch` if it
    /// disagrees with the computed hash
    pub content_hash: Option<ContentHash>,

    /// Caller promises the payload is already compressed, disabling the
    /// engine's own compression
    pub already_compressed: bool,
}

impl StreamInfo {
    /// No expectations
    pub fn empty() -> Self {
        Self::default()
    }
}

// =============================================================================
// Background Write Job
// =============================================================================

/// A scheduled positioned write, owned by the writer thread
struct WriteJob {
    key: String,
    entry: Arc<IndexEntry>,
    data: Bytes,
    offset: u32,
}

// =============================================================================
// Engine
// =============================================================================

/// The embedded binary object store
///
/// Each engine instance owns its own index and backing file; construction
/// truncates any leftover backing file, so the store is rebuilt from empty
/// every run. There is no cross-restart durability by design.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Path of the single append-only backing file
    storage_path: PathBuf,

    /// Key index and offset allocator (shared with the writer thread)
    index: Arc<StorageIndex>,

    /// Advisory memory-pressure valve
    reclaimer: MemoryReclaimer,

    /// Job queue feeding the writer thread; dropped on shutdown
    writer_tx: Option<Sender<WriteJob>>,

    /// Background writer, joined on shutdown
    writer: Option<JoinHandle<()>>,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const STORAGE_FILENAME: &'static str = "storage.bin";

    /// Open an engine with the given config
    ///
    /// On startup:
    /// 1. Create the data directory if it doesn't exist
    /// 2. Recreate the backing file from empty (prior contents discarded)
    /// 3. Start the background writer thread
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let storage_path = config.data_dir.join(Self::STORAGE_FILENAME);

        // A leftover file from a previous run may be longer than anything
        // this run will write; recreate it from empty
        File::create(&storage_path)?;

        let index = Arc::new(StorageIndex::new(config.max_index_size));
        let reclaimer = MemoryReclaimer::new(
            config.memory_flush_threshold,
            config.memory_critical_threshold,
        );

        let (writer_tx, writer_rx) = unbounded();
        let writer = thread::Builder::new().name("binstore-writer".to_string()).spawn({
            let index = Arc::clone(&index);
            let storage_path = storage_path.clone();
            move || run_writer(writer_rx, index, storage_path)
        })?;

        tracing::info!("binstore engine opened at {}", storage_path.display());

        Ok(Self {
            config,
            storage_path,
            index,
            reclaimer,
            writer_tx: Some(writer_tx),
            writer: Some(writer),
        })
    }

    /// Open with a data directory (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.data_dir = path.to_path_buf();
        Self::open(config)
    }

    // =========================================================================
    // Add
    // =========================================================================

    /// Add a payload under a unique key
    ///
    /// The key doubles as a source-file locator: the bytes that are hashed,
    /// compressed, and written are (re)read from the filesystem path named
    /// by `key`. The `source` handle is consulted only for length/existence
    /// validation, never read for content. The key must therefore name a
    /// readable file.
    ///
    /// Returns once the positioned write has been scheduled, not once bytes
    /// are durably written; a concurrent [`Engine::get`] for the same key
    /// blocks until the write completes or the entry is removed.
    ///
    /// On any failure after reservation the key's entry is removed, which
    /// also releases any reader already waiting on it.
    pub fn add(&self, key: &str, source: &File, info: &StreamInfo) -> Result<()> {
        // Step 1: Validate arguments before touching the index
        if key.is_empty() {
            return Err(StoreError::InvalidArgument(
                "key must not be empty".to_string(),
            ));
        }

        // Step 2: Length expectation is checked against the supplied handle
        let source_len = source.metadata()?.len();
        if let Some(expected) = info.length {
            if expected != source_len {
                return Err(StoreError::LengthMismatch {
                    expected,
                    actual: source_len,
                });
            }
        }

        // Step 3: Claim the key (fails fast on DuplicateKey)
        self.index.reserve(key)?;
        tracing::debug!("reserved key {}", key);

        // Steps 4-7 run in the pipeline; any failure rolls the entry back
        // so no half-committed entry is ever left behind
        self.write_pipeline(key, info).map_err(|e| {
            tracing::debug!("add failed for {}: {}, removing entry", key, e);
            self.index.remove(key);
            e
        })
    }

    /// Hash + compress/checksum concurrently, commit, schedule the write
    fn write_pipeline(&self, key: &str, info: &StreamInfo) -> Result<()> {
        let source_path = Path::new(key);
        let raw_len = fs::metadata(source_path)?.len();
        let compress = !info.already_compressed && raw_len > self.config.compression_threshold;

        // Step 4: Both sub-tasks read the source independently and run
        // concurrently; they are joined before offset allocation
        let (hash_result, pack_result) = thread::scope(|scope| {
            let hasher = scope.spawn(|| -> Result<ContentHash> {
                let mut source = File::open(source_path)?;
                codec::content_hash_reader(&mut source)
            });
            let packer = scope.spawn(|| -> Result<(Bytes, [u8; CHECKSUM_LEN])> {
                let raw = fs::read(source_path)?;
                let stored = if compress { codec::compress(&raw)? } else { raw };
                let checksum = codec::crc16_bytes(&stored);
                Ok((Bytes::from(stored), checksum))
            });
            (hasher.join(), packer.join())
        });

        let content_hash = hash_result
            .map_err(|_| StoreError::Storage("hash task panicked".to_string()))??;
        let (stored, checksum) = pack_result
            .map_err(|_| StoreError::Storage("compression task panicked".to_string()))??;

        if let Some(expected) = info.content_hash {
            if expected != content_hash {
                return Err(StoreError::HashMismatch);
            }
        }

        // Step 5: Allocate the byte range and finalize metadata
        let stored_len = u32::try_from(stored.len()).map_err(|_| {
            StoreError::InvalidArgument("stored payload exceeds the 4-byte size limit".to_string())
        })?;
        let offset = self
            .index
            .commit(key, stored_len, content_hash, checksum, compress)?;
        tracing::debug!(
            "committed {} ({} bytes at offset {}, compressed: {})",
            key,
            stored_len,
            offset,
            compress
        );

        // Step 6: Hand the positioned write to the writer thread
        // (fire-and-continue; completion is signalled through the entry)
        let entry = self
            .index
            .get(key)
            .ok_or_else(|| StoreError::Storage("entry vanished before write".to_string()))?;
        self.writer_tx
            .as_ref()
            .ok_or_else(|| StoreError::Storage("engine is shut down".to_string()))?
            .send(WriteJob {
                key: key.to_string(),
                entry,
                data: stored,
                offset,
            })
            .map_err(|_| StoreError::Storage("writer thread unavailable".to_string()))?;

        // Step 7: Capacity check happens after allocation; the byte range
        // stays reserved even though the caller sees an error
        let limit = self.config.max_storage_file_size;
        let end = offset as u64 + stored_len as u64;
        if limit > 0 && end > limit {
            return Err(StoreError::StorageFileSizeExceeded {
                offset: offset as u64,
                size: stored_len as u64,
                limit,
            });
        }

        Ok(())
    }

    // =========================================================================
    // Get
    // =========================================================================

    /// Get a payload by key
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` — the raw (decompressed) payload
    /// - `Ok(None)` — the read raced a write of this key that failed;
    ///   the entry was removed while we were waiting on it
    /// - `Err(KeyNotFound)` — the key is not present in the index
    pub fn get(&self, key: &str) -> Result<Option<Bytes>> {
        // Advisory, idempotent, safe to call redundantly
        self.reclaimer.maybe_reclaim();
        let result = self.read_pipeline(key);
        self.reclaimer.maybe_reclaim();
        result
    }

    fn read_pipeline(&self, key: &str) -> Result<Option<Bytes>> {
        let entry = self.index.get(key).ok_or(StoreError::KeyNotFound)?;

        // Step 1: Cache hit skips disk I/O and the checksum recheck
        // (verified at promotion time)
        if let Some(cached) = entry.cached() {
            tracing::debug!("serving {} from cache", key);
            let meta = entry
                .meta()
                .ok_or_else(|| StoreError::Storage("cached entry without metadata".to_string()))?;
            return Ok(Some(Self::unpack(&meta, cached)?));
        }

        // Step 2: Wait out an in-flight write of this key. Holding no lock
        // here keeps adds and gets of other keys fully concurrent.
        if !entry.is_completed() {
            match entry.wait_settled() {
                WriteState::Removed => {
                    tracing::debug!("read of {} raced a failed write", key);
                    return Ok(None);
                }
                WriteState::Completed | WriteState::Pending => {}
            }
        }

        // Step 3: The region reference is valid once the entry completed
        let meta = entry
            .meta()
            .ok_or_else(|| StoreError::Storage("completed entry without metadata".to_string()))?;
        let stored = self.read_region(&meta.region)?;

        // Step 4: Verify integrity of what the disk handed back
        if codec::crc16_bytes(&stored) != meta.checksum {
            return Err(StoreError::CorruptedData);
        }
        let stored = Bytes::from(stored);

        // Step 5: Promote into the cache slot once the entry is read often
        // enough; later reads short-circuit at step 1
        let threshold = self.config.cache_fetch_threshold;
        if threshold > 0 && entry.record_fetch() >= threshold {
            tracing::debug!("promoting {} into the cache slot", key);
            entry.cache(stored.clone());
        }

        Ok(Some(Self::unpack(&meta, stored)?))
    }

    /// Check if a key is present in the store
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the engine gracefully
    ///
    /// Drains scheduled writes, stops the writer thread, and runs a final
    /// memory-reclamation pass.
    pub fn close(mut self) -> Result<()> {
        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        // Dropping the sender lets the writer drain its queue and exit
        self.writer_tx = None;
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                tracing::warn!("writer thread panicked during shutdown");
            }
            self.reclaimer.reclaim_now();
            tracing::info!("binstore engine closed");
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Path of the backing file
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// Number of live keys
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// Total bytes allocated in the backing file
    pub fn allocated_bytes(&self) -> u64 {
        self.index.allocated()
    }

    /// Approximate serialized size of the index
    pub fn estimated_index_size(&self) -> Result<u64> {
        self.index.estimated_size()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Positioned read of exactly `size` bytes at `offset`
    fn read_region(&self, region: &FileRegion) -> Result<Vec<u8>> {
        let mut file = File::open(&self.storage_path)?;
        file.seek(SeekFrom::Start(region.offset() as u64))?;
        let mut buffer = vec![0u8; region.size() as usize];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Turn stored bytes back into the raw payload
    fn unpack(meta: &EntryMeta, stored: Bytes) -> Result<Bytes> {
        if meta.is_compressed {
            Ok(Bytes::from(codec::decompress(&stored)?))
        } else {
            Ok(stored)
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Writer Thread
// =============================================================================

/// Drains write jobs until the engine drops its sender
///
/// Success settles the entry's completed signal; failure evicts the key,
/// which releases any waiting reader with a not-found outcome.
fn run_writer(jobs: Receiver<WriteJob>, index: Arc<StorageIndex>, storage_path: PathBuf) {
    while let Ok(job) = jobs.recv() {
        match write_at(&storage_path, job.offset, &job.data) {
            Ok(()) => {
                tracing::debug!(
                    "wrote {} bytes at offset {} for {}",
                    job.data.len(),
                    job.offset,
                    job.key
                );
                job.entry.signal_completed();
            }
            Err(e) => {
                tracing::warn!("background write failed for {}: {}", job.key, e);
                index.remove(&job.key);
            }
        }
    }
}

/// Positioned write of the stored bytes at their allocated offset
fn write_at(path: &Path, offset: u32, data: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(offset as u64))?;
    file.write_all(data)?;
    file.flush()?;
    Ok(())
}
