//! Index Module
//!
//! In-memory bookkeeping for every stored key.
//!
//! ## Responsibilities
//! - Thread-safe key → entry mapping (reserve / commit / remove / complete)
//! - Monotonic byte-range allocation over the backing file
//! - Content-hash deduplication at commit time
//! - Approximate serialized-size ceiling enforcement
//!
//! ## Lifecycle of a key
//! ```text
//! reserve ──► pending entry ──► commit (region + metadata) ──► complete
//!                  │                                               │
//!                  └──────────── remove (failure) ◄────────────────┘
//! ```
//!
//! The index lives only in memory for the process lifetime; nothing is
//! persisted or re-opened across restarts.

mod entry;
mod index;

pub use entry::{EntryMeta, FileRegion, IndexEntry, WriteSignal, WriteState};
pub use index::StorageIndex;
