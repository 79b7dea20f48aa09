//! # binstore
//!
//! An embedded binary object store:
//! - Submit a byte stream under a unique key, retrieve it later by that key
//! - Single append-only backing file with non-overlapping byte ranges
//! - Content-addressed deduplication (identical payloads stored once)
//! - CRC16 integrity verification on every uncached read
//! - Readers synchronize cleanly with in-flight writes of the same key
//!
//! The backing file and its index are rebuilt from empty every run; the
//! store deliberately provides no crash/restart durability.
//!
//! ## Architecture Overview
//!
//! ```text
//!         add(key, source, info)                 get(key)
//!                  │                                │
//! ┌────────────────▼────────────────────────────────▼───────────────────┐
//! │                             Engine                                  │
//! │   validate ─► reserve ─► hash ∥ compress+crc ─► commit ─► schedule  │
//! │                                                                     │
//! │   lookup ─► cache? ─► wait(completed|removed) ─► read ─► verify     │
//! └───────┬──────────────────────┬──────────────────────────┬───────────┘
//!         │                      │                          │
//!  ┌──────▼───────┐      ┌───────▼────────┐        ┌────────▼────────┐
//!  │ StorageIndex │      │ Writer Thread  │        │ MemoryReclaimer │
//!  │ (keys, dedup,│      │ (positioned    │        │ (advisory,      │
//!  │  allocator)  │      │  writes)       │        │  threshold-based│
//!  └──────────────┘      └───────┬────────┘        └─────────────────┘
//!                                │
//!                        ┌───────▼────────┐
//!                        │  storage.bin   │
//!                        │ (append-only)  │
//!                        └────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod index;
pub mod memory;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::Config;
pub use engine::{Engine, StreamInfo};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of binstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
