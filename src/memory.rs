//! Memory Reclaimer
//!
//! Advisory memory-pressure valve invoked by the engine around read
//! operations. Watches process memory usage against two thresholds and
//! forces a reclamation pass when the "flush" threshold is crossed; if
//! usage still sits above the "critical" threshold afterwards, reclamation
//! repeats in a bounded loop as backpressure. No correctness property
//! depends on any of this.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Callback that frees whatever memory it can
pub type ReclaimHook = Box<dyn Fn() + Send + Sync>;

/// Callback reporting current process memory usage in bytes
pub type UsageProbe = Box<dyn Fn() -> u64 + Send + Sync>;

/// Upper bound on repeated reclamation passes under critical pressure
const MAX_CRITICAL_PASSES: u32 = 8;

/// Watches process memory and forces reclamation under pressure
pub struct MemoryReclaimer {
    /// Usage above this triggers a reclamation pass (0 disables)
    flush_threshold: u64,

    /// Usage above this after reclaiming triggers the bounded busy-wait
    critical_threshold: u64,

    /// Only one reclamation attempt runs at a time; others no-op
    in_progress: Mutex<()>,

    /// Completed reclamation passes (observable for tests/diagnostics)
    passes: AtomicU64,

    reclaim: ReclaimHook,
    usage: UsageProbe,
}

impl MemoryReclaimer {
    /// Create a reclaimer with the platform-default probe and a no-op hook
    ///
    /// Rust has no collector to prod, so the default hook does nothing;
    /// embedders with an allocator that supports trimming can inject one
    /// via [`MemoryReclaimer::with_hooks`].
    pub fn new(flush_threshold: u64, critical_threshold: u64) -> Self {
        Self::with_hooks(
            flush_threshold,
            critical_threshold,
            Box::new(|| {}),
            Box::new(default_usage_probe),
        )
    }

    /// Create a reclaimer with injected reclaim and usage callbacks
    pub fn with_hooks(
        flush_threshold: u64,
        critical_threshold: u64,
        reclaim: ReclaimHook,
        usage: UsageProbe,
    ) -> Self {
        Self {
            flush_threshold,
            critical_threshold,
            in_progress: Mutex::new(()),
            passes: AtomicU64::new(0),
            reclaim,
            usage,
        }
    }

    /// Reclaim if usage is above the flush threshold; idempotent and cheap
    /// when it is not
    ///
    /// Concurrent callers do not queue: whoever fails to take the lock
    /// returns immediately.
    pub fn maybe_reclaim(&self) {
        if self.flush_threshold == 0 || (self.usage)() <= self.flush_threshold {
            return;
        }

        let Some(_guard) = self.in_progress.try_lock() else {
            return;
        };

        // Re-check under the lock; another pass may have just finished
        if (self.usage)() <= self.flush_threshold {
            return;
        }

        tracing::debug!("memory above flush threshold, reclaiming");
        self.reclaim_pass();

        // Backpressure: stall here rather than risk running out of memory,
        // but never spin forever on a probe that cannot drop
        let mut attempts = 0;
        while (self.usage)() > self.critical_threshold && attempts < MAX_CRITICAL_PASSES {
            tracing::warn!(attempts, "memory above critical threshold");
            self.reclaim_pass();
            attempts += 1;
        }
    }

    /// Unconditional reclamation pass (used on engine shutdown)
    pub fn reclaim_now(&self) {
        let _guard = self.in_progress.lock();
        self.reclaim_pass();
    }

    /// Completed reclamation passes so far
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    fn reclaim_pass(&self) {
        (self.reclaim)();
        self.passes.fetch_add(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for MemoryReclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryReclaimer")
            .field("flush_threshold", &self.flush_threshold)
            .field("critical_threshold", &self.critical_threshold)
            .field("passes", &self.passes())
            .finish()
    }
}

/// Resident-set size of the current process, in bytes
///
/// Reads `/proc/self/statm` on Linux; reports 0 elsewhere, which keeps the
/// reclaimer a no-op on platforms without a cheap usage probe.
#[cfg(target_os = "linux")]
fn default_usage_probe() -> u64 {
    let Ok(statm) = std::fs::read_to_string("/proc/self/statm") else {
        return 0;
    };
    let resident_pages: u64 = statm
        .split_whitespace()
        .nth(1)
        .and_then(|field| field.parse().ok())
        .unwrap_or(0);
    resident_pages * 4096
}

#[cfg(not(target_os = "linux"))]
fn default_usage_probe() -> u64 {
    0
}
