//! Cache statistics and metrics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for cache operations.
///
/// All counters are atomic and can be safely accessed from multiple threads.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of accepted updates.
    updates: AtomicU64,
    /// Number of deletes that removed a resource.
    deletes: AtomicU64,
    /// Number of writes rejected as invalid.
    rejected_writes: AtomicU64,
    /// Number of snapshots built.
    builds: AtomicU64,
    /// Number of snapshot reads retried because of a concurrent write.
    build_retries: AtomicU64,
    /// Number of watch notifications sent.
    notifications_sent: AtomicU64,
}

impl CacheStats {
    /// Create new cache statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted update.
    #[inline]
    pub fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delete that removed a resource.
    #[inline]
    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected write.
    #[inline]
    pub fn record_rejected(&self) {
        self.rejected_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed snapshot build and the retries it needed.
    #[inline]
    pub fn record_build(&self, retries: u64) {
        self.builds.fetch_add(1, Ordering::Relaxed);
        if retries > 0 {
            self.build_retries.fetch_add(retries, Ordering::Relaxed);
        }
    }

    /// Record notifications sent.
    #[inline]
    pub fn record_notifications(&self, count: u64) {
        self.notifications_sent.fetch_add(count, Ordering::Relaxed);
    }

    /// Get total accepted updates.
    #[inline]
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Get total effective deletes.
    #[inline]
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Get total rejected writes.
    #[inline]
    pub fn rejected_writes(&self) -> u64 {
        self.rejected_writes.load(Ordering::Relaxed)
    }

    /// Get total snapshots built.
    #[inline]
    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

    /// Get total build retries.
    #[inline]
    pub fn build_retries(&self) -> u64 {
        self.build_retries.load(Ordering::Relaxed)
    }

    /// Get total notifications sent.
    #[inline]
    pub fn notifications_sent(&self) -> u64 {
        self.notifications_sent.load(Ordering::Relaxed)
    }

    /// Fraction of writes that were rejected (0.0 to 1.0).
    pub fn rejection_rate(&self) -> f64 {
        let rejected = self.rejected_writes() as f64;
        let total = rejected + self.updates() as f64;
        if total == 0.0 {
            0.0
        } else {
            rejected / total
        }
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        self.updates.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.rejected_writes.store(0, Ordering::Relaxed);
        self.builds.store(0, Ordering::Relaxed);
        self.build_retries.store(0, Ordering::Relaxed);
        self.notifications_sent.store(0, Ordering::Relaxed);
    }
}
