//! Lock-free engine metrics.
//!
//! Hot-path recording is O(1) with no allocations or locks; snapshotting
//! is lock-free loads. Intentionally lightweight (std-only) so every
//! crate in the workspace can record metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic lock-free counter.
#[derive(Debug, Default)]
pub struct Counter {
    v: AtomicU64,
}

impl Counter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            v: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc(&self) {
        self.v.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, delta: u64) {
        self.v.fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> u64 {
        self.v.load(Ordering::Relaxed)
    }
}

/// Counters describing one engine instance's activity.
///
/// One instance lives inside each engine; surfaces read it through
/// `InboxEngine::metrics()` for diagnostics panels.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Poll ticks that completed a stats (and possibly page) fetch.
    pub polls_completed: Counter,
    /// Poll deadlines dropped because the previous fetch was still running.
    pub ticks_skipped: Counter,
    /// Fetch results discarded because their generation was superseded.
    pub stale_generation_discards: Counter,
    /// Mutation completions discarded because a newer sequence was issued.
    pub stale_sequence_discards: Counter,
    /// Duplicate mutations that joined an in-flight call instead of
    /// issuing their own request.
    pub mutations_coalesced: Counter,
    /// Optimistic patches rolled back after a failed network call.
    pub rollbacks: Counter,
    /// Stats-invariant violations clamped instead of applied.
    pub invariant_clamps: Counter,
    /// Subscriber callbacks actually invoked (changed views only).
    pub views_delivered: Counter,
}

impl EngineMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            polls_completed: Counter::new(),
            ticks_skipped: Counter::new(),
            stale_generation_discards: Counter::new(),
            stale_sequence_discards: Counter::new(),
            mutations_coalesced: Counter::new(),
            rollbacks: Counter::new(),
            invariant_clamps: Counter::new(),
            views_delivered: Counter::new(),
        }
    }

    /// Point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        EngineMetricsSnapshot {
            polls_completed: self.polls_completed.load(),
            ticks_skipped: self.ticks_skipped.load(),
            stale_generation_discards: self.stale_generation_discards.load(),
            stale_sequence_discards: self.stale_sequence_discards.load(),
            mutations_coalesced: self.mutations_coalesced.load(),
            rollbacks: self.rollbacks.load(),
            invariant_clamps: self.invariant_clamps.load(),
            views_delivered: self.views_delivered.load(),
        }
    }
}

/// Snapshot of [`EngineMetrics`] at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineMetricsSnapshot {
    pub polls_completed: u64,
    pub ticks_skipped: u64,
    pub stale_generation_discards: u64,
    pub stale_sequence_discards: u64,
    pub mutations_coalesced: u64,
    pub rollbacks: u64,
    pub invariant_clamps: u64,
    pub views_delivered: u64,
}
