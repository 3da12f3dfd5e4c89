//! Versioned in-memory inbox cache.
//!
//! `InboxStore` is the single source of truth every surface reads from.
//! It holds the cached notification list (newest first), the aggregate
//! stats, and a strictly-increasing version counter that subscribers use
//! as their cheap "have I seen this" check.
//!
//! Writers are funneled: only the mutation coordinator and the polling
//! scheduler call the mutating operations. Consistency rules:
//!
//! - Every successful mutating operation increments `version` exactly once.
//! - A poll refresh never overwrites an id with an unresolved optimistic
//!   mutation: pending mark-reads keep `is_read = true` in the merged
//!   result, pending removes drop the incoming item, and a pending bulk
//!   mutation discards the refresh outright (the next tick reconciles).
//! - Single-id mark-read adjusts `stats.unread` by -1 clamped at 0; a
//!   would-be-negative counter is logged and clamped, never stored.
//! - Bulk patches recompute `stats` deterministically from the resulting
//!   notification set instead of incrementally, so counters cannot drift.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use tracing::{debug, warn};

use notify_inbox_core::{
    EngineMetrics, InboxStats, Notification, NotificationPage, newest_first, now_naive,
};

// ── Public types ────────────────────────────────────────────────────────

/// Lifecycle of a session's inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created, nothing fetched yet.
    Idle,
    /// A fetch is expected to populate the store (no usable data yet or
    /// an explicit refresh was requested).
    Loading,
    /// Cached data is current as of the last successful fetch.
    Ready,
    /// The last fetch failed; previous data is retained and flagged.
    Error,
    /// Torn down at logout. Terminal.
    Closed,
}

/// How an incoming page merges into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// The page replaces the cached list (poll refresh of page 1).
    Replace,
    /// The page extends the cached list (pagination).
    Append,
}

/// Kind of a single-target optimistic mutation, used for pending-shield
/// bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleKind {
    MarkRead,
    Remove,
}

/// A bulk optimistic patch. All-or-nothing: the coordinator captures the
/// full snapshot before applying and rolls the whole thing back on
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkPatch {
    MarkAllRead,
    ClearRead,
    /// Remove items created strictly before the cutoff.
    ClearOld { cutoff: NaiveDateTime },
    ClearAll,
}

/// Immutable view of the store at one version.
#[derive(Debug, Clone, PartialEq)]
pub struct InboxSnapshot {
    pub version: u64,
    /// Newest first, ties broken by descending id.
    pub notifications: Vec<Notification>,
    pub stats: InboxStats,
    /// Page number the cache currently represents (0 before any fetch).
    pub page: u32,
    pub has_more: bool,
    pub phase: SessionPhase,
    /// Transient-failure banner; cleared by the next successful fetch.
    pub error: Option<String>,
}

// ── Store ───────────────────────────────────────────────────────────────

/// Pending single-target mutations for one id.
#[derive(Debug, Default)]
struct PendingEntry {
    /// Latest sequence issued for this id; completions with a smaller
    /// sequence are stale.
    latest_seq: u64,
    mark_reads: u32,
    removes: u32,
}

impl PendingEntry {
    const fn is_idle(&self) -> bool {
        self.mark_reads == 0 && self.removes == 0
    }
}

#[derive(Debug)]
struct StoreInner {
    notifications: IndexMap<i64, Notification>,
    stats: InboxStats,
    version: u64,
    page: u32,
    has_more: bool,
    phase: SessionPhase,
    error: Option<String>,
    /// Per-id pending mutations (shield against poll overwrite + sequence
    /// staleness tracking).
    pending: HashMap<i64, PendingEntry>,
    /// Count of in-flight bulk mutations; refreshes are discarded while
    /// nonzero.
    bulk_pending: u32,
    /// Source of mutation sequence numbers.
    next_seq: u64,
}

/// Thread-safe inbox cache. See the module docs for the consistency rules.
pub struct InboxStore {
    inner: Mutex<StoreInner>,
    metrics: Arc<EngineMetrics>,
}

impl InboxStore {
    #[must_use]
    pub fn new(metrics: Arc<EngineMetrics>) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                notifications: IndexMap::new(),
                stats: InboxStats::default(),
                version: 0,
                page: 0,
                has_more: false,
                phase: SessionPhase::Idle,
                error: None,
                pending: HashMap::new(),
                bulk_pending: 0,
                next_seq: 0,
            }),
            metrics,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Current snapshot. Cheap relative to list size; subscribers should
    /// gate on `version` before deriving views.
    #[must_use]
    pub fn snapshot(&self) -> InboxSnapshot {
        let inner = self.lock();
        InboxSnapshot {
            version: inner.version,
            notifications: inner.notifications.values().cloned().collect(),
            stats: inner.stats,
            page: inner.page,
            has_more: inner.has_more,
            phase: inner.phase,
            error: inner.error.clone(),
        }
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    // ── Fetch-path writers (scheduler) ──────────────────────────────────

    /// Mark the store as expecting data (`Idle`/`Ready` -> `Loading`).
    pub fn mark_loading(&self) {
        let mut inner = self.lock();
        if inner.phase == SessionPhase::Closed {
            return;
        }
        inner.phase = SessionPhase::Loading;
        inner.bump();
    }

    /// Record a transient fetch failure. Data is retained; the flag is
    /// cleared by the next successful apply.
    pub fn flag_error(&self, message: &str) {
        let mut inner = self.lock();
        if inner.phase == SessionPhase::Closed {
            return;
        }
        inner.phase = SessionPhase::Error;
        inner.error = Some(message.to_string());
        inner.bump();
    }

    /// Merge a fetched page. Returns `false` when the refresh was
    /// discarded because a bulk mutation is unresolved (or the store is
    /// closed); the caller counts the discard.
    pub fn apply_page(&self, page: &NotificationPage, mode: MergeMode) -> bool {
        let mut inner = self.lock();
        if inner.phase == SessionPhase::Closed {
            return false;
        }
        if inner.bulk_pending > 0 {
            debug!(mode = ?mode, "page refresh discarded: bulk mutation unresolved");
            return false;
        }

        let mut merged: IndexMap<i64, Notification> = match mode {
            MergeMode::Replace => IndexMap::with_capacity(page.items.len()),
            MergeMode::Append => std::mem::take(&mut inner.notifications),
        };
        for item in &page.items {
            let entry = inner.pending.get(&item.id);
            // Shield unresolved optimistic state from the refresh.
            if entry.is_some_and(|p| p.removes > 0) {
                continue;
            }
            let mut item = item.clone();
            if entry.is_some_and(|p| p.mark_reads > 0) {
                item.is_read = true;
            }
            merged.insert(item.id, item);
        }
        merged.sort_by(|_, a, _, b| newest_first(a, b));

        inner.notifications = merged;
        inner.page = page.current_page;
        inner.has_more = page.has_more();
        inner.phase = SessionPhase::Ready;
        inner.error = None;
        inner.bump();
        true
    }

    /// Apply server stats. Discarded while any optimistic mutation is
    /// unresolved — the server cannot yet reflect it, and the next poll
    /// reconciles.
    pub fn apply_stats(&self, stats: InboxStats) -> bool {
        let mut inner = self.lock();
        if inner.phase == SessionPhase::Closed {
            return false;
        }
        if inner.bulk_pending > 0 || !inner.pending.is_empty() {
            debug!("stats refresh discarded: optimistic mutation unresolved");
            return false;
        }
        inner.stats = self.clamped(stats);
        inner.phase = SessionPhase::Ready;
        inner.error = None;
        inner.bump();
        true
    }

    // ── Mutation-path writers (coordinator) ─────────────────────────────

    /// Optimistically mark one notification read.
    ///
    /// Flips `is_read` in the cached list (when present), adjusts
    /// `stats.unread` by -1 clamped at 0, registers the pending shield,
    /// and returns the issued sequence plus the exact pre-mutation
    /// snapshot for rollback.
    pub fn optimistic_mark_read(&self, id: i64) -> (u64, InboxSnapshot) {
        let mut inner = self.lock();
        let before = inner.to_snapshot();

        if inner.stats.unread == 0 {
            // Nothing should be unread; flipping would underflow.
            if inner.notifications.get(&id).is_some_and(|n| !n.is_read) {
                warn!(id, "unread counter underflow clamped on mark-read");
                self.metrics.invariant_clamps.inc();
            }
        } else {
            inner.stats.unread -= 1;
        }
        if let Some(n) = inner.notifications.get_mut(&id) {
            n.is_read = true;
        }

        let seq = inner.issue_seq(id, SingleKind::MarkRead);
        inner.bump();
        (seq, before)
    }

    /// Optimistically delete one notification. Stats are recomputed from
    /// the resulting set (total/unread/last_24h all shift).
    pub fn optimistic_remove(&self, id: i64) -> (u64, InboxSnapshot) {
        let mut inner = self.lock();
        let before = inner.to_snapshot();

        let was_cached = inner.notifications.shift_remove(&id).is_some();
        if was_cached {
            inner.recompute_stats();
        } else if inner.stats.total > 0 {
            // Not on the cached page; trust the server-side total.
            inner.stats.total -= 1;
            inner.stats.unread = inner.stats.unread.min(inner.stats.total);
        }

        let seq = inner.issue_seq(id, SingleKind::Remove);
        inner.bump();
        (seq, before)
    }

    /// Optimistically apply a bulk patch and mark the store bulk-pending.
    /// Returns the pre-mutation snapshot for all-or-nothing rollback.
    pub fn optimistic_bulk(&self, patch: BulkPatch) -> InboxSnapshot {
        let mut inner = self.lock();
        let before = inner.to_snapshot();

        match patch {
            BulkPatch::MarkAllRead => {
                for n in inner.notifications.values_mut() {
                    n.is_read = true;
                }
                // The cached page may be a subset of the server total, but
                // mark-all-read touches every row server-side too.
                inner.stats.unread = 0;
            }
            BulkPatch::ClearRead => {
                inner.notifications.retain(|_, n| !n.is_read);
                inner.recompute_stats();
            }
            BulkPatch::ClearOld { cutoff } => {
                inner.notifications.retain(|_, n| n.created_at >= cutoff);
                inner.recompute_stats();
            }
            BulkPatch::ClearAll => {
                inner.notifications.clear();
                inner.recompute_stats();
            }
        }

        inner.bulk_pending += 1;
        inner.bump();
        before
    }

    /// Resolve a single-target mutation. Returns `true` when `seq` is
    /// still the latest issued for `id` — stale completions must be
    /// discarded by the caller.
    pub fn finish_single(&self, id: i64, kind: SingleKind, seq: u64) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.pending.get_mut(&id) else {
            return false;
        };
        match kind {
            SingleKind::MarkRead => entry.mark_reads = entry.mark_reads.saturating_sub(1),
            SingleKind::Remove => entry.removes = entry.removes.saturating_sub(1),
        }
        let is_latest = entry.latest_seq == seq;
        if entry.is_idle() {
            inner.pending.remove(&id);
        }
        is_latest
    }

    /// Resolve one bulk mutation.
    pub fn finish_bulk(&self) {
        let mut inner = self.lock();
        inner.bulk_pending = inner.bulk_pending.saturating_sub(1);
    }

    /// Restore the exact prior data from a pre-mutation snapshot. The
    /// version still advances: rollback is itself a mutation subscribers
    /// must observe.
    pub fn rollback(&self, before: &InboxSnapshot) {
        let mut inner = self.lock();
        if inner.phase == SessionPhase::Closed {
            return;
        }
        inner.notifications = before
            .notifications
            .iter()
            .map(|n| (n.id, n.clone()))
            .collect();
        inner.stats = before.stats;
        inner.page = before.page;
        inner.has_more = before.has_more;
        inner.bump();
    }

    /// Terminal teardown: clear everything, enter `Closed`.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.phase == SessionPhase::Closed {
            return;
        }
        inner.notifications.clear();
        inner.stats = InboxStats::default();
        inner.page = 0;
        inner.has_more = false;
        inner.pending.clear();
        inner.bulk_pending = 0;
        inner.error = None;
        inner.phase = SessionPhase::Closed;
        inner.bump();
    }

    /// Clamp a stats payload into invariant range (`unread <= total`),
    /// counting and logging violations instead of storing them.
    fn clamped(&self, stats: InboxStats) -> InboxStats {
        if stats.is_consistent() {
            return stats;
        }
        warn!(
            total = stats.total,
            unread = stats.unread,
            "server stats violate unread <= total; clamping"
        );
        self.metrics.invariant_clamps.inc();
        InboxStats {
            unread: stats.unread.min(stats.total),
            ..stats
        }
    }
}

impl StoreInner {
    fn bump(&mut self) {
        self.version += 1;
    }

    fn issue_seq(&mut self, id: i64, kind: SingleKind) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        let entry = self.pending.entry(id).or_default();
        entry.latest_seq = seq;
        match kind {
            SingleKind::MarkRead => entry.mark_reads += 1,
            SingleKind::Remove => entry.removes += 1,
        }
        seq
    }

    /// Derive stats from the cached set (bulk-mutation rule: never
    /// incremental arithmetic).
    fn recompute_stats(&mut self) {
        self.stats = InboxStats::derive(
            &self.notifications.values().cloned().collect::<Vec<_>>(),
            now_naive(),
        );
    }

    fn to_snapshot(&self) -> InboxSnapshot {
        InboxSnapshot {
            version: self.version,
            notifications: self.notifications.values().cloned().collect(),
            stats: self.stats,
            page: self.page,
            has_more: self.has_more,
            phase: self.phase,
            error: self.error.clone(),
        }
    }
}
