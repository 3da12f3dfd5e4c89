//! Selector-based fan-out to UI surfaces.
//!
//! Surfaces subscribe with a [`Selector`] describing the slice of inbox
//! state they render; on every store version bump the hub derives each
//! subscriber's view and invokes the callback only when that view
//! actually changed. Guarantees:
//!
//! - Monotonic delivery: a subscriber never observes a snapshot version
//!   lower than one already delivered to it.
//! - Deduplicated delivery: unchanged views (compared structurally) are
//!   not re-delivered.
//! - Re-entrancy safety: subscribing or unsubscribing from inside a
//!   callback never deadlocks or corrupts the iteration — dispatch walks
//!   a snapshot of the subscriber list and re-checks liveness per entry.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use notify_inbox_core::{EngineMetrics, InboxStats, Notification};

use crate::store::{InboxSnapshot, SessionPhase};

/// Handle identifying one subscription.
pub type SubscriptionId = u64;

/// What slice of inbox state a subscriber renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Just the unread counter (bell badge).
    UnreadCount,
    /// The cached page with stats and lifecycle info (management page,
    /// dropdown). `unread_only` filters the items client-side.
    FirstPage { unread_only: bool },
    /// The N newest notifications (dashboard widgets).
    LatestN(usize),
}

/// View derived from a snapshot for one selector.
#[derive(Debug, Clone, PartialEq)]
pub enum InboxView {
    UnreadCount(u64),
    Page {
        items: Vec<Notification>,
        stats: InboxStats,
        has_more: bool,
        phase: SessionPhase,
        error: Option<String>,
    },
    Latest(Vec<Notification>),
}

impl Selector {
    /// Derive this selector's view of a snapshot.
    #[must_use]
    pub fn derive(&self, snap: &InboxSnapshot) -> InboxView {
        match *self {
            Self::UnreadCount => InboxView::UnreadCount(snap.stats.unread),
            Self::FirstPage { unread_only } => {
                let items = if unread_only {
                    snap.notifications
                        .iter()
                        .filter(|n| !n.is_read)
                        .cloned()
                        .collect()
                } else {
                    snap.notifications.clone()
                };
                InboxView::Page {
                    items,
                    stats: snap.stats,
                    has_more: snap.has_more,
                    phase: snap.phase,
                    error: snap.error.clone(),
                }
            }
            Self::LatestN(n) => {
                InboxView::Latest(snap.notifications.iter().take(n).cloned().collect())
            }
        }
    }
}

type Callback = Arc<dyn Fn(&InboxView) + Send + Sync>;

struct SubEntry {
    id: SubscriptionId,
    selector: Selector,
    callback: Callback,
    alive: AtomicBool,
    state: Mutex<SubState>,
}

#[derive(Default)]
struct SubState {
    /// Highest snapshot version delivered (or skipped as unchanged).
    last_version: u64,
    last_view: Option<InboxView>,
}

/// Fan-out registry. One per engine.
pub struct SubscriptionHub {
    entries: Mutex<Vec<Arc<SubEntry>>>,
    next_id: AtomicU64,
    metrics: Arc<EngineMetrics>,
}

impl SubscriptionHub {
    #[must_use]
    pub fn new(metrics: Arc<EngineMetrics>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            metrics,
        }
    }

    /// Register a subscriber. The callback runs on whichever thread
    /// bumped the store (scheduler or a mutating caller) — keep it cheap
    /// and non-blocking.
    pub fn subscribe<F>(&self, selector: Selector, callback: F) -> SubscriptionId
    where
        F: Fn(&InboxView) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(SubEntry {
            id,
            selector,
            callback: Arc::new(callback),
            alive: AtomicBool::new(true),
            state: Mutex::new(SubState::default()),
        });
        self.lock_entries().push(entry);
        debug!(subscription = id, selector = ?selector, "subscriber added");
        id
    }

    /// Remove a subscription. Safe to call from inside a callback; any
    /// dispatch already in progress will skip the entry. Returns whether
    /// the id was live.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.lock_entries();
        let mut found = false;
        entries.retain(|e| {
            if e.id == id {
                e.alive.store(false, Ordering::Release);
                found = true;
                false
            } else {
                true
            }
        });
        if found {
            debug!(subscription = id, "subscriber removed");
        }
        found
    }

    /// Deliver a new snapshot to every subscriber whose view changed.
    pub fn dispatch(&self, snap: &InboxSnapshot) {
        // Snapshot the list so callbacks can (un)subscribe freely.
        let entries: Vec<Arc<SubEntry>> = self.lock_entries().clone();

        for entry in entries {
            if !entry.alive.load(Ordering::Acquire) {
                continue;
            }
            let delivery = {
                let mut state = entry
                    .state
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                // Monotonic: never hand this subscriber an older version.
                if snap.version <= state.last_version {
                    continue;
                }
                state.last_version = snap.version;
                let view = entry.selector.derive(snap);
                if state.last_view.as_ref() == Some(&view) {
                    None
                } else {
                    state.last_view = Some(view.clone());
                    Some(view)
                }
            };
            if let Some(view) = delivery {
                self.metrics.views_delivered.inc();
                (entry.callback)(&view);
            }
        }
    }

    /// Deliver the current snapshot to one subscriber (initial value
    /// right after subscribing). Skipped if a concurrent dispatch already
    /// reached the subscriber with something at least as new.
    pub fn prime(&self, id: SubscriptionId, snap: &InboxSnapshot) {
        let entry = self.lock_entries().iter().find(|e| e.id == id).cloned();
        let Some(entry) = entry else { return };
        let view = {
            let mut state = entry
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if state.last_view.is_some() && state.last_version >= snap.version {
                return;
            }
            state.last_version = state.last_version.max(snap.version);
            let view = entry.selector.derive(snap);
            state.last_view = Some(view.clone());
            view
        };
        self.metrics.views_delivered.inc();
        (entry.callback)(&view);
    }

    /// True when some live subscriber renders list data (first page or a
    /// latest-N slice of it), along with whether every such subscriber
    /// filters to unread-only (the poll can then request the narrower
    /// list).
    #[must_use]
    pub fn wants_first_page(&self) -> Option<bool> {
        let entries = self.lock_entries();
        let mut any = false;
        let mut all_unread_only = true;
        for e in entries.iter() {
            match e.selector {
                Selector::FirstPage { unread_only } => {
                    any = true;
                    all_unread_only &= unread_only;
                }
                Selector::LatestN(_) => {
                    any = true;
                    all_unread_only = false;
                }
                Selector::UnreadCount => {}
            }
        }
        any.then_some(all_unread_only)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock_entries().len()
    }

    /// Force-unsubscribe everyone (logout teardown).
    pub fn clear(&self) {
        let mut entries = self.lock_entries();
        for e in entries.iter() {
            e.alive.store(false, Ordering::Release);
        }
        entries.clear();
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, Vec<Arc<SubEntry>>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
