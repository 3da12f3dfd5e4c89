//! Session facade.
//!
//! `InboxEngine` is the one object UI surfaces hold. It wires the store,
//! hub, coordinator, and scheduler together and owns the session
//! lifecycle: created at login (`Idle`), loading on first subscriber,
//! `Ready` after the first successful poll, `Error` with retained data on
//! transient failures, and terminally `Closed` at logout or on a 401.
//!
//! The scheduler's lifetime follows the subscriber count: the first
//! subscription starts the shared poll timer, the last departure stops it
//! synchronously. Surfaces never talk to the remote API directly.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use notify_inbox_api::NotificationApi;
use notify_inbox_core::{Ack, EngineConfig, EngineMetrics, EngineMetricsSnapshot};

use crate::coordinator::MutationCoordinator;
use crate::error::{EngineError, EngineResult};
use crate::hub::{InboxView, Selector, SubscriptionHub, SubscriptionId};
use crate::scheduler::{self, PollingScheduler};
use crate::store::{InboxSnapshot, InboxStore, MergeMode, SessionPhase};

/// Shared guts of one engine instance. The coordinator and scheduler are
/// the only store writers; everything else reads.
pub(crate) struct EngineCore {
    pub(crate) api: Arc<dyn NotificationApi>,
    pub(crate) config: EngineConfig,
    pub(crate) store: InboxStore,
    pub(crate) hub: SubscriptionHub,
    pub(crate) metrics: Arc<EngineMetrics>,
    /// Bumped on teardown/reset; in-flight results from a superseded
    /// generation are discarded on arrival.
    generation: AtomicU64,
    closed: AtomicBool,
}

impl EngineCore {
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fan the current snapshot out to subscribers.
    pub(crate) fn publish(&self) {
        let snap = self.store.snapshot();
        self.hub.dispatch(&snap);
    }

    /// Teardown driven by a fatal (401) API response. Does not join the
    /// poll worker — the worker observes the closed flag and exits; the
    /// owner's `close()` reaps the thread.
    pub(crate) fn handle_fatal(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("auth rejected; closing inbox session");
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.store.close();
        self.publish();
        self.hub.clear();
    }
}

/// Per-session notification inbox engine.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct InboxEngine {
    core: Arc<EngineCore>,
    coordinator: MutationCoordinator,
    scheduler: Mutex<Option<PollingScheduler>>,
}

impl InboxEngine {
    /// Build an engine over any [`NotificationApi`] implementation. The
    /// store starts empty at version 0; nothing is fetched until the
    /// first subscriber arrives (or `refresh` is called).
    #[must_use]
    pub fn new(api: Arc<dyn NotificationApi>, config: EngineConfig) -> Self {
        let metrics = Arc::new(EngineMetrics::new());
        let coordinator = MutationCoordinator::new(config.request_timeout);
        let core = Arc::new(EngineCore {
            api,
            store: InboxStore::new(Arc::clone(&metrics)),
            hub: SubscriptionHub::new(Arc::clone(&metrics)),
            metrics,
            config,
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        Self {
            core,
            coordinator,
            scheduler: Mutex::new(None),
        }
    }

    // ── Subscriptions ───────────────────────────────────────────────────

    /// Subscribe a surface. The callback immediately receives the current
    /// view, then fires on every store change that alters the view. The
    /// first live subscription starts the shared poll timer.
    pub fn subscribe<F>(&self, selector: Selector, callback: F) -> EngineResult<SubscriptionId>
    where
        F: Fn(&InboxView) + Send + Sync + 'static,
    {
        if self.core.is_closed() {
            return Err(EngineError::Closed);
        }
        let id = self.core.hub.subscribe(selector, callback);
        self.core.hub.prime(id, &self.core.store.snapshot());

        let mut slot = self.lock_scheduler();
        if slot.is_none() {
            if self.core.store.phase() == SessionPhase::Idle {
                self.core.store.mark_loading();
                self.core.publish();
            }
            *slot = Some(PollingScheduler::start(Arc::clone(&self.core)));
        }
        drop(slot);
        Ok(id)
    }

    /// Drop a subscription. Stopping the last one halts the poll timer
    /// synchronously. Returns whether the id was live.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.core.hub.unsubscribe(id);
        if removed && self.core.hub.active_count() == 0 {
            // Take first, then join without holding the slot lock.
            let sched = self.lock_scheduler().take();
            if let Some(sched) = sched {
                sched.stop();
            }
        }
        removed
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// Current store snapshot (phase, error flag, stats, cached list).
    #[must_use]
    pub fn snapshot(&self) -> InboxSnapshot {
        self.core.store.snapshot()
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.core.store.phase()
    }

    #[must_use]
    pub fn metrics(&self) -> EngineMetricsSnapshot {
        self.core.metrics.snapshot()
    }

    // ── Fetch actions ───────────────────────────────────────────────────

    /// Request an immediate refresh. With the poll timer running this
    /// just re-arms it to tick now; otherwise the fetch runs on the
    /// calling thread.
    pub fn refresh(&self) -> EngineResult<()> {
        if self.core.is_closed() {
            return Err(EngineError::Closed);
        }
        if self.core.store.snapshot().notifications.is_empty() {
            // No cached data to show while fetching.
            self.core.store.mark_loading();
            self.core.publish();
        }
        let slot = self.lock_scheduler();
        if let Some(sched) = slot.as_ref() {
            sched.poke();
            return Ok(());
        }
        drop(slot);
        scheduler::run_tick(&self.core);
        Ok(())
    }

    /// Fetch the page after the cached one and append it (management-page
    /// pagination). A no-op when the server reported no further pages.
    pub fn load_more(&self) -> EngineResult<()> {
        if self.core.is_closed() {
            return Err(EngineError::Closed);
        }
        let snap = self.core.store.snapshot();
        if snap.page == 0 {
            // Nothing loaded yet; behave like a refresh.
            return self.refresh();
        }
        if !snap.has_more {
            return Ok(());
        }

        let generation = self.core.generation();
        let unread_only = self.core.hub.wants_first_page().unwrap_or(false);
        let result =
            self.core
                .api
                .fetch_page(snap.page + 1, self.core.config.page_size, unread_only);
        if self.core.generation() != generation || self.core.is_closed() {
            self.core.metrics.stale_generation_discards.inc();
            return Ok(());
        }
        match result {
            Ok(page) => {
                self.core.store.apply_page(&page, MergeMode::Append);
                self.core.publish();
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                self.core.handle_fatal();
                Err(e.into())
            }
            Err(e) => {
                self.core.store.flag_error(&e.to_string());
                self.core.publish();
                Err(e.into())
            }
        }
    }

    // ── Mutations (optimistic, single-flight) ───────────────────────────

    /// Mark one notification read.
    pub fn mark_read(&self, id: i64) -> EngineResult<Ack> {
        self.coordinator.mark_read(&self.core, id)
    }

    /// Mark every notification read.
    pub fn mark_all_read(&self) -> EngineResult<Ack> {
        self.coordinator.mark_all_read(&self.core)
    }

    /// Delete one notification.
    pub fn remove(&self, id: i64) -> EngineResult<Ack> {
        self.coordinator.remove(&self.core, id)
    }

    /// Delete every read notification.
    pub fn clear_read(&self) -> EngineResult<Ack> {
        self.coordinator.clear_read(&self.core)
    }

    /// Delete notifications older than the configured age threshold.
    pub fn clear_old(&self) -> EngineResult<Ack> {
        self.coordinator
            .clear_old(&self.core, self.core.config.clear_old_days)
    }

    /// Delete every notification.
    pub fn clear_all(&self) -> EngineResult<Ack> {
        self.coordinator.clear_all(&self.core)
    }

    // ── Teardown ────────────────────────────────────────────────────────

    /// Tear the session down: bump the generation (discarding in-flight
    /// results), stop and join the poll worker, clear the store, and
    /// force-unsubscribe every surface. Idempotent; the engine is
    /// unusable afterwards.
    pub fn close(&self) {
        let was_closed = self.core.closed.swap(true, Ordering::AcqRel);
        // Reap the worker even when a fatal tick already closed the core;
        // take first so the slot lock is not held across the join.
        let sched = self.lock_scheduler().take();
        if let Some(sched) = sched {
            sched.stop();
        }
        if !was_closed {
            info!("closing inbox session");
            self.core.generation.fetch_add(1, Ordering::AcqRel);
            self.core.store.close();
            self.core.publish();
            self.core.hub.clear();
        }
    }

    fn lock_scheduler(&self) -> std::sync::MutexGuard<'_, Option<PollingScheduler>> {
        self.scheduler
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for InboxEngine {
    fn drop(&mut self) {
        self.close();
    }
}
