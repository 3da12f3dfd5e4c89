//! Shared test helpers for the notify-inbox workspace.
//!
//! The centerpiece is [`ScriptedApi`], an in-memory [`NotificationApi`]
//! that behaves like the real backend (pagination, mark-read semantics,
//! clear operations) while letting tests inject failures and latency per
//! operation and count every call the engine makes.

#![forbid(unsafe_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Duration as ChronoDuration;

use notify_inbox_api::NotificationApi;
use notify_inbox_core::{
    Ack, ApiError, ApiResult, InboxStats, Notification, NotificationKind, NotificationPage,
    newest_first, now_naive,
};

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; repeated calls are no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// Build a notification fixture `age_hours` old.
#[must_use]
pub fn notification(id: i64, kind: NotificationKind, is_read: bool, age_hours: i64) -> Notification {
    Notification {
        id,
        kind,
        title: format!("notification {id}"),
        message: format!("message body {id}"),
        is_read,
        created_at: now_naive() - ChronoDuration::hours(age_hours),
        related_id: None,
        related_type: None,
    }
}

/// Shorthand for an unread stock alert `age_hours` old.
#[must_use]
pub fn unread(id: i64, age_hours: i64) -> Notification {
    notification(id, NotificationKind::StockAlert, false, age_hours)
}

/// Shorthand for a read order update `age_hours` old.
#[must_use]
pub fn read(id: i64, age_hours: i64) -> Notification {
    notification(id, NotificationKind::OrderUpdate, true, age_hours)
}

/// One remote operation, for scripting and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    FetchPage,
    FetchStats,
    MarkRead,
    MarkAllRead,
    Remove,
    ClearRead,
    ClearOld,
    ClearAll,
}

#[derive(Default)]
struct ServerState {
    notifications: Vec<Notification>,
    /// One-shot failures, consumed in FIFO order per operation.
    failures: HashMap<Op, VecDeque<ApiError>>,
    /// Sticky failure returned by every call until healed.
    outage: Option<ApiError>,
    latency: HashMap<Op, Duration>,
    calls: HashMap<Op, u64>,
}

/// In-memory notification backend with failure and latency injection.
#[derive(Default)]
pub struct ScriptedApi {
    state: Mutex<ServerState>,
}

impl ScriptedApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the server-side notification set.
    #[must_use]
    pub fn with_notifications(self, notifications: Vec<Notification>) -> Self {
        self.lock().notifications = notifications;
        self
    }

    /// Queue a one-shot failure for the next call of `op`.
    pub fn push_failure(&self, op: Op, error: ApiError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Fail every call with `error` until [`Self::heal`].
    pub fn start_outage(&self, error: ApiError) {
        self.lock().outage = Some(error);
    }

    /// End a [`Self::start_outage`] window.
    pub fn heal(&self) {
        self.lock().outage = None;
    }

    /// Delay every call of `op` by `latency` (applied outside the state
    /// lock, so concurrent calls overlap like real network I/O).
    pub fn set_latency(&self, op: Op, latency: Duration) {
        self.lock().latency.insert(op, latency);
    }

    /// Number of calls made to `op` so far.
    #[must_use]
    pub fn calls(&self, op: Op) -> u64 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Current server-side notification set (newest first).
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        let mut items = self.lock().notifications.clone();
        items.sort_by(newest_first);
        items
    }

    /// Server-side view of the stats the next `fetch_stats` would return.
    #[must_use]
    pub fn stats(&self) -> InboxStats {
        InboxStats::derive(&self.lock().notifications, now_naive())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Record the call, honor scripted failure/latency, then run `f`
    /// against the state.
    fn call<T>(
        &self,
        op: Op,
        f: impl FnOnce(&mut ServerState) -> ApiResult<T>,
    ) -> ApiResult<T> {
        let (failure, latency) = {
            let mut state = self.lock();
            *state.calls.entry(op).or_insert(0) += 1;
            let failure = state
                .outage
                .clone()
                .or_else(|| state.failures.get_mut(&op).and_then(VecDeque::pop_front));
            (failure, state.latency.get(&op).copied())
        };
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }
        if let Some(error) = failure {
            return Err(error);
        }
        f(&mut self.lock())
    }
}

impl NotificationApi for ScriptedApi {
    fn fetch_page(
        &self,
        page: u32,
        limit: u32,
        unread_only: bool,
    ) -> ApiResult<NotificationPage> {
        self.call(Op::FetchPage, |state| {
            let mut items: Vec<Notification> = state
                .notifications
                .iter()
                .filter(|n| !unread_only || !n.is_read)
                .cloned()
                .collect();
            items.sort_by(newest_first);

            let limit = limit.max(1) as usize;
            let total_pages = u32::try_from(items.len().div_ceil(limit)).unwrap_or(u32::MAX).max(1);
            let page = page.max(1);
            let start = (page as usize - 1) * limit;
            let page_items = items.into_iter().skip(start).take(limit).collect();

            Ok(NotificationPage {
                items: page_items,
                current_page: page,
                total_pages,
            })
        })
    }

    fn fetch_stats(&self) -> ApiResult<InboxStats> {
        self.call(Op::FetchStats, |state| {
            Ok(InboxStats::derive(&state.notifications, now_naive()))
        })
    }

    fn mark_read(&self, id: i64) -> ApiResult<Ack> {
        self.call(Op::MarkRead, |state| {
            let Some(n) = state.notifications.iter_mut().find(|n| n.id == id) else {
                return Err(ApiError::NotFound { id });
            };
            n.is_read = true;
            Ok(Ack::of(1))
        })
    }

    fn mark_all_read(&self) -> ApiResult<Ack> {
        self.call(Op::MarkAllRead, |state| {
            let mut affected = 0;
            for n in &mut state.notifications {
                if !n.is_read {
                    n.is_read = true;
                    affected += 1;
                }
            }
            Ok(Ack::of(affected))
        })
    }

    fn remove(&self, id: i64) -> ApiResult<Ack> {
        self.call(Op::Remove, |state| {
            let before = state.notifications.len();
            state.notifications.retain(|n| n.id != id);
            if state.notifications.len() == before {
                return Err(ApiError::NotFound { id });
            }
            Ok(Ack::of(1))
        })
    }

    fn clear_read(&self) -> ApiResult<Ack> {
        self.call(Op::ClearRead, |state| {
            let before = state.notifications.len();
            state.notifications.retain(|n| !n.is_read);
            Ok(Ack::of((before - state.notifications.len()) as u64))
        })
    }

    fn clear_old(&self, days: u32) -> ApiResult<Ack> {
        self.call(Op::ClearOld, |state| {
            let cutoff = now_naive() - ChronoDuration::days(i64::from(days));
            let before = state.notifications.len();
            state.notifications.retain(|n| n.created_at >= cutoff);
            Ok(Ack::of((before - state.notifications.len()) as u64))
        })
    }

    fn clear_all(&self) -> ApiResult<Ack> {
        self.call(Op::ClearAll, |state| {
            let affected = state.notifications.len() as u64;
            state.notifications.clear();
            Ok(Ack::of(affected))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_splits_and_counts() {
        let api = ScriptedApi::new()
            .with_notifications((1..=5).map(|i| unread(i, i)).collect());
        let page1 = api.fetch_page(1, 2, false).unwrap();
        assert_eq!(page1.items.len(), 2);
        assert_eq!(page1.total_pages, 3);
        assert!(page1.has_more());
        // Newest first: lowest age first.
        assert_eq!(page1.items[0].id, 1);

        let page3 = api.fetch_page(3, 2, false).unwrap();
        assert_eq!(page3.items.len(), 1);
        assert!(!page3.has_more());
        assert_eq!(api.calls(Op::FetchPage), 2);
    }

    #[test]
    fn unread_only_filter() {
        let api = ScriptedApi::new().with_notifications(vec![unread(1, 1), read(2, 2)]);
        let page = api.fetch_page(1, 10, true).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, 1);
    }

    #[test]
    fn mutations_apply_server_side() {
        let api = ScriptedApi::new().with_notifications(vec![unread(1, 1), unread(2, 2)]);
        assert_eq!(api.mark_read(1).unwrap().affected, 1);
        assert_eq!(api.stats().unread, 1);
        assert_eq!(api.mark_all_read().unwrap().affected, 1);
        assert_eq!(api.stats().unread, 0);
        assert!(matches!(
            api.remove(99),
            Err(ApiError::NotFound { id: 99 })
        ));
        assert_eq!(api.clear_all().unwrap().affected, 2);
        assert_eq!(api.stats().total, 0);
    }

    #[test]
    fn one_shot_failures_are_consumed() {
        let api = ScriptedApi::new().with_notifications(vec![unread(1, 1)]);
        api.push_failure(
            Op::FetchStats,
            ApiError::Server {
                status: 500,
                detail: "boom".into(),
            },
        );
        assert!(api.fetch_stats().is_err());
        assert!(api.fetch_stats().is_ok());
    }

    #[test]
    fn outage_is_sticky_until_healed() {
        let api = ScriptedApi::new();
        api.start_outage(ApiError::Network {
            detail: "down".into(),
        });
        assert!(api.fetch_stats().is_err());
        assert!(api.fetch_page(1, 10, false).is_err());
        api.heal();
        assert!(api.fetch_stats().is_ok());
    }

    #[test]
    fn clear_old_respects_cutoff() {
        let api = ScriptedApi::new().with_notifications(vec![
            unread(1, 24 * 10),
            unread(2, 24 * 3),
        ]);
        assert_eq!(api.clear_old(7).unwrap().affected, 1);
        let left = api.notifications();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, 2);
    }
}
