//! The remote notification API contract.

use notify_inbox_core::{Ack, ApiResult, InboxStats, NotificationPage};

/// Blocking contract over the backend notification API.
///
/// Implementations are stateless with respect to the inbox: every call is
/// an independent request/response exchange bounded by the configured
/// timeout. The engine is the only intended caller; UI surfaces go through
/// the engine's subscription interface instead.
///
/// # Errors
///
/// All methods fail with the [`notify_inbox_core::ApiError`] taxonomy:
/// `Network`/`Timeout` (connectivity), `Auth` (401, fatal), `Server`
/// (5xx), `NotFound`/`Validation` (mutation target rejected), `Decode`
/// (malformed payload).
pub trait NotificationApi: Send + Sync {
    /// Fetch one page of notifications, newest first.
    fn fetch_page(&self, page: u32, limit: u32, unread_only: bool)
    -> ApiResult<NotificationPage>;

    /// Fetch the aggregate counters.
    fn fetch_stats(&self) -> ApiResult<InboxStats>;

    /// Mark a single notification read.
    fn mark_read(&self, id: i64) -> ApiResult<Ack>;

    /// Mark every notification read. The ack reports how many changed.
    fn mark_all_read(&self) -> ApiResult<Ack>;

    /// Delete a single notification.
    fn remove(&self, id: i64) -> ApiResult<Ack>;

    /// Delete every read notification.
    fn clear_read(&self) -> ApiResult<Ack>;

    /// Delete notifications older than `days` days.
    fn clear_old(&self, days: u32) -> ApiResult<Ack>;

    /// Delete every notification.
    fn clear_all(&self) -> ApiResult<Ack>;
}
