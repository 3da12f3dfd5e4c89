//! Data models for the notification inbox.
//!
//! These models map to the JSON payloads of the backend notification API.
//! All datetime fields use naive UTC (no timezone info), matching the
//! server's storage convention.

use std::cmp::Ordering;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// =============================================================================
// Notification
// =============================================================================

/// Category of a server-generated notification.
///
/// Wire values are snake_case (`order_update`, `stock_alert`, ...), matching
/// the backend's enum column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderUpdate,
    StockAlert,
    PaymentReminder,
    SystemAlert,
    SupplierUpdate,
    MaterialUpdate,
}

impl NotificationKind {
    /// Stable wire name for logging and display routing.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderUpdate => "order_update",
            Self::StockAlert => "stock_alert",
            Self::PaymentReminder => "payment_reminder",
            Self::SystemAlert => "system_alert",
            Self::SupplierUpdate => "supplier_update",
            Self::MaterialUpdate => "material_update",
        }
    }
}

/// A single notification delivered to the current user.
///
/// # Constraints
/// - `id`: unique, server-assigned; never reused within a session.
/// - Immutable once created except for `is_read`, which only the engine
///   flips (optimistically on user action, authoritatively on poll).
/// - `related_id`/`related_type` link back to the originating business
///   record (order, product, supplier, ...) and are opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_type: Option<String>,
}

/// Canonical inbox ordering: newest first, ties broken by descending id.
///
/// Every merge into the store re-establishes this order so that paged
/// appends and poll replacements agree on item positions.
#[must_use]
pub fn newest_first(a: &Notification, b: &Notification) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

// =============================================================================
// Aggregate stats
// =============================================================================

/// Server-computed aggregate counters, independent of which page of
/// notifications is cached locally.
///
/// # Invariant
/// `unread <= total`. The store clamps rather than propagating a violation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxStats {
    pub total: u64,
    pub unread: u64,
    #[serde(rename = "last_24h")]
    pub last_24h: u64,
}

impl InboxStats {
    /// Recompute stats deterministically from a notification set.
    ///
    /// Used after bulk mutations so counters never drift from the list via
    /// incremental arithmetic. `last_24h` is derived against `now`.
    #[must_use]
    pub fn derive(notifications: &[Notification], now: NaiveDateTime) -> Self {
        let day_ago = now - chrono::Duration::hours(24);
        let total = notifications.len() as u64;
        let unread = notifications.iter().filter(|n| !n.is_read).count() as u64;
        let last_24h = notifications
            .iter()
            .filter(|n| n.created_at > day_ago)
            .count() as u64;
        Self {
            total,
            unread,
            last_24h,
        }
    }

    /// True when the `unread <= total` invariant holds.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.unread <= self.total
    }
}

// =============================================================================
// API payloads
// =============================================================================

/// One page of the notification list as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub current_page: u32,
    pub total_pages: u32,
}

impl NotificationPage {
    /// Whether further pages exist after this one.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.current_page < self.total_pages
    }
}

/// Acknowledgement of a mutating call.
///
/// Bulk operations report how many rows the server touched; single-target
/// operations report 1 (or 0 when the server treated the call as a no-op).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub affected: u64,
}

impl Ack {
    #[must_use]
    pub const fn of(affected: u64) -> Self {
        Self { affected }
    }
}
