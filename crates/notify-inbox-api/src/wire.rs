//! Wire-format payloads for the notification API.
//!
//! The backend wraps list responses in an envelope with a pagination
//! block and acks in a `{"affected": n}` object. Conversions into the
//! core model types live here so the transport stays a thin pipe.

use notify_inbox_core::{Ack, InboxStats, Notification, NotificationPage};
use serde::Deserialize;

/// `GET /notifications` response envelope.
#[derive(Debug, Deserialize)]
pub struct ListEnvelope {
    pub notifications: Vec<Notification>,
    pub pagination: Pagination,
}

/// Pagination block of a list response.
#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
}

impl From<ListEnvelope> for NotificationPage {
    fn from(env: ListEnvelope) -> Self {
        Self {
            items: env.notifications,
            current_page: env.pagination.current_page,
            total_pages: env.pagination.total_pages,
        }
    }
}

/// Ack payload of mutating endpoints. Servers that return an empty body
/// for single-target mutations are normalized to `affected = 1`.
#[derive(Debug, Default, Deserialize)]
pub struct AckEnvelope {
    #[serde(default)]
    pub affected: u64,
}

impl From<AckEnvelope> for Ack {
    fn from(env: AckEnvelope) -> Self {
        Self {
            affected: env.affected,
        }
    }
}

/// `GET /notifications/stats` payload is the stats object itself.
pub type StatsEnvelope = InboxStats;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_envelope_converts_to_page() {
        let json = r#"{
            "notifications": [
                {"id": 2, "type": "order_update", "title": "t", "message": "m",
                 "is_read": false, "created_at": "2025-06-10T08:30:00"}
            ],
            "pagination": {"current_page": 1, "total_pages": 4}
        }"#;
        let env: ListEnvelope = serde_json::from_str(json).unwrap();
        let page: NotificationPage = env.into();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, 2);
        assert_eq!(page.current_page, 1);
        assert!(page.has_more());
    }

    #[test]
    fn ack_envelope_defaults_to_zero() {
        let env: AckEnvelope = serde_json::from_str("{}").unwrap();
        let ack: Ack = env.into();
        assert_eq!(ack.affected, 0);

        let env: AckEnvelope = serde_json::from_str(r#"{"affected": 12}"#).unwrap();
        assert_eq!(Ack::from(env).affected, 12);
    }
}
