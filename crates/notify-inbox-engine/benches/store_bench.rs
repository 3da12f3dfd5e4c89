//! Microbenchmarks for the hot store paths: page merge, snapshot, and
//! view derivation at realistic inbox sizes.

use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use notify_inbox_core::{
    EngineMetrics, Notification, NotificationKind, NotificationPage, now_naive,
};
use notify_inbox_engine::{InboxStore, MergeMode, Selector};

fn fixture(count: i64) -> Vec<Notification> {
    (1..=count)
        .map(|id| Notification {
            id,
            kind: NotificationKind::StockAlert,
            title: format!("notification {id}"),
            message: "low stock threshold reached".to_string(),
            is_read: id % 3 == 0,
            created_at: now_naive() - chrono::Duration::minutes(id),
            related_id: Some(id),
            related_type: Some("product".to_string()),
        })
        .collect()
}

fn bench_store(c: &mut Criterion) {
    let page = NotificationPage {
        items: fixture(200),
        current_page: 1,
        total_pages: 5,
    };

    c.bench_function("apply_page_replace_200", |b| {
        let store = InboxStore::new(Arc::new(EngineMetrics::new()));
        b.iter(|| store.apply_page(&page, MergeMode::Replace));
    });

    c.bench_function("snapshot_200", |b| {
        let store = InboxStore::new(Arc::new(EngineMetrics::new()));
        store.apply_page(&page, MergeMode::Replace);
        b.iter(|| store.snapshot());
    });

    c.bench_function("derive_unread_view_200", |b| {
        let store = InboxStore::new(Arc::new(EngineMetrics::new()));
        store.apply_page(&page, MergeMode::Replace);
        let snap = store.snapshot();
        b.iter(|| Selector::FirstPage { unread_only: true }.derive(&snap));
    });
}

criterion_group!(benches, bench_store);
criterion_main!(benches);
