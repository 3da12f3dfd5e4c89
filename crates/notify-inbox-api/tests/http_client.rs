//! `HttpNotificationApi` against an in-process scripted TCP server:
//! request shape, auth header, status mapping, and timeout behavior.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use notify_inbox_api::{HttpNotificationApi, NotificationApi, StaticCredentials};
use notify_inbox_core::ApiError;

/// Serve exactly one connection with a canned response; hand the raw
/// request back through the channel.
fn one_shot_server(status_line: &str, body: &str) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf).unwrap_or(0);
        let _ = tx.send(String::from_utf8_lossy(&buf[..n]).to_string());
        let _ = stream.write_all(response.as_bytes());
    });
    (format!("http://{addr}"), rx)
}

fn client(base: &str) -> HttpNotificationApi {
    HttpNotificationApi::new(
        base,
        Duration::from_millis(500),
        Box::new(StaticCredentials::new("sekrit-token")),
    )
    .expect("client")
}

#[test]
fn fetch_stats_decodes_and_sends_bearer() {
    let (base, rx) = one_shot_server(
        "HTTP/1.1 200 OK",
        r#"{"total": 7, "unread": 3, "last_24h": 2}"#,
    );
    let api = client(&base);
    let stats = api.fetch_stats().expect("stats");
    assert_eq!(stats.total, 7);
    assert_eq!(stats.unread, 3);
    assert_eq!(stats.last_24h, 2);

    let request = rx.recv().unwrap();
    assert!(request.starts_with("GET /notifications/stats HTTP/1.1\r\n"));
    assert!(request.contains("Authorization: Bearer sekrit-token\r\n"));
    assert!(request.contains("Accept: application/json\r\n"));
}

#[test]
fn fetch_page_builds_query_and_decodes_envelope() {
    let body = r#"{
        "notifications": [
            {"id": 9, "type": "stock_alert", "title": "Low stock", "message": "SKU-1 below minimum",
             "is_read": false, "created_at": "2025-06-10T08:30:00", "related_id": 1, "related_type": "product"}
        ],
        "pagination": {"current_page": 2, "total_pages": 3}
    }"#;
    let (base, rx) = one_shot_server("HTTP/1.1 200 OK", body);
    let api = client(&base);
    let page = api.fetch_page(2, 25, true).expect("page");
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, 9);
    assert_eq!(page.current_page, 2);
    assert!(page.has_more());

    let request = rx.recv().unwrap();
    assert!(
        request.starts_with("GET /notifications?page=2&limit=25&unread_only=true HTTP/1.1\r\n"),
        "unexpected request line: {}",
        request.lines().next().unwrap_or_default()
    );
}

#[test]
fn mark_read_uses_patch_and_normalizes_empty_ack() {
    let (base, rx) = one_shot_server("HTTP/1.1 200 OK", "{}");
    let api = client(&base);
    let ack = api.mark_read(42).expect("ack");
    assert_eq!(ack.affected, 1);

    let request = rx.recv().unwrap();
    assert!(request.starts_with("PATCH /notifications/42/read HTTP/1.1\r\n"));
}

#[test]
fn bulk_endpoints_use_expected_paths() {
    type BulkCall = Box<dyn Fn(&HttpNotificationApi) -> notify_inbox_core::ApiResult<notify_inbox_core::Ack>>;
    let cases: Vec<(&str, BulkCall)> = vec![
        (
            "PATCH /notifications/mark-all-read HTTP",
            Box::new(|api| api.mark_all_read()),
        ),
        (
            "DELETE /notifications/read/clear HTTP",
            Box::new(|api| api.clear_read()),
        ),
        (
            "DELETE /notifications/old/cleanup?days=7 HTTP",
            Box::new(|api| api.clear_old(7)),
        ),
        (
            "DELETE /notifications HTTP",
            Box::new(|api| api.clear_all()),
        ),
    ];
    for (expected_prefix, call) in cases {
        let (base, rx) = one_shot_server("HTTP/1.1 200 OK", r#"{"affected": 4}"#);
        let api = client(&base);
        let ack = call(&api).expect("ack");
        assert_eq!(ack.affected, 4);
        let request = rx.recv().unwrap();
        assert!(
            request.starts_with(expected_prefix),
            "expected request starting with {expected_prefix}, got: {}",
            request.lines().next().unwrap_or_default()
        );
    }
}

#[test]
fn status_codes_map_to_taxonomy() {
    let (base, _rx) = one_shot_server("HTTP/1.1 401 Unauthorized", "");
    assert!(matches!(client(&base).fetch_stats(), Err(ApiError::Auth)));

    let (base, _rx) = one_shot_server("HTTP/1.1 404 Not Found", "{}");
    assert!(matches!(
        client(&base).mark_read(5),
        Err(ApiError::NotFound { id: 5 })
    ));

    let (base, _rx) = one_shot_server("HTTP/1.1 422 Unprocessable Entity", r#"{"error":"bad"}"#);
    assert!(matches!(
        client(&base).remove(5),
        Err(ApiError::Validation { .. })
    ));

    let (base, _rx) = one_shot_server("HTTP/1.1 503 Service Unavailable", "down");
    assert!(matches!(
        client(&base).fetch_stats(),
        Err(ApiError::Server { status: 503, .. })
    ));

    // 404 on a fetch (no mutation target) is a server error, not NotFound.
    let (base, _rx) = one_shot_server("HTTP/1.1 404 Not Found", "");
    assert!(matches!(
        client(&base).fetch_stats(),
        Err(ApiError::Server { status: 404, .. })
    ));
}

#[test]
fn malformed_body_is_a_decode_error() {
    let (base, _rx) = one_shot_server("HTTP/1.1 200 OK", "this is not json");
    assert!(matches!(
        client(&base).fetch_stats(),
        Err(ApiError::Decode { .. })
    ));
}

#[test]
fn unresponsive_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().unwrap();
    // Accept and then stall without responding.
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        thread::sleep(Duration::from_millis(900));
        drop(stream);
    });

    let api = HttpNotificationApi::new(
        &format!("http://{addr}"),
        Duration::from_millis(150),
        Box::new(StaticCredentials::anonymous()),
    )
    .expect("client");

    let start = std::time::Instant::now();
    let result = api.fetch_stats();
    assert!(
        matches!(result, Err(ApiError::Timeout { .. }) | Err(ApiError::Network { .. })),
        "expected timeout-ish failure, got {result:?}"
    );
    assert!(start.elapsed() < Duration::from_millis(700));
    let _ = handle.join();
}

#[test]
fn anonymous_requests_skip_auth_header() {
    let (base, rx) = one_shot_server("HTTP/1.1 200 OK", r#"{"total":0,"unread":0,"last_24h":0}"#);
    let api = HttpNotificationApi::new(
        &base,
        Duration::from_millis(500),
        Box::new(StaticCredentials::anonymous()),
    )
    .expect("client");
    api.fetch_stats().expect("stats");
    let request = rx.recv().unwrap();
    assert!(!request.contains("Authorization:"));
}

#[test]
fn connection_refused_is_network_error() {
    // Bind-then-drop to find a port with nothing listening.
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let api = HttpNotificationApi::new(
        &format!("http://127.0.0.1:{port}"),
        Duration::from_millis(300),
        Box::new(StaticCredentials::anonymous()),
    )
    .expect("client");
    assert!(matches!(
        api.fetch_stats(),
        Err(ApiError::Network { .. }) | Err(ApiError::Timeout { .. })
    ));
}
