//! Synchronous HTTP/1.1 transport for the notification API.
//!
//! Uses `std::net::TcpStream` for plain HTTP and a `curl` subprocess for
//! HTTPS so the crate carries no TLS dependency. Every request is bounded
//! by the configured timeout; timeouts and connectivity failures surface
//! as `ApiError::Timeout` / `ApiError::Network` without any retry here.
//!
//! Wire contract (bearer-authenticated):
//! - `GET    /notifications?page&limit&unread_only`
//! - `GET    /notifications/stats`
//! - `PATCH  /notifications/{id}/read`
//! - `PATCH  /notifications/mark-all-read`
//! - `DELETE /notifications/{id}`
//! - `DELETE /notifications/read/clear`
//! - `DELETE /notifications/old/cleanup?days`
//! - `DELETE /notifications`

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Read as _, Write as _};
use std::net::TcpStream;
use std::time::Duration;

use notify_inbox_core::{Ack, ApiError, ApiResult, InboxStats, NotificationPage};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::client::NotificationApi;
use crate::credentials::CredentialProvider;
use crate::wire::{AckEnvelope, ListEnvelope};

/// Maximum response body bytes to read.
const BODY_LIMIT: usize = 4 * 1024 * 1024; // 4 MiB

/// Bytes of an error body quoted into `ApiError` details.
const DETAIL_LIMIT: usize = 200;

// ── URL handling ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Http,
    Https,
}

/// Parsed base URL: scheme, host, port.
#[derive(Debug, Clone)]
struct BaseUrl {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl BaseUrl {
    fn parse(url: &str) -> ApiResult<Self> {
        if let Some(r) = url.strip_prefix("http://") {
            Self::split_authority(r, Scheme::Http)
        } else if let Some(r) = url.strip_prefix("https://") {
            Self::split_authority(r, Scheme::Https)
        } else {
            Err(ApiError::InvalidUrl {
                detail: format!("unsupported scheme in URL: {url}"),
            })
        }
    }

    fn split_authority(rest: &str, scheme: Scheme) -> ApiResult<Self> {
        // Any path component on the base URL is ignored; endpoints are
        // rooted at /notifications.
        let host_port = rest.split('/').next().unwrap_or(rest);
        let default_port = match scheme {
            Scheme::Http => 80,
            Scheme::Https => 443,
        };
        let (host, port) = if let Some(bracket_end) = host_port.find(']') {
            // IPv6: [::1]:8080
            let h = &host_port[..=bracket_end];
            let p = if host_port.len() > bracket_end + 1 {
                host_port[bracket_end + 2..]
                    .parse::<u16>()
                    .map_err(|e| ApiError::InvalidUrl {
                        detail: format!("invalid port: {e}"),
                    })?
            } else {
                default_port
            };
            (h.to_string(), p)
        } else if let Some(colon) = host_port.rfind(':') {
            let h = &host_port[..colon];
            let p = host_port[colon + 1..]
                .parse::<u16>()
                .map_err(|e| ApiError::InvalidUrl {
                    detail: format!("invalid port: {e}"),
                })?;
            (h.to_string(), p)
        } else {
            (host_port.to_string(), default_port)
        };

        if host.is_empty() {
            return Err(ApiError::InvalidUrl {
                detail: "empty host".to_string(),
            });
        }

        Ok(Self { scheme, host, port })
    }

    fn authority(&self) -> String {
        let default_port = match self.scheme {
            Scheme::Http => 80,
            Scheme::Https => 443,
        };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────────

/// Synchronous HTTP implementation of [`NotificationApi`].
pub struct HttpNotificationApi {
    base: BaseUrl,
    timeout: Duration,
    credentials: Box<dyn CredentialProvider>,
}

impl HttpNotificationApi {
    /// Build a client for `base_url` with the given per-request timeout.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Box<dyn CredentialProvider>,
    ) -> ApiResult<Self> {
        Ok(Self {
            base: BaseUrl::parse(base_url)?,
            timeout,
            credentials,
        })
    }

    /// Issue a request and decode the JSON body into `T`.
    ///
    /// `target` is the mutation target id (if any), used to classify 404s.
    fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        target: Option<i64>,
    ) -> ApiResult<T> {
        let resp = match self.base.scheme {
            Scheme::Http => self.exchange_tcp(method, path),
            Scheme::Https => self.exchange_curl(method, path),
        }?;

        debug!(method, path, status = resp.status, "api call completed");

        if resp.status == 200 {
            if resp.body.is_empty() {
                // Empty-bodied 200s (some proxies strip ack bodies) decode
                // as the type's empty object form.
                return serde_json::from_slice(b"{}").map_err(|e| ApiError::Decode {
                    detail: e.to_string(),
                });
            }
            return serde_json::from_slice(&resp.body).map_err(|e| ApiError::Decode {
                detail: e.to_string(),
            });
        }

        let detail = body_detail(&resp.body);
        Err(match (resp.status, target) {
            (404, None) => ApiError::Server {
                status: 404,
                detail,
            },
            (status, target) => ApiError::from_status(status, target.unwrap_or(0), detail),
        })
    }

    /// One HTTP/1.1 exchange over a fresh TCP connection.
    fn exchange_tcp(&self, method: &str, path: &str) -> ApiResult<RawResponse> {
        let addr = format!("{}:{}", self.base.host, self.base.port);
        let sock_addr = resolve_addr(&addr)?;

        let stream = TcpStream::connect_timeout(&sock_addr, self.timeout)
            .map_err(|e| categorize_io_error(&e, self.timeout))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| categorize_io_error(&e, self.timeout))?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| categorize_io_error(&e, self.timeout))?;

        let auth_header = self
            .credentials
            .bearer_token()
            .map(|t| format!("Authorization: Bearer {t}\r\n"))
            .unwrap_or_default();

        let request = format!(
            "{method} {path} HTTP/1.1\r\n\
             Host: {}\r\n\
             {auth_header}\
             Accept: application/json\r\n\
             User-Agent: notify-inbox/{}\r\n\
             Content-Length: 0\r\n\
             Connection: close\r\n\r\n",
            self.base.authority(),
            env!("CARGO_PKG_VERSION"),
        );

        send_and_receive(stream, &request, self.timeout)
    }

    /// HTTPS exchange via `curl` subprocess (keeps the crate TLS-free).
    fn exchange_curl(&self, method: &str, path: &str) -> ApiResult<RawResponse> {
        let url = format!("https://{}{}", self.base.authority(), path);
        let timeout_secs = self.timeout.as_secs().max(1).to_string();

        let mut cmd = std::process::Command::new("curl");
        cmd.args([
            "-sS",
            "-D",
            "-", // dump headers to stdout
            "-X",
            method,
            "--max-time",
            &timeout_secs,
            "--max-redirs",
            "0",
        ]);
        if let Some(token) = self.credentials.bearer_token() {
            cmd.args(["-H", &format!("Authorization: Bearer {token}")]);
        }
        cmd.args(["-H", "Accept: application/json", &url]);

        let output = cmd.output().map_err(|e| ApiError::Network {
            detail: format!("curl not available: {e}"),
        })?;

        if !output.status.success() && output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("timed out") {
                return Err(ApiError::Timeout {
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            return Err(ApiError::Network {
                detail: format!("curl failed: {stderr}"),
            });
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        let (header_section, body_str) = raw.split_once("\r\n\r\n").unwrap_or((&*raw, ""));

        let mut lines = header_section.lines();
        let status_line = lines.next().unwrap_or("HTTP/1.1 000 Unknown");
        let status = parse_status_line(status_line)?;

        let mut headers = BTreeMap::new();
        for line in lines {
            if let Some((key, value)) = line.split_once(':') {
                headers.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }

        Ok(RawResponse {
            status,
            headers,
            body: body_str.as_bytes().to_vec(),
        })
    }
}

impl NotificationApi for HttpNotificationApi {
    fn fetch_page(
        &self,
        page: u32,
        limit: u32,
        unread_only: bool,
    ) -> ApiResult<NotificationPage> {
        let path = format!("/notifications?page={page}&limit={limit}&unread_only={unread_only}");
        self.call::<ListEnvelope>("GET", &path, None).map(Into::into)
    }

    fn fetch_stats(&self) -> ApiResult<InboxStats> {
        self.call("GET", "/notifications/stats", None)
    }

    fn mark_read(&self, id: i64) -> ApiResult<Ack> {
        self.call::<AckEnvelope>("PATCH", &format!("/notifications/{id}/read"), Some(id))
            .map(|env| normalize_single(env.into()))
    }

    fn mark_all_read(&self) -> ApiResult<Ack> {
        self.call::<AckEnvelope>("PATCH", "/notifications/mark-all-read", None)
            .map(Into::into)
    }

    fn remove(&self, id: i64) -> ApiResult<Ack> {
        self.call::<AckEnvelope>("DELETE", &format!("/notifications/{id}"), Some(id))
            .map(|env| normalize_single(env.into()))
    }

    fn clear_read(&self) -> ApiResult<Ack> {
        self.call::<AckEnvelope>("DELETE", "/notifications/read/clear", None)
            .map(Into::into)
    }

    fn clear_old(&self, days: u32) -> ApiResult<Ack> {
        self.call::<AckEnvelope>(
            "DELETE",
            &format!("/notifications/old/cleanup?days={days}"),
            None,
        )
        .map(Into::into)
    }

    fn clear_all(&self) -> ApiResult<Ack> {
        self.call::<AckEnvelope>("DELETE", "/notifications", None)
            .map(Into::into)
    }
}

/// A 200 with an empty ack body on a single-target mutation means the
/// server applied it; report one affected row.
const fn normalize_single(ack: Ack) -> Ack {
    if ack.affected == 0 {
        Ack::of(1)
    } else {
        ack
    }
}

// ── Transport plumbing ──────────────────────────────────────────────────

#[derive(Debug)]
struct RawResponse {
    status: u16,
    #[allow(dead_code)] // headers kept for future conditional-request use
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

fn resolve_addr(addr: &str) -> ApiResult<std::net::SocketAddr> {
    use std::net::ToSocketAddrs;
    addr.parse().or_else(|_| {
        addr.to_socket_addrs()
            .map_err(|e| ApiError::Network {
                detail: format!("dns: {e}"),
            })?
            .next()
            .ok_or_else(|| ApiError::Network {
                detail: format!("no addresses for {addr}"),
            })
    })
}

/// Map an I/O error to the API taxonomy. Timeouts (including reads that
/// hit the socket deadline) become `Timeout`; everything else `Network`.
fn categorize_io_error(e: &io::Error, timeout: Duration) -> ApiError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ApiError::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        },
        _ => ApiError::Network {
            detail: e.to_string(),
        },
    }
}

/// Send a serialized request and parse the HTTP/1.1 response.
fn send_and_receive<S: io::Read + io::Write>(
    mut stream: S,
    request: &str,
    timeout: Duration,
) -> ApiResult<RawResponse> {
    stream
        .write_all(request.as_bytes())
        .map_err(|e| categorize_io_error(&e, timeout))?;
    stream
        .flush()
        .map_err(|e| categorize_io_error(&e, timeout))?;

    let mut reader = BufReader::new(stream);

    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .map_err(|e| categorize_io_error(&e, timeout))?;
    let status = parse_status_line(&status_line)?;

    // Headers
    let mut headers = BTreeMap::new();
    let mut content_length: Option<usize> = None;
    let mut chunked = false;
    loop {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|e| categorize_io_error(&e, timeout))?;
        let trimmed = line.trim_end_matches("\r\n").trim_end_matches('\n');
        if trimmed.is_empty() {
            break;
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            let key_lower = key.trim().to_lowercase();
            let value_trimmed = value.trim().to_string();
            if key_lower == "content-length" {
                content_length = value_trimmed.parse().ok();
            }
            if key_lower == "transfer-encoding"
                && value_trimmed.to_lowercase().contains("chunked")
            {
                chunked = true;
            }
            headers.insert(key_lower, value_trimmed);
        }
    }

    // Body
    let body = if chunked {
        read_chunked_body(&mut reader, timeout)?
    } else if let Some(len) = content_length {
        let capped = len.min(BODY_LIMIT);
        let mut buf = vec![0u8; capped];
        reader
            .read_exact(&mut buf)
            .map_err(|e| categorize_io_error(&e, timeout))?;
        buf
    } else {
        // Read until EOF (Connection: close)
        let mut buf = Vec::new();
        let _ = reader.take(BODY_LIMIT as u64).read_to_end(&mut buf);
        buf
    };

    Ok(RawResponse {
        status,
        headers,
        body,
    })
}

fn parse_status_line(line: &str) -> ApiResult<u16> {
    // "HTTP/1.1 200 OK" → 200
    let mut parts = line.split_whitespace();
    let _version = parts.next();
    parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| ApiError::Decode {
            detail: format!("malformed status line: {}", line.trim()),
        })
}

fn read_chunked_body<R: BufRead>(reader: &mut R, timeout: Duration) -> ApiResult<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader
            .read_line(&mut size_line)
            .map_err(|e| categorize_io_error(&e, timeout))?;
        // Strip chunk extensions (e.g., ";ext=val")
        let size_hex = size_line.trim().split(';').next().unwrap_or("0").trim();
        let size = usize::from_str_radix(size_hex, 16).map_err(|_| ApiError::Decode {
            detail: format!("invalid chunk size: {}", size_line.trim()),
        })?;
        if size == 0 {
            // Trailing CRLF after the last chunk
            let mut trailer = String::new();
            let _ = reader.read_line(&mut trailer);
            break;
        }
        if body.len() + size > BODY_LIMIT {
            return Err(ApiError::Decode {
                detail: "response body exceeds limit".to_string(),
            });
        }
        let mut chunk = vec![0u8; size];
        reader
            .read_exact(&mut chunk)
            .map_err(|e| categorize_io_error(&e, timeout))?;
        body.extend_from_slice(&chunk);
        // Chunk data is followed by CRLF
        let mut crlf = String::new();
        reader
            .read_line(&mut crlf)
            .map_err(|e| categorize_io_error(&e, timeout))?;
    }
    Ok(body)
}

/// Trimmed, lossy body excerpt for error details.
fn body_detail(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.len() <= DETAIL_LIMIT {
        return trimmed.to_string();
    }
    let mut end = DETAIL_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}
