//! Remote notification API: contract, credentials, and HTTP transport.
//!
//! This crate provides:
//! - [`NotificationApi`] — the blocking contract the engine consumes
//! - [`CredentialProvider`] — the auth collaborator's single
//!   credential-resolution seam
//! - [`HttpNotificationApi`] — synchronous HTTP/1.1 implementation over
//!   `std::net` with a bounded timeout and structured error mapping
//!
//! No retries happen at this layer; retry policy belongs to the engine's
//! scheduler and mutation coordinator.

#![forbid(unsafe_code)]

pub mod client;
pub mod credentials;
pub mod http;
pub mod wire;

pub use client::NotificationApi;
pub use credentials::{CredentialProvider, StaticCredentials};
pub use http::HttpNotificationApi;
