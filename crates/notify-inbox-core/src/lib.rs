//! Core types, configuration, and models for the notification inbox engine
//!
//! This crate provides:
//! - Data models (`Notification`, `InboxStats`, `NotificationPage`, `Ack`)
//! - The remote API error taxonomy (`ApiError`)
//! - Configuration management (`EngineConfig`, environment parsing)
//! - Lock-free engine metrics
//! - Timestamp helpers

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod timestamps;

// Re-export key types for convenience
pub use config::EngineConfig;
pub use error::{ApiError, ApiResult};
pub use metrics::{Counter, EngineMetrics, EngineMetricsSnapshot};
pub use models::{
    Ack, InboxStats, Notification, NotificationKind, NotificationPage, newest_first,
};
pub use timestamps::{cutoff_days_ago, now_naive};
