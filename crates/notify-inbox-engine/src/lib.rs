//! Notification inbox synchronization engine.
//!
//! One engine instance per authenticated session keeps a single cached
//! view of the user's notification inbox and fans it out to every UI
//! surface (bell badge, dropdown preview, management page, dashboard
//! widgets) that subscribes. The engine owns all traffic to the remote
//! notification API:
//!
//! - [`store::InboxStore`] — versioned in-memory cache of notifications
//!   plus aggregate stats; the only state in the system
//! - [`scheduler::PollingScheduler`] — one shared poll timer per session
//!   (never one per surface)
//! - [`coordinator`] — optimistic mutations with per-target single-flight
//!   and per-id sequence ordering
//! - [`hub::SubscriptionHub`] — selector-based fan-out with monotonic,
//!   deduplicated delivery
//! - [`session::InboxEngine`] — the facade UI surfaces actually hold
//!
//! Writers into the store are exactly the coordinator and the scheduler;
//! the hub only reads and notifies.

#![forbid(unsafe_code)]

pub mod coordinator;
pub mod error;
pub mod hub;
pub mod inflight;
pub mod scheduler;
pub mod session;
pub mod store;

pub use error::{EngineError, EngineResult};
pub use hub::{InboxView, Selector, SubscriptionHub, SubscriptionId};
pub use inflight::{InflightMap, JoinOutcome};
pub use session::InboxEngine;
pub use store::{BulkPatch, InboxSnapshot, InboxStore, MergeMode, SessionPhase, SingleKind};
