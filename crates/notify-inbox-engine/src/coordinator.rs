//! Mutation coordination: one user action, one optimistic patch, exactly
//! one network call.
//!
//! Correctness rules under concurrent and duplicate submission:
//!
//! - Per-target single-flight: a duplicate of an in-flight mutation joins
//!   the leader's slot instead of issuing its own request.
//! - Per-id sequences: a completion is reconciled into the store only if
//!   it is still the latest mutation issued for that id; out-of-order
//!   completions are discarded.
//! - Optimistic apply happens before the network call. On success the
//!   optimistic state stands (the next poll reconciles against server
//!   truth). On any non-fatal failure the exact pre-mutation snapshot is
//!   rolled back — all-or-nothing, bulk included. Auth failure tears the
//!   engine down.

use std::time::Duration;

use tracing::debug;

use notify_inbox_core::{Ack, ApiError, cutoff_days_ago, now_naive};

use crate::error::{EngineError, EngineResult};
use crate::inflight::{InflightMap, JoinOutcome};
use crate::session::EngineCore;
use crate::store::{BulkPatch, SingleKind};

type MutationResult = Result<Ack, ApiError>;

/// Identity of a mutation for single-flight purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MutationKey {
    MarkRead(i64),
    Remove(i64),
    MarkAllRead,
    ClearRead,
    ClearOld(u32),
    ClearAll,
}

/// Serializes and deduplicates mutating calls against the store.
pub(crate) struct MutationCoordinator {
    inflight: InflightMap<MutationKey, MutationResult>,
    join_timeout: Duration,
}

impl MutationCoordinator {
    pub(crate) fn new(request_timeout: Duration) -> Self {
        // A joiner must outwait the leader's worst-case network call.
        let join_timeout = request_timeout * 2;
        Self {
            inflight: InflightMap::new(join_timeout),
            join_timeout,
        }
    }

    // ── Single-target mutations ─────────────────────────────────────────

    pub(crate) fn mark_read(&self, core: &EngineCore, id: i64) -> EngineResult<Ack> {
        if core.is_closed() {
            return Err(EngineError::Closed);
        }
        // Already read in the cache: idempotent no-op, no network call.
        if core
            .store
            .snapshot()
            .notifications
            .iter()
            .any(|n| n.id == id && n.is_read)
        {
            return Ok(Ack::of(0));
        }
        self.single(core, MutationKey::MarkRead(id), id, SingleKind::MarkRead)
    }

    pub(crate) fn remove(&self, core: &EngineCore, id: i64) -> EngineResult<Ack> {
        if core.is_closed() {
            return Err(EngineError::Closed);
        }
        self.single(core, MutationKey::Remove(id), id, SingleKind::Remove)
    }

    fn single(
        &self,
        core: &EngineCore,
        key: MutationKey,
        id: i64,
        kind: SingleKind,
    ) -> EngineResult<Ack> {
        let outcome = self
            .inflight
            .execute_or_join(key, || lead_single(core, id, kind));
        self.resolve(core, outcome)
    }

    // ── Bulk mutations ──────────────────────────────────────────────────

    pub(crate) fn mark_all_read(&self, core: &EngineCore) -> EngineResult<Ack> {
        if core.is_closed() {
            return Err(EngineError::Closed);
        }
        // Nothing unread: idempotent no-op, no network call.
        if core.store.snapshot().stats.unread == 0 {
            return Ok(Ack::of(0));
        }
        let outcome = self.inflight.execute_or_join(MutationKey::MarkAllRead, || {
            lead_bulk(core, BulkPatch::MarkAllRead, || core.api.mark_all_read())
        });
        self.resolve(core, outcome)
    }

    pub(crate) fn clear_read(&self, core: &EngineCore) -> EngineResult<Ack> {
        if core.is_closed() {
            return Err(EngineError::Closed);
        }
        let outcome = self.inflight.execute_or_join(MutationKey::ClearRead, || {
            lead_bulk(core, BulkPatch::ClearRead, || core.api.clear_read())
        });
        self.resolve(core, outcome)
    }

    pub(crate) fn clear_old(&self, core: &EngineCore, days: u32) -> EngineResult<Ack> {
        if core.is_closed() {
            return Err(EngineError::Closed);
        }
        let outcome = self
            .inflight
            .execute_or_join(MutationKey::ClearOld(days), || {
                let cutoff = cutoff_days_ago(now_naive(), days);
                lead_bulk(core, BulkPatch::ClearOld { cutoff }, || {
                    core.api.clear_old(days)
                })
            });
        self.resolve(core, outcome)
    }

    pub(crate) fn clear_all(&self, core: &EngineCore) -> EngineResult<Ack> {
        if core.is_closed() {
            return Err(EngineError::Closed);
        }
        let outcome = self.inflight.execute_or_join(MutationKey::ClearAll, || {
            lead_bulk(core, BulkPatch::ClearAll, || core.api.clear_all())
        });
        self.resolve(core, outcome)
    }

    // ── Shared plumbing ─────────────────────────────────────────────────

    fn resolve(
        &self,
        core: &EngineCore,
        outcome: JoinOutcome<MutationResult>,
    ) -> EngineResult<Ack> {
        match outcome {
            JoinOutcome::Led(result) => result.map_err(Into::into),
            JoinOutcome::Joined(result) => {
                core.metrics.mutations_coalesced.inc();
                debug!("duplicate mutation joined in-flight call");
                result.map_err(Into::into)
            }
            JoinOutcome::JoinTimedOut => Err(EngineError::Api(ApiError::Timeout {
                timeout_ms: u64::try_from(self.join_timeout.as_millis()).unwrap_or(u64::MAX),
            })),
        }
    }
}

/// Leader path for a single-target mutation.
fn lead_single(core: &EngineCore, id: i64, kind: SingleKind) -> MutationResult {
    let (seq, before) = match kind {
        SingleKind::MarkRead => core.store.optimistic_mark_read(id),
        SingleKind::Remove => core.store.optimistic_remove(id),
    };
    core.publish();

    let result = match kind {
        SingleKind::MarkRead => core.api.mark_read(id),
        SingleKind::Remove => core.api.remove(id),
    };

    let is_latest = core.store.finish_single(id, kind, seq);
    match &result {
        Ok(_) => {
            // Optimistic state stands; the poll reconciles. A stale
            // success has nothing left to contribute either way.
            if !is_latest {
                core.metrics.stale_sequence_discards.inc();
            }
        }
        Err(e) if e.is_fatal() => core.handle_fatal(),
        Err(e) => {
            if is_latest {
                core.store.rollback(&before);
                core.metrics.rollbacks.inc();
                if e.is_transient() {
                    core.store.flag_error(&e.to_string());
                }
                core.publish();
            } else {
                // A newer mutation owns this id now; rolling back would
                // clobber its optimistic state.
                core.metrics.stale_sequence_discards.inc();
                debug!(id, seq, "stale mutation completion discarded");
            }
        }
    }
    result
}

/// Leader path for a bulk mutation: full-snapshot capture, all-or-nothing
/// rollback.
fn lead_bulk<F>(core: &EngineCore, patch: BulkPatch, call: F) -> MutationResult
where
    F: FnOnce() -> MutationResult,
{
    let before = core.store.optimistic_bulk(patch);
    core.publish();

    let result = call();
    core.store.finish_bulk();

    match &result {
        Ok(_) => {}
        Err(e) if e.is_fatal() => core.handle_fatal(),
        Err(e) => {
            core.store.rollback(&before);
            core.metrics.rollbacks.inc();
            if e.is_transient() {
                core.store.flag_error(&e.to_string());
            }
            core.publish();
        }
    }
    result
}
