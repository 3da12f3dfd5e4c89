//! Shared poll timer.
//!
//! One scheduler per session — never one per mounted surface. The worker
//! runs on a dedicated OS thread and drives `fetch_stats` (plus the first
//! page, when some subscriber renders it) into the store on a fixed
//! cadence. Rules:
//!
//! - Deadline-based ticking: if a fetch outlasts the interval, the missed
//!   deadlines are dropped, never queued. A 15 s fetch against a 10 s
//!   interval produces 2 calls in 30 s, not 3.
//! - A tick that fails transiently flags the store and waits for the next
//!   deadline; there is no in-tick retry, so a slow server never sees a
//!   retry storm.
//! - Results are applied only if the engine generation they started under
//!   is still current; anything else is discarded unapplied.
//! - `stop()` is synchronous: the worker is woken and joined before it
//!   returns (unless called from the worker itself, where it just signals).

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::session::EngineCore;
use crate::store::MergeMode;

/// What a completed tick tells the poll loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Continue,
    /// Fatal auth failure — the engine tore itself down; the worker exits.
    Shutdown,
}

#[derive(Default)]
struct Flags {
    stop: bool,
    poke: bool,
}

struct Control {
    flags: Mutex<Flags>,
    wake: Condvar,
}

/// Handle to the poll worker thread.
pub struct PollingScheduler {
    control: Arc<Control>,
    handle: Option<JoinHandle<()>>,
}

impl PollingScheduler {
    /// Spawn the worker. The first tick runs immediately (initial load);
    /// subsequent ticks follow the configured interval.
    pub(crate) fn start(core: Arc<EngineCore>) -> Self {
        let control = Arc::new(Control {
            flags: Mutex::new(Flags::default()),
            wake: Condvar::new(),
        });
        let thread_control = Arc::clone(&control);
        let handle = thread::Builder::new()
            .name("notify-inbox-poll".into())
            .spawn(move || poll_loop(&core, &thread_control))
            .expect("failed to spawn poll worker");
        info!("poll worker started");
        Self {
            control,
            handle: Some(handle),
        }
    }

    /// Request an immediate out-of-band tick (manual refresh).
    pub(crate) fn poke(&self) {
        let mut flags = self.lock_flags();
        flags.poke = true;
        drop(flags);
        self.control.wake.notify_all();
    }

    /// Stop the worker. Joins unless invoked from the worker thread
    /// itself (e.g. teardown triggered inside a subscriber callback), in
    /// which case the signal alone suffices — the loop exits right after.
    pub(crate) fn stop(mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            if thread::current().id() == handle.thread().id() {
                return;
            }
            let _ = handle.join();
            info!("poll worker stopped");
        }
    }

    fn signal_stop(&self) {
        let mut flags = self.lock_flags();
        flags.stop = true;
        drop(flags);
        self.control.wake.notify_all();
    }

    fn lock_flags(&self) -> std::sync::MutexGuard<'_, Flags> {
        self.control
            .flags
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take()
            && thread::current().id() != handle.thread().id()
        {
            let _ = handle.join();
        }
    }
}

fn poll_loop(core: &Arc<EngineCore>, control: &Arc<Control>) {
    let interval = core.config.poll_interval;
    let mut next_deadline = Instant::now();

    loop {
        // Sleep until the deadline, a poke, or stop.
        let poked = {
            let mut flags = control
                .flags
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            loop {
                if flags.stop {
                    return;
                }
                if flags.poke {
                    flags.poke = false;
                    break true;
                }
                let now = Instant::now();
                if now >= next_deadline {
                    break false;
                }
                let (next, _timed_out) = control
                    .wake
                    .wait_timeout(flags, next_deadline - now)
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                flags = next;
            }
        };

        if core.is_closed() {
            return;
        }
        if run_tick(core) == TickOutcome::Shutdown {
            return;
        }

        if poked {
            // Out-of-band tick: restart the cadence from now.
            next_deadline = Instant::now() + interval;
        } else {
            next_deadline += interval;
            // Drop deadlines the fetch overran; skipped is skipped.
            let now = Instant::now();
            while next_deadline <= now {
                next_deadline += interval;
                core.metrics.ticks_skipped.inc();
                debug!("poll tick skipped: previous fetch still outstanding");
            }
        }
    }
}

/// Run one poll tick: stats, then (if some surface renders it) the first
/// page. Also used inline by `InboxEngine::refresh` when no worker runs.
pub(crate) fn run_tick(core: &EngineCore) -> TickOutcome {
    let generation = core.generation();

    let stats_result = core.api.fetch_stats();
    if core.generation() != generation || core.is_closed() {
        core.metrics.stale_generation_discards.inc();
        debug!("stats result discarded: generation superseded");
        return TickOutcome::Continue;
    }
    match stats_result {
        Ok(stats) => {
            core.store.apply_stats(stats);
        }
        Err(e) if e.is_fatal() => {
            warn!("poll hit auth failure; tearing down");
            core.handle_fatal();
            return TickOutcome::Shutdown;
        }
        Err(e) => {
            warn!(error = %e, "stats poll failed; keeping cached data");
            core.store.flag_error(&e.to_string());
            core.publish();
            return TickOutcome::Continue;
        }
    }

    // List-rendering subscribers drive a page-1 refresh; an empty cache
    // gets an initial population regardless (first load after login).
    let page_filter = core
        .hub
        .wants_first_page()
        .or_else(|| (core.store.snapshot().page == 0).then_some(false));

    if let Some(unread_only) = page_filter {
        let page_result = core
            .api
            .fetch_page(1, core.config.page_size, unread_only);
        if core.generation() != generation || core.is_closed() {
            core.metrics.stale_generation_discards.inc();
            debug!("page result discarded: generation superseded");
            return TickOutcome::Continue;
        }
        match page_result {
            Ok(page) => {
                core.store.apply_page(&page, MergeMode::Replace);
            }
            Err(e) if e.is_fatal() => {
                warn!("poll hit auth failure; tearing down");
                core.handle_fatal();
                return TickOutcome::Shutdown;
            }
            Err(e) => {
                warn!(error = %e, "page poll failed; keeping cached data");
                core.store.flag_error(&e.to_string());
                core.publish();
                return TickOutcome::Continue;
            }
        }
    }

    core.metrics.polls_completed.inc();
    core.publish();
    TickOutcome::Continue
}
