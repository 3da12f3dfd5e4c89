//! Single-flight map for in-flight mutations.
//!
//! When several surfaces fire the same mutation at once (bell and
//! dropdown both marking the same notification read), only the first
//! caller ("leader") issues the network request; the rest ("joiners")
//! block briefly on the leader's slot and share its cloned result. This
//! is what guarantees "exactly one network call" for duplicate actions.
//!
//! Unlike a read-path coalescer, a joiner that times out must NOT fall
//! back to executing independently — that would issue the duplicate
//! request this map exists to prevent. Timeouts surface as
//! [`JoinOutcome::JoinTimedOut`] and the caller reports an error.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

enum SlotState<V> {
    /// The leader is still executing.
    Pending,
    /// The leader finished; joiners clone this value.
    Done(V),
    /// The leader panicked before completing.
    Abandoned,
}

struct Slot<V> {
    state: Mutex<SlotState<V>>,
    done: Condvar,
}

impl<V: Clone> Slot<V> {
    const fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            done: Condvar::new(),
        }
    }

    fn complete(&self, value: &V) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *state = SlotState::Done(value.clone());
        drop(state);
        self.done.notify_all();
    }

    fn abandon(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if matches!(*state, SlotState::Pending) {
            *state = SlotState::Abandoned;
        }
        drop(state);
        self.done.notify_all();
    }

    fn wait(&self, timeout: Duration) -> Option<V> {
        let guard = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let (guard, wait_result) = self
            .done
            .wait_timeout_while(guard, timeout, |s| matches!(s, SlotState::Pending))
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if wait_result.timed_out() {
            return None;
        }
        match &*guard {
            SlotState::Done(v) => Some(v.clone()),
            SlotState::Pending | SlotState::Abandoned => None,
        }
    }
}

/// Outcome of [`InflightMap::execute_or_join`].
#[derive(Debug)]
pub enum JoinOutcome<V> {
    /// This caller executed the operation.
    Led(V),
    /// This caller joined an in-flight operation and shares its result.
    Joined(V),
    /// The join wait expired (or the leader died) before a result landed.
    JoinTimedOut,
}

impl<V> JoinOutcome<V> {
    /// True when no new request was issued for this caller.
    #[must_use]
    pub const fn was_joined(&self) -> bool {
        matches!(self, Self::Joined(_))
    }
}

/// Drop guard: if the leader's closure panics, wake joiners and clear the
/// map entry so the key is usable again.
struct LeaderGuard<'a, K: Hash + Eq + Clone, V: Clone> {
    map: &'a InflightMap<K, V>,
    key: K,
    slot: Arc<Slot<V>>,
    completed: bool,
}

impl<K: Hash + Eq + Clone, V: Clone> Drop for LeaderGuard<'_, K, V> {
    fn drop(&mut self) {
        if !self.completed {
            self.slot.abandon();
            self.map.remove_if_same(&self.key, &self.slot);
        }
    }
}

/// Concurrent map deduplicating in-flight operations by key.
pub struct InflightMap<K, V> {
    slots: Mutex<HashMap<K, Arc<Slot<V>>>>,
    join_timeout: Duration,
}

impl<K: Hash + Eq + Clone, V: Clone> InflightMap<K, V> {
    /// `join_timeout` bounds how long a duplicate caller waits for the
    /// leader; it should comfortably exceed the network timeout.
    #[must_use]
    pub fn new(join_timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            join_timeout,
        }
    }

    /// Execute `f` as leader, or join an existing in-flight call for the
    /// same key and share its result.
    pub fn execute_or_join<F>(&self, key: K, f: F) -> JoinOutcome<V>
    where
        F: FnOnce() -> V,
    {
        let role = {
            let mut map = self
                .slots
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(slot) = map.get(&key).map(Arc::clone) {
                Err(slot)
            } else {
                let slot = Arc::new(Slot::new());
                map.insert(key.clone(), Arc::clone(&slot));
                Ok(slot)
            }
        };

        match role {
            Err(slot) => match slot.wait(self.join_timeout) {
                Some(v) => JoinOutcome::Joined(v),
                None => JoinOutcome::JoinTimedOut,
            },
            Ok(slot) => {
                let mut guard = LeaderGuard {
                    map: self,
                    key,
                    slot,
                    completed: false,
                };
                let value = f();
                guard.completed = true;
                guard.slot.complete(&value);
                self.remove_if_same(&guard.key, &guard.slot);
                JoinOutcome::Led(value)
            }
        }
    }

    /// Number of currently in-flight operations.
    #[must_use]
    pub fn inflight_count(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    fn remove_if_same(&self, key: &K, slot: &Arc<Slot<V>>) {
        let mut map = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(existing) = map.get(key)
            && Arc::ptr_eq(existing, slot)
        {
            map.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn single_caller_leads() {
        let map: InflightMap<&str, i32> = InflightMap::new(Duration::from_millis(100));
        let out = map.execute_or_join("k", || 7);
        assert!(matches!(out, JoinOutcome::Led(7)));
        assert_eq!(map.inflight_count(), 0);
    }

    #[test]
    fn concurrent_same_key_executes_once() {
        let n = 8;
        let map = Arc::new(InflightMap::<String, i32>::new(Duration::from_secs(5)));
        let execs = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(n));

        let handles: Vec<_> = (0..n)
            .map(|_| {
                let map = Arc::clone(&map);
                let execs = Arc::clone(&execs);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    map.execute_or_join("same".to_string(), || {
                        execs.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        42
                    })
                })
            })
            .collect();

        let results: Vec<JoinOutcome<i32>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        // All callers see the value; the closure ran a bounded number of
        // times (1 in the common case, more only if a caller raced in
        // after the leader finished).
        for out in &results {
            match out {
                JoinOutcome::Led(v) | JoinOutcome::Joined(v) => assert_eq!(*v, 42),
                JoinOutcome::JoinTimedOut => panic!("unexpected join timeout"),
            }
        }
        assert!(execs.load(Ordering::SeqCst) < n);
        assert!(results.iter().any(JoinOutcome::was_joined));
        assert_eq!(map.inflight_count(), 0);
    }

    #[test]
    fn different_keys_run_independently() {
        let map = Arc::new(InflightMap::<i64, i64>::new(Duration::from_secs(1)));
        let execs = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let map = Arc::clone(&map);
                let execs = Arc::clone(&execs);
                thread::spawn(move || {
                    map.execute_or_join(i, || {
                        execs.fetch_add(1, Ordering::SeqCst);
                        i * 10
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(execs.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn join_timeout_does_not_reexecute() {
        let map = Arc::new(InflightMap::<&'static str, i32>::new(Duration::from_millis(
            30,
        )));
        let execs = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(Barrier::new(2));

        let leader = {
            let map = Arc::clone(&map);
            let execs = Arc::clone(&execs);
            let started = Arc::clone(&started);
            thread::spawn(move || {
                map.execute_or_join("slow", || {
                    execs.fetch_add(1, Ordering::SeqCst);
                    started.wait();
                    thread::sleep(Duration::from_millis(200));
                    1
                })
            })
        };

        started.wait();
        let joiner = map.execute_or_join("slow", || {
            execs.fetch_add(1, Ordering::SeqCst);
            2
        });

        assert!(matches!(joiner, JoinOutcome::JoinTimedOut));
        leader.join().unwrap();
        // The joiner never ran its closure.
        assert_eq!(execs.load(Ordering::SeqCst), 1);
        assert_eq!(map.inflight_count(), 0);
    }

    #[test]
    fn sequential_reuse_of_key() {
        let map: InflightMap<&str, i32> = InflightMap::new(Duration::from_millis(100));
        assert!(matches!(map.execute_or_join("k", || 1), JoinOutcome::Led(1)));
        assert!(matches!(map.execute_or_join("k", || 2), JoinOutcome::Led(2)));
    }

    #[test]
    fn leader_panic_wakes_joiner_and_clears_entry() {
        let map = Arc::new(InflightMap::<&'static str, i32>::new(Duration::from_secs(2)));
        let started = Arc::new(Barrier::new(2));

        let leader = {
            let map = Arc::clone(&map);
            let started = Arc::clone(&started);
            thread::spawn(move || {
                let _ = map.execute_or_join("boom", || {
                    started.wait();
                    thread::sleep(Duration::from_millis(20));
                    panic!("leader died");
                    #[allow(unreachable_code)]
                    0
                });
            })
        };

        started.wait();
        let joiner = map.execute_or_join("boom", || 5);
        // Joiner either saw the abandoned slot (timed out) or raced in
        // after cleanup and led its own call.
        assert!(matches!(
            joiner,
            JoinOutcome::JoinTimedOut | JoinOutcome::Led(5)
        ));
        assert!(leader.join().is_err());
        assert_eq!(map.inflight_count(), 0);
    }
}
