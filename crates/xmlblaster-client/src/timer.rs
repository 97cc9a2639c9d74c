// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot timer service driving pings and reconnect attempts.
//!
//! A single worker thread owns a deadline-ordered map of pending callbacks.
//! Any number of connections register and cancel entries concurrently;
//! callbacks run on the worker, one at a time, with no timer lock held, so
//! a callback may freely add or remove timers itself.
//!
//! # Guarantees
//!
//! - A registered callback fires at most once.
//! - Removing an entry before its deadline prevents it from firing.
//! - An entry popped by the worker but not yet invoked cannot be recalled.
//!   Owners that need strict cancellation capture a token in the callback
//!   and check it against their own state when it runs.
//!
//! ```ignore
//! let timer = Timeout::new("xmlblaster-ping-timer")?;
//! let key = timer.add_timeout_listener(Duration::from_millis(500), || println!("fired"));
//! timer.remove_timeout_listener(key);
//! ```

use crate::{Error, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Work executed when a timer expires.
pub type TimeoutCallback = Box<dyn FnOnce() + Send + 'static>;

/// Handle of a registered timer.
///
/// Ordered by deadline, ties broken by registration order. A refresh
/// produces a new key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerKey {
    deadline: Instant,
    seq: u64,
}

impl TimerKey {
    /// Instant the timer fires at.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

struct Entry {
    callback: TimeoutCallback,
    created: Instant,
}

struct TimerState {
    entries: BTreeMap<TimerKey, Entry>,
    next_seq: u64,
    running: bool,
}

struct Inner {
    state: Mutex<TimerState>,
    wakeup: Condvar,
}

/// Shared timer service. See the module docs.
pub struct Timeout {
    name: String,
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Timeout {
    /// Start a timer service with a named worker thread.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let inner = Arc::new(Inner {
            state: Mutex::new(TimerState {
                entries: BTreeMap::new(),
                next_seq: 0,
                running: true,
            }),
            wakeup: Condvar::new(),
        });

        let worker_inner = inner.clone();
        let worker_name = name.clone();
        let worker = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(&worker_name, &worker_inner))
            .map_err(|e| Error::internal(format!("failed to spawn timer thread '{}': {}", name, e)))?;

        Ok(Self {
            name,
            inner,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Worker thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register `callback` to run once after `delay`.
    ///
    /// After [`Timeout::shutdown`] the callback is dropped without running and
    /// the returned key is already expired.
    pub fn add_timeout_listener<F>(&self, delay: Duration, callback: F) -> TimerKey
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        let key = next_key(&mut state, delay);
        if !state.running {
            log::debug!("[{}] shut down, dropping timer {:?}", self.name, key);
            return key;
        }
        let is_first = state.entries.keys().next().map_or(true, |first| key < *first);
        state.entries.insert(
            key,
            Entry {
                callback: Box::new(callback),
                created: Instant::now(),
            },
        );
        if is_first {
            self.inner.wakeup.notify_one();
        }
        key
    }

    /// Move a pending timer to fire `delay` from now, keeping its callback.
    ///
    /// Fails if the timer has already fired or was removed.
    pub fn refresh_timeout_listener(&self, key: TimerKey, delay: Duration) -> Result<TimerKey> {
        let mut state = self.inner.state.lock();
        let entry = state
            .entries
            .remove(&key)
            .ok_or_else(|| Error::internal(format!("timer {:?} is expired, cannot refresh", key)))?;
        let new_key = next_key(&mut state, delay);
        state.entries.insert(new_key, entry);
        self.inner.wakeup.notify_one();
        Ok(new_key)
    }

    /// Refresh `key` if it is still pending, otherwise register `callback`.
    pub fn add_or_refresh_timeout_listener<F>(
        &self,
        key: Option<TimerKey>,
        delay: Duration,
        callback: F,
    ) -> TimerKey
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(key) = key {
            if let Ok(new_key) = self.refresh_timeout_listener(key, delay) {
                return new_key;
            }
        }
        self.add_timeout_listener(delay, callback)
    }

    /// Cancel a pending timer. Returns false if it already fired or was removed.
    pub fn remove_timeout_listener(&self, key: TimerKey) -> bool {
        self.inner.state.lock().entries.remove(&key).is_some()
    }

    /// Cancel every pending timer.
    pub fn remove_all(&self) {
        let drained = std::mem::take(&mut self.inner.state.lock().entries);
        // Callbacks may own handles whose Drop touches this timer.
        drop(drained);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// True once the timer has fired or been removed.
    pub fn is_expired(&self, key: TimerKey) -> bool {
        !self.inner.state.lock().entries.contains_key(&key)
    }

    /// Time left until the timer fires, `None` if expired.
    pub fn span_to_timeout(&self, key: TimerKey) -> Option<Duration> {
        let state = self.inner.state.lock();
        state
            .entries
            .contains_key(&key)
            .then(|| key.deadline.saturating_duration_since(Instant::now()))
    }

    /// Time since the timer was registered or last refreshed, `None` if expired.
    pub fn elapsed(&self, key: TimerKey) -> Option<Duration> {
        let state = self.inner.state.lock();
        state.entries.get(&key).map(|e| e.created.elapsed())
    }

    /// Number of pending timers.
    pub fn size(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// False after [`Timeout::shutdown`].
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Drop all pending timers and stop the worker.
    ///
    /// Joins the worker unless called from a timer callback.
    pub fn shutdown(&self) {
        let drained = {
            let mut state = self.inner.state.lock();
            state.running = false;
            std::mem::take(&mut state.entries)
        };
        self.inner.wakeup.notify_all();
        drop(drained);

        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("[{}] worker thread panicked", self.name);
            }
        }
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeout")
            .field("name", &self.name)
            .field("size", &self.size())
            .finish()
    }
}

fn next_key(state: &mut MutexGuard<'_, TimerState>, delay: Duration) -> TimerKey {
    let seq = state.next_seq;
    state.next_seq += 1;
    TimerKey {
        deadline: Instant::now() + delay,
        seq,
    }
}

fn run_worker(name: &str, inner: &Inner) {
    log::debug!("[{}] started", name);
    let mut state = inner.state.lock();
    while state.running {
        let Some(key) = state.entries.keys().next().copied() else {
            inner.wakeup.wait(&mut state);
            continue;
        };
        if key.deadline > Instant::now() {
            inner.wakeup.wait_until(&mut state, key.deadline);
            continue;
        }
        let Some(entry) = state.entries.remove(&key) else {
            continue;
        };
        MutexGuard::unlocked(&mut state, || {
            if catch_unwind(AssertUnwindSafe(entry.callback)).is_err() {
                log::error!("[{}] timer callback {:?} panicked", name, key);
            }
        });
    }
    log::debug!("[{}] stopped", name);
}
