// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Readiness primitives for lazy dynamic filters.
//!
//! Responsibilities:
//! - Defines one-shot, level-triggered readiness signals with removable
//!   listener registrations.
//! - Provides the wait-for-any combinator backing `DynamicFilter::blocked`.
//!
//! Key exported interfaces:
//! - Types: `ReadySignal`, `SignalHandle`, `Blocked`.
//!
//! A signal fires exactly once; a second fire is a collector bug and panics.
//! Listeners registered after the fire run immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

static NEXT_SIGNAL_ID: AtomicUsize = AtomicUsize::new(1);

/// Reference-counted handle to one readiness signal.
pub type SignalHandle = Arc<ReadySignal>;

type Listener = Box<dyn FnOnce() + Send>;

/// Single-assignment readiness signal observed by any number of consumers.
pub struct ReadySignal {
    id: usize,
    name: String,
    fired: AtomicBool,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_listener: AtomicU64,
}

impl ReadySignal {
    pub fn new(name: impl Into<String>) -> SignalHandle {
        Arc::new(Self {
            id: NEXT_SIGNAL_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            fired: AtomicBool::new(false),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Fires the signal and runs all registered listeners.
    ///
    /// Panics on a second fire: fulfilment is single-assignment.
    pub fn fire(&self) {
        let prev = self.fired.swap(true, Ordering::AcqRel);
        assert!(!prev, "readiness signal fired twice: {}", self.name);
        let drained: Vec<Listener> = {
            let mut guard = self.listeners.lock().expect("signal listeners lock");
            guard.drain().map(|(_, listener)| listener).collect()
        };
        for listener in drained {
            listener();
        }
    }

    /// Registers `listener` to run at fire time. Runs it immediately and
    /// returns `None` when the signal already fired.
    pub fn add_listener(&self, listener: Listener) -> Option<u64> {
        if self.is_fired() {
            listener();
            return None;
        }
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        {
            let mut guard = self.listeners.lock().expect("signal listeners lock");
            guard.insert(id, listener);
        }
        // Lost race with a concurrent fire: the drain may have happened before
        // the insert, so replay the listener ourselves.
        if self.is_fired() {
            let listener = {
                let mut guard = self.listeners.lock().expect("signal listeners lock");
                guard.remove(&id)
            };
            if let Some(listener) = listener {
                listener();
            }
            return None;
        }
        Some(id)
    }

    /// Drops an unfired registration. A no-op when the listener already ran.
    pub fn remove_listener(&self, id: u64) {
        let mut guard = self.listeners.lock().expect("signal listeners lock");
        guard.remove(&id);
    }

    #[cfg(test)]
    fn listener_count(&self) -> usize {
        self.listeners.lock().expect("signal listeners lock").len()
    }
}

struct BlockedState {
    done: Mutex<bool>,
    cond: Condvar,
}

/// Awaitable handle returned by `DynamicFilter::blocked`.
///
/// Completes when any one of the signals it was built over fires. Dropping
/// the handle removes its unfired registrations, so listeners never outlive
/// the waiter.
pub struct Blocked {
    state: Arc<BlockedState>,
    registrations: Vec<(SignalHandle, u64)>,
}

impl Blocked {
    /// An already-complete awaitable.
    pub fn ready() -> Self {
        Self {
            state: Arc::new(BlockedState {
                done: Mutex::new(true),
                cond: Condvar::new(),
            }),
            registrations: Vec::new(),
        }
    }

    /// Completes when any of `signals` fires; already-fired signals complete
    /// it immediately. An empty signal list is already complete.
    pub fn when_any(signals: &[SignalHandle]) -> Self {
        if signals.is_empty() {
            return Self::ready();
        }
        let state = Arc::new(BlockedState {
            done: Mutex::new(false),
            cond: Condvar::new(),
        });
        let mut registrations = Vec::new();
        for signal in signals {
            let listener_state = Arc::clone(&state);
            let registration = signal.add_listener(Box::new(move || {
                let mut done = listener_state.done.lock().expect("blocked state lock");
                *done = true;
                listener_state.cond.notify_all();
            }));
            match registration {
                Some(id) => registrations.push((Arc::clone(signal), id)),
                // Listener ran inline: the signal had already fired.
                None => break,
            }
        }
        Self {
            state,
            registrations,
        }
    }

    pub fn is_done(&self) -> bool {
        *self.state.done.lock().expect("blocked state lock")
    }

    /// Blocks the calling thread until completion.
    pub fn wait(&self) {
        let mut done = self.state.done.lock().expect("blocked state lock");
        while !*done {
            done = self.state.cond.wait(done).expect("blocked state lock");
        }
    }

    /// Blocks up to `timeout`; returns whether the handle completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.state.done.lock().expect("blocked state lock");
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .state
                .cond
                .wait_timeout(done, deadline - now)
                .expect("blocked state lock");
            done = guard;
        }
        true
    }
}

impl Drop for Blocked {
    fn drop(&mut self) {
        for (signal, id) in self.registrations.drain(..) {
            signal.remove_listener(id);
        }
    }
}
