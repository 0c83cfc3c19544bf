//! Generic subscriber registry.
//!
//! # Contract
//!
//! - `register` / `remove` manage the active set. `remove` is idempotent.
//! - `subscribe` returns a [`Subscription`] that removes itself on drop;
//!   scoped waiters use it so every exit path deregisters.
//! - `notify` snapshots the subscriber list under the registry lock, releases
//!   the lock, and queues one job per subscriber on the [`DispatchPool`].
//!   The producer never runs a callback itself.
//! - A panicking callback is caught and logged; other subscribers and the
//!   producer are unaffected.
//!
//! The registry lock is its own; it is never taken while the order store's
//! lock is held, and never held while a callback runs, so callbacks may
//! re-enter the registry or the store freely.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::dispatch::DispatchPool;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

/// Handle returned by [`CallbackRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackId(u64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb-{}", self.0)
    }
}

struct Subscribers<T> {
    next_id: AtomicU64,
    callbacks: Mutex<BTreeMap<CallbackId, Callback<T>>>,
}

impl<T> Subscribers<T> {
    fn remove(&self, id: CallbackId) -> bool {
        // Dropped outside the lock: a callback's captures may do work on drop.
        let removed = self.callbacks.lock().remove(&id);
        removed.is_some()
    }
}

/// Set of callbacks invoked once per event.
pub struct CallbackRegistry<T> {
    subscribers: Arc<Subscribers<T>>,
    pool: Arc<DispatchPool>,
}

impl<T> CallbackRegistry<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(pool: Arc<DispatchPool>) -> Self {
        Self {
            subscribers: Arc::new(Subscribers {
                next_id: AtomicU64::new(1),
                callbacks: Mutex::new(BTreeMap::new()),
            }),
            pool,
        }
    }

    /// Add `callback` to the active set.
    pub fn register<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = CallbackId(self.subscribers.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .callbacks
            .lock()
            .insert(id, Arc::new(callback));
        trace!(callback_id = %id, "callback registered");
        id
    }

    /// Remove a callback. Returns `false` if it was not registered; that is
    /// not an error.
    pub fn remove(&self, id: CallbackId) -> bool {
        let removed = self.subscribers.remove(id);
        trace!(callback_id = %id, removed, "callback removed");
        removed
    }

    /// Register `callback` for as long as the returned guard lives.
    pub fn subscribe<F>(&self, callback: F) -> Subscription<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.register(callback);
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Drop every callback. Waiters whose callback is dropped this way observe
    /// an interrupted wait.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.subscribers.callbacks.lock());
        trace!(count = drained.len(), "callbacks cleared");
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.callbacks.lock().len()
    }

    /// Deliver `event` to every currently registered callback via the pool.
    pub fn notify(&self, event: T) {
        let targets: Vec<(CallbackId, Callback<T>)> = self
            .subscribers
            .callbacks
            .lock()
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();

        if targets.is_empty() {
            return;
        }

        let event = Arc::new(event);
        for (id, callback) in targets {
            let event = Arc::clone(&event);
            self.pool.execute(move || {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                    error!(
                        callback_id = %id,
                        panic = panic_message(panic.as_ref()),
                        "subscriber callback panicked; delivery to other subscribers continues"
                    );
                }
            });
        }
    }
}

impl<T> fmt::Debug for CallbackRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("subscribers", &self.subscribers.callbacks.lock().len())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Registration that ends when dropped.
#[must_use = "dropping a Subscription deregisters its callback immediately"]
pub struct Subscription<T> {
    id: CallbackId,
    subscribers: Weak<Subscribers<T>>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> CallbackId {
        self.id
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.remove(self.id);
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
