//! Awaitable value cells.
//!
//! [`AwaitableVar`] lets tasks wait until a cell takes on a specific value.
//! Unlike a plain event, a waiter only returns while the value actually
//! holds its target: every wake re-checks, so a rapid `A -> target -> A`
//! transition releases only the waiters that got scheduled while the value
//! was `target`. This is the latch semantics the endpoint's `connected`
//! flag relies on.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::lock;

struct VarState<T> {
    value: T,
    next_waiter: u64,
    waiters: Vec<(u64, Arc<Notify>)>,
}

/// A shared mutable cell that tasks may wait to take on a specific value.
///
/// Reads and writes are synchronous; [`Self::set`] wakes every currently
/// registered waiter. Clones share the same cell.
#[derive(Clone)]
pub struct AwaitableVar<T> {
    state: Arc<Mutex<VarState<T>>>,
}

impl<T: Clone + PartialEq> AwaitableVar<T> {
    /// Create a cell holding `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(VarState { value: initial, next_waiter: 0, waiters: Vec::new() })),
        }
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> T {
        lock(&self.state).value.clone()
    }

    /// Replace the value and wake all registered waiters.
    pub fn set(&self, value: T) {
        let state = &mut *lock(&self.state);
        state.value = value;

        for (_, waiter) in &state.waiters {
            waiter.notify_one();
        }
    }

    /// Wait until the cell holds `value`.
    ///
    /// Returns immediately on a match. Otherwise registers a fresh wake
    /// event and loops: wait, re-check. The registration is removed on
    /// every exit path, including cancellation.
    pub async fn wait_for(&self, value: T) {
        let guard = {
            let state = &mut *lock(&self.state);
            if state.value == value {
                return;
            }

            let id = state.next_waiter;
            state.next_waiter += 1;

            let notify = Arc::new(Notify::new());
            state.waiters.push((id, notify.clone()));
            WaiterGuard { state: &*self.state, id, notify }
        };

        loop {
            guard.notify.notified().await;
            if lock(&self.state).value == value {
                return;
            }
        }
    }
}

/// Removes a waiter registration when the waiting future completes or is
/// cancelled.
struct WaiterGuard<'a, T> {
    state: &'a Mutex<VarState<T>>,
    id: u64,
    notify: Arc<Notify>,
}

impl<T> Drop for WaiterGuard<'_, T> {
    fn drop(&mut self) {
        lock(self.state).waiters.retain(|(id, _)| *id != self.id);
    }
}

/// A boolean [`AwaitableVar`] with flag-shaped conveniences.
///
/// Similar to an async event, except that waiters only return while the
/// flag still holds the awaited value (see the module docs).
#[derive(Clone)]
pub struct Flag {
    var: AwaitableVar<bool>,
}

impl Flag {
    /// Create a flag holding `initial`.
    #[must_use]
    pub fn new(initial: bool) -> Self {
        Self { var: AwaitableVar::new(initial) }
    }

    /// Set the flag (to true).
    pub fn set(&self) {
        self.var.set(true);
    }

    /// Clear the flag (to false).
    pub fn clear(&self) {
        self.var.set(false);
    }

    /// True if the flag is set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.var.get()
    }

    /// True if the flag is cleared.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        !self.var.get()
    }

    /// Wait until the flag is set.
    pub async fn wait(&self) {
        self.var.wait_for(true).await;
    }

    /// Wait until the flag is cleared.
    pub async fn wait_clear(&self) {
        self.var.wait_for(false).await;
    }
}

impl Default for Flag {
    fn default() -> Self {
        Self::new(false)
    }
}
