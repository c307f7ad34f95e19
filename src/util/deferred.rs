//! Reusable single-flight completion signal

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tokio::sync::Notify;

/// A one-shot completion signal that can be awaited by any number of waiters.
///
/// Unlike a oneshot channel, a `Deferred` can be cloned and awaited repeatedly
/// after it has resolved, which makes it suitable for "wait for the current
/// cycle" APIs: the owner resolves the deferred when the cycle finishes and
/// immediately swaps in a fresh instance for the next cycle. Waiters holding
/// the old instance still observe the resolved value and never deadlock.
pub struct Deferred<T> {
    inner: Rc<DeferredInner<T>>,
}

struct DeferredInner<T> {
    value: RefCell<Option<T>>,
    done: Cell<bool>,
    notify: Notify,
}

impl<T: Clone> Deferred<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DeferredInner {
                value: RefCell::new(None),
                done: Cell::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Create a deferred which is already resolved
    pub fn resolved(value: T) -> Self {
        let deferred = Self::new();
        deferred.resolve(value);
        deferred
    }

    /// True once `resolve()` has been called
    pub fn is_done(&self) -> bool {
        self.inner.done.get()
    }

    /// The resolved value, if any
    pub fn value(&self) -> Option<T> {
        self.inner.value.borrow().clone()
    }

    /// Resolve the deferred, waking all current and future waiters. Calls
    /// after the first are ignored.
    pub fn resolve(&self, value: T) {
        if self.inner.done.get() {
            return;
        }
        *self.inner.value.borrow_mut() = Some(value);
        self.inner.done.set(true);
        self.inner.notify.notify_waiters();
    }

    /// Wait until the deferred resolves and return the resolved value.
    /// Returns immediately if already resolved.
    pub async fn wait(&self) -> T {
        loop {
            // Register interest before checking the flag so a resolve
            // between the check and the await cannot be missed
            let notified = self.inner.notify.notified();
            if self.inner.done.get() {
                let value = self.inner.value.borrow();
                if let Some(value) = value.as_ref() {
                    return value.clone();
                }
            }
            notified.await;
        }
    }
}

impl<T: Clone> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}
