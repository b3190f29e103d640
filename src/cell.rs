// src/cell.rs

//! A mutex-guarded single value shared across threads and tasks.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Owns one `T` behind one lock.
///
/// [`get`](Self::get) and [`set`](Self::set) are each atomic. Nothing else
/// is: a `get` followed by a `set` can interleave with other writers, so
/// concurrent increments may lose updates. Callers that need a compound
/// invariant must hold their own lock around the sequence.
///
/// A panic in another thread while it held the lock does not poison the
/// cell; the last written value stays readable.
pub struct ThreadSafeCell<T> {
    inner: Mutex<T>,
}

impl<T> ThreadSafeCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn set(&self, value: T) {
        let previous = std::mem::replace(&mut *self.lock(), value);
        // Run the old value's destructor outside the lock.
        drop(previous);
    }

    pub fn into_inner(self) -> T {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> ThreadSafeCell<T> {
    pub fn get(&self) -> T {
        self.lock().clone()
    }
}

impl<T: Default> Default for ThreadSafeCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for ThreadSafeCell<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for ThreadSafeCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadSafeCell").field(&*self.lock()).finish()
    }
}
