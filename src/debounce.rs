// src/debounce.rs

//! Coalesce bursts of triggers into a single delayed action.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

/// Generation counter plus the currently armed timer.
///
/// Every call to `debounce` or `cancel` bumps `generation`; a timer only runs
/// its action if the generation it was armed with is still current when it
/// wakes up. A timer that wins also bumps the generation, so the check and
/// the hand-off happen under the same lock.
#[derive(Default)]
struct DebounceState {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

/// Runs only the most recent action of a burst, once, after a quiet window.
///
/// `debounce` may be called from any thread, including threads that are not
/// part of a tokio runtime (e.g. the `notify` callback thread); timers are
/// spawned onto the runtime handle given at construction.
///
/// Dropping the debouncer cancels a pending timer.
pub struct Debouncer {
    runtime: Handle,
    state: Arc<Mutex<DebounceState>>,
}

impl Debouncer {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            state: Arc::new(Mutex::new(DebounceState::default())),
        }
    }

    /// Convenience constructor for callers already inside a runtime.
    pub fn current() -> Result<Self, tokio::runtime::TryCurrentError> {
        Ok(Self::new(Handle::try_current()?))
    }

    /// Disarm any previously armed timer and arm a new one for `window`.
    ///
    /// `action` runs exactly once if no further `debounce`/`cancel` call
    /// happens on this instance before `window` elapses.
    pub fn debounce<F>(&self, window: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = lock(&self.state);
        state.generation = state.generation.wrapping_add(1);
        let token = state.generation;

        if let Some(previous) = state.pending.take() {
            previous.abort();
        }

        let shared = Arc::clone(&self.state);
        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(window).await;

            {
                let mut state = lock(&shared);
                if state.generation != token {
                    trace!(token, "debounce timer superseded");
                    return;
                }
                state.generation = state.generation.wrapping_add(1);
                state.pending = None;
            }

            action();
        });

        state.pending = Some(timer);
    }

    /// Disarm the pending timer, if any, without running its action.
    pub fn cancel(&self) {
        let mut state = lock(&self.state);
        state.generation = state.generation.wrapping_add(1);
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.state)
            .pending
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("Debouncer")
            .field("generation", &state.generation)
            .field("pending", &state.pending.is_some())
            .finish()
    }
}

fn lock(state: &Mutex<DebounceState>) -> MutexGuard<'_, DebounceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
