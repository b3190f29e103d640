//! Hand-rolled collaborators for scheduler and watcher tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use phpmon_runtime::cell::ThreadSafeCell;
use phpmon_runtime::exec::BoxFuture;
use phpmon_runtime::updates::{AvailableVersion, CheckError, Clock, UpdateChecker};

/// An update checker that returns queued results in order.
///
/// Once the queue is empty every further check succeeds with `"1.0.0"`.
#[derive(Debug, Default)]
pub struct ScriptedChecker {
    results: Mutex<VecDeque<Result<AvailableVersion, CheckError>>>,
    calls: AtomicUsize,
}

impl ScriptedChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self, version: &str) -> Self {
        self.push(Ok(AvailableVersion {
            version: version.to_string(),
        }))
    }

    pub fn then_network_error(self) -> Self {
        self.push(Err(CheckError::Network("connection refused".to_string())))
    }

    pub fn then_parse_error(self) -> Self {
        self.push(Err(CheckError::Parse("<html>".to_string())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn push(self, result: Result<AvailableVersion, CheckError>) -> Self {
        self.results.lock().unwrap().push_back(result);
        self
    }
}

impl UpdateChecker for ScriptedChecker {
    fn check(&self) -> BoxFuture<'_, Result<AvailableVersion, CheckError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.results.lock().unwrap().pop_front();
        Box::pin(async move {
            next.unwrap_or_else(|| {
                Ok(AvailableVersion {
                    version: "1.0.0".to_string(),
                })
            })
        })
    }
}

/// A clock that only moves when told to.
///
/// `advance` is a read-then-write on the underlying cell; only drive it
/// from the test body.
#[derive(Debug)]
pub struct ManualClock {
    now: ThreadSafeCell<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: ThreadSafeCell::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    pub fn advance(&self, by: TimeDelta) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

/// Counts how many times a callback ran.
#[derive(Debug, Clone, Default)]
pub struct CallCounter {
    count: Arc<AtomicUsize>,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback that bumps this counter.
    pub fn callback(&self) -> impl Fn() + Send + Sync + 'static {
        let count = Arc::clone(&self.count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}
