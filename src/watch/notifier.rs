// src/watch/notifier.rs

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::cell::ThreadSafeCell;
use crate::debounce::Debouncer;
use crate::errors::Result;

use super::mask::EventMask;

type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// State shared between the notifier handle, the `notify` callback thread
/// and pending debounce timers.
struct NotifierShared {
    path: PathBuf,
    mask: EventMask,
    suspended: ThreadSafeCell<bool>,
    /// `true` until `terminate`. Callbacks run under the read lock, so once
    /// `terminate` has taken the write lock no callback is in flight and
    /// none can start.
    alive: RwLock<bool>,
    debounce: Option<(Debouncer, Duration)>,
    on_change: ChangeCallback,
}

impl NotifierShared {
    fn handle_event(self: &Arc<Self>, res: notify::Result<Event>) {
        let event = match res {
            Ok(event) => event,
            Err(err) => {
                warn!(path = ?self.path, error = %err, "file watch error");
                return;
            }
        };

        let Some(kind) = EventMask::classify(&event.kind) else {
            trace!(path = ?self.path, kind = ?event.kind, "ignoring event kind");
            return;
        };
        if !self.mask.contains(kind) {
            return;
        }

        if self.suspended.get() {
            debug!(path = ?self.path, %kind, "notifier suspended; dropping event");
            return;
        }

        match &self.debounce {
            Some((debouncer, window)) => {
                let shared = Arc::clone(self);
                debouncer.debounce(*window, move || shared.fire());
            }
            None => self.fire(),
        }
    }

    fn fire(&self) {
        let alive = self.alive.read().unwrap_or_else(PoisonError::into_inner);
        if !*alive {
            return;
        }
        // A debounced timer armed before `suspend` must not fire during it.
        if self.suspended.get() {
            debug!(path = ?self.path, "notifier suspended; dropping debounced change");
            return;
        }

        debug!(path = ?self.path, "file changed");
        (self.on_change)();
    }
}

/// Configures and starts an [`FsNotifier`].
#[derive(Debug)]
pub struct FsNotifierBuilder {
    path: PathBuf,
    mask: EventMask,
    debounce: Option<Duration>,
    runtime: Option<Handle>,
}

impl FsNotifierBuilder {
    pub fn mask(mut self, mask: EventMask) -> Self {
        self.mask = mask;
        self
    }

    /// Collapse events closer together than `window` into one callback.
    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = Some(window);
        self
    }

    /// Runtime used for debounce timers. Defaults to the current runtime.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Start watching. `on_change` runs on the `notify` thread (undebounced)
    /// or on a runtime worker (debounced).
    pub fn start<F>(self, on_change: F) -> Result<FsNotifier>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let debounce = match self.debounce {
            Some(window) => {
                let handle = match self.runtime {
                    Some(handle) => handle,
                    None => Handle::try_current()?,
                };
                Some((Debouncer::new(handle), window))
            }
            None => None,
        };

        let shared = Arc::new(NotifierShared {
            path: self.path.clone(),
            mask: self.mask,
            suspended: ThreadSafeCell::new(false),
            alive: RwLock::new(true),
            debounce,
            on_change: Arc::new(on_change),
        });

        let callback_shared = Arc::clone(&shared);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| callback_shared.handle_event(res),
            Config::default(),
        )?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        info!(
            path = ?self.path,
            mask = %self.mask,
            debounce_ms = self.debounce.map(|d| d.as_millis() as u64),
            "file notifier started"
        );

        Ok(FsNotifier {
            watcher: Mutex::new(Some(watcher)),
            shared,
        })
    }
}

/// Watches one path and calls back when it changes.
///
/// While suspended the OS watch stays in place but events are dropped;
/// resuming does not replay them. Call [`terminate`](Self::terminate) to
/// release the OS watch (dropping the notifier does the same).
pub struct FsNotifier {
    watcher: Mutex<Option<RecommendedWatcher>>,
    shared: Arc<NotifierShared>,
}

impl FsNotifier {
    pub fn builder(path: impl Into<PathBuf>) -> FsNotifierBuilder {
        FsNotifierBuilder {
            path: path.into(),
            mask: EventMask::WRITE,
            debounce: None,
            runtime: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn mask(&self) -> EventMask {
        self.shared.mask
    }

    pub fn suspend(&self) {
        self.shared.suspended.set(true);
        debug!(path = ?self.shared.path, "notifier suspended");
    }

    pub fn resume(&self) {
        self.shared.suspended.set(false);
        debug!(path = ?self.shared.path, "notifier resumed");
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.suspended.get()
    }

    /// Suspend while `action` runs, resuming on every exit path (including
    /// errors, panics and the future being dropped).
    pub async fn with_suspended<F, Fut, T>(&self, action: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = SuspendGuard::new(self);
        action().await
    }

    /// Blocking counterpart of [`with_suspended`](Self::with_suspended).
    pub fn with_suspended_blocking<F, T>(&self, action: F) -> T
    where
        F: FnOnce() -> T,
    {
        let _guard = SuspendGuard::new(self);
        action()
    }

    /// Release the OS watch. After this returns `on_change` will not run
    /// again. Safe to call more than once.
    ///
    /// Must not be called from inside `on_change`.
    pub fn terminate(&self) {
        {
            let mut alive = self
                .shared
                .alive
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if !*alive {
                return;
            }
            *alive = false;
        }

        if let Some((debouncer, _)) = &self.shared.debounce {
            debouncer.cancel();
        }

        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(watcher);

        info!(path = ?self.shared.path, "file notifier terminated");
    }

    pub fn is_terminated(&self) -> bool {
        !*self
            .shared
            .alive
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FsNotifier {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for FsNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsNotifier")
            .field("path", &self.shared.path)
            .field("mask", &self.shared.mask)
            .field("suspended", &self.shared.suspended.get())
            .finish_non_exhaustive()
    }
}

struct SuspendGuard<'a> {
    notifier: &'a FsNotifier,
}

impl<'a> SuspendGuard<'a> {
    fn new(notifier: &'a FsNotifier) -> Self {
        notifier.suspend();
        Self { notifier }
    }
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        self.notifier.resume();
    }
}
