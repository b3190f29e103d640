// src/updates/scheduler.rs

//! Async worker that drives [`SchedulerCore`].
//!
//! All state lives on a single task reachable only through an mpsc channel,
//! so no two checks ever overlap. Timers are separate tasks that, when they
//! fire, send a message back into that channel instead of touching state.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{PhpmonError, Result};

use super::checker::UpdateChecker;
use super::core::{
    CheckOutcome, PersistedState, SchedulePolicy, SchedulerCommand, SchedulerCore, SchedulerEvent,
    SchedulerPhase,
};
use super::store::{self, KeyValueStore};

const CHANNEL_CAPACITY: usize = 16;

static SHARED: OnceLock<UpdateScheduler> = OnceLock::new();

/// Source of "now" for throttling and persisted timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Whether the user has automatic checks turned on. Consulted at every
/// start and before every check.
pub type PreferenceFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Collaborators the worker needs.
pub struct SchedulerDeps {
    pub checker: Arc<dyn UpdateChecker>,
    pub store: Arc<dyn KeyValueStore>,
    pub enabled: PreferenceFn,
    pub clock: Arc<dyn Clock>,
}

impl SchedulerDeps {
    pub fn new(checker: Arc<dyn UpdateChecker>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            checker,
            store,
            enabled: Arc::new(|| true),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_preference(mut self, enabled: PreferenceFn) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Observable view of the worker's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub phase: SchedulerPhase,
    pub failure_count: u32,
    pub last_success: Option<DateTime<Utc>>,
    /// Delay of the currently armed timer, if any.
    pub next_delay: Option<Duration>,
    /// Every delay armed so far, oldest first.
    pub armed_history: Vec<Duration>,
    pub checks_run: u64,
    pub latest_version: Option<String>,
}

enum SchedulerMsg {
    Start,
    TimerFired { generation: u64 },
    Snapshot(oneshot::Sender<SchedulerSnapshot>),
    Shutdown,
}

/// Handle to the update-check worker.
///
/// Cheap to clone; all clones talk to the same worker. The worker stops
/// when every handle is dropped or [`shutdown`](Self::shutdown) is called.
#[derive(Clone)]
pub struct UpdateScheduler {
    tx: mpsc::Sender<SchedulerMsg>,
}

impl fmt::Debug for UpdateScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateScheduler")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl UpdateScheduler {
    /// Load the persisted fields and spawn the worker. Nothing is scheduled
    /// until [`start`](Self::start) is called.
    pub fn spawn(policy: SchedulePolicy, deps: SchedulerDeps) -> Self {
        let persisted = store::load_persisted(deps.store.as_ref());
        debug!(
            failure_count = persisted.failure_count,
            last_success = ?persisted.last_success,
            "loaded update scheduler state"
        );

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let worker = Worker {
            core: SchedulerCore::new(policy, persisted),
            deps,
            rx,
            self_tx: tx.downgrade(),
            timer: None,
            generation: 0,
            next_delay: None,
            armed_history: Vec::new(),
            checks_run: 0,
            latest_version: None,
        };
        tokio::spawn(worker.run());

        Self { tx }
    }

    /// Make this scheduler the process-wide instance. Succeeds once.
    pub fn install(self) -> Result<&'static UpdateScheduler> {
        let mut installed = false;
        let shared = SHARED.get_or_init(|| {
            installed = true;
            self
        });

        if installed {
            Ok(shared)
        } else {
            Err(PhpmonError::AlreadyInstalled("update scheduler"))
        }
    }

    pub fn shared() -> Option<&'static UpdateScheduler> {
        SHARED.get()
    }

    /// (Re)start automatic checks. Any pending timer is replaced.
    pub async fn start(&self) -> Result<()> {
        self.send(SchedulerMsg::Start).await
    }

    pub async fn snapshot(&self) -> Result<SchedulerSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerMsg::Snapshot(reply_tx)).await?;
        reply_rx.await.map_err(|_| PhpmonError::SchedulerStopped)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SchedulerMsg::Shutdown).await
    }

    async fn send(&self, msg: SchedulerMsg) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| PhpmonError::SchedulerStopped)
    }
}

struct Worker {
    core: SchedulerCore,
    deps: SchedulerDeps,
    rx: mpsc::Receiver<SchedulerMsg>,
    /// Weak so that the worker does not keep its own channel open.
    self_tx: mpsc::WeakSender<SchedulerMsg>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
    next_delay: Option<Duration>,
    armed_history: Vec<Duration>,
    checks_run: u64,
    latest_version: Option<String>,
}

impl Worker {
    async fn run(mut self) {
        info!("update scheduler worker started");

        while let Some(msg) = self.rx.recv().await {
            match msg {
                SchedulerMsg::Start => {
                    let event = SchedulerEvent::Started {
                        now: self.deps.clock.now(),
                        enabled: (self.deps.enabled)(),
                    };
                    self.handle(event).await;
                }
                SchedulerMsg::TimerFired { generation } => {
                    if generation != self.generation {
                        debug!(generation, current = self.generation, "ignoring stale timer");
                        continue;
                    }
                    self.timer = None;
                    self.next_delay = None;
                    self.handle(SchedulerEvent::TimerFired).await;
                }
                SchedulerMsg::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                SchedulerMsg::Shutdown => {
                    self.disarm();
                    break;
                }
            }
        }

        self.disarm();
        info!("update scheduler worker finished");
    }

    /// Feed one event to the core and execute the resulting commands,
    /// including any follow-up events a check produces.
    async fn handle(&mut self, event: SchedulerEvent) {
        let mut queue: VecDeque<SchedulerCommand> = self.core.step(event).commands.into();

        while let Some(command) = queue.pop_front() {
            match command {
                SchedulerCommand::CancelTimer => self.disarm(),
                SchedulerCommand::ArmTimer(delay) => self.arm(delay),
                SchedulerCommand::PersistFailureCount(count) => {
                    if let Err(err) = store::write_failure_count(self.deps.store.as_ref(), count) {
                        warn!(error = %err, count, "failed to persist update failure count");
                    }
                }
                SchedulerCommand::PersistLastSuccess(at) => {
                    if let Err(err) = store::write_last_success(self.deps.store.as_ref(), at) {
                        warn!(error = %err, "failed to persist last update check");
                    }
                }
                SchedulerCommand::RunCheck => {
                    self.disarm();
                    let outcome = self.run_check().await;
                    let finished = SchedulerEvent::CheckFinished {
                        outcome,
                        now: self.deps.clock.now(),
                    };
                    queue.extend(self.core.step(finished).commands);
                }
            }
        }
    }

    async fn run_check(&mut self) -> CheckOutcome {
        if !(self.deps.enabled)() {
            return CheckOutcome::Disabled;
        }

        self.checks_run += 1;
        debug!(check = self.checks_run, "running update check");

        match self.deps.checker.check().await {
            Ok(available) => {
                info!(version = %available.version, "latest available version");
                self.latest_version = Some(available.version);
                CheckOutcome::Success
            }
            Err(err) => {
                warn!(error = %err, "update check failed");
                CheckOutcome::TransientFailure(err.kind())
            }
        }
    }

    /// Replace any pending timer with one that fires after `delay`.
    fn arm(&mut self, delay: Duration) {
        self.disarm();

        let generation = self.generation;
        let tx = self.self_tx.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(SchedulerMsg::TimerFired { generation }).await;
            }
        }));
        self.next_delay = Some(delay);
        self.armed_history.push(delay);

        debug!(delay_secs = delay.as_secs(), generation, "armed update check timer");
    }

    fn disarm(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.next_delay = None;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn snapshot(&self) -> SchedulerSnapshot {
        let PersistedState {
            last_success,
            failure_count,
        } = self.core.state();

        SchedulerSnapshot {
            phase: self.core.phase(),
            failure_count,
            last_success,
            next_delay: self.next_delay,
            armed_history: self.armed_history.clone(),
            checks_run: self.checks_run,
            latest_version: self.latest_version.clone(),
        }
    }
}
