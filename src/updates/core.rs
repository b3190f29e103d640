// src/updates/core.rs

//! Pure state machine for automatic update checks.
//!
//! `SchedulerCore` owns no IO. The worker in [`super::scheduler`] feeds it
//! [`SchedulerEvent`]s and executes the [`SchedulerCommand`]s it returns
//! (persist a field, arm a timer, run a check). Keeping the semantics here
//! lets the backoff rules be tested without timers or a store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Intervals and the retry table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePolicy {
    /// Delay after a successful check.
    pub normal_interval: Duration,
    /// A check at start-up is skipped if the last success is more recent
    /// than this.
    pub minimum_interval: Duration,
    /// Delay after the n-th consecutive failure is `retry_delays[n - 1]`.
    pub retry_delays: Vec<Duration>,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            normal_interval: Duration::from_secs(24 * 60 * 60),
            minimum_interval: Duration::from_secs(60 * 60),
            retry_delays: vec![
                Duration::from_secs(5 * 60),
                Duration::from_secs(15 * 60),
                Duration::from_secs(60 * 60),
                Duration::from_secs(3 * 60 * 60),
            ],
        }
    }
}

/// The two durable fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistedState {
    pub last_success: Option<DateTime<Utc>>,
    pub failure_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Parse,
}

/// Result of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Success,
    /// Automatic checks are turned off.
    Disabled,
    TransientFailure(FailureKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerPhase {
    /// Waiting for a timer (or not started yet).
    #[default]
    Idle,
    Checking,
    /// Checks are disabled; nothing is armed until the next `start`.
    Dormant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    Started { now: DateTime<Utc>, enabled: bool },
    TimerFired,
    CheckFinished { outcome: CheckOutcome, now: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    CancelTimer,
    ArmTimer(Duration),
    RunCheck,
    PersistFailureCount(u32),
    PersistLastSuccess(DateTime<Utc>),
}

/// Commands produced by a single `step`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStep {
    pub commands: Vec<SchedulerCommand>,
}

impl SchedulerStep {
    fn push(&mut self, command: SchedulerCommand) {
        self.commands.push(command);
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerCore {
    policy: SchedulePolicy,
    state: PersistedState,
    phase: SchedulerPhase,
}

impl SchedulerCore {
    pub fn new(policy: SchedulePolicy, state: PersistedState) -> Self {
        Self {
            policy,
            state,
            phase: SchedulerPhase::Idle,
        }
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    pub fn state(&self) -> PersistedState {
        self.state
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn step(&mut self, event: SchedulerEvent) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        match event {
            SchedulerEvent::Started { now, enabled } => self.on_started(now, enabled, &mut step),
            SchedulerEvent::TimerFired => {
                self.phase = SchedulerPhase::Checking;
                step.push(SchedulerCommand::RunCheck);
            }
            SchedulerEvent::CheckFinished { outcome, now } => {
                self.on_check_finished(outcome, now, &mut step)
            }
        }

        step
    }

    fn on_started(&mut self, now: DateTime<Utc>, enabled: bool, step: &mut SchedulerStep) {
        step.push(SchedulerCommand::CancelTimer);

        if !enabled {
            debug!("automatic update checks disabled at start; deferring");
            self.phase = SchedulerPhase::Idle;
            step.push(SchedulerCommand::ArmTimer(self.policy.normal_interval));
            return;
        }

        if let Some(wait) = self.remaining_throttle(now) {
            debug!(wait_secs = wait.as_secs(), "last update check is recent; deferring");
            self.phase = SchedulerPhase::Idle;
            step.push(SchedulerCommand::ArmTimer(wait));
            return;
        }

        self.phase = SchedulerPhase::Checking;
        step.push(SchedulerCommand::RunCheck);
    }

    /// Time left until `minimum_interval` has passed since the last success.
    fn remaining_throttle(&self, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.state.last_success?;
        // A last-success in the future (clock change) counts as just now.
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        self.policy
            .minimum_interval
            .checked_sub(elapsed)
            .filter(|remaining| !remaining.is_zero())
    }

    fn on_check_finished(
        &mut self,
        outcome: CheckOutcome,
        now: DateTime<Utc>,
        step: &mut SchedulerStep,
    ) {
        match outcome {
            CheckOutcome::Success => {
                self.state.failure_count = 0;
                self.state.last_success = Some(now);
                self.phase = SchedulerPhase::Idle;

                info!("update check succeeded");
                step.push(SchedulerCommand::PersistFailureCount(0));
                step.push(SchedulerCommand::PersistLastSuccess(now));
                step.push(SchedulerCommand::ArmTimer(self.policy.normal_interval));
            }
            CheckOutcome::Disabled => {
                self.phase = SchedulerPhase::Dormant;
                info!("automatic update checks disabled; scheduler dormant");
            }
            CheckOutcome::TransientFailure(kind) => {
                let count = self.state.failure_count.saturating_add(1);
                let delay = match retry_delay(&self.policy.retry_delays, count) {
                    Some(delay) => {
                        self.state.failure_count = count;
                        delay
                    }
                    None => {
                        self.state.failure_count = 0;
                        self.policy.normal_interval
                    }
                };
                self.phase = SchedulerPhase::Idle;

                warn!(
                    ?kind,
                    failure_count = self.state.failure_count,
                    retry_secs = delay.as_secs(),
                    "update check failed; scheduling retry"
                );
                step.push(SchedulerCommand::PersistFailureCount(self.state.failure_count));
                step.push(SchedulerCommand::ArmTimer(delay));
            }
        }
    }
}

/// Delay for the `failure_count`-th consecutive failure (1-based), or `None`
/// once the table is exhausted.
pub fn retry_delay(table: &[Duration], failure_count: u32) -> Option<Duration> {
    let index = usize::try_from(failure_count).ok()?.checked_sub(1)?;
    table.get(index).copied()
}
