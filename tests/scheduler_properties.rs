// tests/scheduler_properties.rs

use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use phpmon_runtime::updates::{
    CheckOutcome, FailureKind, PersistedState, SchedulePolicy, SchedulerCommand, SchedulerCore,
    SchedulerEvent, SchedulerPhase, retry_delay,
};
use proptest::prelude::*;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).single().expect("valid date")
}

fn policy_strategy() -> impl Strategy<Value = SchedulePolicy> {
    (
        1u64..=100_000,
        proptest::collection::vec(1u64..=50_000, 0..8),
    )
        .prop_flat_map(|(normal, retries)| {
            (0..=normal).prop_map(move |minimum| SchedulePolicy {
                normal_interval: Duration::from_secs(normal),
                minimum_interval: Duration::from_secs(minimum),
                retry_delays: retries.iter().copied().map(Duration::from_secs).collect(),
            })
        })
}

fn outcome_strategy() -> impl Strategy<Value = CheckOutcome> {
    prop_oneof![
        3 => Just(CheckOutcome::TransientFailure(FailureKind::Network)),
        2 => Just(CheckOutcome::TransientFailure(FailureKind::Parse)),
        2 => Just(CheckOutcome::Success),
    ]
}

fn armed(commands: &[SchedulerCommand]) -> Vec<Duration> {
    commands
        .iter()
        .filter_map(|c| match c {
            SchedulerCommand::ArmTimer(d) => Some(*d),
            _ => None,
        })
        .collect()
}

proptest! {
    /// Whatever the outcome history, every finished check arms exactly one
    /// timer, and its delay is the table entry for the new failure count
    /// or the normal interval.
    #[test]
    fn every_check_arms_table_or_normal_delay(
        policy in policy_strategy(),
        outcomes in proptest::collection::vec(outcome_strategy(), 1..40),
    ) {
        let mut core = SchedulerCore::new(policy.clone(), PersistedState::default());

        for outcome in outcomes {
            let before = core.state().failure_count;
            let step = core.step(SchedulerEvent::CheckFinished { outcome, now: now() });
            let delays = armed(&step.commands);
            prop_assert_eq!(delays.len(), 1);

            let after = core.state().failure_count;
            match outcome {
                CheckOutcome::Success => {
                    prop_assert_eq!(after, 0);
                    prop_assert_eq!(delays[0], policy.normal_interval);
                }
                CheckOutcome::TransientFailure(_) => {
                    if after == 0 {
                        prop_assert_eq!(before as usize, policy.retry_delays.len());
                        prop_assert_eq!(delays[0], policy.normal_interval);
                    } else {
                        prop_assert_eq!(after, before + 1);
                        prop_assert_eq!(delays[0], policy.retry_delays[after as usize - 1]);
                    }
                }
                CheckOutcome::Disabled => unreachable!(),
            }

            prop_assert!(after as usize <= policy.retry_delays.len());
            prop_assert!(step.commands.contains(&SchedulerCommand::PersistFailureCount(after)));
        }
    }

    /// Start never both checks and arms, and a deferred start waits no longer
    /// than the minimum interval.
    #[test]
    fn start_defers_or_checks(
        policy in policy_strategy(),
        ago_secs in proptest::option::of(0i64..200_000),
        enabled in any::<bool>(),
    ) {
        let state = PersistedState {
            last_success: ago_secs.map(|s| now() - TimeDelta::seconds(s)),
            failure_count: 0,
        };
        let mut core = SchedulerCore::new(policy.clone(), state);
        let step = core.step(SchedulerEvent::Started { now: now(), enabled });

        prop_assert_eq!(step.commands.first(), Some(&SchedulerCommand::CancelTimer));

        let runs = step.commands.contains(&SchedulerCommand::RunCheck);
        let delays = armed(&step.commands);
        prop_assert!(runs != (delays.len() == 1));

        if !enabled {
            prop_assert_eq!(delays, vec![policy.normal_interval]);
        } else if let Some(&wait) = delays.first() {
            prop_assert!(wait <= policy.minimum_interval);
            prop_assert!(!wait.is_zero());
            prop_assert_eq!(core.phase(), SchedulerPhase::Idle);
        } else {
            prop_assert_eq!(core.phase(), SchedulerPhase::Checking);
        }
    }

    #[test]
    fn retry_delay_is_one_based(
        table in proptest::collection::vec(1u64..1000, 0..10),
        count in 0u32..20,
    ) {
        let table: Vec<Duration> = table.into_iter().map(Duration::from_secs).collect();
        let expected = match count {
            0 => None,
            n => table.get(n as usize - 1).copied(),
        };
        prop_assert_eq!(retry_delay(&table, count), expected);
    }
}

#[test]
fn disabled_outcome_goes_dormant_without_timer() {
    let mut core = SchedulerCore::new(SchedulePolicy::default(), PersistedState::default());
    core.step(SchedulerEvent::TimerFired);
    assert_eq!(core.phase(), SchedulerPhase::Checking);

    let step = core.step(SchedulerEvent::CheckFinished {
        outcome: CheckOutcome::Disabled,
        now: now(),
    });
    assert!(step.commands.is_empty());
    assert_eq!(core.phase(), SchedulerPhase::Dormant);
}

#[test]
fn success_persists_both_fields() {
    let mut core = SchedulerCore::new(
        SchedulePolicy::default(),
        PersistedState {
            last_success: None,
            failure_count: 3,
        },
    );

    let step = core.step(SchedulerEvent::CheckFinished {
        outcome: CheckOutcome::Success,
        now: now(),
    });
    assert_eq!(
        step.commands,
        vec![
            SchedulerCommand::PersistFailureCount(0),
            SchedulerCommand::PersistLastSuccess(now()),
            SchedulerCommand::ArmTimer(Duration::from_secs(24 * 60 * 60)),
        ]
    );
    assert_eq!(core.state().last_success, Some(now()));
}

/// A last success stamped in the future (clock moved back) still defers.
#[test]
fn future_last_success_counts_as_just_now() {
    let policy = SchedulePolicy::default();
    let mut core = SchedulerCore::new(
        policy.clone(),
        PersistedState {
            last_success: Some(now() + TimeDelta::hours(3)),
            failure_count: 0,
        },
    );

    let step = core.step(SchedulerEvent::Started {
        now: now(),
        enabled: true,
    });
    assert_eq!(
        step.commands,
        vec![
            SchedulerCommand::CancelTimer,
            SchedulerCommand::ArmTimer(policy.minimum_interval),
        ]
    );
}
