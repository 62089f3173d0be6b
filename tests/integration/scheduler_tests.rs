//! Scheduler → cycle executor → device bank, on simulated pins.

use std::time::Duration;

use async_io_mini::Timer;
use edge_executor::LocalExecutor;
use futures_lite::future::block_on;

use trashcan::adapters::file_store::FileStore;
use trashcan::adapters::sim::sim_bank;
use trashcan::app::ports::ConfigStore;
use trashcan::config::{ConfigHandle, ConfigWatchdog, SystemConfig};
use trashcan::devices::{Action, Actuator, CycleGroup, DeviceState};
use trashcan::error::DeviceError;
use trashcan::scheduler::cycle::{CycleOutcome, Rejection, run_cycle};
use trashcan::scheduler::jobs::{CycleLength, JobAction, ScheduledJob, Trigger};
use trashcan::scheduler::{SchedTime, Scheduler, SchedulerError};

const HOLD: Duration = Duration::from_millis(20);

fn at(uptime_secs: u64, hour: u8, minute: u8) -> SchedTime {
    SchedTime {
        uptime_secs,
        day: 1,
        hour,
        minute,
    }
}

// ── Dispatch → cycle ──────────────────────────────────────────

#[test]
fn cron_fire_runs_cycle_and_leaves_outputs_off() {
    let cfg = SystemConfig::default();
    let mut scheduler = Scheduler::from_config(&cfg);
    let (bank, probes) = sim_bank(true);

    // long_cycle_uvc defaults to 02:00.
    let due = scheduler.tick(at(10, 2, 0));
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, "long_cycle_uvc");
    let JobAction::Cycle { group, length } = due[0].action else {
        panic!("expected a cycle, got {:?}", due[0].action);
    };
    assert_eq!(group, CycleGroup::Light);
    assert_eq!(length, CycleLength::Long);

    let outcome = block_on(run_cycle(&bank, group, HOLD));
    scheduler.finish(&due[0].id);

    assert!(outcome.is_clean());
    assert_eq!(bank.read(Actuator::Light).unwrap(), DeviceState::Off);
    assert!(probes.output(Actuator::Light).level());
    assert_eq!(scheduler.running_count(), 0);

    // Same minute again: already fired.
    assert!(scheduler.tick(at(40, 2, 0)).is_empty());
}

#[test]
fn fire_while_paused_is_dropped_not_deferred() {
    let mut scheduler = Scheduler::new(4);
    let uvc = JobAction::Cycle {
        group: CycleGroup::Light,
        length: CycleLength::Long,
    };
    scheduler
        .add(ScheduledJob::cron("long_cycle_uvc", 2, 0, uvc))
        .unwrap();

    scheduler.pause();
    assert!(scheduler.tick(at(10, 2, 0)).is_empty());
    scheduler.resume();
    assert!(scheduler.tick(at(20, 2, 0)).is_empty());
    assert!(scheduler.tick(at(80, 2, 1)).is_empty());

    // Next day it fires as usual.
    let next_day = SchedTime {
        day: 2,
        ..at(86_410, 2, 0)
    };
    let due = scheduler.tick(next_day);
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, "long_cycle_uvc");
}

#[test]
fn running_job_is_not_started_twice() {
    let mut scheduler = Scheduler::new(4);
    scheduler
        .add(ScheduledJob::interval("sweep", 5, JobAction::PhoneHome))
        .unwrap();
    assert!(scheduler.tick(at(0, 0, 0)).is_empty());
    assert_eq!(scheduler.tick(at(5, 0, 0)).len(), 1);
    // Still running when due again.
    assert!(scheduler.tick(at(10, 0, 0)).is_empty());
    assert_eq!(scheduler.run_now("sweep"), Err(SchedulerError::AlreadyRunning));
    scheduler.finish("sweep");
    assert_eq!(scheduler.tick(at(15, 0, 0)).len(), 1);
}

#[test]
fn run_now_respects_worker_limit() {
    let cfg = SystemConfig {
        max_workers: 1,
        ..SystemConfig::default()
    };
    let mut scheduler = Scheduler::from_config(&cfg);
    assert!(scheduler.run_now("long_cycle_fan").is_ok());
    assert_eq!(
        scheduler.run_now("short_cycle_uvc"),
        Err(SchedulerError::WorkersExhausted)
    );
    scheduler.finish("long_cycle_fan");
    assert!(scheduler.run_now("short_cycle_uvc").is_ok());
}

// ── Mutual exclusion ──────────────────────────────────────────

#[test]
fn overlapping_cycles_share_no_actuator() {
    let (bank, _probes) = sim_bank(true);
    let executor: LocalExecutor<'_, 8> = LocalExecutor::new();

    let first = executor.spawn(run_cycle(&bank, CycleGroup::Light, Duration::from_millis(60)));
    let second = executor.spawn(async {
        Timer::after(Duration::from_millis(10)).await;
        run_cycle(&bank, CycleGroup::Both, HOLD).await
    });
    let third = executor.spawn(async {
        Timer::after(Duration::from_millis(10)).await;
        run_cycle(&bank, CycleGroup::Fan, HOLD).await
    });

    let (a, b, c) = block_on(executor.run(async { (first.await, second.await, third.await) }));
    assert!(a.is_clean());
    assert_eq!(b, CycleOutcome::Rejected(Rejection::Busy));
    assert!(c.is_clean(), "fan does not overlap light");
    assert!(bank.leased().is_empty());
}

#[test]
fn manual_write_refused_during_cycle() {
    let (bank, _probes) = sim_bank(true);
    let executor: LocalExecutor<'_, 8> = LocalExecutor::new();

    let cycle = executor.spawn(run_cycle(&bank, CycleGroup::Fan, Duration::from_millis(40)));
    let manual = executor.spawn(async {
        Timer::after(Duration::from_millis(10)).await;
        (
            bank.write_manual(Actuator::Fan, Action::Off),
            bank.write_manual(Actuator::Light, Action::On),
        )
    });

    let (outcome, (fan, light)) = block_on(executor.run(async { (cycle.await, manual.await) }));
    assert!(outcome.is_clean());
    assert_eq!(fan, Err(DeviceError::Busy(Actuator::Fan)));
    assert_eq!(light, Ok(DeviceState::On));
}

#[test]
fn cycle_rejected_when_target_already_on() {
    let (bank, _probes) = sim_bank(true);
    bank.write(Actuator::Fan, Action::On).unwrap();
    let outcome = block_on(run_cycle(&bank, CycleGroup::Both, HOLD));
    assert_eq!(outcome, CycleOutcome::Rejected(Rejection::AlreadyOn(Actuator::Fan)));
    assert_eq!(bank.read(Actuator::Light).unwrap(), DeviceState::Off);
}

#[test]
fn failed_turn_on_still_switches_everything_off() {
    let (bank, probes) = sim_bank(true);
    probes.output(Actuator::Fan).fail_writes(true);
    let outcome = block_on(run_cycle(&bank, CycleGroup::Both, HOLD));
    assert!(matches!(
        outcome,
        CycleOutcome::Aborted {
            failed_on: Actuator::Fan,
            ..
        }
    ));
    assert_eq!(bank.read(Actuator::Light).unwrap(), DeviceState::Off);
}

// ── Config reload ─────────────────────────────────────────────

#[test]
fn config_change_reschedules_builtin_jobs() {
    let store = FileStore::in_memory();
    let handle = ConfigHandle::new(SystemConfig::default());
    let mut watchdog = ConfigWatchdog::new(store.change_id().unwrap());
    let mut scheduler = Scheduler::from_config(&handle.snapshot());
    scheduler
        .add(ScheduledJob::cron(
            "evening_fan",
            19,
            30,
            JobAction::Cycle {
                group: CycleGroup::Fan,
                length: CycleLength::Short,
            },
        ))
        .unwrap();

    assert_eq!(watchdog.poll(&store, &handle).unwrap(), None);

    store.set("LONG_CYCLE_UVC_HOUR", "7").unwrap();
    store.set("long_cycle_uvc_minute", "45").unwrap();
    assert_eq!(watchdog.poll(&store, &handle).unwrap(), Some(2));
    scheduler.apply_config(&handle.snapshot());

    assert_eq!(
        scheduler.get("long_cycle_uvc").unwrap().trigger,
        Trigger::Cron { hour: 7, minute: 45 }
    );
    assert!(scheduler.contains("evening_fan"), "reconciled jobs survive reload");
    assert_eq!(watchdog.poll(&store, &handle).unwrap(), None);
}

#[test]
fn invalid_option_keeps_previous_value() {
    let store = FileStore::in_memory();
    let handle = ConfigHandle::new(SystemConfig::default());
    store.set("max_workers", "0").unwrap();
    store.set("short_cycle_sleep", "120").unwrap();
    handle.reload(&store).unwrap();

    let cfg = handle.snapshot();
    assert_eq!(cfg.max_workers, SystemConfig::default().max_workers);
    assert_eq!(cfg.short_cycle_sleep, 120);
}
