//! Phone-home: upload drain and job reconciliation against a mock server.

use std::cell::RefCell;

use futures_lite::future::block_on;

use trashcan::adapters::file_store::FileStore;
use trashcan::app::ports::RecordStore;
use trashcan::config::SystemConfig;
use trashcan::devices::CycleGroup;
use trashcan::records::{Record, RecordKind, ScannedCode, WeightRecord};
use trashcan::scheduler::Scheduler;
use trashcan::scheduler::jobs::{
    BROADCAST_LOCATION, CycleLength, JobAction, JobSpec, PHONE_HOME, TriggerKind, TriggerParams,
};
use trashcan::sync::{SyncLimits, SyncService, drain};

use super::mock_hw::MockRemote;

fn buffered(weights: usize, barcodes: usize) -> FileStore {
    let store = FileStore::in_memory();
    for i in 0..weights {
        store
            .append(Record::Weight(WeightRecord::new(i as f64, i as f64)))
            .unwrap();
    }
    for i in 0..barcodes {
        store
            .append(Record::Barcode(ScannedCode::new(&format!("{:04}", i))))
            .unwrap();
    }
    store
}

fn cron_spec(id: &str, hour: u8, action: Option<JobAction>) -> JobSpec {
    JobSpec {
        id: id.to_owned(),
        trigger_kind: TriggerKind::Cron,
        trigger_params: TriggerParams {
            hour: Some(hour),
            minute: Some(0),
            seconds: None,
        },
        locked: false,
        action,
    }
}

// ── Upload drain ──────────────────────────────────────────────

#[test]
fn drain_uploads_and_deletes_everything() {
    let store = buffered(3, 2);
    let remote = MockRemote::new();

    let report = block_on(drain(RecordKind::Weight, 3, &store, &remote));
    assert_eq!(report.uploaded, 3);
    assert!(!report.aborted);
    assert!(store.list(RecordKind::Weight).unwrap().is_empty());
    assert_eq!(store.list(RecordKind::Barcode).unwrap().len(), 2);
}

#[test]
fn drain_stops_at_failure_limit() {
    let store = buffered(5, 0);
    let remote = MockRemote::failing();

    let report = block_on(drain(RecordKind::Weight, 3, &store, &remote));
    assert_eq!(report.failed, 3);
    assert!(report.aborted);
    assert_eq!(remote.upload_attempts.get(), 3);
    assert_eq!(store.list(RecordKind::Weight).unwrap().len(), 5, "nothing lost");
}

#[test]
fn drain_uploads_oldest_first() {
    let store = buffered(0, 3);
    let remote = MockRemote::new();
    block_on(drain(RecordKind::Barcode, 3, &store, &remote));

    let codes: Vec<String> = remote
        .uploads
        .borrow()
        .iter()
        .filter_map(|r| match r {
            Record::Barcode(b) => Some(b.code.clone()),
            Record::Weight(_) => None,
        })
        .collect();
    assert_eq!(codes, ["0000", "0001", "0002"]);
}

#[test]
fn weight_limit_does_not_stop_barcode_drain() {
    let store = buffered(5, 3);
    let remote = MockRemote::failing_kind(RecordKind::Weight);
    let cfg = SystemConfig::default();
    let scheduler = RefCell::new(Scheduler::from_config(&cfg));
    let limits = SyncLimits {
        weight_failures: 2,
        barcode_failures: 2,
    };

    let report = block_on(SyncService::new().run(&store, &remote, &scheduler, limits)).unwrap();
    assert_eq!(report.weights.failed, 2);
    assert!(report.weights.aborted);
    assert_eq!(report.barcodes.uploaded, 3);
    assert!(!report.barcodes.aborted);
    assert_eq!(remote.upload_attempts.get(), 2 + 3);
    assert_eq!(store.list(RecordKind::Weight).unwrap().len(), 5);
    assert!(store.list(RecordKind::Barcode).unwrap().is_empty());
}

#[test]
fn barcode_failures_leave_weight_drain_alone() {
    let store = buffered(2, 4);
    let remote = MockRemote::failing_kind(RecordKind::Barcode);
    let cfg = SystemConfig::default();
    let scheduler = RefCell::new(Scheduler::from_config(&cfg));
    let limits = SyncLimits {
        weight_failures: 1,
        barcode_failures: 3,
    };

    let report = block_on(SyncService::new().run(&store, &remote, &scheduler, limits)).unwrap();
    assert_eq!(report.weights.uploaded, 2);
    assert_eq!(report.barcodes.failed, 3);
    assert!(report.barcodes.aborted);
    assert!(store.list(RecordKind::Weight).unwrap().is_empty());
    assert_eq!(store.list(RecordKind::Barcode).unwrap().len(), 4);
}

// ── Full pass ─────────────────────────────────────────────────

#[test]
fn phone_home_reconciles_and_is_idempotent() {
    let store = buffered(1, 1);
    let remote = MockRemote::new();
    remote.serve_jobs(vec![
        cron_spec("long_cycle_uvc", 5, None),
        cron_spec(
            "evening_fan",
            19,
            Some(JobAction::Cycle {
                group: CycleGroup::Fan,
                length: CycleLength::Short,
            }),
        ),
    ]);
    let cfg = SystemConfig::default();
    let scheduler = RefCell::new(Scheduler::from_config(&cfg));
    let sync = SyncService::new();
    let limits = SyncLimits::from_config(&cfg);

    let first = block_on(sync.run(&store, &remote, &scheduler, limits)).unwrap();
    assert_eq!(first.weights.uploaded, 1);
    assert_eq!(first.barcodes.uploaded, 1);
    let jobs = first.jobs.unwrap();
    assert_eq!(jobs.added, ["evening_fan"]);
    assert_eq!(jobs.removed.len(), 5);

    let mut ids = scheduler.borrow().ids();
    ids.sort();
    assert_eq!(
        ids,
        [BROADCAST_LOCATION, "evening_fan", "long_cycle_uvc", PHONE_HOME]
    );

    let second = block_on(sync.run(&store, &remote, &scheduler, limits)).unwrap();
    assert!(second.jobs.unwrap().is_noop(), "second pass changes nothing");
    assert!(!sync.is_running());
}

#[test]
fn locked_jobs_survive_empty_server_set() {
    let store = FileStore::in_memory();
    let remote = MockRemote::new();
    remote.serve_jobs(Vec::new());
    let cfg = SystemConfig::default();
    let scheduler = RefCell::new(Scheduler::from_config(&cfg));

    let report = block_on(SyncService::new().run(
        &store,
        &remote,
        &scheduler,
        SyncLimits::from_config(&cfg),
    ))
    .unwrap();
    assert_eq!(report.jobs.unwrap().removed.len(), 6);
    assert!(scheduler.borrow().contains(PHONE_HOME));
    assert!(scheduler.borrow().contains(BROADCAST_LOCATION));
}

#[test]
fn unfetchable_job_set_leaves_table_alone() {
    let store = buffered(0, 1);
    let remote = MockRemote::new();
    let cfg = SystemConfig::default();
    let scheduler = RefCell::new(Scheduler::from_config(&cfg));
    let before = scheduler.borrow().ids();

    let report = block_on(SyncService::new().run(
        &store,
        &remote,
        &scheduler,
        SyncLimits::from_config(&cfg),
    ))
    .unwrap();
    assert!(report.jobs.is_none());
    assert_eq!(report.barcodes.uploaded, 1);
    assert_eq!(scheduler.borrow().ids(), before);
}

#[test]
fn server_job_without_inferable_action_is_rejected() {
    let store = FileStore::in_memory();
    let remote = MockRemote::new();
    remote.serve_jobs(vec![cron_spec("mystery", 3, None)]);
    let cfg = SystemConfig::default();
    let scheduler = RefCell::new(Scheduler::from_config(&cfg));

    let report = block_on(SyncService::new().run(
        &store,
        &remote,
        &scheduler,
        SyncLimits::from_config(&cfg),
    ))
    .unwrap();
    let jobs = report.jobs.unwrap();
    assert_eq!(jobs.rejected, 1);
    assert!(!scheduler.borrow().contains("mystery"));
}

#[test]
fn malformed_server_job_keeps_matching_local_job() {
    let store = FileStore::in_memory();
    let remote = MockRemote::new();
    remote.serve_jobs(vec![
        cron_spec("long_cycle_uvc", 25, None),
        cron_spec("short_cycle_fan", 4, None),
    ]);
    let cfg = SystemConfig::default();
    let scheduler = RefCell::new(Scheduler::from_config(&cfg));
    let installed = scheduler.borrow().get("long_cycle_uvc").cloned();

    let report = block_on(SyncService::new().run(
        &store,
        &remote,
        &scheduler,
        SyncLimits::from_config(&cfg),
    ))
    .unwrap();
    let jobs = report.jobs.unwrap();
    assert_eq!(jobs.rejected, 1);
    assert!(!jobs.removed.iter().any(|id| id == "long_cycle_uvc"));
    assert_eq!(scheduler.borrow().get("long_cycle_uvc").cloned(), installed);
    assert!(scheduler.borrow().contains("short_cycle_fan"));
    assert!(!scheduler.borrow().contains("long_cycle_fan"));
}
