//! Lid service end-to-end: lid switch → FSM → session side effects.

use futures_lite::future::block_on;

use trashcan::app::events::AppEvent;
use trashcan::app::ports::{LidStatus, RecordStore};
use trashcan::app::service::LidService;
use trashcan::devices::Actuator;
use trashcan::fsm::StateId;
use trashcan::records::{Record, RecordKind};

use super::mock_hw::{CollectSink, LidRig, MockRemote, lid_rig};

fn poll(service: &mut LidService, rig: &mut LidRig, sink: &mut CollectSink) {
    block_on(service.poll(&mut rig.ports, sink));
}

fn started() -> (LidService, CollectSink) {
    let mut sink = CollectSink::default();
    let mut service = LidService::new();
    service.start(&mut sink);
    (service, sink)
}

// ── Session lifecycle ─────────────────────────────────────────

#[test]
fn open_close_cycle_writes_exactly_one_weight() {
    let mut rig = lid_rig(MockRemote::new());
    let (mut service, mut sink) = started();
    assert_eq!(service.state(), StateId::Idle);

    rig.probes.lid.set(true);
    poll(&mut service, &mut rig, &mut sink);
    assert_eq!(service.state(), StateId::Open);
    assert!(service.session_active());

    // Still open: nothing new happens.
    poll(&mut service, &mut rig, &mut sink);
    poll(&mut service, &mut rig, &mut sink);
    assert!(rig.store.list(RecordKind::Weight).unwrap().is_empty());

    rig.probes.lid.set(false);
    poll(&mut service, &mut rig, &mut sink);
    assert_eq!(service.state(), StateId::Idle);
    assert!(!service.session_active());

    let weights = rig.store.list(RecordKind::Weight).unwrap();
    assert_eq!(weights.len(), 1, "one weight per lid cycle");
    match &weights[0] {
        Record::Weight(w) => assert!((w.calibrated_value - 1000.0).abs() < 1e-9),
        other => panic!("unexpected record {:?}", other),
    }
    assert_eq!(rig.cell.resets(), 1, "amplifier reset before sampling");
}

#[test]
fn scheduler_paused_and_resumed_exactly_once() {
    let mut rig = lid_rig(MockRemote::new());
    let (mut service, mut sink) = started();

    rig.probes.lid.set(true);
    poll(&mut service, &mut rig, &mut sink);
    assert_eq!(rig.scheduler.pauses.get(), 1);
    assert_eq!(rig.scheduler.resumes.get(), 0);

    poll(&mut service, &mut rig, &mut sink);
    assert_eq!(rig.scheduler.pauses.get(), 1);

    rig.probes.lid.set(false);
    poll(&mut service, &mut rig, &mut sink);
    poll(&mut service, &mut rig, &mut sink);
    assert_eq!(rig.scheduler.pauses.get(), 1);
    assert_eq!(rig.scheduler.resumes.get(), 1);
}

#[test]
fn status_notified_on_open_and_close() {
    let mut rig = lid_rig(MockRemote::new());
    let (mut service, mut sink) = started();

    rig.probes.lid.set(true);
    poll(&mut service, &mut rig, &mut sink);
    rig.probes.lid.set(false);
    poll(&mut service, &mut rig, &mut sink);

    assert_eq!(
        *rig.remote.statuses.borrow(),
        vec![LidStatus::Open, LidStatus::Closed]
    );
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AppEvent::StateChanged {
            from: StateId::Open,
            to: StateId::Idle
        }
    )));
}

#[test]
fn scanner_trigger_follows_session() {
    let mut rig = lid_rig(MockRemote::new());
    let (mut service, mut sink) = started();
    let trigger = rig.probes.output(Actuator::ScannerTrigger).clone();

    // Active-low: high = off.
    assert!(trigger.level());
    rig.probes.lid.set(true);
    poll(&mut service, &mut rig, &mut sink);
    assert!(!trigger.level(), "scanner enabled while open");

    rig.probes.lid.set(false);
    poll(&mut service, &mut rig, &mut sink);
    assert!(trigger.level(), "scanner disabled after close");
}

#[test]
fn lid_read_failure_keeps_state() {
    let mut rig = lid_rig(MockRemote::new());
    let (mut service, mut sink) = started();

    rig.probes.lid.set(true);
    poll(&mut service, &mut rig, &mut sink);
    rig.probes.lid.fail_reads(true);
    poll(&mut service, &mut rig, &mut sink);
    assert_eq!(service.state(), StateId::Open);
    assert!(sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::Failed { context: "lid switch", .. })));
}

// ── Scans ─────────────────────────────────────────────────────

#[test]
fn scan_uploaded_when_server_reachable() {
    let mut rig = lid_rig(MockRemote::new());
    let (mut service, mut sink) = started();
    rig.ports.scanner.queue_scan("Ab12");

    rig.probes.lid.set(true);
    poll(&mut service, &mut rig, &mut sink);

    assert_eq!(service.session_scans(), 1);
    let uploads = rig.remote.uploads.borrow();
    assert_eq!(uploads.len(), 1);
    match &uploads[0] {
        Record::Barcode(b) => assert_eq!(b.code, "Ab12"),
        other => panic!("unexpected record {:?}", other),
    }
    assert!(rig.store.list(RecordKind::Barcode).unwrap().is_empty());
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AppEvent::BarcodeScanned { code, uploaded: true } if code == "Ab12"
    )));
}

#[test]
fn scan_buffered_when_upload_fails() {
    let mut rig = lid_rig(MockRemote::failing());
    let (mut service, mut sink) = started();
    rig.ports.scanner.queue_scan("0123");

    rig.probes.lid.set(true);
    poll(&mut service, &mut rig, &mut sink);

    let buffered = rig.store.list(RecordKind::Barcode).unwrap();
    assert_eq!(buffered.len(), 1);
    match &buffered[0] {
        Record::Barcode(b) => assert_eq!(b.code, "0123"),
        other => panic!("unexpected record {:?}", other),
    }
}

#[test]
fn no_scan_while_closed() {
    let mut rig = lid_rig(MockRemote::new());
    let (mut service, mut sink) = started();
    rig.ports.scanner.queue_scan("42");

    poll(&mut service, &mut rig, &mut sink);
    assert_eq!(rig.ports.scanner.pending(), 3, "scanner untouched while idle");
    assert!(rig.remote.uploads.borrow().is_empty());
}

// ── Scale failure ─────────────────────────────────────────────

#[test]
fn scale_failure_on_close_writes_nothing() {
    let mut rig = lid_rig(MockRemote::new());
    let (mut service, mut sink) = started();

    rig.probes.lid.set(true);
    poll(&mut service, &mut rig, &mut sink);
    rig.cell.fail(true);
    rig.probes.lid.set(false);
    poll(&mut service, &mut rig, &mut sink);

    assert_eq!(service.state(), StateId::Idle);
    assert!(rig.store.list(RecordKind::Weight).unwrap().is_empty());
    assert!(sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::Failed { context: "weight capture", .. })));
}
