//! Mock adapters for integration tests.
//!
//! Records every remote call and scheduler pause/resume so tests can
//! assert on the full history without a home server or real GPIO.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use trashcan::adapters::file_store::FileStore;
use trashcan::adapters::sim::{SimLoadCell, SimProbes, sim_bank};
use trashcan::app::events::AppEvent;
use trashcan::app::ports::{
    ByteStreamReader, EventSink, LidStatus, RemoteError, RemotePort, SchedulerControl,
    StatusReport,
};
use trashcan::app::service::LidPorts;
use trashcan::config::{ConfigHandle, SystemConfig};
use trashcan::drivers::barcode::{ENTER, REPORT_LEN, SHIFT};
use trashcan::drivers::scale::Scale;
use trashcan::error::DeviceError;
use trashcan::records::{Record, RecordKind};
use trashcan::scheduler::jobs::JobSpec;

// ── MockRemote ────────────────────────────────────────────────

#[derive(Default)]
pub struct MockRemote {
    pub statuses: RefCell<Vec<LidStatus>>,
    pub uploads: RefCell<Vec<Record>>,
    /// Every upload fails with `Transport` while set.
    pub fail_uploads: Cell<bool>,
    /// Uploads of this kind fail with `Transport`.
    pub fail_kind: Cell<Option<RecordKind>>,
    /// `None` → `fetch_jobs` fails.
    pub jobs: RefCell<Option<Vec<JobSpec>>>,
    pub upload_attempts: Cell<usize>,
}

#[allow(dead_code)]
impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let r = Self::default();
        r.fail_uploads.set(true);
        r
    }

    pub fn failing_kind(kind: RecordKind) -> Self {
        let r = Self::default();
        r.fail_kind.set(Some(kind));
        r
    }

    pub fn serve_jobs(&self, jobs: Vec<JobSpec>) {
        *self.jobs.borrow_mut() = Some(jobs);
    }
}

impl RemotePort for MockRemote {
    fn notify_status(&self, report: &StatusReport) -> Result<(), RemoteError> {
        self.statuses.borrow_mut().push(report.lid);
        Ok(())
    }

    fn upload(&self, record: &Record) -> Result<(), RemoteError> {
        self.upload_attempts.set(self.upload_attempts.get() + 1);
        if self.fail_uploads.get() || self.fail_kind.get() == Some(record.kind()) {
            return Err(RemoteError::Transport);
        }
        self.uploads.borrow_mut().push(record.clone());
        Ok(())
    }

    fn fetch_jobs(&self) -> Result<Vec<JobSpec>, RemoteError> {
        self.jobs.borrow().clone().ok_or(RemoteError::Transport)
    }
}

// ── MockScheduler ─────────────────────────────────────────────

#[derive(Default)]
pub struct MockScheduler {
    pub pauses: Cell<u32>,
    pub resumes: Cell<u32>,
    paused: Cell<bool>,
}

impl SchedulerControl for MockScheduler {
    fn pause(&self) {
        self.pauses.set(self.pauses.get() + 1);
        self.paused.set(true);
    }

    fn resume(&self) {
        self.resumes.set(self.resumes.get() + 1);
        self.paused.set(false);
    }

    fn is_paused(&self) -> bool {
        self.paused.get()
    }
}

// ── ScriptedScanner ───────────────────────────────────────────

/// Plays back queued reports; reads "time out" instantly once empty.
#[derive(Default)]
pub struct ScriptedScanner {
    reports: VecDeque<[u8; REPORT_LEN]>,
}

#[allow(dead_code)]
impl ScriptedScanner {
    /// Queue one scan of `code` followed by Enter.
    pub fn queue_scan(&mut self, code: &str) {
        for c in code.chars() {
            let (shift, usage) = usage_for(c);
            if shift {
                self.reports.push_back([0, 0, SHIFT, usage, 0, 0, 0, 0]);
            } else {
                self.reports.push_back([0, 0, usage, 0, 0, 0, 0, 0]);
            }
        }
        self.reports.push_back([0, 0, ENTER, 0, 0, 0, 0, 0]);
    }

    pub fn pending(&self) -> usize {
        self.reports.len()
    }
}

fn usage_for(c: char) -> (bool, u8) {
    match c {
        'a'..='z' => (false, 4 + (c as u8 - b'a')),
        'A'..='Z' => (true, 4 + (c as u8 - b'A')),
        '1'..='9' => (false, 30 + (c as u8 - b'1')),
        '0' => (false, 39),
        '-' => (false, 45),
        _ => (false, 44),
    }
}

impl ByteStreamReader for ScriptedScanner {
    async fn read_report(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, DeviceError> {
        match self.reports.pop_front() {
            Some(report) => {
                let n = report.len().min(buf.len());
                buf[..n].copy_from_slice(&report[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }
}

// ── CollectSink ───────────────────────────────────────────────

#[derive(Default)]
pub struct CollectSink {
    pub events: Vec<AppEvent>,
}

impl EventSink for CollectSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Lid rig ───────────────────────────────────────────────────

/// Everything a lid-service test needs, with probes kept on the side.
pub struct LidRig {
    pub ports: LidPorts<ScriptedScanner>,
    pub probes: SimProbes,
    pub cell: SimLoadCell,
    pub store: Rc<FileStore>,
    pub remote: Rc<MockRemote>,
    pub scheduler: Rc<MockScheduler>,
}

pub fn fast_config() -> SystemConfig {
    SystemConfig {
        lid_poll_interval_ms: 10,
        barcode_timeout_ms: 10,
        num_measurements: 5,
        ..SystemConfig::default()
    }
}

pub fn lid_rig(remote: MockRemote) -> LidRig {
    let config = ConfigHandle::new(fast_config());
    let (bank, probes) = sim_bank(true);
    let cell = SimLoadCell::new(1000);
    let store = Rc::new(FileStore::in_memory());
    let remote = Rc::new(remote);
    let scheduler = Rc::new(MockScheduler::default());
    let ports = LidPorts {
        devices: Rc::new(bank),
        scanner: ScriptedScanner::default(),
        scale: Rc::new(RefCell::new(Scale::new(Box::new(cell.clone()), config.clone()))),
        records: store.clone(),
        remote: remote.clone(),
        scheduler: scheduler.clone(),
        config,
    };
    LidRig {
        ports,
        probes,
        cell,
        store,
        remote,
        scheduler,
    }
}
