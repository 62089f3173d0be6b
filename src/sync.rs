//! Remote Sync Reconciler (phone-home).
//!
//! Two independent sub-tasks per run:
//!
//! 1. **Upload drain**: for each record kind, upload buffered records
//!    oldest-first and delete each one the server accepts.  A per-run
//!    failure counter per kind stops that kind's drain once it reaches
//!    its limit; whatever is left waits for the next run.
//! 2. **Job reconciliation**: diff the local job table against the
//!    server's job set by id.  Locked ids are never touched.
//!
//! Runs never overlap: a second [`SyncService::run`] while one is in
//! flight returns `None` immediately.

use core::cell::{Cell, RefCell};
use std::collections::HashSet;

use log::{debug, info, warn};

use crate::app::ports::{RecordStore, RemotePort, StoreError};
use crate::config::SystemConfig;
use crate::records::RecordKind;
use crate::scheduler::Scheduler;
use crate::scheduler::jobs::{JobSpec, ScheduledJob, is_locked_id};

// ═══════════════════════════════════════════════════════════════
//  Reports
// ═══════════════════════════════════════════════════════════════

/// Outcome of draining one record kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Records the server accepted.
    pub uploaded: usize,
    /// Upload attempts that failed.
    pub failed: usize,
    /// The failure limit stopped the drain early.
    pub aborted: bool,
}

/// Changes one reconciliation pass applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Server jobs that could not be installed.
    pub rejected: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub weights: DrainReport,
    pub barcodes: DrainReport,
    /// `None` when the server job set could not be fetched.
    pub jobs: Option<ReconcileReport>,
}

/// Per-kind failure limits for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncLimits {
    pub weight_failures: u8,
    pub barcode_failures: u8,
}

impl SyncLimits {
    pub fn from_config(cfg: &SystemConfig) -> Self {
        Self {
            weight_failures: cfg.weight_upload_failure_limit,
            barcode_failures: cfg.barcode_upload_failure_limit,
        }
    }

    fn for_kind(self, kind: RecordKind) -> usize {
        usize::from(match kind {
            RecordKind::Weight => self.weight_failures,
            RecordKind::Barcode => self.barcode_failures,
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Upload drain
// ═══════════════════════════════════════════════════════════════

/// Upload and delete buffered records of one kind.
pub async fn drain(
    kind: RecordKind,
    limit: usize,
    store: &dyn RecordStore,
    remote: &dyn RemotePort,
) -> DrainReport {
    let mut report = DrainReport::default();
    let records = match store.list(kind) {
        Ok(records) => records,
        Err(e) => {
            warn!("SYNC | cannot list {} records: {}", kind, e);
            return report;
        }
    };

    for record in records {
        match remote.upload(&record) {
            Ok(()) => {
                report.uploaded += 1;
                match store.delete(kind, record.id()) {
                    Ok(()) | Err(StoreError::NotFound) => {}
                    // Stays buffered and will be sent again.
                    Err(e) => warn!("SYNC | {} {} uploaded but not deleted: {}", kind, record.id(), e),
                }
            }
            Err(e) => {
                report.failed += 1;
                debug!("SYNC | {} {} upload failed: {}", kind, record.id(), e);
                if report.failed >= limit {
                    warn!(
                        "SYNC | {} drain stopped after {} failures ({})",
                        kind, report.failed, e
                    );
                    report.aborted = true;
                    break;
                }
            }
        }
        futures_lite::future::yield_now().await;
    }
    report
}

// ═══════════════════════════════════════════════════════════════
//  Job reconciliation
// ═══════════════════════════════════════════════════════════════

/// The server's job set as fetched.
///
/// Every id the server listed counts as present, including entries that
/// could not be turned into a local job.
#[derive(Debug, Clone, Default)]
pub struct ServerJobs {
    listed: HashSet<String>,
    installable: Vec<ScheduledJob>,
    rejected: usize,
}

impl ServerJobs {
    pub fn from_specs(specs: Vec<JobSpec>) -> Self {
        let mut set = Self::default();
        for spec in specs {
            set.listed.insert(spec.id.clone());
            let id = spec.id.clone();
            match ScheduledJob::try_from(spec) {
                Ok(job) => set.installable.push(job),
                Err(e) => {
                    warn!("SYNC | server job '{}' rejected: {}", id, e);
                    set.rejected += 1;
                }
            }
        }
        set
    }

    pub fn lists(&self, id: &str) -> bool {
        self.listed.contains(id)
    }
}

impl From<Vec<ScheduledJob>> for ServerJobs {
    fn from(jobs: Vec<ScheduledJob>) -> Self {
        Self {
            listed: jobs.iter().map(|j| j.id.clone()).collect(),
            installable: jobs,
            rejected: 0,
        }
    }
}

/// Diff-and-apply the server job set onto the local table.
///
/// Running it twice against an unchanged server set is a no-op.
pub fn reconcile(scheduler: &mut Scheduler, server: &ServerJobs) -> ReconcileReport {
    let mut report = ReconcileReport {
        rejected: server.rejected,
        ..ReconcileReport::default()
    };

    let locked: HashSet<String> = scheduler
        .jobs()
        .filter(|j| j.is_locked())
        .map(|j| j.id.clone())
        .collect();
    let is_locked = |id: &str| is_locked_id(id) || locked.contains(id);

    let local_ids: HashSet<String> = scheduler.ids().into_iter().collect();

    for id in &local_ids {
        if !is_locked(id) && !server.lists(id) {
            match scheduler.remove(id) {
                Ok(_) => report.removed.push(id.clone()),
                Err(e) => warn!("SYNC | could not remove job '{}': {}", id, e),
            }
        }
    }

    for job in &server.installable {
        if is_locked(&job.id) || local_ids.contains(&job.id) {
            continue;
        }
        match scheduler.add(job.clone()) {
            Ok(()) => report.added.push(job.id.clone()),
            Err(e) => {
                warn!("SYNC | could not add job '{}': {}", job.id, e);
                report.rejected += 1;
            }
        }
    }

    report.removed.sort();
    if !report.is_noop() {
        info!(
            "SYNC | jobs reconciled: +{:?} -{:?}",
            report.added, report.removed
        );
    }
    report
}

// ═══════════════════════════════════════════════════════════════
//  SyncService
// ═══════════════════════════════════════════════════════════════

/// Runs phone-home passes, one at a time.
#[derive(Debug, Default)]
pub struct SyncService {
    in_flight: Cell<bool>,
}

/// Clears the in-flight flag however the run ends.
struct RunGuard<'a>(&'a Cell<bool>);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl SyncService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.get()
    }

    /// One phone-home pass.  `None` if a pass is already running.
    pub async fn run(
        &self,
        store: &dyn RecordStore,
        remote: &dyn RemotePort,
        scheduler: &RefCell<Scheduler>,
        limits: SyncLimits,
    ) -> Option<SyncReport> {
        if self.in_flight.replace(true) {
            warn!("SYNC | previous phone-home still running, skipping");
            return None;
        }
        let _guard = RunGuard(&self.in_flight);

        let weights = drain(RecordKind::Weight, limits.for_kind(RecordKind::Weight), store, remote).await;
        let barcodes =
            drain(RecordKind::Barcode, limits.for_kind(RecordKind::Barcode), store, remote).await;

        let jobs = match remote.fetch_jobs() {
            Ok(specs) => {
                let server = ServerJobs::from_specs(specs);
                Some(reconcile(&mut scheduler.borrow_mut(), &server))
            }
            Err(e) => {
                info!("SYNC | job set not fetched: {}", e);
                None
            }
        };

        info!(
            "SYNC | phone-home done: weights {}/{} up, barcodes {}/{} up",
            weights.uploaded,
            weights.uploaded + weights.failed,
            barcodes.uploaded,
            barcodes.uploaded + barcodes.failed
        );
        Some(SyncReport {
            weights,
            barcodes,
            jobs,
        })
    }
}
