//! Job scheduler engine.
//!
//! Holds the job table and decides, once per tick, which jobs fire.  It
//! does not run anything itself: [`Scheduler::tick`] returns the
//! [`Dispatch`]es the runtime should spawn, and the runtime calls
//! [`Scheduler::finish`] when a job returns.
//!
//! ```text
//!   clock ──▶ tick() ──▶ [Dispatch] ──▶ runtime spawns job ──▶ finish(id)
//!                ▲
//!   lid FSM ── pause()/resume()
//! ```
//!
//! Executor rules:
//! - one running instance per job id; a fire while it runs is dropped
//! - at most `max_workers` jobs running at once
//! - fires that land while paused are dropped, not queued
//! - pausing never interrupts a job that is already running

pub mod cycle;
pub mod jobs;

use core::cell::RefCell;
use core::fmt;

use chrono::{Datelike, Timelike};
use log::{debug, info, warn};

use crate::app::ports::SchedulerControl;
use crate::config::SystemConfig;
use jobs::{JobAction, ScheduledJob, Trigger, default_jobs};

/// Job table capacity.
pub const MAX_JOBS: usize = 16;

// ═══════════════════════════════════════════════════════════════
//  Time and dispatch
// ═══════════════════════════════════════════════════════════════

/// What the scheduler needs to know about "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedTime {
    /// Monotonic seconds since start.
    pub uptime_secs: u64,
    /// Local calendar day (any monotonic day number).
    pub day: i32,
    pub hour: u8,
    pub minute: u8,
}

impl SchedTime {
    pub fn from_datetime<T: Datelike + Timelike>(uptime_secs: u64, t: &T) -> Self {
        Self {
            uptime_secs,
            day: t.num_days_from_ce(),
            hour: t.hour() as u8,
            minute: t.minute() as u8,
        }
    }
}

/// A job the runtime should start now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub id: String,
    pub action: JobAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// The job table is full.
    TableFull,
    /// A job with this id is already installed.
    DuplicateId,
    /// No job with this id.
    UnknownJob,
    /// The job is locked and cannot be removed.
    Locked,
    /// An instance of the job is already running.
    AlreadyRunning,
    /// The scheduler is paused.
    Paused,
    /// `max_workers` jobs are already running.
    WorkersExhausted,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableFull => write!(f, "job table full"),
            Self::DuplicateId => write!(f, "job id already installed"),
            Self::UnknownJob => write!(f, "no such job"),
            Self::Locked => write!(f, "job is locked"),
            Self::AlreadyRunning => write!(f, "job already running"),
            Self::Paused => write!(f, "scheduler paused"),
            Self::WorkersExhausted => write!(f, "all workers busy"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

/// Internal bookkeeping for an installed job.
#[derive(Debug, Clone)]
struct JobEntry {
    job: ScheduledJob,
    /// Uptime at which an interval job is next due (`None` until first tick).
    next_due: Option<u64>,
    /// `(day, hour, minute)` a cron job last fired for.
    last_fired: Option<(i32, u8, u8)>,
}

impl JobEntry {
    fn new(job: ScheduledJob) -> Self {
        Self {
            job,
            next_due: None,
            last_fired: None,
        }
    }

    /// Advance the schedule; `true` if the job is due at `now`.
    fn advance(&mut self, now: SchedTime) -> bool {
        match self.job.trigger {
            Trigger::Cron { hour, minute } => {
                let stamp = (now.day, now.hour, now.minute);
                if now.hour == hour && now.minute == minute && self.last_fired != Some(stamp) {
                    self.last_fired = Some(stamp);
                    true
                } else {
                    false
                }
            }
            Trigger::Interval { seconds } => {
                let period = u64::from(seconds);
                match self.next_due {
                    None => {
                        self.next_due = Some(now.uptime_secs + period);
                        false
                    }
                    Some(due) if now.uptime_secs >= due => {
                        // No backlog: the next fire is a full period from now.
                        self.next_due = Some(now.uptime_secs + period);
                        true
                    }
                    Some(_) => false,
                }
            }
        }
    }
}

pub struct Scheduler {
    jobs: heapless::Vec<JobEntry, MAX_JOBS>,
    /// Ids of jobs currently executing.
    running: heapless::Vec<String, MAX_JOBS>,
    max_workers: u8,
    paused: bool,
}

impl Scheduler {
    pub fn new(max_workers: u8) -> Self {
        Self {
            jobs: heapless::Vec::new(),
            running: heapless::Vec::new(),
            max_workers: max_workers.max(1),
            paused: false,
        }
    }

    /// Scheduler with the built-in job table derived from `cfg`.
    pub fn from_config(cfg: &SystemConfig) -> Self {
        let mut s = Self::new(cfg.max_workers);
        for job in default_jobs(cfg) {
            if let Err(e) = s.add(job) {
                warn!("Scheduler: built-in job rejected: {}", e);
            }
        }
        s
    }

    // ── Job table ─────────────────────────────────────────────

    pub fn add(&mut self, job: ScheduledJob) -> Result<(), SchedulerError> {
        if self.contains(&job.id) {
            return Err(SchedulerError::DuplicateId);
        }
        info!("Scheduler: added '{}' ({})", job.id, job.trigger);
        self.jobs
            .push(JobEntry::new(job))
            .map_err(|_| SchedulerError::TableFull)
    }

    /// Remove an unlocked job.  A running instance is left to finish.
    pub fn remove(&mut self, id: &str) -> Result<ScheduledJob, SchedulerError> {
        let idx = self.position(id).ok_or(SchedulerError::UnknownJob)?;
        if self.jobs[idx].job.is_locked() {
            return Err(SchedulerError::Locked);
        }
        let entry = self.jobs.remove(idx);
        info!("Scheduler: removed '{}'", id);
        Ok(entry.job)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&ScheduledJob> {
        self.position(id).map(|i| &self.jobs[i].job)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &ScheduledJob> {
        self.jobs.iter().map(|e| &e.job)
    }

    pub fn ids(&self) -> Vec<String> {
        self.jobs().map(|j| j.id.clone()).collect()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.jobs.iter().position(|e| e.job.id == id)
    }

    /// Re-derive the built-in jobs from a new config.
    ///
    /// Only built-ins still installed are touched; jobs added by
    /// reconciliation are kept as they are.
    pub fn apply_config(&mut self, cfg: &SystemConfig) {
        self.max_workers = cfg.max_workers.max(1);
        for fresh in default_jobs(cfg) {
            let Some(idx) = self.position(&fresh.id) else {
                continue;
            };
            let entry = &mut self.jobs[idx];
            if entry.job.trigger != fresh.trigger {
                info!(
                    "Scheduler: '{}' rescheduled {} -> {}",
                    fresh.id, entry.job.trigger, fresh.trigger
                );
                entry.next_due = None;
                entry.last_fired = None;
            }
            entry.job.trigger = fresh.trigger;
            entry.job.action = fresh.action;
        }
    }

    // ── Execution ─────────────────────────────────────────────

    /// Advance every schedule to `now` and return the jobs to start.
    pub fn tick(&mut self, now: SchedTime) -> Vec<Dispatch> {
        let mut due = Vec::new();
        for entry in &mut self.jobs {
            if entry.advance(now) {
                due.push((entry.job.id.clone(), entry.job.action));
            }
        }

        let mut out = Vec::new();
        for (id, action) in due {
            if self.paused {
                debug!("Scheduler: '{}' due while paused, dropped", id);
                continue;
            }
            match self.claim(&id) {
                Ok(()) => {
                    info!("Scheduler: '{}' fired", id);
                    out.push(Dispatch { id, action });
                }
                Err(SchedulerError::AlreadyRunning) => {
                    info!("Scheduler: '{}' still running, fire coalesced", id);
                }
                Err(e) => warn!("Scheduler: '{}' dropped: {}", id, e),
            }
        }
        out
    }

    /// Start a job immediately, under the same rules as a timed fire.
    pub fn run_now(&mut self, id: &str) -> Result<Dispatch, SchedulerError> {
        let action = self.get(id).ok_or(SchedulerError::UnknownJob)?.action;
        if self.paused {
            return Err(SchedulerError::Paused);
        }
        self.claim(id)?;
        info!("Scheduler: '{}' started on request", id);
        Ok(Dispatch {
            id: id.to_owned(),
            action,
        })
    }

    /// Mark a dispatched job as returned.
    pub fn finish(&mut self, id: &str) {
        if let Some(i) = self.running.iter().position(|r| r == id) {
            self.running.swap_remove(i);
            debug!("Scheduler: '{}' finished", id);
        }
    }

    fn claim(&mut self, id: &str) -> Result<(), SchedulerError> {
        if self.is_running(id) {
            return Err(SchedulerError::AlreadyRunning);
        }
        if self.running.len() >= usize::from(self.max_workers) {
            return Err(SchedulerError::WorkersExhausted);
        }
        self.running
            .push(id.to_owned())
            .map_err(|_| SchedulerError::WorkersExhausted)
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.running.iter().any(|r| r == id)
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    // ── Pause ─────────────────────────────────────────────────

    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            info!("Scheduler: paused");
        }
    }

    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            info!("Scheduler: resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl SchedulerControl for RefCell<Scheduler> {
    fn pause(&self) {
        self.borrow_mut().pause();
    }

    fn resume(&self) {
        self.borrow_mut().resume();
    }

    fn is_paused(&self) -> bool {
        self.borrow().is_paused()
    }
}
