//! Shared mutable context threaded through every lid state handler.
//!
//! `LidContext` is the "blackboard": the service writes the latest lid
//! reading before each tick, handlers write side-effect requests, and the
//! service drains and applies those requests after the tick.

use crate::app::ports::LidStatus;

/// One lid-open scanning session.  Exists only while the lid is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSession {
    /// FSM tick at which the lid opened.
    pub opened_at_tick: u64,
    /// Non-empty scans delivered during this session.
    pub scans: u32,
}

impl ScanSession {
    pub fn new(opened_at_tick: u64) -> Self {
        Self {
            opened_at_tick,
            scans: 0,
        }
    }
}

/// Side effects requested by state handlers, applied by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionRequests {
    pub pause_scheduler: bool,
    pub resume_scheduler: bool,
    /// Lid status to report to the home server.
    pub notify: Option<LidStatus>,
    /// Switch the scanner trigger on (`true`) or off.
    pub scanner: Option<bool>,
    /// Take one scale reading and buffer a weight record.
    pub capture_weight: bool,
}

impl SessionRequests {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Drain the pending requests.
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }
}

/// The shared context passed to every state handler function.
#[derive(Debug, Default)]
pub struct LidContext {
    // -- Timing --
    pub ticks_in_state: u64,
    pub total_ticks: u64,

    // -- Sensor data --
    /// Latest lid switch reading.  Updated before each tick.
    pub lid_open: bool,

    // -- Outputs --
    pub requests: SessionRequests,

    // -- Session --
    /// At most one session, present exactly while `Open`.
    pub session: Option<ScanSession>,
}

impl LidContext {
    pub fn new() -> Self {
        Self::default()
    }
}
