//! Cleaning cycle executor.
//!
//! `Idle → Running → Idle` for one actuator group:
//!
//! 1. claim a lease on the group (refused if another cycle holds any of it)
//! 2. read every target; refuse if any is already on or unreadable
//! 3. turn every target on, hold, then turn every target off
//!
//! Refusal happens before any write and before any sleep.  The turn-off
//! step always visits every target, even when an earlier write failed.

use core::fmt;
use std::time::Duration;

use async_io_mini::Timer;
use log::{info, warn};

use crate::devices::{Action, Actuator, ActuatorSet, CycleGroup, DeviceBank, DeviceState};

/// Why a cycle request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Another cycle holds part of the group.
    Busy,
    /// The actuator was already on (manual session or stuck relay).
    AlreadyOn(Actuator),
    /// The actuator's state could not be read.
    Unreadable(Actuator),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "another cycle holds the group"),
            Self::AlreadyOn(a) => write!(f, "{} already on", a),
            Self::Unreadable(a) => write!(f, "{} state unreadable", a),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was written.
    Rejected(Rejection),
    /// The hold ran.  `failed_off` lists targets whose turn-off failed.
    Completed { failed_off: ActuatorSet },
    /// A turn-on failed; the hold was skipped and every target switched off.
    Aborted {
        failed_on: Actuator,
        failed_off: ActuatorSet,
    },
}

impl CycleOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Completed { failed_off } if failed_off.is_empty())
    }
}

/// Run one cleaning cycle on `group`, holding for `hold`.
pub async fn run_cycle(devices: &DeviceBank, group: CycleGroup, hold: Duration) -> CycleOutcome {
    let targets = group.actuators();

    let Some(_lease) = devices.try_lease(targets) else {
        warn!("CYCLE | {} rejected: {}", group, Rejection::Busy);
        return CycleOutcome::Rejected(Rejection::Busy);
    };

    for actuator in targets.iter() {
        let rejection = match devices.read(actuator) {
            Ok(DeviceState::Off) => continue,
            Ok(DeviceState::On) => Rejection::AlreadyOn(actuator),
            Err(_) => Rejection::Unreadable(actuator),
        };
        warn!("CYCLE | {} rejected: {}", group, rejection);
        return CycleOutcome::Rejected(rejection);
    }

    let mut failed_on = None;
    for actuator in targets.iter() {
        if let Err(e) = devices.write(actuator, Action::On) {
            warn!("CYCLE | {} turn-on failed: {}", group, e);
            failed_on = Some(actuator);
            break;
        }
    }

    if failed_on.is_none() {
        info!("CYCLE | {} on, holding {:?}", group, hold);
        Timer::after(hold).await;
    }

    let failed_off = switch_off(devices, targets);
    if !failed_off.is_empty() {
        warn!("CYCLE | {} left partially on", group);
    }

    match failed_on {
        Some(failed_on) => CycleOutcome::Aborted {
            failed_on,
            failed_off,
        },
        None => {
            info!("CYCLE | {} complete", group);
            CycleOutcome::Completed { failed_off }
        }
    }
}

/// Best-effort: every target is attempted.
fn switch_off(devices: &DeviceBank, targets: ActuatorSet) -> ActuatorSet {
    let mut failed = Vec::new();
    for actuator in targets.iter() {
        if let Err(e) = devices.write(actuator, Action::Off) {
            warn!("CYCLE | turn-off failed: {}", e);
            failed.push(actuator);
        }
    }
    ActuatorSet::of(&failed)
}
