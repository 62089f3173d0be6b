//! Outbound application events.
//!
//! The lid service, the runtime's job tasks and the command loop emit
//! these through the [`EventSink`](super::ports::EventSink) port.
//! Adapters on the other side decide what to do with them.

use crate::devices::{Actuator, DeviceState};
use crate::error::Error;
use crate::fsm::StateId;
use crate::scheduler::cycle::CycleOutcome;
use crate::sync::SyncReport;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The lid service has started (carries initial state).
    Started(StateId),

    /// The lid FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// A non-empty scan was decoded.  `uploaded` = delivered straight to
    /// the home server; otherwise it was buffered.
    BarcodeScanned { code: String, uploaded: bool },

    /// A weight was captured on lid close and buffered.
    WeightCaptured { raw: f64, weight: f64 },

    /// A cleaning cycle job returned.
    CycleFinished { job: String, outcome: CycleOutcome },

    /// A phone-home pass finished.
    SyncCompleted(SyncReport),

    /// A manual actuator command was applied.
    ActuatorSet { actuator: Actuator, state: DeviceState },

    /// The scale was re-zeroed.
    Tared { tare: f64 },

    /// A config change was picked up.
    ConfigReloaded { change_id: u64 },

    /// Something failed; the owning loop carried on.
    Failed { context: &'static str, error: Error },
}
