//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing each application event as one
//! log line.  A future MQTT or dashboard adapter would implement the same
//! trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::scheduler::cycle::CycleOutcome;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_state={}", state);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {} -> {}", from, to);
            }
            AppEvent::BarcodeScanned { code, uploaded } => {
                info!(
                    "SCAN  | code={} | {}",
                    code,
                    if *uploaded { "uploaded" } else { "buffered" }
                );
            }
            AppEvent::WeightCaptured { raw, weight } => {
                info!("SCALE | weight={:.3} raw={:.1}", weight, raw);
            }
            AppEvent::CycleFinished { job, outcome } => match outcome {
                CycleOutcome::Completed { failed_off } if failed_off.is_empty() => {
                    info!("CYCLE | {} completed", job);
                }
                CycleOutcome::Rejected(reason) => {
                    info!("CYCLE | {} rejected: {}", job, reason);
                }
                other => warn!("CYCLE | {} finished with faults: {:?}", job, other),
            },
            AppEvent::SyncCompleted(report) => {
                info!(
                    "SYNC  | weights up={} failed={} | barcodes up={} failed={} | jobs={}",
                    report.weights.uploaded,
                    report.weights.failed,
                    report.barcodes.uploaded,
                    report.barcodes.failed,
                    match &report.jobs {
                        Some(r) => format!("+{} -{}", r.added.len(), r.removed.len()),
                        None => "unreachable".to_string(),
                    }
                );
            }
            AppEvent::ActuatorSet { actuator, state } => {
                info!("DEV   | {}={}", actuator, state);
            }
            AppEvent::Tared { tare } => {
                info!("SCALE | tare={:.3}", tare);
            }
            AppEvent::ConfigReloaded { change_id } => {
                info!("CONF  | reloaded at change {}", change_id);
            }
            AppEvent::Failed { context, error } => {
                warn!("FAIL  | {}: {}", context, error);
            }
        }
    }
}
