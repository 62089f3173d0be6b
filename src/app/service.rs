//! Lid service, the Bin Activity Controller's hub.
//!
//! [`LidService`] owns the lid FSM and its context.  Each
//! [`poll`](LidService::poll) reads the lid switch, ticks the FSM, applies
//! whatever side effects the handlers requested, and then either runs one
//! bounded scanner wait (lid open) or sleeps one poll interval (lid closed).
//!
//! ```text
//!  DeviceBank ──▶ ┌────────────────────────┐ ──▶ EventSink
//!  Scanner    ──▶ │      LidService        │ ──▶ RemotePort / RecordStore
//!  Scale      ◀── │  FSM · session · scans │ ──▶ SchedulerControl
//!                 └────────────────────────┘
//! ```

use core::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use async_io_mini::Timer;
use log::{debug, info, warn};

use crate::config::ConfigHandle;
use crate::devices::{Action, Actuator, DeviceBank};
use crate::drivers::barcode;
use crate::drivers::scale::Scale;
use crate::error::Error;
use crate::fsm::context::{LidContext, SessionRequests};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::records::{Record, ScannedCode, WeightRecord};

use super::events::AppEvent;
use super::ports::{
    ByteStreamReader, EventSink, RecordStore, RemotePort, SchedulerControl, StatusReport,
};

/// Everything the lid service drives.
pub struct LidPorts<R> {
    pub devices: Rc<DeviceBank>,
    pub scanner: R,
    pub scale: Rc<RefCell<Scale>>,
    pub records: Rc<dyn RecordStore>,
    pub remote: Rc<dyn RemotePort>,
    pub scheduler: Rc<dyn SchedulerControl>,
    pub config: ConfigHandle,
}

// ───────────────────────────────────────────────────────────────
// LidService
// ───────────────────────────────────────────────────────────────

pub struct LidService {
    fsm: Fsm,
    ctx: LidContext,
}

impl Default for LidService {
    fn default() -> Self {
        Self::new()
    }
}

impl LidService {
    /// Construct the service.  Does **not** start the FSM; call [`start`](Self::start).
    pub fn new() -> Self {
        Self {
            fsm: Fsm::new(build_state_table(), StateId::Idle),
            ctx: LidContext::new(),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, sink: &mut impl EventSink) {
        self.fsm.start(&mut self.ctx);
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!("LidService started in {}", self.fsm.current_state());
    }

    // ── Per-poll orchestration ────────────────────────────────

    /// One pass of the lid loop.
    pub async fn poll<R: ByteStreamReader>(
        &mut self,
        ports: &mut LidPorts<R>,
        sink: &mut impl EventSink,
    ) {
        let cfg = ports.config.snapshot();
        let interval = Duration::from_millis(u64::from(cfg.lid_poll_interval_ms));

        // 1. Live lid reading; a failed read keeps the last known position.
        match ports.devices.lid_is_open() {
            Ok(open) => self.ctx.lid_open = open,
            Err(e) => {
                warn!("LID | lid switch read failed: {}", e);
                sink.emit(&AppEvent::Failed {
                    context: "lid switch",
                    error: e.into(),
                });
            }
        }

        // 2. FSM tick
        let prev = self.fsm.current_state();
        self.fsm.tick(&mut self.ctx);
        let now = self.fsm.current_state();

        // 3. Side effects requested by the handlers
        let requests = self.ctx.requests.take();
        if !requests.is_empty() {
            self.apply(requests, ports, &cfg.device_id, sink);
        }
        if now != prev {
            sink.emit(&AppEvent::StateChanged { from: prev, to: now });
        }

        // 4. Scan or wait
        if now == StateId::Open {
            let timeout = Duration::from_millis(u64::from(
                cfg.barcode_timeout_ms.min(cfg.lid_poll_interval_ms),
            ));
            match barcode::decode(&mut ports.scanner, timeout).await {
                Ok(code) if !code.is_empty() => self.deliver(code.as_str(), ports, sink),
                Ok(_) => {}
                Err(e) => {
                    warn!("LID | scanner read failed: {}", e);
                    Timer::after(interval).await;
                }
            }
        } else {
            Timer::after(interval).await;
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn session_active(&self) -> bool {
        self.ctx.session.is_some()
    }

    /// Non-empty scans delivered in the current session.
    pub fn session_scans(&self) -> u32 {
        self.ctx.session.map_or(0, |s| s.scans)
    }

    // ── Internal ──────────────────────────────────────────────

    fn apply<R>(
        &mut self,
        requests: SessionRequests,
        ports: &LidPorts<R>,
        device_id: &str,
        sink: &mut impl EventSink,
    ) {
        if requests.pause_scheduler {
            ports.scheduler.pause();
        }
        if requests.resume_scheduler {
            ports.scheduler.resume();
        }

        if let Some(on) = requests.scanner {
            let action = if on { Action::On } else { Action::Off };
            if let Err(e) = ports.devices.write(Actuator::ScannerTrigger, action) {
                warn!("LID | scanner trigger: {}", e);
                sink.emit(&AppEvent::Failed {
                    context: "scanner trigger",
                    error: e.into(),
                });
            }
        }

        if let Some(lid) = requests.notify {
            // Best-effort: bounded by the remote's status timeout.
            if let Err(e) = ports.remote.notify_status(&StatusReport::now(device_id, lid)) {
                debug!("LID | status '{}' not delivered: {}", lid, e);
            }
        }

        if requests.capture_weight {
            self.capture_weight(ports, sink);
        }
    }

    /// One scale read, one buffered weight record.
    fn capture_weight<R>(&self, ports: &LidPorts<R>, sink: &mut impl EventSink) {
        let measured = ports.scale.borrow_mut().measure();
        let result = measured.and_then(|m| {
            let record = WeightRecord::new(m.raw, m.weight);
            ports
                .records
                .append(Record::Weight(record))
                .map(|_| m)
                .map_err(Error::from)
        });
        match result {
            Ok(m) => {
                info!("LID | weight captured: {:.3} (raw {:.1})", m.weight, m.raw);
                sink.emit(&AppEvent::WeightCaptured {
                    raw: m.raw,
                    weight: m.weight,
                });
            }
            Err(e) => {
                warn!("LID | weight not captured: {}", e);
                sink.emit(&AppEvent::Failed {
                    context: "weight capture",
                    error: e,
                });
            }
        }
    }

    /// Upload a scan straight away; buffer it if that fails.
    fn deliver<R>(&mut self, code: &str, ports: &LidPorts<R>, sink: &mut impl EventSink) {
        let record = Record::Barcode(ScannedCode::new(code));
        let uploaded = match ports.remote.upload(&record) {
            Ok(()) => true,
            Err(e) => {
                debug!("LID | barcode upload failed ({}), buffering", e);
                if let Err(e) = ports.records.append(record) {
                    warn!("LID | barcode '{}' lost: {}", code, e);
                    sink.emit(&AppEvent::Failed {
                        context: "barcode buffer",
                        error: e.into(),
                    });
                }
                false
            }
        };
        if let Some(session) = self.ctx.session.as_mut() {
            session.scans += 1;
        }
        info!("LID | scanned '{}' ({})", code, if uploaded { "uploaded" } else { "buffered" });
        sink.emit(&AppEvent::BarcodeScanned {
            code: code.to_owned(),
            uploaded,
        });
    }
}
