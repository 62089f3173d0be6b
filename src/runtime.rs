//! Cooperative task set: everything the controller does, on one thread.
//!
//! One `edge-executor` [`LocalExecutor`] driven by `block_on`; timers come
//! from the `async-io-mini` reactor, so idle tasks sleep instead of spin.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │  block_on(executor.run(shutdown.wait()))                     │
//!  │                                                              │
//!  │  ┌───────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐  │
//!  │  │ Lid loop  │ │ Scheduler  │ │  Config    │ │  Commands  │  │
//!  │  │ poll ⏱    │ │ tick 1s ⏱  │ │ watchdog ⏱ │ │ wake-on-rx │  │
//!  │  └───────────┘ └─────┬──────┘ └────────────┘ └─────┬──────┘  │
//!  │                      │ spawn per dispatch          │         │
//!  │                 ┌────▼─────────────────────────────▼───┐     │
//!  │                 │ job tasks: cycle · phone-home · bcast │     │
//!  │                 └───────────────────────────────────────┘     │
//!  └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Shared state lives in `Rc`/`RefCell`; no borrow is held across an
//! `.await`.

use core::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use async_io_mini::Timer;
use edge_executor::LocalExecutor;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::{debug, info, warn};

use crate::adapters::broadcast::UdpBroadcaster;
use crate::adapters::log_sink::LogEventSink;
use crate::adapters::time::SystemClock;
use crate::app::commands::{COMMAND_CHANNEL, DeviceCommand};
use crate::app::events::AppEvent;
use crate::app::ports::{ByteStreamReader, ConfigStore, EventSink, RecordStore, RemotePort};
use crate::app::service::{LidPorts, LidService};
use crate::config::{ConfigHandle, ConfigWatchdog};
use crate::devices::DeviceBank;
use crate::drivers::scale::Scale;
use crate::error::DeviceError;
use crate::scheduler::cycle::run_cycle;
use crate::scheduler::jobs::JobAction;
use crate::scheduler::{Dispatch, Scheduler};
use crate::sync::{SyncLimits, SyncService};

/// Wake-queue depth: the four resident tasks plus up to `max_workers` jobs.
const TASK_QUEUE: usize = 64;

const SCHEDULER_TICK: Duration = Duration::from_secs(1);

type Executor = LocalExecutor<'static, TASK_QUEUE>;

// ── Shutdown ──────────────────────────────────────────────────

/// Cloneable stop request.  May be triggered from any thread.
#[derive(Clone)]
pub struct ShutdownToken(Arc<Signal<CriticalSectionRawMutex, ()>>);

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self(Arc::new(Signal::new()))
    }

    pub fn trigger(&self) {
        self.0.signal(());
    }

    pub fn is_triggered(&self) -> bool {
        self.0.signaled()
    }

    async fn wait(&self) {
        self.0.wait().await;
    }
}

// ── Wiring ────────────────────────────────────────────────────

/// Adapters the runtime is built from.
pub struct Wiring<R> {
    pub devices: Rc<DeviceBank>,
    pub scanner: R,
    pub scale: Rc<RefCell<Scale>>,
    pub records: Rc<dyn RecordStore>,
    pub config_store: Rc<dyn ConfigStore>,
    pub remote: Rc<dyn RemotePort>,
    pub config: ConfigHandle,
}

struct Shared {
    devices: Rc<DeviceBank>,
    scale: Rc<RefCell<Scale>>,
    records: Rc<dyn RecordStore>,
    config_store: Rc<dyn ConfigStore>,
    remote: Rc<dyn RemotePort>,
    scheduler: Rc<RefCell<Scheduler>>,
    config: ConfigHandle,
    sync: SyncService,
    clock: SystemClock,
}

pub struct Runtime<R> {
    shared: Rc<Shared>,
    scanner: R,
    watchdog: ConfigWatchdog,
}

impl<R: ByteStreamReader + 'static> Runtime<R> {
    /// Build the scheduler from the current config and switch every output off.
    pub fn new(wiring: Wiring<R>) -> Self {
        let cfg = wiring.config.snapshot();
        let scheduler = Rc::new(RefCell::new(Scheduler::from_config(&cfg)));
        let change_id = wiring.config_store.change_id().unwrap_or_else(|e| {
            warn!("Runtime: config change id unreadable ({}), starting from 0", e);
            0
        });
        wiring.devices.all_off();

        Self {
            shared: Rc::new(Shared {
                devices: wiring.devices,
                scale: wiring.scale,
                records: wiring.records,
                config_store: wiring.config_store,
                remote: wiring.remote,
                scheduler,
                config: wiring.config,
                sync: SyncService::new(),
                clock: SystemClock::new(),
            }),
            scanner: wiring.scanner,
            watchdog: ConfigWatchdog::new(change_id),
        }
    }

    pub fn scheduler(&self) -> Rc<RefCell<Scheduler>> {
        Rc::clone(&self.shared.scheduler)
    }

    /// Run every task until `shutdown` fires, then switch all outputs off.
    pub fn run(self, shutdown: ShutdownToken) {
        let executor: Rc<Executor> = Rc::new(LocalExecutor::new());
        let weak = Rc::downgrade(&executor);
        let shared = self.shared;

        executor
            .spawn(lid_task(Rc::clone(&shared), self.scanner))
            .detach();
        executor
            .spawn(scheduler_task(Rc::clone(&shared), weak.clone()))
            .detach();
        executor
            .spawn(watchdog_task(Rc::clone(&shared), self.watchdog))
            .detach();
        executor
            .spawn(command_task(Rc::clone(&shared), weak))
            .detach();

        info!(
            "Runtime: {} jobs installed, running",
            shared.scheduler.borrow().ids().len()
        );
        futures_lite::future::block_on(executor.run(shutdown.wait()));

        drop(executor);
        shared.devices.all_off();
        info!("Runtime: stopped, outputs off");
    }
}

// ── Resident tasks ────────────────────────────────────────────

async fn lid_task<R: ByteStreamReader>(shared: Rc<Shared>, scanner: R) {
    let mut sink = LogEventSink::new();
    let mut ports = LidPorts {
        devices: Rc::clone(&shared.devices),
        scanner,
        scale: Rc::clone(&shared.scale),
        records: Rc::clone(&shared.records),
        remote: Rc::clone(&shared.remote),
        scheduler: shared.scheduler.clone(),
        config: shared.config.clone(),
    };
    let mut service = LidService::new();
    service.start(&mut sink);
    loop {
        service.poll(&mut ports, &mut sink).await;
    }
}

async fn scheduler_task(shared: Rc<Shared>, executor: Weak<Executor>) {
    loop {
        Timer::after(SCHEDULER_TICK).await;
        let due = shared.scheduler.borrow_mut().tick(shared.clock.now());
        for dispatch in due {
            spawn_job(&executor, &shared, dispatch);
        }
    }
}

async fn watchdog_task(shared: Rc<Shared>, mut watchdog: ConfigWatchdog) {
    let mut sink = LogEventSink::new();
    loop {
        let period = u64::from(shared.config.snapshot().watchdog_timer);
        Timer::after(Duration::from_secs(period)).await;
        match watchdog.poll(&*shared.config_store, &shared.config) {
            Ok(Some(change_id)) => {
                shared
                    .scheduler
                    .borrow_mut()
                    .apply_config(&shared.config.snapshot());
                sink.emit(&AppEvent::ConfigReloaded { change_id });
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Config: watchdog poll failed: {}", e);
                sink.emit(&AppEvent::Failed {
                    context: "config watchdog",
                    error: e.into(),
                });
            }
        }
    }
}

async fn command_task(shared: Rc<Shared>, executor: Weak<Executor>) {
    let mut sink = LogEventSink::new();
    loop {
        let cmd = COMMAND_CHANNEL.receive().await;
        handle_command(&shared, &executor, cmd, &mut sink).await;
    }
}

// ── Jobs ──────────────────────────────────────────────────────

fn spawn_job(executor: &Weak<Executor>, shared: &Rc<Shared>, dispatch: Dispatch) {
    match executor.upgrade() {
        Some(ex) => ex.spawn(run_job(Rc::clone(shared), dispatch)).detach(),
        None => shared.scheduler.borrow_mut().finish(&dispatch.id),
    }
}

async fn run_job(shared: Rc<Shared>, dispatch: Dispatch) {
    let mut sink = LogEventSink::new();
    let cfg = shared.config.snapshot();
    debug!("Scheduler: '{}' running {:?}", dispatch.id, dispatch.action);

    match dispatch.action {
        JobAction::Cycle { group, length } => {
            let outcome = run_cycle(&shared.devices, group, length.hold(&cfg)).await;
            sink.emit(&AppEvent::CycleFinished {
                job: dispatch.id.clone(),
                outcome,
            });
        }
        JobAction::PhoneHome => {
            let report = shared
                .sync
                .run(
                    &*shared.records,
                    &*shared.remote,
                    &shared.scheduler,
                    SyncLimits::from_config(&cfg),
                )
                .await;
            if let Some(report) = report {
                sink.emit(&AppEvent::SyncCompleted(report));
            }
        }
        JobAction::BroadcastLocation => {
            if let Err(e) = UdpBroadcaster::announce(cfg.pi_broadcast_port) {
                sink.emit(&AppEvent::Failed {
                    context: "discovery broadcast",
                    error: DeviceError::from(e).into(),
                });
            }
        }
    }

    shared.scheduler.borrow_mut().finish(&dispatch.id);
}

// ── Commands ──────────────────────────────────────────────────

async fn handle_command(
    shared: &Rc<Shared>,
    executor: &Weak<Executor>,
    cmd: DeviceCommand,
    sink: &mut impl EventSink,
) {
    debug!("CMD: {:?}", cmd);
    match cmd {
        DeviceCommand::Actuate { actuator, action } => {
            match shared.devices.write_manual(actuator, action) {
                Ok(state) => sink.emit(&AppEvent::ActuatorSet { actuator, state }),
                Err(e) => {
                    warn!("CMD: {} {:?} refused: {}", actuator, action, e);
                    sink.emit(&AppEvent::Failed {
                        context: "actuate",
                        error: e.into(),
                    });
                }
            }
        }
        DeviceCommand::Lid(action) => {
            let width = Duration::from_millis(u64::from(shared.config.snapshot().lid_pulse_ms));
            if let Err(e) = shared.devices.pulse_lid(action, width).await {
                warn!("CMD: lid {:?} failed: {}", action, e);
                sink.emit(&AppEvent::Failed {
                    context: "lid pulse",
                    error: e.into(),
                });
            }
        }
        DeviceCommand::Tare => {
            let tared = shared.scale.borrow_mut().tare(&*shared.config_store);
            match tared {
                Ok(tare) => sink.emit(&AppEvent::Tared { tare }),
                Err(error) => sink.emit(&AppEvent::Failed {
                    context: "tare",
                    error,
                }),
            }
        }
        DeviceCommand::ReadScale => {
            let measured = shared.scale.borrow_mut().measure();
            match measured {
                Ok(m) => info!("SCALE | reading {:.3} (raw {:.1}, {} samples)", m.weight, m.raw, m.retained),
                Err(error) => sink.emit(&AppEvent::Failed {
                    context: "scale read",
                    error,
                }),
            }
        }
        DeviceCommand::RunJob(id) => {
            let started = shared.scheduler.borrow_mut().run_now(&id);
            match started {
                Ok(dispatch) => spawn_job(executor, shared, dispatch),
                Err(e) => {
                    warn!("CMD: job '{}' not started: {}", id, e);
                    sink.emit(&AppEvent::Failed {
                        context: "run job",
                        error: e.into(),
                    });
                }
            }
        }
    }
}
