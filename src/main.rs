//! TrashCAN controller main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SysfsPin / SimPin   HidrawScanner   Hx711 / Sim   FileStore   │
//! │  (DeviceBank)        (scanner)       (Scale)       (records +  │
//! │  HttpRemote          UdpBroadcaster  LogEventSink   config)    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  LidService (FSM · scan sessions)  Scheduler · Sync    │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Runtime: one LocalExecutor, four resident tasks + job tasks   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use trashcan::adapters::file_store::FileStore;
use trashcan::adapters::hidraw::HidrawScanner;
use trashcan::adapters::sim::{NoScanner, OfflineRemote, SimLoadCell, sim_bank};
use trashcan::adapters::sysfs_gpio::{Direction, HostDelay, SysfsPin};
use trashcan::app::ports::{AnalogSampler, ByteStreamReader, DigitalOutput, RemotePort};
use trashcan::config::{ConfigHandle, GpioBackend, SystemConfig};
use trashcan::devices::{Actuator, DeviceBank};
use trashcan::drivers::gpio::{HalInput, HalOutput};
use trashcan::drivers::hx711::{AmpGain, Hx711};
use trashcan::drivers::scale::Scale;
use trashcan::error::DeviceError;
use trashcan::runtime::{Runtime, ShutdownToken, Wiring};

const DEFAULT_DATA_PATH: &str = "/srv/trashcan/trashcan.json";

/// Reading of the simulated load cell on the `sim` backend.
const SIM_LOAD_CELL_STEADY: i32 = 0;

// ── Scanner selection ─────────────────────────────────────────

enum Scanner {
    Hidraw(HidrawScanner),
    Absent(NoScanner),
}

impl ByteStreamReader for Scanner {
    async fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, DeviceError> {
        match self {
            Self::Hidraw(s) => s.read_report(buf, timeout).await,
            Self::Absent(s) => s.read_report(buf, timeout).await,
        }
    }
}

fn open_scanner(cfg: &SystemConfig) -> Scanner {
    match HidrawScanner::open(&cfg.barcode_scanner_path) {
        Ok(s) => Scanner::Hidraw(s),
        Err(e) => {
            warn!(
                "Scanner: {} unavailable ({}), scans disabled",
                cfg.barcode_scanner_path, e
            );
            Scanner::Absent(NoScanner)
        }
    }
}

// ── Device bank ───────────────────────────────────────────────

fn sysfs_bank(cfg: &SystemConfig) -> Result<DeviceBank> {
    let off = Direction::Out {
        high: cfg.outputs_active_low,
    };
    let open_output = |actuator: Actuator| -> Result<Box<dyn DigitalOutput>> {
        let bcm = match actuator {
            Actuator::Light => cfg.light_pin,
            Actuator::Fan => cfg.fan_pin,
            Actuator::Led => cfg.led_pin,
            Actuator::LidOpen => cfg.lid_open_pin,
            Actuator::LidClose => cfg.lid_close_pin,
            Actuator::ScannerTrigger => cfg.scanner_trigger_pin,
        };
        let pin = SysfsPin::open(bcm, off)
            .map_err(|e| e.0)
            .with_context(|| format!("gpio{} ({})", bcm, actuator))?;
        Ok(Box::new(HalOutput::new(pin)))
    };

    let outputs: Vec<Box<dyn DigitalOutput>> = Actuator::ALL
        .into_iter()
        .map(open_output)
        .collect::<Result<_>>()?;
    let outputs: [Box<dyn DigitalOutput>; Actuator::COUNT] = outputs
        .try_into()
        .map_err(|_| anyhow::anyhow!("actuator pin count mismatch"))?;
    let lid = SysfsPin::open(cfg.lid_switch_pin, Direction::In)
        .map_err(|e| e.0)
        .with_context(|| format!("gpio{} (lid switch)", cfg.lid_switch_pin))?;

    Ok(DeviceBank::new(
        outputs,
        Box::new(HalInput::new(lid)),
        cfg.outputs_active_low,
    ))
}

fn device_bank(cfg: &SystemConfig) -> Result<DeviceBank> {
    match cfg.gpio_backend {
        GpioBackend::Sysfs => sysfs_bank(cfg),
        GpioBackend::Sim => {
            warn!("GPIO: simulated backend, no hardware will move");
            Ok(sim_bank(cfg.outputs_active_low).0)
        }
    }
}

// ── Load cell ─────────────────────────────────────────────────

fn load_cell(cfg: &SystemConfig) -> Result<Box<dyn AnalogSampler>> {
    match cfg.gpio_backend {
        GpioBackend::Sysfs => {
            let gain = AmpGain::from_factor(cfg.scale_amp_gain)
                .with_context(|| format!("scale_amp_gain {}", cfg.scale_amp_gain))?;
            let dout = SysfsPin::open(cfg.scale_data_pin, Direction::In)
                .map_err(|e| e.0)
                .with_context(|| format!("gpio{} (scale data)", cfg.scale_data_pin))?;
            let pd_sck = SysfsPin::open(cfg.scale_clock_pin, Direction::Out { high: false })
                .map_err(|e| e.0)
                .with_context(|| format!("gpio{} (scale clock)", cfg.scale_clock_pin))?;
            Ok(Box::new(Hx711::new(dout, pd_sck, HostDelay, gain)))
        }
        GpioBackend::Sim => {
            warn!("Scale: simulated load cell, weights are not real");
            Ok(Box::new(SimLoadCell::new(SIM_LOAD_CELL_STEADY)))
        }
    }
}

// ── Remote ────────────────────────────────────────────────────

#[cfg(feature = "http")]
fn remote(config: &ConfigHandle) -> Rc<dyn RemotePort> {
    match trashcan::adapters::http_remote::HttpRemote::new(config.clone()) {
        Ok(r) => Rc::new(r),
        Err(e) => {
            warn!("Remote: HTTP client unavailable ({}), buffering everything", e);
            Rc::new(OfflineRemote::new())
        }
    }
}

#[cfg(not(feature = "http"))]
fn remote(_config: &ConfigHandle) -> Rc<dyn RemotePort> {
    warn!("Remote: built without HTTP support, buffering everything");
    Rc::new(OfflineRemote::new())
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("TrashCAN v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Store and config ───────────────────────────────────
    let path = std::env::var_os("TRASHCAN_DATA")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH));
    let store = Rc::new(
        FileStore::open(&path).map_err(|e| anyhow::anyhow!("store {}: {}", path.display(), e))?,
    );

    let config = ConfigHandle::new(SystemConfig::default());
    match config.reload(&*store) {
        Ok(change_id) => info!("Config: loaded at change {}", change_id),
        Err(e) => warn!("Config: store unreadable ({}), running with defaults", e),
    }
    let cfg = config.snapshot();

    // ── 2. Hardware ───────────────────────────────────────────
    let devices = Rc::new(device_bank(&cfg).context("GPIO init failed")?);
    let scanner = open_scanner(&cfg);
    let sampler = load_cell(&cfg).context("load cell init failed")?;
    let scale = Rc::new(RefCell::new(Scale::new(sampler, config.clone())));

    // ── 3. Runtime ────────────────────────────────────────────
    let runtime = Runtime::new(Wiring {
        devices,
        scanner,
        scale,
        records: store.clone(),
        config_store: store,
        remote: remote(&config),
        config,
    });

    info!("System ready. Entering task loop.");
    runtime.run(ShutdownToken::new());
    Ok(())
}
