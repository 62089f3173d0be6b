//! System configuration parameters
//!
//! All tunable parameters for the TrashCAN controller.  Values live in the
//! external config store as name/value strings; [`SystemConfig::from_options`]
//! overlays them onto the defaults.  Option names are matched
//! case-insensitively so the legacy upper-case names (`TARE`,
//! `LONG_CYCLE_SLEEP`, ...) keep working.
//!
//! Readers never see a half-applied reload: the live configuration is an
//! immutable snapshot behind [`ConfigHandle`], replaced wholesale by the
//! [`ConfigWatchdog`].

use std::sync::{Arc, RwLock};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::ports::{ConfigError, ConfigStore, StoreError};
use crate::drivers::{barcode, hx711};
use crate::pins;

/// Upper bound for any blocking remote call (ms).
pub const MAX_REMOTE_TIMEOUT_MS: u32 = 500;

/// Which GPIO backend the binary wires up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpioBackend {
    /// In-memory pins (bench testing, CI).
    Sim,
    /// Linux `/sys/class/gpio`.
    Sysfs,
}

/// A single stored option as the config store reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOption {
    pub name: String,
    pub value: String,
    /// Change id of the write that last set this option.
    pub change_id: u64,
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Cleaning cycle schedule (daily, local time) ---
    pub long_cycle_uvc_hour: u8,
    pub long_cycle_uvc_minute: u8,
    pub short_cycle_uvc_hour: u8,
    pub short_cycle_uvc_minute: u8,
    pub long_cycle_fan_hour: u8,
    pub long_cycle_fan_minute: u8,
    pub short_cycle_fan_hour: u8,
    pub short_cycle_fan_minute: u8,
    pub long_cycle_both_hour: u8,
    pub long_cycle_both_minute: u8,
    pub short_cycle_both_hour: u8,
    pub short_cycle_both_minute: u8,

    // --- Cleaning cycle hold (seconds) ---
    /// How long a long cycle keeps its actuators on.
    pub long_cycle_sleep: u32,
    /// How long a short cycle keeps its actuators on.
    pub short_cycle_sleep: u32,

    // --- Scheduler ---
    /// Maximum number of jobs executing at once.
    pub max_workers: u8,
    /// Config change poll period (seconds).
    pub watchdog_timer: u32,

    // --- Phone home / discovery ---
    /// Phone-home (upload + job reconciliation) period (seconds).
    pub phone_home_sleep: u32,
    /// Discovery broadcast period (seconds).
    pub broadcast_sleep: u32,
    /// UDP port the discovery datagram is sent to.
    pub pi_broadcast_port: u16,
    /// Base URL of the home server.  Empty = offline, everything buffers.
    pub home_server_url: String,
    /// Identifier reported in status notifications.
    pub device_id: String,
    /// Timeout for lid status notifications and barcode lookups (ms).
    pub status_timeout_ms: u32,
    /// Timeout for uploads and job fetches (ms).
    pub remote_timeout_ms: u32,
    /// Failed weight uploads tolerated per phone-home run.
    pub weight_upload_failure_limit: u8,
    /// Failed barcode uploads tolerated per phone-home run.
    pub barcode_upload_failure_limit: u8,

    // --- Scale ---
    /// Samples taken per measurement.
    pub num_measurements: u16,
    /// Added to every raw sample before filtering.
    pub scale_offset: f64,
    /// Theoretical zero-load reading after offset.
    pub scale_baseline: f64,
    /// Counts → physical unit.
    pub scale_gain: f64,
    /// HX711 amplifier gain factor: 128 or 64 (channel A), 32 (channel B).
    pub scale_amp_gain: u8,
    /// Stored tare, subtracted from every calibrated reading.
    pub tare: f64,

    // --- Lid / scanner ---
    /// Lid sensor poll period (ms).  Also caps each scanner wait.
    pub lid_poll_interval_ms: u32,
    /// Barcode decoder wait for the first report (ms).
    pub barcode_timeout_ms: u32,
    /// Width of the pulse sent to the lid motor buttons (ms).
    pub lid_pulse_ms: u32,
    /// hidraw device the scanner enumerates as.
    pub barcode_scanner_path: String,

    // --- Pins ---
    pub gpio_backend: GpioBackend,
    pub lid_switch_pin: u8,
    pub lid_open_pin: u8,
    pub lid_close_pin: u8,
    pub light_pin: u8,
    pub fan_pin: u8,
    pub led_pin: u8,
    pub scanner_trigger_pin: u8,
    pub scale_data_pin: u8,
    pub scale_clock_pin: u8,
    /// Output relays are wired active-low.
    pub outputs_active_low: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Schedule
            long_cycle_uvc_hour: 2,
            long_cycle_uvc_minute: 0,
            short_cycle_uvc_hour: 14,
            short_cycle_uvc_minute: 0,
            long_cycle_fan_hour: 3,
            long_cycle_fan_minute: 0,
            short_cycle_fan_hour: 15,
            short_cycle_fan_minute: 0,
            long_cycle_both_hour: 4,
            long_cycle_both_minute: 0,
            short_cycle_both_hour: 20,
            short_cycle_both_minute: 0,

            // Hold
            long_cycle_sleep: 1800, // 30 min
            short_cycle_sleep: 300, // 5 min

            // Scheduler
            max_workers: 10,
            watchdog_timer: 5,

            // Remote
            phone_home_sleep: 300,
            broadcast_sleep: 60,
            pi_broadcast_port: 50_000,
            home_server_url: String::new(),
            device_id: String::from("trashcan"),
            status_timeout_ms: 200,
            remote_timeout_ms: 500,
            weight_upload_failure_limit: 3,
            barcode_upload_failure_limit: 3,

            // Scale
            num_measurements: 15,
            scale_offset: 0.0,
            scale_baseline: 0.0,
            scale_gain: 1.0,
            scale_amp_gain: 128,
            tare: 0.0,

            // Lid / scanner
            lid_poll_interval_ms: 100,
            barcode_timeout_ms: barcode::DEFAULT_TIMEOUT.as_millis() as u32,
            lid_pulse_ms: 500,
            barcode_scanner_path: String::from("/dev/hidraw0"),

            // Pins
            gpio_backend: GpioBackend::Sim,
            lid_switch_pin: pins::LID_SWITCH_GPIO,
            lid_open_pin: pins::LID_OPEN_GPIO,
            lid_close_pin: pins::LID_CLOSE_GPIO,
            light_pin: pins::LIGHT_GPIO,
            fan_pin: pins::FAN_GPIO,
            led_pin: pins::LED_GPIO,
            scanner_trigger_pin: pins::SCANNER_TRIGGER_GPIO,
            scale_data_pin: pins::SCALE_DATA_GPIO,
            scale_clock_pin: pins::SCALE_CLOCK_GPIO,
            outputs_active_low: true,
        }
    }
}

impl SystemConfig {
    /// Overlay stored options onto the defaults.
    ///
    /// Unknown names are skipped (the store is shared with other
    /// components); a value that does not parse or validate is rejected
    /// and the previous value kept.
    pub fn from_options<'a>(options: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut cfg = Self::default();
        for (name, raw) in options {
            match cfg.with_option(name, raw) {
                Ok(next) => cfg = next,
                Err(ConfigError::UnknownOption) => debug!("Config: ignoring unknown option '{}'", name),
                Err(e) => warn!("Config: option '{}'='{}' rejected: {}", name, raw, e),
            }
        }
        cfg
    }

    /// Return a copy with one option applied.
    pub fn with_option(&self, name: &str, raw: &str) -> Result<Self, ConfigError> {
        let key = name.trim().to_ascii_lowercase();
        let mut doc = serde_json::to_value(self).map_err(|_| ConfigError::ParseFailed)?;
        let slot = doc
            .as_object_mut()
            .and_then(|map| map.get_mut(&key))
            .ok_or(ConfigError::UnknownOption)?;

        *slot = if slot.is_string() {
            Value::String(raw.to_owned())
        } else {
            serde_json::from_str(raw.trim()).unwrap_or_else(|_| Value::String(raw.to_owned()))
        };

        let next: SystemConfig = serde_json::from_value(doc).map_err(|_| ConfigError::ParseFailed)?;
        next.validate()?;
        Ok(next)
    }

    /// Range-check every field that could wedge the controller.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let schedule = [
            (self.long_cycle_uvc_hour, self.long_cycle_uvc_minute),
            (self.short_cycle_uvc_hour, self.short_cycle_uvc_minute),
            (self.long_cycle_fan_hour, self.long_cycle_fan_minute),
            (self.short_cycle_fan_hour, self.short_cycle_fan_minute),
            (self.long_cycle_both_hour, self.long_cycle_both_minute),
            (self.short_cycle_both_hour, self.short_cycle_both_minute),
        ];
        if schedule.iter().any(|&(h, m)| h > 23 || m > 59) {
            return Err(ConfigError::ValidationFailed(
                "cycle hour must be 0–23 and minute 0–59",
            ));
        }
        if self.long_cycle_sleep == 0 || self.short_cycle_sleep == 0 {
            return Err(ConfigError::ValidationFailed("cycle sleep must be > 0"));
        }
        if !(1..=32).contains(&self.max_workers) {
            return Err(ConfigError::ValidationFailed("max_workers must be 1–32"));
        }
        if self.watchdog_timer == 0 {
            return Err(ConfigError::ValidationFailed("watchdog_timer must be > 0"));
        }
        if self.phone_home_sleep == 0 || self.broadcast_sleep == 0 {
            return Err(ConfigError::ValidationFailed(
                "phone_home_sleep and broadcast_sleep must be > 0",
            ));
        }
        // Remote calls block the executor thread the lid loop runs on.
        if !(50..=MAX_REMOTE_TIMEOUT_MS).contains(&self.status_timeout_ms)
            || !(50..=MAX_REMOTE_TIMEOUT_MS).contains(&self.remote_timeout_ms)
        {
            return Err(ConfigError::ValidationFailed(
                "remote timeouts must be 50–500 ms",
            ));
        }
        if self.weight_upload_failure_limit == 0 || self.barcode_upload_failure_limit == 0 {
            return Err(ConfigError::ValidationFailed(
                "upload failure limits must be >= 1",
            ));
        }
        if !(1..=200).contains(&self.num_measurements) {
            return Err(ConfigError::ValidationFailed("num_measurements must be 1–200"));
        }
        if !self.scale_gain.is_finite() || self.scale_gain == 0.0 {
            return Err(ConfigError::ValidationFailed("scale_gain must be finite and non-zero"));
        }
        if hx711::AmpGain::from_factor(self.scale_amp_gain).is_none() {
            return Err(ConfigError::ValidationFailed("scale_amp_gain must be 128, 64 or 32"));
        }
        if !self.scale_offset.is_finite() || !self.scale_baseline.is_finite() || !self.tare.is_finite()
        {
            return Err(ConfigError::ValidationFailed(
                "scale_offset, scale_baseline and tare must be finite",
            ));
        }
        if !(10..=100).contains(&self.lid_poll_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "lid_poll_interval_ms must be 10–100",
            ));
        }
        if !(10..=10_000).contains(&self.barcode_timeout_ms) {
            return Err(ConfigError::ValidationFailed(
                "barcode_timeout_ms must be 10–10000",
            ));
        }
        if !(50..=5000).contains(&self.lid_pulse_ms) {
            return Err(ConfigError::ValidationFailed("lid_pulse_ms must be 50–5000"));
        }
        Ok(())
    }

    /// Build from the option list a config store returns.
    pub fn from_store_options(options: &[ConfigOption]) -> Self {
        Self::from_options(options.iter().map(|o| (o.name.as_str(), o.value.as_str())))
    }
}

// ---------------------------------------------------------------------------
// Live snapshot
// ---------------------------------------------------------------------------

/// Shared handle to the live configuration snapshot.
///
/// Cloning the handle is cheap; [`snapshot`](Self::snapshot) hands out an
/// `Arc` that stays valid (and unchanged) after a newer snapshot is
/// published.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<SystemConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: SystemConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<SystemConfig> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the snapshot in one step.
    pub fn publish(&self, config: SystemConfig) {
        let next = Arc::new(config);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Rebuild from the store and publish.  Returns the store's change id.
    pub fn reload(&self, store: &dyn ConfigStore) -> Result<u64, StoreError> {
        let change_id = store.change_id()?;
        let options = store.options()?;
        self.publish(SystemConfig::from_store_options(&options));
        Ok(change_id)
    }
}

/// Polls the store's change id and republishes the snapshot when it advances.
#[derive(Debug)]
pub struct ConfigWatchdog {
    last_change_id: u64,
}

impl ConfigWatchdog {
    pub fn new(last_change_id: u64) -> Self {
        Self { last_change_id }
    }

    pub fn last_change_id(&self) -> u64 {
        self.last_change_id
    }

    /// Returns the new change id when a reload happened.
    pub fn poll(
        &mut self,
        store: &dyn ConfigStore,
        handle: &ConfigHandle,
    ) -> Result<Option<u64>, StoreError> {
        let current = store.change_id()?;
        if current <= self.last_change_id {
            return Ok(None);
        }
        let loaded = handle.reload(store)?;
        info!(
            "Config: change id {} -> {}, snapshot republished",
            self.last_change_id, loaded
        );
        self.last_change_id = loaded;
        Ok(Some(loaded))
    }
}
