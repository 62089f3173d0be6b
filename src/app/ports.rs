//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ LidService / Scheduler / SyncService
//! ```
//!
//! Driven adapters (pins, sampler, scanner, record store, home server,
//! event sinks) implement these traits.  The domain core consumes them via
//! generics or `dyn`, so it never touches hardware or the network directly.
//!
//! ## Conventions
//!
//! - Device ports are `&mut self`; the [`DeviceBank`](crate::devices::DeviceBank)
//!   owns each pin and serialises access.
//! - Store and remote ports are `&self` so they can be shared between the
//!   lid loop and the phone-home job on one executor.
//! - All port errors are typed; callers must handle every variant explicitly.

use core::fmt;
use core::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConfigOption;
use crate::error::DeviceError;
use crate::records::{Record, RecordId, RecordKind};
use crate::scheduler::jobs::JobSpec;

// ───────────────────────────────────────────────────────────────
// Device capability ports (driven adapter: hardware ↔ domain)
// ───────────────────────────────────────────────────────────────

/// A single digital sensor line.
pub trait DigitalInput {
    /// Live electrical level.  Never cached.
    fn is_high(&mut self) -> Result<bool, DeviceError>;
}

/// A single digital output line.
pub trait DigitalOutput {
    /// Drive the line to the given electrical level.
    fn set_level(&mut self, high: bool) -> Result<(), DeviceError>;

    /// Read back the level the line is currently driven to.
    fn is_set_high(&mut self) -> Result<bool, DeviceError>;
}

/// Load-cell amplifier.
pub trait AnalogSampler {
    /// Power-cycle the amplifier so the next samples start clean.
    fn reset(&mut self) -> Result<(), DeviceError>;

    /// Take `count` raw readings.
    fn sample(&mut self, count: usize) -> Result<Vec<i32>, DeviceError>;
}

/// Raw HID report source (barcode scanner).
pub trait ByteStreamReader {
    /// Wait up to `timeout` for one report and copy it into `buf`.
    ///
    /// Returns the number of bytes read; `Ok(0)` means nothing arrived
    /// before the timeout.
    fn read_report(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> impl Future<Output = Result<usize, DeviceError>>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Record store port (driven adapter: domain ↔ buffered records)
// ───────────────────────────────────────────────────────────────

/// Buffer for records that have not reached the home server yet.
///
/// Presence means "not yet uploaded".  Implementations must persist each
/// mutation before returning.
pub trait RecordStore {
    fn append(&self, record: Record) -> Result<RecordId, StoreError>;

    /// Remove a buffered record.  `NotFound` if it is already gone.
    fn delete(&self, kind: RecordKind, id: RecordId) -> Result<(), StoreError>;

    /// Every buffered record of `kind`, oldest first.
    fn list(&self, kind: RecordKind) -> Result<Vec<Record>, StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Config store port (driven adapter: domain ↔ option table)
// ───────────────────────────────────────────────────────────────

/// Externally owned option table with a monotonic change counter.
pub trait ConfigStore {
    fn options(&self) -> Result<Vec<ConfigOption>, StoreError>;

    fn get(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// Write an option.  Returns the new change id.
    fn set(&self, name: &str, value: &str) -> Result<u64, StoreError>;

    /// Advances on every `set`.
    fn change_id(&self) -> Result<u64, StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Remote port (driven adapter: domain → home server)
// ───────────────────────────────────────────────────────────────

/// Lid position carried in status notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LidStatus {
    Open,
    Closed,
}

impl fmt::Display for LidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Body of a lid status notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub device_id: String,
    pub lid: LidStatus,
    pub timestamp: DateTime<Utc>,
}

impl StatusReport {
    pub fn now(device_id: &str, lid: LidStatus) -> Self {
        Self {
            device_id: device_id.to_owned(),
            lid,
            timestamp: Utc::now(),
        }
    }
}

/// The home server.  Every call is bounded by a short timeout.
pub trait RemotePort {
    /// Best-effort lid status notification.
    fn notify_status(&self, report: &StatusReport) -> Result<(), RemoteError>;

    /// Deliver one record.  `Ok` means the server accepted it.
    fn upload(&self, record: &Record) -> Result<(), RemoteError>;

    /// The server's authoritative job set.
    fn fetch_jobs(&self) -> Result<Vec<JobSpec>, RemoteError>;
}

// ───────────────────────────────────────────────────────────────
// Scheduler control (decouples the lid FSM from the scheduler)
// ───────────────────────────────────────────────────────────────

/// What the lid state machine needs from the scheduler.
pub trait SchedulerControl {
    /// Stop new jobs from firing.  Running jobs are not interrupted.
    fn pause(&self);

    fn resume(&self);

    fn is_paused(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`RecordStore`] and [`ConfigStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Requested record does not exist.
    NotFound,
    /// Stored document failed to parse.
    Corrupted,
    /// Generic I/O error from the backing file.
    Io(std::io::ErrorKind),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "record not found"),
            Self::Corrupted => write!(f, "store corrupted"),
            Self::Io(kind) => write!(f, "I/O error: {}", kind),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.kind())
    }
}

/// Errors from [`RemotePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteError {
    /// No home server URL configured.
    NotConfigured,
    /// The request did not complete within its timeout.
    Timeout,
    /// The server answered with a non-success status.
    Http(u16),
    /// Connection refused, DNS failure, etc.
    Transport,
    /// The response body could not be decoded.
    Decode,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "home server not configured"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Http(status) => write!(f, "server returned HTTP {}", status),
            Self::Transport => write!(f, "transport failure"),
            Self::Decode => write!(f, "response could not be decoded"),
        }
    }
}

/// Errors from configuration parsing and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No such option name.
    UnknownOption,
    /// The value does not parse as the option's type.
    ParseFailed,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOption => write!(f, "unknown option"),
            Self::ParseFailed => write!(f, "value does not parse"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}
