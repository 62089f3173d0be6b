//! Unified error types for the TrashCAN controller.
//!
//! One `Error` enum that every subsystem converts into, so the task loops
//! in [`runtime`](crate::runtime) can log any failure the same way and keep
//! going.  Nothing here is fatal: device, measurement and remote failures
//! are reported to the caller and the owning loop continues.

use core::fmt;

use crate::app::ports::{ConfigError, RemoteError, StoreError};
use crate::devices::Actuator;
use crate::scheduler::SchedulerError;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A pin, sampler or byte stream could not be reached.
    Device(DeviceError),
    /// The scale pipeline had nothing left to average.
    Measurement(MeasurementError),
    /// The home server could not be reached or answered badly.
    Remote(RemoteError),
    /// The record/config store failed.
    Store(StoreError),
    /// A configuration value is invalid.
    Config(ConfigError),
    /// The job table rejected an operation.
    Scheduler(SchedulerError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(e) => write!(f, "device: {e}"),
            Self::Measurement(e) => write!(f, "measurement: {e}"),
            Self::Remote(e) => write!(f, "remote: {e}"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Scheduler(e) => write!(f, "scheduler: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Device errors
// ---------------------------------------------------------------------------

/// Failures of the device capability layer.  Surfaced, never retried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// The write did not reach the actuator's pin.
    WriteFailed(Actuator),
    /// A sensor or pin state could not be read.
    ReadFailed(&'static str),
    /// The actuator is held by a running cleaning cycle.
    Busy(Actuator),
    /// The underlying file/stream returned an I/O error.
    Io(std::io::ErrorKind),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteFailed(a) => write!(f, "write to {a} failed"),
            Self::ReadFailed(what) => write!(f, "read of {what} failed"),
            Self::Busy(a) => write!(f, "{a} is held by a cleaning cycle"),
            Self::Io(kind) => write!(f, "I/O error: {kind}"),
        }
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.kind())
    }
}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        Self::Device(e)
    }
}

// ---------------------------------------------------------------------------
// Measurement errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasurementError {
    /// The sampler returned no samples at all.
    NoSamples,
    /// Every sample fell outside the outlier band around the median.
    AllRejected { median: f64 },
}

impl fmt::Display for MeasurementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSamples => write!(f, "no samples"),
            Self::AllRejected { median } => {
                write!(f, "no samples within band of median {median:.1}")
            }
        }
    }
}

impl From<MeasurementError> for Error {
    fn from(e: MeasurementError) -> Self {
        Self::Measurement(e)
    }
}

// ---------------------------------------------------------------------------
// Port error conversions
// ---------------------------------------------------------------------------

impl From<RemoteError> for Error {
    fn from(e: RemoteError) -> Self {
        Self::Remote(e)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<SchedulerError> for Error {
    fn from(e: SchedulerError) -> Self {
        Self::Scheduler(e)
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
