//! Linux sysfs GPIO (`/sys/class/gpio`).
//!
//! [`SysfsPin`] implements the `embedded-hal` digital traits so it plugs
//! into [`HalInput`](crate::drivers::gpio::HalInput) /
//! [`HalOutput`](crate::drivers::gpio::HalOutput) like any other HAL pin.
//! Pins are exported on open and left exported on drop; another process
//! may still be watching them.
//!
//! [`HostDelay`] is the matching `embedded-hal` delay for bit-banged
//! protocols (HX711) driven over these pins.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin, StatefulOutputPin};
use log::{debug, warn};

const GPIO_ROOT: &str = "/sys/class/gpio";

#[derive(Debug)]
pub struct SysfsError(pub io::Error);

impl digital::Error for SysfsError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl From<io::Error> for SysfsError {
    fn from(e: io::Error) -> Self {
        Self(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    /// Output, initially driven to the given level.
    Out { high: bool },
}

/// One exported BCM line.
#[derive(Debug)]
pub struct SysfsPin {
    value: PathBuf,
}

impl SysfsPin {
    pub fn open(bcm: u8, direction: Direction) -> Result<Self, SysfsError> {
        let dir = PathBuf::from(format!("{GPIO_ROOT}/gpio{bcm}"));
        if !dir.exists() {
            debug!("SysfsPin: exporting gpio{}", bcm);
            fs::write(format!("{GPIO_ROOT}/export"), bcm.to_string())?;
        }
        // "high"/"low" set direction and level in one write, no glitch.
        let mode = match direction {
            Direction::In => "in",
            Direction::Out { high: true } => "high",
            Direction::Out { high: false } => "low",
        };
        fs::write(dir.join("direction"), mode).inspect_err(|e| {
            warn!("SysfsPin: gpio{} direction '{}' rejected: {}", bcm, mode, e);
        })?;
        Ok(Self {
            value: dir.join("value"),
        })
    }

    fn read_level(&self) -> Result<bool, SysfsError> {
        let raw = fs::read_to_string(&self.value)?;
        Ok(raw.trim_start().starts_with('1'))
    }

    fn write_level(&self, high: bool) -> Result<(), SysfsError> {
        fs::write(&self.value, if high { "1" } else { "0" })?;
        Ok(())
    }
}

impl ErrorType for SysfsPin {
    type Error = SysfsError;
}

impl InputPin for SysfsPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.read_level()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.read_level().map(|h| !h)
    }
}

impl OutputPin for SysfsPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write_level(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write_level(true)
    }
}

impl StatefulOutputPin for SysfsPin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        self.read_level()
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        self.read_level().map(|h| !h)
    }
}

/// Thread delay: spins below [`SPIN_LIMIT`], sleeps above it.
///
/// `thread::sleep` overshoots by tens of microseconds, long enough to
/// power down an HX711 mid-read.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostDelay;

const SPIN_LIMIT: Duration = Duration::from_micros(200);

impl DelayNs for HostDelay {
    fn delay_ns(&mut self, ns: u32) {
        let wait = Duration::from_nanos(u64::from(ns));
        if wait >= SPIN_LIMIT {
            std::thread::sleep(wait);
            return;
        }
        let until = Instant::now() + wait;
        while Instant::now() < until {
            std::hint::spin_loop();
        }
    }
}
