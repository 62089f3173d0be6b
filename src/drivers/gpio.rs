//! embedded-hal pin adapters.
//!
//! Any `embedded-hal` 1.0 pin plugs into the device layer through
//! [`HalInput`] / [`HalOutput`].  [`SimPin`] is an in-memory pin used by
//! the `sim` backend and by tests; clones share the same line so a test
//! can hold a probe while the bank owns the pin.

use std::cell::Cell;
use std::rc::Rc;

use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin, StatefulOutputPin};
use log::trace;

use crate::app::ports::{DigitalInput, DigitalOutput};
use crate::error::DeviceError;

fn hal_error(e: impl digital::Error) -> DeviceError {
    trace!("GPIO | HAL error: {:?}", e.kind());
    DeviceError::Io(std::io::ErrorKind::Other)
}

// ---------------------------------------------------------------------------
// HAL wrappers
// ---------------------------------------------------------------------------

/// Adapts an `embedded-hal` input pin.
pub struct HalInput<P>(P);

impl<P: InputPin> HalInput<P> {
    pub fn new(pin: P) -> Self {
        Self(pin)
    }
}

impl<P: InputPin> DigitalInput for HalInput<P> {
    fn is_high(&mut self) -> Result<bool, DeviceError> {
        self.0.is_high().map_err(hal_error)
    }
}

/// Adapts an `embedded-hal` stateful output pin.
pub struct HalOutput<P>(P);

impl<P: StatefulOutputPin> HalOutput<P> {
    pub fn new(pin: P) -> Self {
        Self(pin)
    }
}

impl<P: StatefulOutputPin> DigitalOutput for HalOutput<P> {
    fn set_level(&mut self, high: bool) -> Result<(), DeviceError> {
        if high {
            self.0.set_high().map_err(hal_error)
        } else {
            self.0.set_low().map_err(hal_error)
        }
    }

    fn is_set_high(&mut self) -> Result<bool, DeviceError> {
        self.0.is_set_high().map_err(hal_error)
    }
}

// ---------------------------------------------------------------------------
// Simulated pin
// ---------------------------------------------------------------------------

/// Injected failure of a [`SimPin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimPinError;

impl digital::Error for SimPinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// In-memory GPIO line.
#[derive(Debug, Clone)]
pub struct SimPin {
    level: Rc<Cell<bool>>,
    fail_writes: Rc<Cell<bool>>,
    fail_reads: Rc<Cell<bool>>,
}

impl SimPin {
    pub fn new(initial_high: bool) -> Self {
        Self {
            level: Rc::new(Cell::new(initial_high)),
            fail_writes: Rc::new(Cell::new(false)),
            fail_reads: Rc::new(Cell::new(false)),
        }
    }

    /// Current electrical level.
    pub fn level(&self) -> bool {
        self.level.get()
    }

    /// Drive the line from outside (a sensor changing, a stuck relay).
    pub fn set(&self, high: bool) {
        self.level.set(high);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    fn write(&self, high: bool) -> Result<(), SimPinError> {
        if self.fail_writes.get() {
            return Err(SimPinError);
        }
        self.level.set(high);
        Ok(())
    }

    fn sense(&self) -> Result<bool, SimPinError> {
        if self.fail_reads.get() {
            return Err(SimPinError);
        }
        Ok(self.level.get())
    }
}

impl ErrorType for SimPin {
    type Error = SimPinError;
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.sense()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.sense().map(|h| !h)
    }
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true)
    }
}

impl StatefulOutputPin for SimPin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        self.sense()
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        self.sense().map(|h| !h)
    }
}
