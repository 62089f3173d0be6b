//! Simulation backends for bench testing without the bin hardware.
//!
//! - [`SimLoadCell`]: scripted load-cell readings with failure injection.
//! - [`NoScanner`]: a scanner that never produces a report.
//! - [`OfflineRemote`]: a home server that is never reachable.
//! - [`sim_bank`]: a [`DeviceBank`] of [`SimPin`]s plus probes onto them.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use async_io_mini::Timer;
use log::info;

use crate::app::ports::{AnalogSampler, ByteStreamReader, RemoteError, RemotePort, StatusReport};
use crate::devices::{Actuator, DeviceBank};
use crate::drivers::gpio::{HalInput, HalOutput, SimPin};
use crate::error::DeviceError;
use crate::records::Record;
use crate::scheduler::jobs::JobSpec;

// ---------------------------------------------------------------------------
// Load cell
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LoadCellState {
    /// Readings handed out before falling back to `steady`.
    queued: VecDeque<i32>,
    steady: i32,
    fail: bool,
    resets: u32,
}

/// Scripted load cell.  Clones share state so a test can keep a handle
/// after the sampler has been boxed into a [`Scale`](crate::drivers::scale::Scale).
#[derive(Debug, Clone, Default)]
pub struct SimLoadCell {
    state: Rc<RefCell<LoadCellState>>,
}

impl SimLoadCell {
    /// Load cell that always reads `steady`.
    pub fn new(steady: i32) -> Self {
        let cell = Self::default();
        cell.state.borrow_mut().steady = steady;
        cell
    }

    pub fn set_steady(&self, value: i32) {
        self.state.borrow_mut().steady = value;
    }

    /// Queue exact readings ahead of the steady value.
    pub fn queue(&self, readings: impl IntoIterator<Item = i32>) {
        self.state.borrow_mut().queued.extend(readings);
    }

    pub fn fail(&self, fail: bool) {
        self.state.borrow_mut().fail = fail;
    }

    pub fn resets(&self) -> u32 {
        self.state.borrow().resets
    }
}

impl AnalogSampler for SimLoadCell {
    fn reset(&mut self) -> Result<(), DeviceError> {
        let mut s = self.state.borrow_mut();
        if s.fail {
            return Err(DeviceError::ReadFailed("load cell"));
        }
        s.resets += 1;
        Ok(())
    }

    fn sample(&mut self, count: usize) -> Result<Vec<i32>, DeviceError> {
        let mut s = self.state.borrow_mut();
        if s.fail {
            return Err(DeviceError::ReadFailed("load cell"));
        }
        let steady = s.steady;
        Ok((0..count)
            .map(|_| s.queued.pop_front().unwrap_or(steady))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// Stands in when no scanner device could be opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScanner;

impl ByteStreamReader for NoScanner {
    async fn read_report(&mut self, _buf: &mut [u8], timeout: Duration) -> Result<usize, DeviceError> {
        Timer::after(timeout).await;
        Ok(0)
    }
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

/// Remote used when the binary is built without HTTP support.
#[derive(Debug, Default)]
pub struct OfflineRemote {
    calls: Cell<u32>,
}

impl OfflineRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls refused so far.
    pub fn calls(&self) -> u32 {
        self.calls.get()
    }

    fn refuse<T>(&self) -> Result<T, RemoteError> {
        self.calls.set(self.calls.get() + 1);
        Err(RemoteError::NotConfigured)
    }
}

impl RemotePort for OfflineRemote {
    fn notify_status(&self, _report: &StatusReport) -> Result<(), RemoteError> {
        self.refuse()
    }

    fn upload(&self, _record: &Record) -> Result<(), RemoteError> {
        self.refuse()
    }

    fn fetch_jobs(&self) -> Result<Vec<JobSpec>, RemoteError> {
        self.refuse()
    }
}

// ---------------------------------------------------------------------------
// Device bank
// ---------------------------------------------------------------------------

/// Probes onto the lines of a simulated bank.
#[derive(Debug, Clone)]
pub struct SimProbes {
    /// Indexed by [`Actuator::index`].
    pub outputs: [SimPin; Actuator::COUNT],
    pub lid: SimPin,
}

impl SimProbes {
    pub fn output(&self, actuator: Actuator) -> &SimPin {
        &self.outputs[actuator.index()]
    }
}

/// All outputs start at their "off" level, lid closed.
pub fn sim_bank(active_low: bool) -> (DeviceBank, SimProbes) {
    let outputs: [SimPin; Actuator::COUNT] = core::array::from_fn(|_| SimPin::new(active_low));
    let lid = SimPin::new(false);
    let bank = DeviceBank::new(
        outputs
            .clone()
            .map(|p| Box::new(HalOutput::new(p)) as Box<dyn crate::app::ports::DigitalOutput>),
        Box::new(HalInput::new(lid.clone())),
        active_low,
    );
    info!("DEV | simulated device bank ({} outputs)", Actuator::COUNT);
    (bank, SimProbes { outputs, lid })
}
