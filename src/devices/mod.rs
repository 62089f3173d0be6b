//! Device Capability Layer.
//!
//! [`DeviceBank`] owns every output line and the lid switch.  It is the
//! single source of truth for actuator state: every [`read`](DeviceBank::read)
//! queries the live pin, nothing is cached.
//!
//! Cleaning cycles take a [`CycleLease`] on the actuators they drive.  A
//! manual write to a leased actuator is rejected with
//! [`DeviceError::Busy`]; a second cycle asking for an overlapping set is
//! refused outright.  Leases are released on drop.

use core::cell::{Cell, RefCell};
use core::fmt;
use std::time::Duration;

use async_io_mini::Timer;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{DigitalInput, DigitalOutput};
use crate::error::DeviceError;

// ---------------------------------------------------------------------------
// Actuator identity
// ---------------------------------------------------------------------------

/// Every output line the controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Actuator {
    /// UV cleaning light.
    Light = 0,
    Fan = 1,
    /// Front status LED.
    Led = 2,
    /// Lid motor "open" button.
    LidOpen = 3,
    /// Lid motor "close" button.
    LidClose = 4,
    /// Barcode scanner enable.
    ScannerTrigger = 5,
}

impl Actuator {
    pub const COUNT: usize = 6;

    pub const ALL: [Actuator; Self::COUNT] = [
        Self::Light,
        Self::Fan,
        Self::Led,
        Self::LidOpen,
        Self::LidClose,
        Self::ScannerTrigger,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    fn mask(self) -> u8 {
        1 << (self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Fan => "fan",
            Self::Led => "led",
            Self::LidOpen => "lid_open",
            Self::LidClose => "lid_close",
            Self::ScannerTrigger => "scanner_trigger",
        }
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A small set of actuators, stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActuatorSet(u8);

impl ActuatorSet {
    pub fn of(actuators: &[Actuator]) -> Self {
        Self(actuators.iter().fold(0, |acc, a| acc | a.mask()))
    }

    pub fn contains(self, actuator: Actuator) -> bool {
        self.0 & actuator.mask() != 0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Actuator> {
        Actuator::ALL.into_iter().filter(move |a| self.contains(*a))
    }
}

// ---------------------------------------------------------------------------
// States and commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    On,
    Off,
}

impl DeviceState {
    pub fn is_on(self) -> bool {
        self == Self::On
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::On => Self::Off,
            Self::Off => Self::On,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
        }
    }
}

/// What a write asks an actuator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    On,
    Off,
    Toggle,
}

/// Actuator group a cleaning cycle drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleGroup {
    Light,
    Fan,
    Both,
}

impl CycleGroup {
    pub fn actuators(self) -> ActuatorSet {
        match self {
            Self::Light => ActuatorSet::of(&[Actuator::Light]),
            Self::Fan => ActuatorSet::of(&[Actuator::Fan]),
            Self::Both => ActuatorSet::of(&[Actuator::Fan, Actuator::Light]),
        }
    }
}

impl fmt::Display for CycleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Fan => write!(f, "fan"),
            Self::Both => write!(f, "both"),
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceBank
// ---------------------------------------------------------------------------

/// Owns all pins.  Shared by `Rc` across the tasks of one executor.
pub struct DeviceBank {
    outputs: [RefCell<Box<dyn DigitalOutput>>; Actuator::COUNT],
    lid: RefCell<Box<dyn DigitalInput>>,
    /// Outputs drive LOW for "on".
    active_low: bool,
    leased: Cell<u8>,
}

impl DeviceBank {
    /// `outputs` is indexed by [`Actuator::index`].
    pub fn new(
        outputs: [Box<dyn DigitalOutput>; Actuator::COUNT],
        lid: Box<dyn DigitalInput>,
        active_low: bool,
    ) -> Self {
        Self {
            outputs: outputs.map(RefCell::new),
            lid: RefCell::new(lid),
            active_low,
            leased: Cell::new(0),
        }
    }

    /// Drive every output to "off".  Called once at startup.
    pub fn all_off(&self) {
        for actuator in Actuator::ALL {
            if let Err(e) = self.write(actuator, Action::Off) {
                warn!("DEV | {} could not be switched off: {}", actuator, e);
            }
        }
    }

    // ── Reads ─────────────────────────────────────────────────

    /// Live state of an actuator.
    pub fn read(&self, actuator: Actuator) -> Result<DeviceState, DeviceError> {
        let high = self.outputs[actuator.index()]
            .borrow_mut()
            .is_set_high()
            .map_err(|_| DeviceError::ReadFailed(actuator.name()))?;
        Ok(if high != self.active_low {
            DeviceState::On
        } else {
            DeviceState::Off
        })
    }

    /// Live lid switch.  High = open.
    pub fn lid_is_open(&self) -> Result<bool, DeviceError> {
        self.lid
            .borrow_mut()
            .is_high()
            .map_err(|_| DeviceError::ReadFailed("lid"))
    }

    // ── Writes ────────────────────────────────────────────────

    /// Unconditional write.  Returns the state the actuator was driven to.
    pub fn write(&self, actuator: Actuator, action: Action) -> Result<DeviceState, DeviceError> {
        let target = match action {
            Action::On => DeviceState::On,
            Action::Off => DeviceState::Off,
            Action::Toggle => self.read(actuator)?.toggled(),
        };
        let level = target.is_on() != self.active_low;
        self.outputs[actuator.index()]
            .borrow_mut()
            .set_level(level)
            .map_err(|_| DeviceError::WriteFailed(actuator))?;
        debug!("DEV | {} -> {}", actuator, target);
        Ok(target)
    }

    /// Write on behalf of an operator.  Refused while a cycle holds the actuator.
    pub fn write_manual(
        &self,
        actuator: Actuator,
        action: Action,
    ) -> Result<DeviceState, DeviceError> {
        if self.leased().contains(actuator) {
            return Err(DeviceError::Busy(actuator));
        }
        self.write(actuator, action)
    }

    /// Press one of the lid motor buttons for `width`.
    ///
    /// `On` opens, `Off` closes, `Toggle` picks by the live lid switch.
    /// The release is attempted even if the press failed.
    pub async fn pulse_lid(&self, action: Action, width: Duration) -> Result<Actuator, DeviceError> {
        let button = match action {
            Action::On => Actuator::LidOpen,
            Action::Off => Actuator::LidClose,
            Action::Toggle => {
                if self.lid_is_open()? {
                    Actuator::LidClose
                } else {
                    Actuator::LidOpen
                }
            }
        };
        info!("DEV | pulsing {} for {:?}", button, width);
        let pressed = self.write(button, Action::On);
        if pressed.is_ok() {
            Timer::after(width).await;
        }
        let released = self.write(button, Action::Off);
        pressed?;
        released?;
        Ok(button)
    }

    // ── Leases ────────────────────────────────────────────────

    /// Actuators currently held by cleaning cycles.
    pub fn leased(&self) -> ActuatorSet {
        ActuatorSet(self.leased.get())
    }

    /// Claim `set` for a cleaning cycle.  `None` if any of it is already held.
    pub fn try_lease(&self, set: ActuatorSet) -> Option<CycleLease<'_>> {
        let held = self.leased();
        if held.intersects(set) {
            return None;
        }
        self.leased.set(held.0 | set.0);
        Some(CycleLease { bank: self, set })
    }
}

/// Exclusive claim on a set of actuators; released on drop.
pub struct CycleLease<'a> {
    bank: &'a DeviceBank,
    set: ActuatorSet,
}

impl CycleLease<'_> {
    pub fn actuators(&self) -> ActuatorSet {
        self.set
    }
}

impl Drop for CycleLease<'_> {
    fn drop(&mut self) {
        let held = self.bank.leased.get();
        self.bank.leased.set(held & !self.set.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::gpio::{HalInput, HalOutput, SimPin};

    fn bank() -> (DeviceBank, Vec<SimPin>, SimPin) {
        let pins: Vec<SimPin> = (0..Actuator::COUNT).map(|_| SimPin::new(true)).collect();
        let outputs: [Box<dyn DigitalOutput>; Actuator::COUNT] =
            core::array::from_fn(|i| Box::new(HalOutput::new(pins[i].clone())) as Box<dyn DigitalOutput>);
        let lid = SimPin::new(false);
        let bank = DeviceBank::new(outputs, Box::new(HalInput::new(lid.clone())), true);
        (bank, pins, lid)
    }

    #[test]
    fn active_low_write_drives_pin_low() {
        let (bank, pins, _) = bank();
        assert_eq!(bank.read(Actuator::Fan), Ok(DeviceState::Off));
        bank.write(Actuator::Fan, Action::On).unwrap();
        assert!(!pins[Actuator::Fan.index()].level());
        assert_eq!(bank.read(Actuator::Fan), Ok(DeviceState::On));
    }

    #[test]
    fn toggle_flips_live_state() {
        let (bank, _, _) = bank();
        assert_eq!(bank.write(Actuator::Light, Action::Toggle), Ok(DeviceState::On));
        assert_eq!(bank.write(Actuator::Light, Action::Toggle), Ok(DeviceState::Off));
    }

    #[test]
    fn read_sees_external_change() {
        let (bank, pins, _) = bank();
        pins[Actuator::Led.index()].set(false);
        assert_eq!(bank.read(Actuator::Led), Ok(DeviceState::On));
    }

    #[test]
    fn failed_write_is_surfaced() {
        let (bank, pins, _) = bank();
        pins[Actuator::Fan.index()].fail_writes(true);
        assert_eq!(
            bank.write(Actuator::Fan, Action::On),
            Err(DeviceError::WriteFailed(Actuator::Fan))
        );
    }

    #[test]
    fn manual_write_refused_under_lease() {
        let (bank, _, _) = bank();
        let lease = bank.try_lease(CycleGroup::Fan.actuators()).unwrap();
        assert_eq!(
            bank.write_manual(Actuator::Fan, Action::On),
            Err(DeviceError::Busy(Actuator::Fan))
        );
        assert!(bank.write_manual(Actuator::Light, Action::On).is_ok());
        drop(lease);
        assert!(bank.write_manual(Actuator::Fan, Action::On).is_ok());
    }

    #[test]
    fn overlapping_lease_refused() {
        let (bank, _, _) = bank();
        let _fan = bank.try_lease(CycleGroup::Fan.actuators()).unwrap();
        assert!(bank.try_lease(CycleGroup::Both.actuators()).is_none());
        assert!(bank.try_lease(CycleGroup::Light.actuators()).is_some());
    }

    #[test]
    fn lid_switch_reads_live() {
        let (bank, _, lid) = bank();
        assert_eq!(bank.lid_is_open(), Ok(false));
        lid.set(true);
        assert_eq!(bank.lid_is_open(), Ok(true));
    }

    #[test]
    fn lid_toggle_pulses_close_when_open() {
        let (bank, _, lid) = bank();
        lid.set(true);
        let pressed = futures_lite::future::block_on(
            bank.pulse_lid(Action::Toggle, Duration::from_millis(1)),
        );
        assert_eq!(pressed, Ok(Actuator::LidClose));
        assert_eq!(bank.read(Actuator::LidClose), Ok(DeviceState::Off));
    }
}
