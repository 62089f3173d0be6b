//! HX711 24-bit load-cell amplifier, bit-banged over two GPIO lines.
//!
//! DOUT goes low when a conversion is ready.  Each of the next 24 PD_SCK
//! pulses shifts out one bit, MSB first, and 1–3 extra pulses select the
//! input and gain of the *next* conversion.  PD_SCK held high for more
//! than 60 µs powers the chip down; taking it low again resets it to
//! channel A, gain 128.
//!
//! Reads block the calling thread until DOUT signals ready (up to
//! [`READY_TIMEOUT_MS`]).  At the chip's 10 SPS rate a batch of N samples
//! takes roughly N × 100 ms.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, warn};

use crate::app::ports::AnalogSampler;
use crate::error::DeviceError;

/// Longest wait for DOUT to signal a finished conversion.
pub const READY_TIMEOUT_MS: u32 = 500;

const READY_POLL_US: u32 = 1_000;
const POWER_DOWN_US: u32 = 100;
const HALF_CLOCK_US: u32 = 1;

/// Input channel and gain of the next conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmpGain {
    /// Channel A, gain 128.
    A128,
    /// Channel A, gain 64.
    A64,
    /// Channel B, gain 32.
    B32,
}

impl AmpGain {
    /// Map the datasheet gain factor (128, 64 or 32).
    pub fn from_factor(factor: u8) -> Option<Self> {
        match factor {
            128 => Some(Self::A128),
            64 => Some(Self::A64),
            32 => Some(Self::B32),
            _ => None,
        }
    }

    fn extra_pulses(self) -> u8 {
        match self {
            Self::A128 => 1,
            Self::B32 => 2,
            Self::A64 => 3,
        }
    }
}

pub struct Hx711<D, S, T> {
    dout: D,
    pd_sck: S,
    delay: T,
    gain: AmpGain,
}

impl<D: InputPin, S: OutputPin, T: DelayNs> Hx711<D, S, T> {
    pub fn new(dout: D, pd_sck: S, delay: T, gain: AmpGain) -> Self {
        Self {
            dout,
            pd_sck,
            delay,
            gain,
        }
    }

    fn clock(&mut self, high: bool) -> Result<(), DeviceError> {
        let res = if high {
            self.pd_sck.set_high()
        } else {
            self.pd_sck.set_low()
        };
        res.map_err(|_| DeviceError::ReadFailed("load cell clock"))
    }

    fn data_high(&mut self) -> Result<bool, DeviceError> {
        self.dout
            .is_high()
            .map_err(|_| DeviceError::ReadFailed("load cell data"))
    }

    fn wait_ready(&mut self) -> Result<(), DeviceError> {
        for _ in 0..(READY_TIMEOUT_MS * 1_000 / READY_POLL_US) {
            if !self.data_high()? {
                return Ok(());
            }
            self.delay.delay_us(READY_POLL_US);
        }
        warn!("SCALE | HX711 not ready after {} ms", READY_TIMEOUT_MS);
        Err(DeviceError::ReadFailed("load cell not ready"))
    }

    /// One signed 24-bit conversion.
    pub fn read(&mut self) -> Result<i32, DeviceError> {
        self.wait_ready()?;

        let mut raw: u32 = 0;
        for _ in 0..24 {
            self.clock(true)?;
            self.delay.delay_us(HALF_CLOCK_US);
            let bit = self.data_high()?;
            self.clock(false)?;
            self.delay.delay_us(HALF_CLOCK_US);
            raw = (raw << 1) | u32::from(bit);
        }
        for _ in 0..self.gain.extra_pulses() {
            self.clock(true)?;
            self.delay.delay_us(HALF_CLOCK_US);
            self.clock(false)?;
            self.delay.delay_us(HALF_CLOCK_US);
        }

        // Sign-extend the 24-bit two's complement word.
        Ok(((raw << 8) as i32) >> 8)
    }
}

impl<D, S, T> AnalogSampler for Hx711<D, S, T>
where
    D: InputPin,
    S: OutputPin,
    T: DelayNs,
{
    fn reset(&mut self) -> Result<(), DeviceError> {
        self.clock(true)?;
        self.delay.delay_us(POWER_DOWN_US);
        self.clock(false)?;
        // The chip wakes on A/128; one conversion applies the configured gain.
        let discarded = self.read()?;
        debug!("SCALE | HX711 reset, discarded {}", discarded);
        Ok(())
    }

    fn sample(&mut self, count: usize) -> Result<Vec<i32>, DeviceError> {
        (0..count).map(|_| self.read()).collect()
    }
}
