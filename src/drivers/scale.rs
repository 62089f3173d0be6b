//! Load-cell scale pipeline.
//!
//! Raw amplifier counts → calibrated, tared weight:
//!
//! 1. add `scale_offset` to every sample
//! 2. sort; median = element at `round(N/2)`
//! 3. keep samples inside `[0.75 × median, 1.25 × median]`
//! 4. `weight = (mean(kept) − scale_baseline) × scale_gain − tare`
//!
//! The filtering step is a pure function ([`filter_and_calibrate`]) so it
//! can be tested without a sampler.

use log::{info, warn};

use crate::app::ports::{AnalogSampler, ConfigStore};
use crate::config::{ConfigHandle, SystemConfig};
use crate::error::{Error, MeasurementError};

/// Lower edge of the outlier band, as a fraction of the median.
pub const BAND_LOW: f64 = 0.75;
/// Upper edge of the outlier band, as a fraction of the median.
pub const BAND_HIGH: f64 = 1.25;

/// Calibration constants, snapshotted from config for one measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub offset: f64,
    pub baseline: f64,
    pub gain: f64,
    pub tare: f64,
}

impl Calibration {
    pub fn from_config(cfg: &SystemConfig) -> Self {
        Self {
            offset: cfg.scale_offset,
            baseline: cfg.scale_baseline,
            gain: cfg.scale_gain,
            tare: cfg.tare,
        }
    }
}

/// One finished measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Mean of the retained samples (offset applied).
    pub raw: f64,
    /// Calibrated, tared weight.
    pub weight: f64,
    /// How many samples survived the band.
    pub retained: usize,
}

/// Index of the median element for `n` sorted samples.
fn median_index(n: usize) -> usize {
    let idx = (n as f64 / 2.0).round_ties_even() as usize;
    idx.min(n.saturating_sub(1))
}

/// Run the filter and calibration steps over one batch of samples.
pub fn filter_and_calibrate(
    samples: &[i32],
    cal: &Calibration,
) -> Result<Measurement, MeasurementError> {
    if samples.is_empty() {
        return Err(MeasurementError::NoSamples);
    }

    let mut values: Vec<f64> = samples.iter().map(|&s| f64::from(s) + cal.offset).collect();
    values.sort_by(f64::total_cmp);
    let median = values[median_index(values.len())];

    let a = median * BAND_LOW;
    let b = median * BAND_HIGH;
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

    let kept: Vec<f64> = values.into_iter().filter(|v| (lo..=hi).contains(v)).collect();
    if kept.is_empty() {
        return Err(MeasurementError::AllRejected { median });
    }

    let raw = kept.iter().sum::<f64>() / kept.len() as f64;
    let weight = (raw - cal.baseline) * cal.gain - cal.tare;
    Ok(Measurement {
        raw,
        weight,
        retained: kept.len(),
    })
}

// ---------------------------------------------------------------------------
// Scale
// ---------------------------------------------------------------------------

/// Sampler plus the live calibration from config.
pub struct Scale {
    sampler: Box<dyn AnalogSampler>,
    config: ConfigHandle,
}

impl Scale {
    pub fn new(sampler: Box<dyn AnalogSampler>, config: ConfigHandle) -> Self {
        Self { sampler, config }
    }

    /// Reset the amplifier and take one measurement with the current tare.
    pub fn measure(&mut self) -> Result<Measurement, Error> {
        let cfg = self.config.snapshot();
        self.measure_with(&Calibration::from_config(&cfg), cfg.num_measurements)
    }

    fn measure_with(&mut self, cal: &Calibration, count: u16) -> Result<Measurement, Error> {
        self.sampler.reset()?;
        let samples = self.sampler.sample(usize::from(count))?;
        let m = filter_and_calibrate(&samples, cal)?;
        if m.retained < samples.len() {
            info!(
                "SCALE | {} of {} samples outside band, rejected",
                samples.len() - m.retained,
                samples.len()
            );
        }
        Ok(m)
    }

    /// Re-zero: measure with no tare and store the result as the new tare.
    ///
    /// The stored value is in calibrated units (offset, baseline and gain
    /// already applied), not a raw ADC count, because the pipeline
    /// subtracts tare after gain.  The next measurement at the same load
    /// reads 0.
    pub fn tare(&mut self, store: &dyn ConfigStore) -> Result<f64, Error> {
        let cfg = self.config.snapshot();
        let cal = Calibration {
            tare: 0.0,
            ..Calibration::from_config(&cfg)
        };
        let zero = self.measure_with(&cal, cfg.num_measurements)?.weight;
        store.set("tare", &zero.to_string())?;
        if let Err(e) = self.config.reload(store) {
            warn!("SCALE | tare stored but config reload failed: {}", e);
        }
        info!("SCALE | tare set to {:.3}", zero);
        Ok(zero)
    }
}
