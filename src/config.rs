use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

use crate::adc::{ChannelId, DEFAULT_REFERENCE_MV, DEFAULT_RESOLUTION_BITS};

/// Samples averaged to find the zero current offset (about 1.25 s at 1 ms each)
pub const DEFAULT_CALIBRATION_SAMPLES: usize = 1250;
/// Currents below this are calibration residue and reported as 0 A
pub const DEFAULT_NOISE_FLOOR_AMPS: f32 = 0.002;
pub const DEFAULT_LINE_FREQUENCY_HZ: f32 = 50.0;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("calibration mapping must be finite (slope={slope}, intercept={intercept})")]
    Mapping { slope: f32, intercept: f32 },
    #[error("line frequency must be positive, got {0}")]
    LineFrequency(f32),
    #[error("calibration needs at least one sample")]
    CalibrationSamples,
    #[error("noise floor must be >= 0, got {0}")]
    NoiseFloor(f32),
    #[error("ADC reference must be positive, got {0}")]
    Reference(f32),
    #[error("ADC resolution must be 1..=16 bits, got {0}")]
    Resolution(u8),
    #[error("ADC full scale must be 1..={limit} for {bits} bits, got {count}")]
    MaxCount { count: u16, bits: u8, limit: u16 },
    #[error("report_every must be at least 1")]
    ReportInterval,
}

/// Per channel settings. Only `channel`, `slope` and `intercept` are required.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub channel: ChannelId,
    /// Amps per RMS millivolt
    pub slope: f32,
    /// Amps
    pub intercept: f32,
    pub line_frequency_hz: f32,
    pub calibration_samples: usize,
    pub noise_floor_amps: f32,
    pub reference_mv: f32,
    /// Count read at `reference_mv`. Full scale of `resolution_bits` when unset.
    pub adc_max_count: Option<u16>,
    pub resolution_bits: u8,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            slope: 1.0,
            intercept: 0.0,
            line_frequency_hz: DEFAULT_LINE_FREQUENCY_HZ,
            calibration_samples: DEFAULT_CALIBRATION_SAMPLES,
            noise_floor_amps: DEFAULT_NOISE_FLOOR_AMPS,
            reference_mv: DEFAULT_REFERENCE_MV,
            adc_max_count: None,
            resolution_bits: DEFAULT_RESOLUTION_BITS,
        }
    }
}

fn full_scale(bits: u8) -> u16 {
    ((1u32 << bits) - 1) as u16
}

impl SensorConfig {
    /// Count corresponding to the reference voltage
    pub fn max_count(&self) -> u16 {
        self.adc_max_count
            .unwrap_or_else(|| full_scale(self.resolution_bits.clamp(1, 16)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.slope.is_finite() && self.intercept.is_finite()) {
            return Err(ConfigError::Mapping {
                slope: self.slope,
                intercept: self.intercept,
            });
        }
        if !(self.line_frequency_hz.is_finite() && self.line_frequency_hz > 0.0) {
            return Err(ConfigError::LineFrequency(self.line_frequency_hz));
        }
        if self.calibration_samples == 0 {
            return Err(ConfigError::CalibrationSamples);
        }
        if !(self.noise_floor_amps.is_finite() && self.noise_floor_amps >= 0.0) {
            return Err(ConfigError::NoiseFloor(self.noise_floor_amps));
        }
        if !(self.reference_mv.is_finite() && self.reference_mv > 0.0) {
            return Err(ConfigError::Reference(self.reference_mv));
        }
        if self.resolution_bits == 0 || self.resolution_bits > 16 {
            return Err(ConfigError::Resolution(self.resolution_bits));
        }
        let limit = full_scale(self.resolution_bits);
        let count = self.max_count();
        if count == 0 || count > limit {
            return Err(ConfigError::MaxCount {
                count,
                bits: self.resolution_bits,
                limit,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub sensors: Vec<SensorConfig>,
    /// Pause between polling ticks
    pub update_interval_ms: u64,
    /// Ticks between current reports
    pub report_every: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sensors: vec![SensorConfig::default()],
            update_interval_ms: 1,
            report_every: 1000,
        }
    }
}

impl MonitorConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        for (i, sensor) in config.sensors.iter().enumerate() {
            sensor.validate().with_context(|| format!("sensor {i}"))?;
        }
        if config.report_every == 0 {
            return Err(ConfigError::ReportInterval.into());
        }
        Ok(config)
    }
}
