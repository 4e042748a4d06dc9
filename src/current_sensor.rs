//! RMS current measurement for a single non-invasive (CT) sensor channel.
//!
//! The sensor's bias circuit centers the AC waveform around some DC level.
//! That level is measured once with no load (`calibrate`), subtracted from
//! every following sample and the remaining zero mean signal is fed to a
//! windowed statistics estimator. Its standard deviation is the RMS voltage,
//! which a linear mapping turns into amps.

use embedded_hal::blocking::delay::DelayMs;
use thiserror::Error;

use crate::adc::{AdcScale, ChannelId, SampleSource};
use crate::config::{
    ConfigError, SensorConfig, DEFAULT_CALIBRATION_SAMPLES, DEFAULT_LINE_FREQUENCY_HZ,
    DEFAULT_NOISE_FLOOR_AMPS,
};
use crate::statistics::WindowedStatistics;

/// Line cycles covered by the statistics window
const WINDOW_CYCLES: f32 = 40.0;
const CALIBRATION_SAMPLE_INTERVAL_MS: u32 = 1;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("calibration needs at least one sample")]
    InvalidSampleCount,
    #[error("line frequency must be positive and finite, got {0} Hz")]
    InvalidFrequency(f32),
    #[error("invalid sensor configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("ADC error: {0}")]
    Adc(#[from] anyhow::Error),
}

/// Statistics window in seconds for a line frequency
pub fn window_for_frequency(frequency_hz: f32) -> Result<f32, SensorError> {
    let window = WINDOW_CYCLES / frequency_hz;
    if frequency_hz > 0.0 && window.is_finite() && window > 0.0 {
        Ok(window)
    } else {
        Err(SensorError::InvalidFrequency(frequency_hz))
    }
}

pub struct CurrentSensor<S, D, W>
where
    S: SampleSource,
    D: DelayMs<u32>,
    W: WindowedStatistics,
{
    channel: ChannelId,
    slope: f32,
    intercept: f32,
    /// DC bias in mV
    offset: f32,
    window_secs: f32,
    scale: AdcScale,
    resolution_bits: u8,
    noise_floor: f32,
    calibration_samples: usize,
    last_rms_mv: f32,
    last_current: f32,
    calibrated: bool,
    warned_uncalibrated: bool,
    /// Failed reads since the last report
    dropped_samples: u32,

    source: S,
    delay: D,
    stats: W,
}

impl<S, D, W> CurrentSensor<S, D, W>
where
    S: SampleSource,
    D: DelayMs<u32>,
    W: WindowedStatistics,
{
    /// Creates an uncalibrated sensor for a 50 Hz line and the 12 bit ESP32 ADC.
    /// `current = intercept + slope * rms_mv`
    pub fn new(
        channel: ChannelId,
        slope: f32,
        intercept: f32,
        source: S,
        delay: D,
        stats: W,
    ) -> Self {
        Self {
            channel,
            slope,
            intercept,
            offset: 0.0,
            window_secs: WINDOW_CYCLES / DEFAULT_LINE_FREQUENCY_HZ,
            scale: AdcScale::default(),
            resolution_bits: crate::adc::DEFAULT_RESOLUTION_BITS,
            noise_floor: DEFAULT_NOISE_FLOOR_AMPS,
            calibration_samples: DEFAULT_CALIBRATION_SAMPLES,
            last_rms_mv: 0.0,
            last_current: 0.0,
            calibrated: false,
            warned_uncalibrated: false,
            dropped_samples: 0,
            source,
            delay,
            stats,
        }
    }

    pub fn from_config(
        config: &SensorConfig,
        source: S,
        delay: D,
        stats: W,
    ) -> Result<Self, SensorError> {
        config.validate()?;

        let mut sensor = Self::new(
            config.channel,
            config.slope,
            config.intercept,
            source,
            delay,
            stats,
        );
        sensor.window_secs = window_for_frequency(config.line_frequency_hz)?;
        sensor.scale = AdcScale {
            reference_mv: config.reference_mv,
            max_count: config.max_count(),
        };
        sensor.resolution_bits = config.resolution_bits;
        sensor.noise_floor = config.noise_floor_amps;
        sensor.calibration_samples = config.calibration_samples;
        Ok(sensor)
    }

    /// Configures the ADC input and the statistics window. Call once before sampling.
    ///
    /// This reconfigures the whole ADC peripheral, other channels on it share the resolution.
    pub fn begin(&mut self) -> Result<(), SensorError> {
        self.source.configure_input(self.channel)?;
        self.source.set_resolution(self.resolution_bits)?;
        self.stats.set_window_secs(self.window_secs);
        log::debug!(
            "Sensor on channel {} ready, window {:.3} s",
            self.channel,
            self.window_secs
        );
        Ok(())
    }

    /// Measures the zero current DC offset. Must be called with no load.
    ///
    /// Blocks for about `samples` milliseconds. If a read fails midway the
    /// previous offset and calibration state are kept.
    pub fn calibrate(&mut self, samples: usize) -> Result<f32, SensorError> {
        if samples == 0 {
            return Err(SensorError::InvalidSampleCount);
        }
        log::info!("Calibrating sensor on channel {}...", self.channel);

        let mut sum = 0.0f64;
        for _ in 0..samples {
            sum += self.read_millivolts()? as f64;
            self.delay.delay_ms(CALIBRATION_SAMPLE_INTERVAL_MS);
        }

        self.offset = (sum / samples as f64) as f32;
        self.calibrated = true;
        log::info!(
            "Channel {} zero offset: {:.2} mV",
            self.channel,
            self.offset
        );
        Ok(self.offset)
    }

    /// Feeds one offset corrected sample to the statistics. Call continuously.
    pub fn update(&mut self) {
        if !self.calibrated {
            if !self.warned_uncalibrated {
                log::warn!(
                    "Sensor on channel {} is not calibrated, ignoring samples",
                    self.channel
                );
                self.warned_uncalibrated = true;
            }
            return;
        }

        match self.read_millivolts() {
            Ok(mv) => self.stats.input(mv - self.offset),
            Err(e) => {
                // Only the first failure of each report period is logged
                if self.dropped_samples == 0 {
                    log::warn!("Channel {}: dropping sample: {}", self.channel, e);
                }
                self.dropped_samples = self.dropped_samples.saturating_add(1);
            }
        }
    }

    /// RMS current in amps over the current window, 0 while uncalibrated.
    /// `label` tells channels apart in the report line.
    pub fn current(&mut self, label: usize) -> f32 {
        if !self.calibrated {
            return 0.0;
        }

        // Standard deviation equals RMS here because the offset was removed
        self.last_rms_mv = self.stats.sigma();
        let amps = self.intercept + self.slope * self.last_rms_mv;
        self.last_current = if amps < self.noise_floor { 0.0 } else { amps };

        log::info!(
            "Corrected RMS: {:.3} mV  |  TRMS_{}: {:.3} A",
            self.last_rms_mv,
            label,
            self.last_current
        );
        if self.dropped_samples > 0 {
            log::warn!(
                "Channel {}: {} sample(s) dropped since last report",
                self.channel,
                self.dropped_samples
            );
            self.dropped_samples = 0;
        }
        self.last_current
    }

    /// Tracks a different line frequency. The window spans 40 cycles.
    pub fn set_window(&mut self, frequency_hz: f32) -> Result<(), SensorError> {
        let window = window_for_frequency(frequency_hz)?;
        self.apply_window(window);
        Ok(())
    }

    /// Sets a window from `window_for_frequency`
    pub(crate) fn apply_window(&mut self, window_secs: f32) {
        self.window_secs = window_secs;
        self.stats.set_window_secs(window_secs);
    }

    /// DC offset in mV, 0 until calibrated
    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn window_secs(&self) -> f32 {
        self.window_secs
    }

    pub fn last_rms_mv(&self) -> f32 {
        self.last_rms_mv
    }

    pub fn last_current(&self) -> f32 {
        self.last_current
    }

    /// Failed reads since the last `current()`
    pub fn dropped_samples(&self) -> u32 {
        self.dropped_samples
    }

    /// Sample count configured for calibration
    pub fn calibration_samples(&self) -> usize {
        self.calibration_samples
    }

    fn read_millivolts(&mut self) -> anyhow::Result<f32> {
        let raw = self.source.read_raw(self.channel)?;
        Ok(self.scale.to_millivolts(raw))
    }
}
