//! Synthetic CT sensor output, for running without hardware

use std::f32::consts::PI;

use crate::adc::{ChannelId, SampleSource, DEFAULT_MAX_COUNT};
use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    Sine,
    Square,
}

/// An AC waveform riding on a DC bias, in ADC counts, sampled at clock time
pub struct SimulatedSource<C: Clock> {
    clock: C,
    waveform: Waveform,
    bias: f32,
    amplitude: f32,
    frequency_hz: f32,
    max_count: u16,
}

impl<C: Clock> SimulatedSource<C> {
    pub fn new(clock: C, waveform: Waveform, bias: f32, amplitude: f32, frequency_hz: f32) -> Self {
        Self {
            clock,
            waveform,
            bias,
            amplitude,
            frequency_hz,
            max_count: DEFAULT_MAX_COUNT,
        }
    }

    /// Changes the peak amplitude (counts), e.g. to simulate a load switching on
    pub fn set_amplitude(&mut self, amplitude: f32) {
        self.amplitude = amplitude;
    }

    fn sample(&self) -> f32 {
        let t = self.clock.micros() as f64 / 1_000_000.0;
        let phase = (t * self.frequency_hz as f64).fract() as f32;
        let wave = match self.waveform {
            Waveform::Sine => (2.0 * PI * phase).sin(),
            Waveform::Square if phase < 0.5 => 1.0,
            Waveform::Square => -1.0,
        };
        self.bias + self.amplitude * wave
    }
}

impl<C: Clock> SampleSource for SimulatedSource<C> {
    fn configure_input(&mut self, channel: ChannelId) -> anyhow::Result<()> {
        log::debug!("Simulating input on channel {channel}");
        Ok(())
    }

    fn set_resolution(&mut self, bits: u8) -> anyhow::Result<()> {
        if bits == 0 || bits > 16 {
            anyhow::bail!("unsupported resolution: {bits} bits");
        }
        self.max_count = ((1u32 << bits) - 1) as u16;
        Ok(())
    }

    fn read_raw(&mut self, _channel: ChannelId) -> anyhow::Result<u16> {
        Ok(self.sample().round().clamp(0.0, self.max_count as f32) as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    #[test]
    fn square_wave_alternates_around_bias() {
        let clock = ManualClock::default();
        let mut source = SimulatedSource::new(clock.clone(), Waveform::Square, 2000.0, 300.0, 50.0);

        clock.advance(Duration::from_millis(5));
        assert_eq!(source.read_raw(0).unwrap(), 2300);
        clock.advance(Duration::from_millis(10));
        assert_eq!(source.read_raw(0).unwrap(), 1700);
    }

    #[test]
    fn sine_peaks_a_quarter_period_in() {
        let clock = ManualClock::default();
        let mut source = SimulatedSource::new(clock.clone(), Waveform::Sine, 2000.0, 500.0, 50.0);

        assert_eq!(source.read_raw(0).unwrap(), 2000);
        clock.advance(Duration::from_millis(5));
        assert_eq!(source.read_raw(0).unwrap(), 2500);
    }

    #[test]
    fn clamps_to_adc_range() {
        let clock = ManualClock::default();
        let mut source = SimulatedSource::new(clock.clone(), Waveform::Square, 2000.0, 3000.0, 50.0);
        source.set_resolution(12).unwrap();

        clock.advance(Duration::from_millis(1));
        assert_eq!(source.read_raw(0).unwrap(), 4095);
        clock.advance(Duration::from_millis(10));
        assert_eq!(source.read_raw(0).unwrap(), 0);

        assert!(source.set_resolution(0).is_err());
    }
}
