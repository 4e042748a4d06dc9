//! Streaming mean / standard deviation over a trailing time window

use std::f32::consts::TAU;

use crate::clock::Clock;

#[cfg(test)]
use mockall::automock;

/// A streaming estimator whose statistics only consider roughly the last
/// `window` seconds of input.
#[cfg_attr(test, automock)]
pub trait WindowedStatistics {
    fn set_window_secs(&mut self, window: f32);
    fn input(&mut self, sample: f32);
    /// Standard deviation of the current window. Does not consume samples.
    fn sigma(&self) -> f32;
}

/// First order low pass filter driven by elapsed time
#[derive(Debug, Clone)]
struct LowPass {
    tau_secs: f32,
    value: f32,
    seeded: bool,
}

impl LowPass {
    fn new(tau_secs: f32) -> Self {
        Self {
            tau_secs,
            value: 0.0,
            seeded: false,
        }
    }

    fn input(&mut self, x: f32, dt_secs: f32) {
        if !self.seeded {
            self.value = x;
            self.seeded = true;
            return;
        }
        let alpha = 1.0 - (-dt_secs / self.tau_secs).exp();
        self.value += alpha * (x - self.value);
    }
}

/// Exponentially windowed mean and variance.
///
/// Both the mean and the squared deviation from it go through a low pass
/// filter with a cutoff of `1 / window` Hz, i.e. a time constant of
/// `window / 2π`. Older samples fade out continuously instead of dropping off
/// a ring buffer, and a step change has settled after about one window.
pub struct RunningStatistics<C: Clock> {
    clock: C,
    mean: LowPass,
    variance: LowPass,
    last_input_us: Option<u64>,
}

impl<C: Clock> RunningStatistics<C> {
    pub fn new(clock: C, window_secs: f32) -> Self {
        Self {
            clock,
            mean: LowPass::new(window_secs / TAU),
            variance: LowPass::new(window_secs / TAU),
            last_input_us: None,
        }
    }

    pub fn window_secs(&self) -> f32 {
        self.mean.tau_secs * TAU
    }

    pub fn mean(&self) -> f32 {
        self.mean.value
    }

    pub fn variance(&self) -> f32 {
        self.variance.value.max(0.0)
    }
}

impl<C: Clock> WindowedStatistics for RunningStatistics<C> {
    fn set_window_secs(&mut self, window: f32) {
        if !(window.is_finite() && window > 0.0) {
            log::warn!("Ignoring statistics window of {window} s");
            return;
        }
        self.mean.tau_secs = window / TAU;
        self.variance.tau_secs = window / TAU;
    }

    fn input(&mut self, sample: f32) {
        let now = self.clock.micros();
        let dt_secs = self
            .last_input_us
            .map(|last| now.saturating_sub(last) as f32 / 1_000_000.0)
            .unwrap_or(0.0);
        self.last_input_us = Some(now);

        self.mean.input(sample, dt_secs);
        let deviation = sample - self.mean.value;
        self.variance.input(deviation * deviation, dt_secs);
    }

    fn sigma(&self) -> f32 {
        self.variance().sqrt()
    }
}
