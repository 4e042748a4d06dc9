use std::sync::{Arc, Mutex};

use anyhow::anyhow;

#[cfg(test)]
use mockall::automock;

/// ADC input number (GPIO) a sensor is wired to
pub type ChannelId = u8;

/// A blocking, single-shot ADC.
///
/// Several channels may live on the same peripheral; wrap the source in an
/// `Arc<Mutex<_>>` to share it between sensors.
#[cfg_attr(test, automock)]
pub trait SampleSource {
    /// Prepares the pin as an analog input.
    fn configure_input(&mut self, channel: ChannelId) -> anyhow::Result<()>;
    /// Sets the conversion width in bits.
    fn set_resolution(&mut self, bits: u8) -> anyhow::Result<()>;
    /// Takes one conversion, in raw counts.
    fn read_raw(&mut self, channel: ChannelId) -> anyhow::Result<u16>;
}

impl<S: SampleSource> SampleSource for Arc<Mutex<S>> {
    fn configure_input(&mut self, channel: ChannelId) -> anyhow::Result<()> {
        self.lock()
            .map_err(|e| anyhow!("ADC lock poisoned: {e}"))?
            .configure_input(channel)
    }

    fn set_resolution(&mut self, bits: u8) -> anyhow::Result<()> {
        self.lock()
            .map_err(|e| anyhow!("ADC lock poisoned: {e}"))?
            .set_resolution(bits)
    }

    fn read_raw(&mut self, channel: ChannelId) -> anyhow::Result<u16> {
        self.lock()
            .map_err(|e| anyhow!("ADC lock poisoned: {e}"))?
            .read_raw(channel)
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn configure_input(&mut self, channel: ChannelId) -> anyhow::Result<()> {
        (**self).configure_input(channel)
    }

    fn set_resolution(&mut self, bits: u8) -> anyhow::Result<()> {
        (**self).set_resolution(bits)
    }

    fn read_raw(&mut self, channel: ChannelId) -> anyhow::Result<u16> {
        (**self).read_raw(channel)
    }
}

/// ESP32 reference voltage
pub const DEFAULT_REFERENCE_MV: f32 = 3300.0;
/// Full scale of a 12 bit conversion
pub const DEFAULT_MAX_COUNT: u16 = 4095;
pub const DEFAULT_RESOLUTION_BITS: u8 = 12;

/// Linear conversion from raw counts to millivolts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcScale {
    pub reference_mv: f32,
    pub max_count: u16,
}

impl Default for AdcScale {
    fn default() -> Self {
        Self {
            reference_mv: DEFAULT_REFERENCE_MV,
            max_count: DEFAULT_MAX_COUNT,
        }
    }
}

impl AdcScale {
    pub fn to_millivolts(&self, raw: u16) -> f32 {
        self.reference_mv * raw as f32 / self.max_count as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;
    use std::thread;

    #[test]
    fn full_scale_is_reference_voltage() {
        let scale = AdcScale::default();
        assert_eq!(scale.to_millivolts(0), 0.0);
        assert_eq!(scale.to_millivolts(4095), 3300.0);
        assert!((scale.to_millivolts(2048) - 1650.4).abs() < 0.1);
    }

    #[test]
    fn shared_source_forwards_calls() {
        let mut adc = MockSampleSource::new();
        adc.expect_configure_input()
            .with(eq(4))
            .once()
            .returning(|_| Ok(()));
        adc.expect_read_raw()
            .with(eq(4))
            .times(2)
            .returning(|_| Ok(1234));

        let shared = Arc::new(Mutex::new(adc));
        let mut a = shared.clone();
        let mut b = shared.clone();
        a.configure_input(4).unwrap();
        assert_eq!(a.read_raw(4).unwrap(), 1234);
        assert_eq!(b.read_raw(4).unwrap(), 1234);
    }

    #[test]
    fn boxed_source_forwards_calls() {
        let mut adc = MockSampleSource::new();
        adc.expect_set_resolution()
            .with(eq(12))
            .once()
            .returning(|_| Ok(()));
        adc.expect_read_raw().returning(|_| Ok(7));

        let mut boxed: Box<dyn SampleSource> = Box::new(adc);
        boxed.set_resolution(12).unwrap();
        assert_eq!(boxed.read_raw(0).unwrap(), 7);
    }

    #[test]
    fn poisoned_lock_is_an_error() {
        let shared = Arc::new(Mutex::new(MockSampleSource::new()));
        let poisoner = shared.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();

        let mut source = shared.clone();
        assert!(source.read_raw(1).is_err());
    }
}
