use std::borrow::Borrow;

use anyhow::bail;
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        Resolution,
    },
    gpio::{ADCPin, Pin},
};

use crate::adc::{ChannelId, SampleSource};

/// One ADC input in one-shot mode, 11 dB attenuation (full 0-3.3 V range).
///
/// Several channels on the same unit can share an `AdcDriver` by reference.
pub struct EspAdcChannel<'d, T, M>
where
    T: ADCPin,
    M: Borrow<AdcDriver<'d, T::Adc>>,
{
    channel: ChannelId,
    driver: AdcChannelDriver<'d, T, M>,
}

impl<'d, T, M> EspAdcChannel<'d, T, M>
where
    T: ADCPin + Pin,
    M: Borrow<AdcDriver<'d, T::Adc>>,
{
    pub fn new(adc: M, pin: T) -> anyhow::Result<Self> {
        let channel = pin.pin() as ChannelId;
        let config = AdcChannelConfig {
            attenuation: DB_11,
            resolution: Resolution::Resolution12Bit,
            ..Default::default()
        };
        log::info!("Initializing ADC on GPIO{}", channel);
        let driver = AdcChannelDriver::new(adc, pin, &config)?;
        Ok(Self { channel, driver })
    }
}

impl<'d, T, M> SampleSource for EspAdcChannel<'d, T, M>
where
    T: ADCPin,
    M: Borrow<AdcDriver<'d, T::Adc>>,
{
    fn configure_input(&mut self, channel: ChannelId) -> anyhow::Result<()> {
        // The pin was put in analog mode when the channel driver was created
        if channel != self.channel {
            bail!("ADC driver is bound to GPIO{}, not GPIO{}", self.channel, channel);
        }
        Ok(())
    }

    fn set_resolution(&mut self, bits: u8) -> anyhow::Result<()> {
        if bits != 12 {
            bail!("only 12 bit conversions are supported, got {bits}");
        }
        Ok(())
    }

    fn read_raw(&mut self, channel: ChannelId) -> anyhow::Result<u16> {
        if channel != self.channel {
            bail!("ADC driver is bound to GPIO{}, not GPIO{}", self.channel, channel);
        }
        Ok(self.driver.read_raw()?)
    }
}
