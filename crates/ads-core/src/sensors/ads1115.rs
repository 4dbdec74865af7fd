use alloc::vec::Vec;

use embassy_time::{Instant, Timer};
use log::debug;

use super::{SensorError, SensorSource};
use crate::bus::Transact;
use crate::channels::ResolvedChannels;
use crate::codec::{
    CONFIG_REGISTER, CONVERSION_REGISTER, FULL_SCALE_VOLTS, conversion_delay, decode_result,
    encode_config, to_physical_value,
};
use crate::reading::Reading;

/// ADS1115 read in single-shot mode, one channel after the other.
///
/// Each channel is converted with its own effective sample rate: the
/// configuration register is written (which starts the conversion), the
/// source waits one conversion period plus the settling overhead, and the
/// conversion register is read back.
pub struct Ads1115Source<B> {
    /// `None` once the source has been shut down
    bus: Option<B>,
    channels: ResolvedChannels,
    global_rate: i32,
}

impl<B> Ads1115Source<B> {
    /// Create the source, checking every enabled channel against the codec.
    ///
    /// An out-of-range channel is reported here so it never surfaces while
    /// sampling.
    pub fn new(bus: B, channels: ResolvedChannels, global_rate: i32) -> Result<Self, SensorError> {
        for &channel in channels.enabled() {
            encode_config(channel, channels.sample_rate(channel, global_rate))?;
        }

        Ok(Self {
            bus: Some(bus),
            channels,
            global_rate,
        })
    }

    pub fn channels(&self) -> &ResolvedChannels {
        &self.channels
    }
}

impl<B: Transact> SensorSource for Ads1115Source<B> {
    async fn sample(&mut self) -> Result<Vec<Reading>, SensorError> {
        let bus = self.bus.as_mut().ok_or(SensorError::Closed)?;
        let mut batch = Vec::with_capacity(self.channels.enabled().len());

        for &channel in self.channels.enabled() {
            let rate = self.channels.sample_rate(channel, self.global_rate);
            let [high, low] = encode_config(channel, rate)?;

            bus.transact(&[CONFIG_REGISTER, high, low], &mut [])
                .await
                .map_err(|cause| SensorError::Io {
                    channel,
                    operation: "write config register",
                    cause,
                })?;

            Timer::after(conversion_delay(rate)).await;

            let mut result = [0u8; 2];
            bus.transact(&[CONVERSION_REGISTER], &mut result)
                .await
                .map_err(|cause| SensorError::Io {
                    channel,
                    operation: "read conversion register",
                    cause,
                })?;
            let timestamp = Instant::now();

            let raw = decode_result(result);
            let value = to_physical_value(
                raw,
                FULL_SCALE_VOLTS,
                self.channels.scale(channel),
                self.channels.offset(channel),
            );
            debug!("ADS1115 channel {}: raw={} value={:.6}", channel, raw, value);

            batch.push(Reading::new(channel, raw, value, timestamp));
        }

        Ok(batch)
    }

    fn shutdown(&mut self) {
        if self.bus.take().is_some() {
            debug!("ADS1115 bus released");
        }
    }
}
