use alloc::vec::Vec;

use embassy_time::Instant;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{SensorError, SensorSource};
use crate::channels::ResolvedChannels;
use crate::codec::{FULL_SCALE_VOLTS, to_physical_value};
use crate::reading::Reading;

/// Upper bound (exclusive) of generated raw codes
const MAX_SIMULATED_CODE: i16 = i16::MAX;

/// Generates uniformly distributed readings for every enabled channel.
///
/// Lets the rest of the pipeline run without hardware: it never fails and
/// never waits.
pub struct SimulatedSource {
    rng: SmallRng,
    channels: ResolvedChannels,
}

impl SimulatedSource {
    pub fn new(channels: ResolvedChannels, seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            channels,
        }
    }

    pub fn channels(&self) -> &ResolvedChannels {
        &self.channels
    }
}

impl SensorSource for SimulatedSource {
    async fn sample(&mut self) -> Result<Vec<Reading>, SensorError> {
        let timestamp = Instant::now();

        let batch = self
            .channels
            .enabled()
            .iter()
            .map(|&channel| {
                let raw = self.rng.gen_range(0..MAX_SIMULATED_CODE);
                let value = to_physical_value(
                    raw,
                    FULL_SCALE_VOLTS,
                    self.channels.scale(channel),
                    self.channels.offset(channel),
                );
                Reading::new(channel, raw, value, timestamp)
            })
            .collect();

        Ok(batch)
    }

    fn shutdown(&mut self) {}
}
