//! Channel settings and their resolution into sampling tables
//!
//! The resolver runs once at startup. It turns the configured list of
//! [`ChannelSetting`]s into the ordered list of channels to sample plus the
//! calibration and rate lookups the sources need on every sample.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use embassy_time::Duration;
use serde::{Deserialize, Deserializer, Serialize};

use crate::codec::{DEFAULT_SAMPLE_RATE, SETTLING_OVERHEAD_MS};

const DEFAULT_SCALE: f64 = 1.0;
const DEFAULT_OFFSET: f64 = 0.0;

/// Per-channel configuration, as resolved by the configuration loader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSetting {
    /// Single-ended input index
    pub channel: u8,
    #[serde(default)]
    pub enabled: bool,
    /// Multiplier applied to the converted voltage
    #[serde(rename = "calibration_scale", default = "default_scale")]
    pub scale: f64,
    /// Added after scaling
    #[serde(rename = "calibration_offset", default)]
    pub offset: f64,
    /// Per-channel rate override. `0` in configuration means "use the global rate".
    #[serde(
        default,
        deserialize_with = "deserialize_rate_override",
        skip_serializing_if = "Option::is_none"
    )]
    pub sample_rate: Option<u32>,
}

fn default_scale() -> f64 {
    DEFAULT_SCALE
}

fn deserialize_rate_override<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.filter(|&rate| rate != 0))
}

impl ChannelSetting {
    /// An enabled channel with identity calibration and no rate override.
    pub const fn enabled(channel: u8) -> Self {
        Self {
            channel,
            enabled: true,
            scale: DEFAULT_SCALE,
            offset: DEFAULT_OFFSET,
            sample_rate: None,
        }
    }

    pub const fn with_calibration(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    pub const fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Sampling order and lookup tables derived from the channel settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedChannels {
    enabled: Vec<u8>,
    scales: BTreeMap<u8, f64>,
    offsets: BTreeMap<u8, f64>,
    rate_overrides: BTreeMap<u8, Option<u32>>,
}

impl ResolvedChannels {
    /// Enabled channels in configuration order.
    pub fn enabled(&self) -> &[u8] {
        &self.enabled
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }

    pub fn scale(&self, channel: u8) -> f64 {
        self.scales.get(&channel).copied().unwrap_or(DEFAULT_SCALE)
    }

    pub fn offset(&self, channel: u8) -> f64 {
        self.offsets.get(&channel).copied().unwrap_or(DEFAULT_OFFSET)
    }

    pub fn rate_override(&self, channel: u8) -> Option<u32> {
        self.rate_overrides.get(&channel).copied().flatten()
    }

    /// Rate the channel is converted at, given the global configured rate.
    pub fn sample_rate(&self, channel: u8, global_rate: i32) -> u32 {
        effective_sample_rate(self.rate_override(channel), global_rate)
    }
}

/// Builds the sampling tables in a single pass over `settings`.
///
/// Calibration and overrides are recorded for every entry, enabled or not.
/// Only enabled entries join the sampling order. Duplicate ids are not merged:
/// the later entry wins in the tables and an id enabled twice is sampled twice.
pub fn resolve(settings: &[ChannelSetting]) -> ResolvedChannels {
    let mut resolved = ResolvedChannels::default();

    for setting in settings {
        resolved.scales.insert(setting.channel, setting.scale);
        resolved.offsets.insert(setting.channel, setting.offset);
        resolved
            .rate_overrides
            .insert(setting.channel, setting.sample_rate);

        if setting.enabled {
            resolved.enabled.push(setting.channel);
        }
    }

    resolved
}

/// Override if present, else the global rate, else [`DEFAULT_SAMPLE_RATE`]
/// when the global rate is non-positive.
pub fn effective_sample_rate(rate_override: Option<u32>, global_rate: i32) -> u32 {
    match rate_override {
        Some(rate) if rate > 0 => rate,
        _ => match u32::try_from(global_rate) {
            Ok(rate) if rate > 0 => rate,
            _ => DEFAULT_SAMPLE_RATE,
        },
    }
}

/// Period of the sampling loop.
///
/// Models one sequential single-shot conversion per enabled channel:
/// `sum(1000 / rate + overhead)` rounded to the nearest millisecond. With no
/// enabled channel a single conversion at the global rate is assumed.
pub fn sensor_interval(channels: &ResolvedChannels, global_rate: i32) -> Duration {
    let per_conversion = |rate: u32| 1000.0 / f64::from(rate) + SETTLING_OVERHEAD_MS as f64;

    let total_ms = if channels.is_empty() {
        per_conversion(effective_sample_rate(None, global_rate))
    } else {
        channels
            .enabled()
            .iter()
            .map(|&channel| per_conversion(channels.sample_rate(channel, global_rate)))
            .sum()
    };

    Duration::from_millis((total_ms + 0.5) as u64)
}
