//! Per-sink running averages
//!
//! Every sink owns a [`SinkState`]: a map from channel to a
//! [`ChannelAccumulator`] behind its own async mutex. The sampling loop
//! absorbs each batch into every sink; each sink's publish loop drains its own
//! map on its own schedule. Sinks never share a lock, so a slow sink cannot
//! hold up another one.
//!
//! ## Averaging window
//!
//! A drain covers every sample absorbed since the previous drain of the same
//! sink. A sink whose interval is longer than the sampling interval therefore
//! publishes a rolling multi-sample average; one that is shorter sometimes
//! finds nothing to publish.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant};

use crate::reading::Reading;

/// Running sums for one channel of one sink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelAccumulator {
    /// Sum of calibrated values
    sum: f64,
    /// Sum of raw codes, widened so it cannot overflow
    raw_sum: i64,
    count: u32,
    /// Newest timestamp seen
    latest: Instant,
}

impl ChannelAccumulator {
    fn new(reading: &Reading) -> Self {
        Self {
            sum: reading.value,
            raw_sum: i64::from(reading.raw),
            count: 1,
            latest: reading.timestamp,
        }
    }

    fn add(&mut self, reading: &Reading) {
        self.sum += reading.value;
        self.raw_sum += i64::from(reading.raw);
        self.count += 1;
        // Keep the maximum, not the last write
        if reading.timestamp > self.latest {
            self.latest = reading.timestamp;
        }
    }

    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Averaged reading, or `None` when nothing has been accumulated.
    fn average(&self, channel: u8) -> Option<Reading> {
        if self.count == 0 {
            return None;
        }

        let count = i64::from(self.count);
        let raw = round_half_away_from_zero(self.raw_sum, count)
            .clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16;

        Some(Reading::new(
            channel,
            raw,
            self.sum / f64::from(self.count),
            self.latest,
        ))
    }
}

/// `numerator / denominator` rounded to nearest, ties away from zero.
///
/// Exact integer arithmetic: `denominator` must be positive.
fn round_half_away_from_zero(numerator: i64, denominator: i64) -> i64 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}

/// Aggregation state of one output sink.
pub struct SinkState {
    name: String,
    interval: Duration,
    accumulators: Mutex<CriticalSectionRawMutex, BTreeMap<u8, ChannelAccumulator>>,
}

impl SinkState {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            accumulators: Mutex::new(BTreeMap::new()),
        }
    }

    /// Like [`SinkState::new`], falling back to `default_interval` when no
    /// interval is configured.
    pub fn with_default_interval(
        name: impl Into<String>,
        interval: Option<Duration>,
        default_interval: Duration,
    ) -> Self {
        Self::new(name, interval.unwrap_or(default_interval))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish period of this sink.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Add a complete batch to this sink's running sums.
    pub async fn absorb(&self, readings: &[Reading]) {
        let mut accumulators = self.accumulators.lock().await;

        for reading in readings {
            accumulators
                .entry(reading.channel)
                .and_modify(|acc| acc.add(reading))
                .or_insert_with(|| ChannelAccumulator::new(reading));
        }
    }

    /// Average and clear everything absorbed since the last drain.
    ///
    /// Returns one reading per channel that received samples, in ascending
    /// channel order. The map is emptied, so a channel without new samples is
    /// absent from the next snapshot. An empty result means there is nothing
    /// to publish.
    pub async fn drain(&self) -> Vec<Reading> {
        let drained = {
            let mut accumulators = self.accumulators.lock().await;
            core::mem::take(&mut *accumulators)
        };

        drained
            .into_iter()
            .filter_map(|(channel, acc)| acc.average(channel))
            .collect()
    }

    /// Number of channels currently holding samples.
    pub async fn pending_channels(&self) -> usize {
        self.accumulators.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    fn at(ticks: u64) -> Instant {
        Instant::from_ticks(ticks)
    }

    #[test]
    fn test_single_sample_is_returned_unchanged() {
        let sink = SinkState::new("console", Duration::from_millis(100));
        let reading = Reading::new(2, -1234, 0.123456789, at(10));

        block_on(sink.absorb(&[reading]));
        let snapshot = block_on(sink.drain());

        assert_eq!(snapshot, [reading]);
    }

    #[test]
    fn test_two_samples_are_averaged() {
        let sink = SinkState::new("console", Duration::from_millis(100));
        block_on(sink.absorb(&[Reading::new(0, 100, 1.0, at(1))]));
        block_on(sink.absorb(&[Reading::new(0, 201, 2.5, at(2))]));

        let snapshot = block_on(sink.drain());

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].channel, 0);
        assert_eq!(snapshot[0].value, 1.75);
        // 150.5 rounds away from zero
        assert_eq!(snapshot[0].raw, 151);
        assert_eq!(snapshot[0].timestamp, at(2));
    }

    #[test]
    fn test_drain_clears_state() {
        let sink = SinkState::new("mqtt", Duration::from_millis(100));
        block_on(sink.absorb(&[
            Reading::new(0, 1, 0.1, at(1)),
            Reading::new(1, 2, 0.2, at(1)),
        ]));

        assert_eq!(block_on(sink.drain()).len(), 2);
        assert_eq!(block_on(sink.pending_channels()), 0);
        assert!(block_on(sink.drain()).is_empty());
    }

    #[test]
    fn test_channel_without_new_samples_is_absent() {
        let sink = SinkState::new("console", Duration::from_millis(100));
        block_on(sink.absorb(&[
            Reading::new(0, 1, 0.1, at(1)),
            Reading::new(1, 2, 0.2, at(1)),
        ]));
        block_on(sink.drain());

        block_on(sink.absorb(&[Reading::new(1, 4, 0.4, at(2))]));
        let snapshot = block_on(sink.drain());

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].channel, 1);
    }

    #[test]
    fn test_latest_timestamp_is_monotonic_max() {
        let sink = SinkState::new("console", Duration::from_millis(100));
        block_on(sink.absorb(&[
            Reading::new(0, 1, 0.1, at(50)),
            Reading::new(0, 1, 0.1, at(20)),
        ]));

        assert_eq!(block_on(sink.drain())[0].timestamp, at(50));
    }

    #[test]
    fn test_sinks_are_independent() {
        let fast = SinkState::new("fast", Duration::from_millis(10));
        let slow = SinkState::new("slow", Duration::from_millis(1000));
        let batch = [Reading::new(0, 10, 1.0, at(1))];

        block_on(fast.absorb(&batch));
        block_on(slow.absorb(&batch));
        assert_eq!(block_on(fast.drain()).len(), 1);

        block_on(fast.absorb(&[Reading::new(0, 20, 2.0, at(2))]));
        block_on(slow.absorb(&[Reading::new(0, 20, 2.0, at(2))]));

        let slow_snapshot = block_on(slow.drain());
        assert_eq!(slow_snapshot[0].value, 1.5);
        assert_eq!(slow_snapshot[0].raw, 15);

        let fast_snapshot = block_on(fast.drain());
        assert_eq!(fast_snapshot[0].value, 2.0);
        assert_eq!(fast_snapshot[0].raw, 20);
    }

    #[test]
    fn test_snapshot_is_ordered_by_channel() {
        let sink = SinkState::new("console", Duration::from_millis(100));
        block_on(sink.absorb(&[
            Reading::new(3, 0, 0.0, at(1)),
            Reading::new(0, 0, 0.0, at(1)),
            Reading::new(2, 0, 0.0, at(1)),
        ]));

        let channels: Vec<u8> = block_on(sink.drain()).iter().map(|r| r.channel).collect();
        assert_eq!(channels, [0, 2, 3]);
    }

    #[test]
    fn test_raw_sum_does_not_overflow() {
        let sink = SinkState::new("console", Duration::from_millis(100));
        for tick in 0..1000 {
            block_on(sink.absorb(&[Reading::new(0, i16::MAX, 4.096, at(tick))]));
        }
        assert_eq!(block_on(sink.drain())[0].raw, i16::MAX);
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round_half_away_from_zero(3, 2), 2);
        assert_eq!(round_half_away_from_zero(-3, 2), -2);
        assert_eq!(round_half_away_from_zero(5, 4), 1);
        assert_eq!(round_half_away_from_zero(-5, 4), -1);
        assert_eq!(round_half_away_from_zero(5, 3), 2);
        assert_eq!(round_half_away_from_zero(-5, 3), -2);
        assert_eq!(round_half_away_from_zero(0, 7), 0);
    }

    #[test]
    fn test_default_interval() {
        let global = Duration::from_millis(20);
        let fallback = SinkState::with_default_interval("a", None, global);
        let explicit = SinkState::with_default_interval("b", Some(Duration::from_secs(5)), global);

        assert_eq!(fallback.interval(), global);
        assert_eq!(explicit.interval(), Duration::from_secs(5));
    }
}
