use embassy_time::Instant;

/// One measurement of one channel.
///
/// Produced by a [`SensorSource`](crate::sensors::SensorSource) per sample and
/// by [`SinkState::drain`](crate::aggregate::SinkState::drain) per averaged
/// snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Single-ended input the value was taken from
    pub channel: u8,
    /// Conversion register code (averaged and rounded for drained readings)
    pub raw: i16,
    /// Calibrated physical value in volts
    pub value: f64,
    /// Monotonic time the conversion was read
    pub timestamp: Instant,
}

impl Reading {
    pub const fn new(channel: u8, raw: i16, value: f64, timestamp: Instant) -> Self {
        Self {
            channel,
            raw,
            value,
            timestamp,
        }
    }
}
