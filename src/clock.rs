use chrono::{DateTime, Utc};
use embassy_time::Instant;

/// Maps monotonic [`Instant`]s onto wall-clock time.
///
/// Readings are stamped with the monotonic clock; sinks that print or send
/// calendar time convert through one anchor taken at startup, so a wall-clock
/// step while running does not reorder readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    origin: Instant,
    origin_utc: DateTime<Utc>,
}

impl WallClock {
    /// Anchor the current monotonic time to the current system time.
    pub fn now() -> Self {
        Self::anchored(Instant::now(), Utc::now())
    }

    pub const fn anchored(origin: Instant, origin_utc: DateTime<Utc>) -> Self {
        Self { origin, origin_utc }
    }

    pub fn to_utc(&self, instant: Instant) -> DateTime<Utc> {
        match instant.checked_duration_since(self.origin) {
            Some(elapsed) => {
                self.origin_utc + chrono::Duration::microseconds(elapsed.as_micros() as i64)
            }
            None => {
                let before = self.origin.duration_since(instant);
                self.origin_utc - chrono::Duration::microseconds(before.as_micros() as i64)
            }
        }
    }
}
