use std::io::Write;

use ads_core::publish::{Publish, PublishError};
use ads_core::reading::Reading;
use chrono::SecondsFormat;

use crate::clock::WallClock;

/// Writes one text line per reading.
pub struct ConsoleSink<W> {
    out: W,
    clock: WallClock,
}

impl<W: Write> ConsoleSink<W> {
    pub const fn new(out: W, clock: WallClock) -> Self {
        Self { out, clock }
    }

    /// `<RFC 3339 UTC> channel=<n> raw=<raw> value=<value>`
    pub fn format_line(&self, reading: &Reading) -> String {
        format!(
            "{} channel={} raw={} value={:.6}",
            self.clock
                .to_utc(reading.timestamp)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            reading.channel,
            reading.raw,
            reading.value
        )
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Publish for ConsoleSink<W> {
    async fn publish(&mut self, readings: &[Reading]) -> Result<(), PublishError> {
        let mut text = String::new();
        for reading in readings {
            text.push_str(&self.format_line(reading));
            text.push('\n');
        }

        self.out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|e| PublishError::rejected("console", &e.to_string()))
    }

    fn close(&mut self) -> Result<(), PublishError> {
        self.out
            .flush()
            .map_err(|e| PublishError::rejected("console", &e.to_string()))
    }
}
