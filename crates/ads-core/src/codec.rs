//! ADS1115 register codec
//!
//! Pure functions that turn a (channel, sample rate) pair into the bytes of the
//! device configuration register, and turn the two bytes of the conversion
//! register back into a signed code and a calibrated physical value.
//!
//! ## Configuration word layout
//!
//! | Bits  | Field | Value used                                   |
//! |-------|-------|----------------------------------------------|
//! | 15    | OS    | 1 (start a single conversion)                |
//! | 14:12 | MUX   | 4 + channel (AINx vs GND, channels 0..=3)    |
//! | 11:9  | PGA   | 0b001 (±4.096 V full scale)                  |
//! | 8     | MODE  | 1 (single-shot)                              |
//! | 7:5   | DR    | from [`DATA_RATES`]                          |
//! | 1:0   | COMP  | 0b11 (comparator disabled)                   |

use embassy_time::Duration;
use thiserror_no_std::Error;

/// Register pointer of the conversion result register
pub const CONVERSION_REGISTER: u8 = 0x00;

/// Register pointer of the configuration register
pub const CONFIG_REGISTER: u8 = 0x01;

/// Full-scale range selected by the PGA field, in volts
pub const FULL_SCALE_VOLTS: f64 = 4.096;

/// Extra time allowed on top of one conversion period before the result is read
pub const SETTLING_OVERHEAD_MS: u64 = 2;

/// Sample rate used whenever a configured rate is missing, non-positive or unknown
pub const DEFAULT_SAMPLE_RATE: u32 = 128;

/// Samples per second supported by the device, paired with their DR field code
pub const DATA_RATES: [(u32, u8); 8] = [
    (8, 0b000),
    (16, 0b001),
    (32, 0b010),
    (64, 0b011),
    (128, 0b100),
    (250, 0b101),
    (475, 0b110),
    (860, 0b111),
];

/// MUX field codes for single-ended inputs, indexed by channel
const SINGLE_ENDED_MUX: [u8; 4] = [0b100, 0b101, 0b110, 0b111];

const OS_START: u16 = 1 << 15;
const PGA_4_096V: u16 = 0b001 << 9;
const MODE_SINGLE_SHOT: u16 = 1 << 8;
const COMPARATOR_DISABLED: u16 = 0b11;

const CODE_SPAN: f64 = 32768.0;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid channel {0}: only single-ended inputs 0..=3 exist")]
    InvalidChannel(u8),
}

/// Returns true if `sample_rate` is one of the device's discrete data rates.
pub fn is_supported_rate(sample_rate: u32) -> bool {
    DATA_RATES.iter().any(|&(rate, _)| rate == sample_rate)
}

/// DR field code for a sample rate. Unknown rates use the 128 SPS entry.
fn data_rate_code(sample_rate: u32) -> u8 {
    DATA_RATES
        .iter()
        .find(|&&(rate, _)| rate == sample_rate)
        .or_else(|| {
            DATA_RATES
                .iter()
                .find(|&&(rate, _)| rate == DEFAULT_SAMPLE_RATE)
        })
        .map(|&(_, code)| code)
        .unwrap_or(0b100)
}

/// Builds the configuration register for a single-shot conversion on `channel`.
///
/// Returns the big-endian byte pair `[high, low]` to write after the
/// [`CONFIG_REGISTER`] pointer.
pub fn encode_config(channel: u8, sample_rate: u32) -> Result<[u8; 2], CodecError> {
    let mux = *SINGLE_ENDED_MUX
        .get(usize::from(channel))
        .ok_or(CodecError::InvalidChannel(channel))?;

    let word = OS_START
        | (u16::from(mux) << 12)
        | PGA_4_096V
        | MODE_SINGLE_SHOT
        | (u16::from(data_rate_code(sample_rate)) << 5)
        | COMPARATOR_DISABLED;

    Ok(word.to_be_bytes())
}

/// Interprets the conversion register as a big-endian two's-complement code.
pub fn decode_result(bytes: [u8; 2]) -> i16 {
    i16::from_be_bytes(bytes)
}

/// Converts a raw code into a calibrated physical value.
pub fn to_physical_value(raw: i16, full_scale_volts: f64, scale: f64, offset: f64) -> f64 {
    f64::from(raw) / CODE_SPAN * full_scale_volts * scale + offset
}

/// Time to wait between starting a conversion and reading its result.
///
/// One conversion period rounded up to the next millisecond plus
/// [`SETTLING_OVERHEAD_MS`]. Zero is treated as [`DEFAULT_SAMPLE_RATE`].
pub fn conversion_delay(sample_rate: u32) -> Duration {
    let rate = if sample_rate == 0 {
        DEFAULT_SAMPLE_RATE
    } else {
        sample_rate
    };
    let period_ms = 1000_u64.div_ceil(u64::from(rate));
    Duration::from_millis(period_ms + SETTLING_OVERHEAD_MS)
}
