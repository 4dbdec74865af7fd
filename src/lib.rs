//! ads-relay: sample an ADS1115 on Linux and publish averaged readings
//!
//! The sampling and fan-out core lives in `ads-core`; this crate adds what a
//! host daemon needs around it: configuration, the Linux I2C transport, the
//! console and MQTT sinks and process wiring.

pub mod app;
pub mod bus;
pub mod clock;
pub mod config;
pub mod sinks;
