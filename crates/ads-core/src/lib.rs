//! Hardware-independent core library for ads-relay
//!
//! This crate contains all platform-agnostic logic of the ADS1115 telemetry
//! daemon: the register codec, channel resolution, the hardware and simulated
//! sensor sources, per-sink aggregation and the sampling/fan-out tasks.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts. Time comes from `embassy-time`; the
//! binary picks the time driver.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod aggregate;
pub mod bus;
pub mod channels;
pub mod codec;
pub mod pipeline;
pub mod publish;
pub mod reading;
pub mod sensors;

pub use aggregate::SinkState;
pub use channels::{ChannelSetting, ResolvedChannels};
pub use pipeline::{MAX_SINKS, Pipeline, Shutdown, ShutdownListener};
pub use publish::{Publish, PublishError};
pub use reading::Reading;
pub use sensors::{SensorError, SensorSource, Source};
