mod ads1115;
mod simulated;

pub use ads1115::Ads1115Source;
pub use simulated::SimulatedSource;

use alloc::vec::Vec;
use core::future::Future;

use thiserror_no_std::Error;

use crate::bus::{BusError, Transact};
use crate::codec::CodecError;
use crate::reading::Reading;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{0}")]
    Codec(CodecError),
    #[error("{operation} failed on channel {channel}: {cause}")]
    Io {
        channel: u8,
        operation: &'static str,
        cause: BusError,
    },
    #[error("sensor has been shut down")]
    Closed,
}

impl From<CodecError> for SensorError {
    fn from(value: CodecError) -> Self {
        Self::Codec(value)
    }
}

/// A producer of reading batches.
pub trait SensorSource {
    /// Read every enabled channel once, in resolver order.
    ///
    /// Either the whole batch is returned or an error; never a partial batch.
    fn sample(&mut self) -> impl Future<Output = Result<Vec<Reading>, SensorError>>;

    /// Release the underlying resources. Calling it again is a no-op.
    fn shutdown(&mut self);
}

/// The sensor variant chosen at startup.
pub enum Source<B> {
    Hardware(Ads1115Source<B>),
    Simulated(SimulatedSource),
}

impl<B> Source<B> {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Hardware(_) => "ads1115",
            Self::Simulated(_) => "simulation",
        }
    }
}

impl<B: Transact> SensorSource for Source<B> {
    async fn sample(&mut self) -> Result<Vec<Reading>, SensorError> {
        match self {
            Self::Hardware(source) => source.sample().await,
            Self::Simulated(source) => source.sample().await,
        }
    }

    fn shutdown(&mut self) {
        match self {
            Self::Hardware(source) => source.shutdown(),
            Self::Simulated(source) => source.shutdown(),
        }
    }
}

impl<B> From<Ads1115Source<B>> for Source<B> {
    fn from(value: Ads1115Source<B>) -> Self {
        Self::Hardware(value)
    }
}

impl<B> From<SimulatedSource> for Source<B> {
    fn from(value: SimulatedSource) -> Self {
        Self::Simulated(value)
    }
}
