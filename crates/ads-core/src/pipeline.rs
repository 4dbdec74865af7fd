//! Sampling and fan-out tasks
//!
//! One sampling task pulls batches from the [`SensorSource`] at the global
//! sensor interval and absorbs each successful batch into every sink. One
//! publish task per sink drains that sink at its own interval and hands the
//! averaged snapshot to its [`Publish`] implementation. All tasks race their
//! timer against a shared [`Shutdown`] signal and stop as soon as it fires.
//!
//! The tasks are plain futures: the caller decides how to run them (spawned on
//! an executor, or joined).
//!
//! ```rust,ignore
//! let pipeline = Pipeline::new(interval, [("console", None)])?;
//! let mut sampler_stop = pipeline.shutdown().listener()?;
//! let mut sink_stop = pipeline.shutdown().listener()?;
//!
//! join(
//!     sampling_loop(&mut source, pipeline.sinks(), pipeline.sensor_interval(), &mut sampler_stop),
//!     publish_loop(&pipeline.sinks()[0], &mut console, &mut sink_stop),
//! )
//! .await;
//! ```

use alloc::string::String;
use alloc::vec::Vec;

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::watch::{Receiver, Watch};
use embassy_time::{Duration, Instant, Ticker};
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::aggregate::SinkState;
use crate::publish::Publish;
use crate::sensors::SensorSource;

/// Maximum number of output sinks one pipeline can feed
pub const MAX_SINKS: usize = 8;

/// Tasks that can observe the shutdown signal: the sampler, every publish
/// task, and one connection driver per sink
pub const SHUTDOWN_LISTENERS: usize = 2 * MAX_SINKS + 1;

/// Shortest period a ticker is allowed to run at
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineError {
    #[error("no output sinks configured")]
    NoSinks,
    #[error("{0} sinks configured, at most 8 are supported")]
    TooManySinks(usize),
    #[error("too many shutdown listeners")]
    TooManyListeners,
}

/// Broadcast stop signal shared by every pipeline task.
pub struct Shutdown {
    watch: Watch<CriticalSectionRawMutex, (), SHUTDOWN_LISTENERS>,
}

impl Shutdown {
    pub const fn new() -> Self {
        Self {
            watch: Watch::new(),
        }
    }

    /// Ask every task to stop. Triggering more than once has no further effect.
    pub fn trigger(&self) {
        self.watch.sender().send(());
    }

    /// Register one task. A listener created after [`Shutdown::trigger`]
    /// sees the signal immediately.
    pub fn listener(&self) -> Result<ShutdownListener<'_>, PipelineError> {
        self.watch
            .receiver()
            .map(|receiver| ShutdownListener { receiver })
            .ok_or(PipelineError::TooManyListeners)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// One task's view of the [`Shutdown`] signal.
pub struct ShutdownListener<'a> {
    receiver: Receiver<'a, CriticalSectionRawMutex, (), SHUTDOWN_LISTENERS>,
}

impl ShutdownListener<'_> {
    /// Resolves once shutdown has been triggered.
    pub async fn wait(&mut self) {
        self.receiver.get().await
    }

    pub fn is_triggered(&mut self) -> bool {
        self.receiver.try_get().is_some()
    }
}

/// Sink states and shared signal of one sampling pipeline.
pub struct Pipeline {
    sensor_interval: Duration,
    sinks: Vec<SinkState>,
    shutdown: Shutdown,
}

impl Pipeline {
    /// Create one [`SinkState`] per `(name, interval)` pair.
    ///
    /// Sinks without an interval publish at `sensor_interval`.
    pub fn new<I, N>(sensor_interval: Duration, sinks: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = (N, Option<Duration>)>,
        N: Into<String>,
    {
        let sinks: Vec<SinkState> = sinks
            .into_iter()
            .map(|(name, interval)| {
                SinkState::with_default_interval(name, interval, sensor_interval)
            })
            .collect();

        if sinks.is_empty() {
            return Err(PipelineError::NoSinks);
        }
        if sinks.len() > MAX_SINKS {
            return Err(PipelineError::TooManySinks(sinks.len()));
        }

        Ok(Self {
            sensor_interval,
            sinks,
            shutdown: Shutdown::new(),
        })
    }

    pub const fn sensor_interval(&self) -> Duration {
        self.sensor_interval
    }

    pub fn sinks(&self) -> &[SinkState] {
        &self.sinks
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }
}

/// Sample at `period` and feed every sink until shutdown.
///
/// A failed sample is logged and dropped; no sink sees any part of it. A batch
/// that outlasts `period` is followed by the next one straight away, but
/// missed ticks are not queued up. On shutdown the source is released and
/// undrained sums are left in place.
pub async fn sampling_loop<S: SensorSource>(
    source: &mut S,
    sinks: &[SinkState],
    period: Duration,
    shutdown: &mut ShutdownListener<'_>,
) {
    info!(
        "Sampling every {} ms into {} sink(s)",
        period.as_millis(),
        sinks.len()
    );

    let period = period.max(MIN_PERIOD);
    let mut ticker = Ticker::every(period);
    loop {
        // Shutdown is polled first: a lagging ticker is always ready
        if let Either::First(()) = select(shutdown.wait(), ticker.next()).await {
            break;
        }

        let started = Instant::now();
        match source.sample().await {
            Ok(batch) => {
                for sink in sinks {
                    sink.absorb(&batch).await;
                }
            }
            Err(e) => warn!("Sensor read failed, dropping sample: {}", e),
        }

        // Overran: at most one tick is owed, counted from this batch's start
        if started.elapsed() >= period {
            ticker.reset_at(started);
        }
    }

    source.shutdown();
    info!("Sampling stopped");
}

/// Drain `sink` every interval and publish non-empty snapshots until shutdown.
///
/// Delivery is at most once: a snapshot the publisher rejects is logged and
/// lost. The publisher is closed on shutdown.
pub async fn publish_loop<P: Publish>(
    sink: &SinkState,
    publisher: &mut P,
    shutdown: &mut ShutdownListener<'_>,
) {
    debug!(
        "Publishing '{}' every {} ms",
        sink.name(),
        sink.interval().as_millis()
    );

    let mut ticker = Ticker::every(sink.interval().max(MIN_PERIOD));
    loop {
        if let Either::First(()) = select(shutdown.wait(), ticker.next()).await {
            break;
        }

        let snapshot = sink.drain().await;
        if snapshot.is_empty() {
            continue;
        }

        if let Err(e) = publisher.publish(&snapshot).await {
            error!(
                "Publish to '{}' failed, dropping {} reading(s): {}",
                sink.name(),
                snapshot.len(),
                e
            );
        }
    }

    if let Err(e) = publisher.close() {
        warn!("Closing '{}' failed: {}", sink.name(), e);
    }
    info!("Publisher '{}' stopped", sink.name());
}
