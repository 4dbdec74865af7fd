//! Startup wiring and task supervision
//!
//! [`run`] builds the sensor source and sinks from a validated
//! [`RelayConfig`], spawns one sampling task, one publish task per sink and
//! one connection task per MQTT sink on the current `LocalSet`, then waits for
//! SIGINT or SIGTERM and shuts everything down.

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use ads_core::channels::{resolve, sensor_interval};
use ads_core::pipeline::{Pipeline, PipelineError, publish_loop, sampling_loop};
use ads_core::sensors::{Ads1115Source, SensorError, SimulatedSource, Source};
use embassy_futures::select::{Either, select};
use log::{error, info};
use static_cell::StaticCell;
use thiserror_no_std::Error;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::{JoinHandle, spawn_local};

use crate::bus::{self, LinuxBus, OpenBusError};
use crate::clock::WallClock;
use crate::config::{OutputKind, RelayConfig, SensorMode};
use crate::sinks::{ConsoleSink, MqttError, MqttSink, Sink, drive_connection};

static PIPELINE: StaticCell<Pipeline> = StaticCell::new();

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I2C setup failed: {0}")]
    Bus(OpenBusError),
    #[error("Sensor setup failed: {0}")]
    Sensor(SensorError),
    #[error("MQTT setup failed: {0}")]
    Mqtt(MqttError),
    #[error("Pipeline setup failed: {0}")]
    Pipeline(PipelineError),
    #[error("Signal handling failed: {0}")]
    Signal(String),
    #[error("Relay is already running")]
    AlreadyRunning,
}

impl From<OpenBusError> for AppError {
    fn from(value: OpenBusError) -> Self {
        Self::Bus(value)
    }
}

impl From<SensorError> for AppError {
    fn from(value: SensorError) -> Self {
        Self::Sensor(value)
    }
}

impl From<MqttError> for AppError {
    fn from(value: MqttError) -> Self {
        Self::Mqtt(value)
    }
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

/// Run the relay until SIGINT or SIGTERM.
///
/// Must be called inside a `tokio::task::LocalSet`. Only one relay can run per
/// process.
pub async fn run(config: RelayConfig) -> Result<(), AppError> {
    let channels = resolve(&config.channels);
    let interval = sensor_interval(&channels, config.sample_rate);
    info!(
        "Sensor {:?} on {} at 0x{:02X}, channels {:?}, {} SPS, sampling every {} ms",
        config.sensor,
        bus::device_path(&config.i2c_bus),
        config.i2c_address,
        channels.enabled(),
        config.sample_rate,
        interval.as_millis()
    );

    let mut source: Source<LinuxBus> = match config.sensor {
        SensorMode::Hardware => {
            let bus = bus::open(&config.i2c_bus, config.i2c_address)?;
            Ads1115Source::new(bus, channels.clone(), config.sample_rate)?.into()
        }
        SensorMode::Simulation => SimulatedSource::new(channels.clone(), seed()).into(),
    };
    info!("Using {} source", source.kind());

    let pipeline = Pipeline::new(
        interval,
        config
            .outputs
            .iter()
            .map(|output| (output.kind.name(), output.interval)),
    )?;
    let pipeline: &'static Pipeline = PIPELINE
        .try_init(pipeline)
        .ok_or(AppError::AlreadyRunning)?;

    let clock = WallClock::now();
    let mut sinks = Vec::with_capacity(config.outputs.len());
    let mut connections = Vec::new();
    for (output, state) in config.outputs.iter().zip(pipeline.sinks()) {
        let sink = match &output.kind {
            OutputKind::Console => Sink::Console(ConsoleSink::new(io::stdout(), clock)),
            OutputKind::Mqtt(mqtt) => {
                let (sink, connection) = MqttSink::connect(mqtt, channels.enabled()).await?;
                connections.push(connection);
                Sink::Mqtt(sink)
            }
        };
        info!(
            "Output {} publishes every {} ms",
            sink.kind(),
            state.interval().as_millis()
        );
        sinks.push(sink);
    }

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let mut sampler_stop = pipeline.shutdown().listener()?;
    tasks.push(spawn_local(async move {
        sampling_loop(
            &mut source,
            pipeline.sinks(),
            pipeline.sensor_interval(),
            &mut sampler_stop,
        )
        .await
    }));

    for (state, mut sink) in pipeline.sinks().iter().zip(sinks) {
        let mut stop = pipeline.shutdown().listener()?;
        tasks.push(spawn_local(async move {
            publish_loop(state, &mut sink, &mut stop).await
        }));
    }

    for connection in connections {
        let mut stop = pipeline.shutdown().listener()?;
        tasks.push(spawn_local(async move {
            drive_connection(connection, &mut stop).await
        }));
    }

    let signalled = wait_for_signal().await;
    info!("Shutting down");
    pipeline.shutdown().trigger();

    for task in tasks {
        if let Err(e) = task.await {
            error!("Task ended abnormally: {}", e);
        }
    }
    info!("Shutdown complete");

    signalled
}

async fn wait_for_signal() -> Result<(), AppError> {
    let mut terminate =
        signal(SignalKind::terminate()).map_err(|e| AppError::Signal(e.to_string()))?;

    match select(tokio::signal::ctrl_c(), terminate.recv()).await {
        Either::First(result) => result.map_err(|e| AppError::Signal(e.to_string())),
        Either::Second(_) => Ok(()),
    }
}

/// Seed for the simulated source.
fn seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
