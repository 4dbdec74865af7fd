//! MQTT output
//!
//! Every averaged reading is published as `{"voltage": <value>, "raw": <raw>}`
//! at QoS 0 to the state topic, where `%d` stands for the channel. An empty
//! state topic publishes to `ads1115/channel/<n>` instead.
//!
//! When a discovery topic is configured, Home Assistant sensor entries are
//! published once at startup with the retain flag: one per enabled channel if
//! the discovery topic contains `%d`, a single entry otherwise.
//!
//! The client never waits on the broker while publishing. Requests go into a
//! bounded queue that [`drive_connection`] flushes; a full queue rejects the
//! snapshot.

use ads_core::pipeline::ShutdownListener;
use ads_core::publish::{Publish, PublishError};
use ads_core::reading::Reading;
use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Timer, with_timeout};
use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;
use thiserror_no_std::Error;

use crate::config::MqttConfig;

const DEFAULT_PORT: u16 = 1883;
const PER_CHANNEL_TOPIC_PREFIX: &str = "ads1115/channel/";
const CHANNEL_PLACEHOLDER: &str = "%d";

/// Pending requests the client may queue before publishing is rejected
const REQUEST_CAPACITY: usize = 64;
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MqttError {
    #[error("unsupported MQTT server address '{0}'")]
    InvalidServer(String),
    #[error("could not connect to {server}: {details}")]
    Connect { server: String, details: String },
    #[error("timed out connecting to {0}")]
    Timeout(String),
}

/// State message for one reading.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct StatePayload {
    pub voltage: f64,
    pub raw: i16,
}

impl From<&Reading> for StatePayload {
    fn from(reading: &Reading) -> Self {
        Self {
            voltage: reading.value,
            raw: reading.raw,
        }
    }
}

/// Home Assistant MQTT discovery entry for a voltage sensor.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DiscoveryPayload {
    pub name: String,
    pub state_topic: String,
    pub unit_of_measurement: &'static str,
    pub device_class: &'static str,
    pub state_class: &'static str,
    pub value_template: &'static str,
    pub json_attributes_topic: String,
    pub unique_id: String,
}

impl DiscoveryPayload {
    fn voltage(name: String, state_topic: String, unique_id: String) -> Self {
        Self {
            name,
            json_attributes_topic: state_topic.clone(),
            state_topic,
            unit_of_measurement: "V",
            device_class: "voltage",
            state_class: "measurement",
            value_template: "{{ value_json.voltage }}",
            unique_id,
        }
    }
}

/// Topic the readings of `channel` are published to.
pub fn state_topic_for(base: &str, channel: u8) -> String {
    if base.is_empty() {
        format!("{PER_CHANNEL_TOPIC_PREFIX}{channel}")
    } else {
        base.replace(CHANNEL_PLACEHOLDER, &channel.to_string())
    }
}

/// Discovery messages to publish for `config`, as `(topic, payload)` pairs.
pub fn discovery_messages(config: &MqttConfig, channels: &[u8]) -> Vec<(String, DiscoveryPayload)> {
    let Some(topic) = &config.discovery_topic else {
        return Vec::new();
    };

    let name = config
        .discovery_name
        .clone()
        .unwrap_or_else(|| format!("ADS1115 {}", config.client_id));
    let unique_id = config
        .discovery_unique_id
        .clone()
        .unwrap_or_else(|| config.client_id.clone());

    if topic.contains(CHANNEL_PLACEHOLDER) {
        channels
            .iter()
            .map(|&channel| {
                (
                    topic.replace(CHANNEL_PLACEHOLDER, &channel.to_string()),
                    DiscoveryPayload::voltage(
                        format!("{name} ch{channel}"),
                        state_topic_for(&config.state_topic, channel),
                        format!("{unique_id}_{channel}"),
                    ),
                )
            })
            .collect()
    } else {
        vec![(
            topic.clone(),
            DiscoveryPayload::voltage(name, config.state_topic.clone(), unique_id),
        )]
    }
}

/// Host and port of a `tcp://host:port`, `mqtt://host:port` or `host[:port]` server.
pub fn broker_address(server: &str) -> Result<(String, u16), MqttError> {
    let invalid = || MqttError::InvalidServer(server.to_string());

    let rest = match server.split_once("://") {
        Some(("tcp" | "mqtt", rest)) => rest,
        Some(_) => return Err(invalid()),
        None => server,
    };
    let rest = rest.trim_end_matches('/');

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
        None => (rest, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(invalid());
    }
    Ok((host.to_string(), port))
}

/// Publishing half of an MQTT connection.
pub struct MqttSink {
    client: AsyncClient,
    state_topic: String,
}

impl MqttSink {
    /// Connect to the broker, wait for it to accept the session and queue the
    /// discovery messages for `channels`.
    ///
    /// The returned [`EventLoop`] must be handed to [`drive_connection`].
    pub async fn connect(
        config: &MqttConfig,
        channels: &[u8],
    ) -> Result<(Self, EventLoop), MqttError> {
        let (host, port) = broker_address(&config.server)?;

        let mut options = MqttOptions::new(config.client_id.clone(), host, port);
        options.set_keep_alive(core::time::Duration::from_secs(KEEP_ALIVE.as_secs()));
        if let Some(username) = &config.username {
            options.set_credentials(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            );
        }

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let connected = with_timeout(CONNECT_TIMEOUT, async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => return Err(e),
                }
            }
        })
        .await;

        match connected {
            Ok(Ok(())) => info!("Connected to MQTT broker {}", config.server),
            Ok(Err(e)) => {
                return Err(MqttError::Connect {
                    server: config.server.clone(),
                    details: e.to_string(),
                });
            }
            Err(_) => return Err(MqttError::Timeout(config.server.clone())),
        }

        let sink = Self {
            client,
            state_topic: config.state_topic.clone(),
        };
        sink.announce(config, channels);
        Ok((sink, event_loop))
    }

    fn announce(&self, config: &MqttConfig, channels: &[u8]) {
        for (topic, payload) in discovery_messages(config, channels) {
            let queued = serde_json::to_vec(&payload)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    self.client
                        .try_publish(topic.clone(), QoS::AtMostOnce, true, bytes)
                        .map_err(|e| e.to_string())
                });
            match queued {
                Ok(()) => debug!("Queued discovery entry on {}", topic),
                Err(e) => warn!("MQTT discovery publish to {} failed: {}", topic, e),
            }
        }
    }
}

impl Publish for MqttSink {
    async fn publish(&mut self, readings: &[Reading]) -> Result<(), PublishError> {
        for reading in readings {
            let topic = state_topic_for(&self.state_topic, reading.channel);
            let payload = serde_json::to_vec(&StatePayload::from(reading))
                .map_err(|e| PublishError::rejected("mqtt", &e.to_string()))?;

            self.client
                .try_publish(topic, QoS::AtMostOnce, false, payload)
                .map_err(|e| PublishError::rejected("mqtt", &e.to_string()))?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), PublishError> {
        self.client
            .try_disconnect()
            .map_err(|e| PublishError::rejected("mqtt", &e.to_string()))
    }
}

/// Run the connection of one [`MqttSink`] until shutdown.
///
/// Connection errors are logged and retried. After shutdown the loop keeps
/// polling briefly so the disconnect queued by [`MqttSink::close`] is sent.
pub async fn drive_connection(mut event_loop: EventLoop, shutdown: &mut ShutdownListener<'_>) {
    loop {
        match select(event_loop.poll(), shutdown.wait()).await {
            Either::First(Ok(_)) => {}
            Either::First(Err(e)) => {
                warn!("MQTT connection error: {}", e);
                if let Either::Second(()) =
                    select(Timer::after(RECONNECT_DELAY), shutdown.wait()).await
                {
                    break;
                }
            }
            Either::Second(()) => break,
        }
    }

    let _ = with_timeout(DISCONNECT_GRACE, async {
        loop {
            match event_loop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
    debug!("MQTT connection closed");
}
