mod console;
mod mqtt;

pub use console::ConsoleSink;
pub use mqtt::{
    DiscoveryPayload, MqttError, MqttSink, StatePayload, broker_address, discovery_messages,
    drive_connection, state_topic_for,
};

use std::io::Stdout;

use ads_core::publish::{Publish, PublishError};
use ads_core::reading::Reading;

/// The output variants a configured sink can take.
pub enum Sink {
    Console(ConsoleSink<Stdout>),
    Mqtt(MqttSink),
}

impl Sink {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Console(_) => "console",
            Self::Mqtt(_) => "mqtt",
        }
    }
}

impl Publish for Sink {
    async fn publish(&mut self, readings: &[Reading]) -> Result<(), PublishError> {
        match self {
            Self::Console(sink) => sink.publish(readings).await,
            Self::Mqtt(sink) => sink.publish(readings).await,
        }
    }

    fn close(&mut self) -> Result<(), PublishError> {
        match self {
            Self::Console(sink) => sink.close(),
            Self::Mqtt(sink) => sink.close(),
        }
    }
}
