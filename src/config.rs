//! Daemon configuration
//!
//! Built-in defaults are overlaid by an optional JSON file, which is overlaid
//! by command-line flags. The merged result is validated once and turned into
//! a [`RelayConfig`]; nothing downstream re-checks it.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use ads_core::MAX_SINKS;
use ads_core::channels::ChannelSetting;
use ads_core::codec::is_supported_rate;
use clap::Parser;
use embassy_time::Duration;
use log::warn;
use serde::Deserialize;
use thiserror_no_std::Error;

pub const DEFAULT_I2C_BUS: &str = "/dev/i2c-1";
pub const DEFAULT_I2C_ADDRESS: u8 = ads_core::bus::DEFAULT_ADDRESS;
pub const DEFAULT_SAMPLE_RATE: i32 = 128;
pub const DEFAULT_MQTT_SERVER: &str = "tcp://localhost:1883";
pub const DEFAULT_MQTT_CLIENT_ID: &str = "ads1115-client";
pub const DEFAULT_MQTT_STATE_TOPIC: &str = "ads1115";

/// Highest single-ended input of the ADS1115
const MAX_CHANNEL: u8 = 3;
const MAX_I2C_ADDRESS: u32 = 0x7F;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("could not read config file {path}: {details}")]
    Read { path: String, details: String },
    #[error("could not parse config file: {0}")]
    Parse(String),
    #[error("invalid I2C address '{0}'")]
    InvalidAddress(String),
    #[error("I2C address 0x{0:X} is not a 7-bit address")]
    AddressOutOfRange(u32),
    #[error("sample rate must be > 0, got {0}")]
    InvalidSampleRate(i64),
    #[error("invalid channel '{0}'")]
    InvalidChannel(String),
    #[error("channel {0} does not exist, channels are 0..=3")]
    ChannelOutOfRange(u8),
    #[error("channel {0} is configured more than once")]
    DuplicateChannel(u8),
    #[error("invalid entry '{entry}' for --{flag}")]
    InvalidMapping { flag: &'static str, entry: String },
    #[error("unknown sensor type '{0}'")]
    UnknownSensorType(String),
    #[error("unknown output type '{0}'")]
    UnknownOutput(String),
    #[error("no outputs configured")]
    NoOutputs,
    #[error("{0} outputs configured, at most 8 are supported")]
    TooManyOutputs(usize),
}

/// Command-line flags. Every flag overrides the config file.
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "ads-relay", version)]
#[command(about = "Sample an ADS1115 and publish averaged readings", long_about = None)]
pub struct Cli {
    /// Path to a JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// I2C bus device, or a bare bus number ('2' means /dev/i2c-2)
    #[arg(long)]
    pub i2c_bus: Option<String>,
    /// I2C address, decimal or 0x hex
    #[arg(long)]
    pub i2c_address: Option<String>,
    /// Global ADS1115 sample rate in samples per second
    #[arg(long, allow_negative_numbers = true)]
    pub sample_rate: Option<i64>,
    /// real|hardware|simulation|sim|fake
    #[arg(long)]
    pub sensor_type: Option<String>,
    /// Enabled channels, e.g. 0,1,2,3
    #[arg(long)]
    pub channels: Option<String>,
    /// Per-channel calibration scale, e.g. 0=1.2,1=0.98
    #[arg(long)]
    pub channel_scales: Option<String>,
    /// Per-channel calibration offset, e.g. 0=0.1
    #[arg(long)]
    pub channel_offsets: Option<String>,
    /// Per-channel sample rate, e.g. 0=250
    #[arg(long)]
    pub channel_rates: Option<String>,
    /// Per-channel enable flag, e.g. 0=true,3=false
    #[arg(long)]
    pub channel_enabled: Option<String>,
    /// Comma-separated outputs (console,mqtt)
    #[arg(long)]
    pub outputs: Option<String>,
    /// Per-output publish interval in ms, e.g. console=1000,mqtt=5000
    #[arg(long)]
    pub output_intervals: Option<String>,
    #[arg(long)]
    pub mqtt_server: Option<String>,
    #[arg(long)]
    pub mqtt_user: Option<String>,
    #[arg(long)]
    pub mqtt_pass: Option<String>,
    #[arg(long)]
    pub mqtt_client_id: Option<String>,
    /// State topic; %d is replaced by the channel
    #[arg(long)]
    pub mqtt_topic: Option<String>,
    /// Home Assistant discovery topic; %d publishes one entry per channel
    #[arg(long)]
    pub mqtt_discovery_topic: Option<String>,
}

impl Cli {
    fn has_mqtt_flags(&self) -> bool {
        self.mqtt_server.is_some()
            || self.mqtt_user.is_some()
            || self.mqtt_pass.is_some()
            || self.mqtt_client_id.is_some()
            || self.mqtt_topic.is_some()
            || self.mqtt_discovery_topic.is_some()
    }
}

/// An I2C address as it may appear in JSON: a number or a (hex) string.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum AddressValue {
    Number(u32),
    Text(String),
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct I2cSection {
    pub bus: Option<String>,
    pub address: Option<AddressValue>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct MqttSection {
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    #[serde(alias = "topic")]
    pub state_topic: Option<String>,
    pub discovery_topic: Option<String>,
    pub discovery_name: Option<String>,
    pub discovery_unique_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct OutputSection {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub interval_ms: Option<u64>,
    #[serde(default)]
    pub mqtt: Option<MqttSection>,
}

impl OutputSection {
    fn named(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            interval_ms: None,
            mqtt: None,
        }
    }
}

/// Layout of the JSON config file. Every field is optional.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub i2c: I2cSection,
    pub sample_rate: Option<i64>,
    pub sensor_type: Option<String>,
    pub outputs: Option<Vec<OutputSection>>,
    pub channels: Option<Vec<ChannelSetting>>,
}

impl FromStr for FileConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Which sensor variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorMode {
    Hardware,
    Simulation,
}

impl FromStr for SensorMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "real" | "hardware" => Ok(Self::Hardware),
            "simulation" | "sim" | "fake" => Ok(Self::Simulation),
            _ => Err(ConfigError::UnknownSensorType(s.to_string())),
        }
    }
}

/// Resolved MQTT connection and topic settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    /// Empty means one `ads1115/channel/<n>` topic per channel
    pub state_topic: String,
    pub discovery_topic: Option<String>,
    pub discovery_name: Option<String>,
    pub discovery_unique_id: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self::from_section(&MqttSection::default())
    }
}

impl MqttConfig {
    fn from_section(section: &MqttSection) -> Self {
        let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());

        Self {
            server: non_empty(&section.server).unwrap_or_else(|| DEFAULT_MQTT_SERVER.into()),
            username: non_empty(&section.username),
            password: non_empty(&section.password),
            client_id: non_empty(&section.client_id)
                .unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.into()),
            state_topic: section
                .state_topic
                .clone()
                .unwrap_or_else(|| DEFAULT_MQTT_STATE_TOPIC.into()),
            discovery_topic: non_empty(&section.discovery_topic),
            discovery_name: non_empty(&section.discovery_name),
            discovery_unique_id: non_empty(&section.discovery_unique_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputKind {
    Console,
    Mqtt(MqttConfig),
}

impl OutputKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Mqtt(_) => "mqtt",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub kind: OutputKind,
    /// `None` publishes at the sensor interval
    pub interval: Option<Duration>,
}

/// Validated configuration the daemon runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Device path, e.g. `/dev/i2c-1`
    pub i2c_bus: String,
    pub i2c_address: u8,
    pub sample_rate: i32,
    pub sensor: SensorMode,
    pub channels: Vec<ChannelSetting>,
    pub outputs: Vec<OutputConfig>,
}

/// Intermediate, unvalidated merge of defaults, file and flags.
#[derive(Debug, Clone, PartialEq)]
struct Draft {
    i2c_bus: String,
    i2c_address: u32,
    sample_rate: i64,
    sensor_type: String,
    channels: Vec<ChannelSetting>,
    outputs: Vec<OutputSection>,
}

impl Default for Draft {
    fn default() -> Self {
        Self {
            i2c_bus: DEFAULT_I2C_BUS.into(),
            i2c_address: u32::from(DEFAULT_I2C_ADDRESS),
            sample_rate: i64::from(DEFAULT_SAMPLE_RATE),
            sensor_type: "real".into(),
            channels: (0..=MAX_CHANNEL).map(ChannelSetting::enabled).collect(),
            outputs: vec![OutputSection::named("console")],
        }
    }
}

impl Draft {
    fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(bus) = file.i2c.bus {
            self.i2c_bus = bus;
        }
        if let Some(address) = file.i2c.address {
            self.i2c_address = match address {
                AddressValue::Number(n) => n,
                AddressValue::Text(s) => parse_address(&s)?,
            };
        }
        if let Some(rate) = file.sample_rate {
            self.sample_rate = rate;
        }
        if let Some(sensor_type) = file.sensor_type {
            self.sensor_type = sensor_type;
        }
        if let Some(outputs) = file.outputs {
            self.outputs = outputs;
        }
        if let Some(channels) = file.channels {
            self.channels = channels;
        }
        Ok(())
    }

    fn apply_flags(&mut self, cli: &Cli) -> Result<(), ConfigError> {
        if let Some(bus) = &cli.i2c_bus {
            self.i2c_bus = bus.clone();
        }
        if let Some(address) = &cli.i2c_address {
            self.i2c_address = parse_address(address)?;
        }
        if let Some(rate) = cli.sample_rate {
            self.sample_rate = rate;
        }
        if let Some(sensor_type) = &cli.sensor_type {
            self.sensor_type = sensor_type.clone();
        }

        if let Some(list) = &cli.channels {
            let ids = parse_channel_list(list)?;
            let previous = core::mem::take(&mut self.channels);
            self.channels = ids
                .into_iter()
                .map(|id| {
                    let mut setting = previous
                        .iter()
                        .find(|existing| existing.channel == id)
                        .copied()
                        .unwrap_or_else(|| ChannelSetting::enabled(id));
                    setting.enabled = true;
                    setting
                })
                .collect();
        }
        if let Some(map) = &cli.channel_scales {
            for (id, scale) in parse_channel_map::<f64>("channel-scales", map)? {
                self.channel_mut(id).scale = scale;
            }
        }
        if let Some(map) = &cli.channel_offsets {
            for (id, offset) in parse_channel_map::<f64>("channel-offsets", map)? {
                self.channel_mut(id).offset = offset;
            }
        }
        if let Some(map) = &cli.channel_rates {
            for (id, rate) in parse_channel_map::<u32>("channel-rates", map)? {
                self.channel_mut(id).sample_rate = Some(rate).filter(|&r| r != 0);
            }
        }
        if let Some(map) = &cli.channel_enabled {
            for (id, enabled) in parse_channel_map::<bool>("channel-enabled", map)? {
                self.channel_mut(id).enabled = enabled;
            }
        }

        if let Some(list) = &cli.outputs {
            let previous = core::mem::take(&mut self.outputs);
            self.outputs = parse_list(list)
                .map(|kind| {
                    previous
                        .iter()
                        .find(|existing| existing.kind.eq_ignore_ascii_case(kind))
                        .cloned()
                        .unwrap_or_else(|| OutputSection::named(kind))
                })
                .collect();
        }
        if let Some(map) = &cli.output_intervals {
            for (kind, interval) in parse_key_value_map::<u64>("output-intervals", map)? {
                for output in self
                    .outputs
                    .iter_mut()
                    .filter(|o| o.kind.eq_ignore_ascii_case(&kind))
                {
                    output.interval_ms = Some(interval);
                }
            }
        }
        if cli.has_mqtt_flags() {
            self.apply_mqtt_flags(cli);
        }
        Ok(())
    }

    /// Overlay MQTT flags on every mqtt output, adding one if there is none.
    fn apply_mqtt_flags(&mut self, cli: &Cli) {
        if !self.outputs.iter().any(|o| o.kind.eq_ignore_ascii_case("mqtt")) {
            self.outputs.push(OutputSection::named("mqtt"));
        }

        let set = |slot: &mut Option<String>, flag: &Option<String>| {
            if let Some(value) = flag {
                *slot = Some(value.clone());
            }
        };
        for output in self
            .outputs
            .iter_mut()
            .filter(|o| o.kind.eq_ignore_ascii_case("mqtt"))
        {
            let section = output.mqtt.get_or_insert_with(MqttSection::default);
            set(&mut section.server, &cli.mqtt_server);
            set(&mut section.username, &cli.mqtt_user);
            set(&mut section.password, &cli.mqtt_pass);
            set(&mut section.client_id, &cli.mqtt_client_id);
            set(&mut section.state_topic, &cli.mqtt_topic);
            set(&mut section.discovery_topic, &cli.mqtt_discovery_topic);
        }
    }

    /// Entry for `id`, appending a disabled default one if it is not listed.
    fn channel_mut(&mut self, id: u8) -> &mut ChannelSetting {
        let index = match self.channels.iter().position(|c| c.channel == id) {
            Some(index) => index,
            None => {
                self.channels.push(ChannelSetting::enabled(id).disabled());
                self.channels.len() - 1
            }
        };
        &mut self.channels[index]
    }

    fn validate(self) -> Result<RelayConfig, ConfigError> {
        if self.i2c_address > MAX_I2C_ADDRESS {
            return Err(ConfigError::AddressOutOfRange(self.i2c_address));
        }
        let sample_rate = i32::try_from(self.sample_rate)
            .ok()
            .filter(|&rate| rate > 0)
            .ok_or(ConfigError::InvalidSampleRate(self.sample_rate))?;
        if !is_supported_rate(sample_rate as u32) {
            warn!(
                "Sample rate {} is not supported by the ADS1115, conversions will use 128",
                sample_rate
            );
        }
        let sensor = self.sensor_type.parse::<SensorMode>()?;

        let mut channels: Vec<ChannelSetting> = Vec::with_capacity(self.channels.len());
        for setting in self.channels {
            let id = setting.channel;
            if id > MAX_CHANNEL {
                return Err(ConfigError::ChannelOutOfRange(id));
            }
            if channels.iter().any(|c| c.channel == setting.channel) {
                return Err(ConfigError::DuplicateChannel(setting.channel));
            }
            if let Some(rate) = setting.sample_rate
                && !is_supported_rate(rate)
            {
                warn!(
                    "Channel {} sample rate {} is not supported, conversions will use 128",
                    id, rate
                );
            }
            channels.push(setting);
        }
        if !channels.iter().any(|c| c.enabled) {
            warn!("No channel is enabled, nothing will be published");
        }

        if self.outputs.is_empty() {
            return Err(ConfigError::NoOutputs);
        }
        if self.outputs.len() > MAX_SINKS {
            return Err(ConfigError::TooManyOutputs(self.outputs.len()));
        }
        let outputs = self
            .outputs
            .iter()
            .map(|section| {
                let kind = match section.kind.trim().to_ascii_lowercase().as_str() {
                    "console" => OutputKind::Console,
                    "mqtt" => OutputKind::Mqtt(MqttConfig::from_section(
                        section.mqtt.as_ref().unwrap_or(&MqttSection::default()),
                    )),
                    _ => return Err(ConfigError::UnknownOutput(section.kind.clone())),
                };
                let interval = section
                    .interval_ms
                    .filter(|&ms| ms > 0)
                    .map(Duration::from_millis);
                Ok(OutputConfig { kind, interval })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RelayConfig {
            i2c_bus: self.i2c_bus,
            i2c_address: self.i2c_address as u8,
            sample_rate,
            sensor,
            channels,
            outputs,
        })
    }
}

impl RelayConfig {
    /// Merge `file` and `cli` over the defaults and validate the result.
    pub fn resolve(file: Option<FileConfig>, cli: &Cli) -> Result<Self, ConfigError> {
        let mut draft = Draft::default();
        if let Some(file) = file {
            draft.apply_file(file)?;
        }
        draft.apply_flags(cli)?;
        draft.validate()
    }

    /// Copy that is safe to log, with MQTT passwords masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        for output in &mut config.outputs {
            if let OutputKind::Mqtt(mqtt) = &mut output.kind
                && mqtt.password.is_some()
            {
                mqtt.password = Some("****".into());
            }
        }
        config
    }

    /// Read the file named by `--config`, if any, and resolve.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
                    path: path.display().to_string(),
                    details: e.to_string(),
                })?;
                Some(text.parse::<FileConfig>()?)
            }
            None => None,
        };
        Self::resolve(file, cli)
    }
}

/// Non-empty, trimmed items of a comma-separated list.
fn parse_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|item| !item.is_empty())
}

/// Decimal or `0x`-prefixed hexadecimal address.
pub fn parse_address(s: &str) -> Result<u32, ConfigError> {
    let trimmed = s.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|_| ConfigError::InvalidAddress(s.to_string()))
}

fn parse_channel_list(s: &str) -> Result<Vec<u8>, ConfigError> {
    parse_list(s)
        .map(|item| {
            item.parse::<u8>()
                .map_err(|_| ConfigError::InvalidChannel(item.to_string()))
        })
        .collect()
}

/// `key=value` pairs of a comma-separated list, in order.
fn parse_key_value_map<V: FromStr>(
    flag: &'static str,
    s: &str,
) -> Result<Vec<(String, V)>, ConfigError> {
    parse_list(s)
        .map(|entry| {
            let invalid = || ConfigError::InvalidMapping {
                flag,
                entry: entry.to_string(),
            };
            let (key, value) = entry.split_once('=').ok_or_else(invalid)?;
            let key = key.trim();
            if key.is_empty() {
                return Err(invalid());
            }
            let value = value.trim().parse::<V>().map_err(|_| invalid())?;
            Ok((key.to_string(), value))
        })
        .collect()
}

/// `channel=value` pairs of a comma-separated list, in order.
fn parse_channel_map<V: FromStr>(
    flag: &'static str,
    s: &str,
) -> Result<Vec<(u8, V)>, ConfigError> {
    parse_key_value_map::<V>(flag, s)?
        .into_iter()
        .map(|(key, value)| {
            key.parse::<u8>()
                .map(|id| (id, value))
                .map_err(|_| ConfigError::InvalidChannel(key))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["ads-relay"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::resolve(None, &Cli::default()).unwrap();

        assert_eq!(config.i2c_bus, "/dev/i2c-1");
        assert_eq!(config.i2c_address, 0x48);
        assert_eq!(config.sample_rate, 128);
        assert_eq!(config.sensor, SensorMode::Hardware);
        assert_eq!(
            config.channels,
            (0..=3).map(ChannelSetting::enabled).collect::<Vec<_>>()
        );
        assert_eq!(
            config.outputs,
            [OutputConfig {
                kind: OutputKind::Console,
                interval: None
            }]
        );
    }

    #[test]
    fn test_file_config() {
        let file: FileConfig = r#"{
            "i2c": { "bus": "2", "address": 72 },
            "sample_rate": 250,
            "outputs": [{"type": "console"}, {"type": "mqtt", "interval_ms": 5000,
                         "mqtt": {"server": "tcp://broker:1883", "topic": "adc/%d"}}],
            "sensor_type": "sim",
            "channels": [
                {"channel": 0, "enabled": true,
                 "calibration_scale": 1.0, "calibration_offset": 0.12},
                {"channel": 1, "enabled": false,
                 "calibration_scale": 0.98, "calibration_offset": -0.05, "sample_rate": 860}
            ]
        }"#
        .parse()
        .unwrap();

        let config = RelayConfig::resolve(Some(file), &Cli::default()).unwrap();

        assert_eq!(config.i2c_bus, "2");
        assert_eq!(config.i2c_address, 72);
        assert_eq!(config.sample_rate, 250);
        assert_eq!(config.sensor, SensorMode::Simulation);
        assert_eq!(config.channels.len(), 2);
        assert!(config.channels[0].enabled);
        assert!((config.channels[0].offset - 0.12).abs() < 1e-12);
        assert!(!config.channels[1].enabled);
        assert!((config.channels[1].scale - 0.98).abs() < 1e-12);
        assert_eq!(config.channels[1].sample_rate, Some(860));

        assert_eq!(config.outputs[0].interval, None);
        assert_eq!(config.outputs[1].interval, Some(Duration::from_secs(5)));
        match &config.outputs[1].kind {
            OutputKind::Mqtt(mqtt) => {
                assert_eq!(mqtt.server, "tcp://broker:1883");
                assert_eq!(mqtt.state_topic, "adc/%d");
                assert_eq!(mqtt.client_id, DEFAULT_MQTT_CLIENT_ID);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_hex_address_in_file() {
        let file: FileConfig = r#"{"i2c": {"address": "0x49"}}"#.parse().unwrap();
        let config = RelayConfig::resolve(Some(file), &Cli::default()).unwrap();
        assert_eq!(config.i2c_address, 0x49);
    }

    #[test]
    fn test_malformed_file() {
        assert!(matches!(
            "{\"sample_rate\": ".parse::<FileConfig>(),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_flags_override_file() {
        let file: FileConfig = r#"{"sample_rate": 250, "i2c": {"bus": "/dev/i2c-3"}}"#
            .parse()
            .unwrap();
        let flags = cli(&[
            "--sample-rate",
            "860",
            "--i2c-bus",
            "2",
            "--i2c-address",
            "0x4A",
            "--sensor-type",
            "fake",
        ]);

        let config = RelayConfig::resolve(Some(file), &flags).unwrap();

        assert_eq!(config.sample_rate, 860);
        assert_eq!(config.i2c_bus, "2");
        assert_eq!(config.i2c_address, 0x4A);
        assert_eq!(config.sensor, SensorMode::Simulation);
    }

    #[test]
    fn test_channel_flags() {
        let flags = cli(&[
            "--channels",
            "2,0",
            "--channel-scales",
            "0=1.2, 2=0.98",
            "--channel-offsets",
            "0=-0.1",
            "--channel-rates",
            "2=250,0=0",
            "--channel-enabled",
            "0=false,3=true",
        ]);

        let config = RelayConfig::resolve(None, &flags).unwrap();
        let ids: Vec<u8> = config.channels.iter().map(|c| c.channel).collect();

        assert_eq!(ids, [2, 0, 3]);
        assert!(config.channels[0].enabled);
        assert_eq!(config.channels[0].scale, 0.98);
        assert_eq!(config.channels[0].sample_rate, Some(250));
        assert!(!config.channels[1].enabled);
        assert_eq!(config.channels[1].scale, 1.2);
        assert_eq!(config.channels[1].offset, -0.1);
        assert_eq!(config.channels[1].sample_rate, None);
        assert!(config.channels[2].enabled);
    }

    #[test]
    fn test_output_flags() {
        let flags = cli(&[
            "--outputs",
            "console,mqtt",
            "--output-intervals",
            "console=1000,mqtt=5000",
            "--mqtt-server",
            "tcp://10.0.0.2:1883",
            "--mqtt-topic",
            "",
        ]);

        let config = RelayConfig::resolve(None, &flags).unwrap();

        assert_eq!(config.outputs.len(), 2);
        assert_eq!(config.outputs[0].interval, Some(Duration::from_secs(1)));
        assert_eq!(config.outputs[1].interval, Some(Duration::from_secs(5)));
        match &config.outputs[1].kind {
            OutputKind::Mqtt(mqtt) => {
                assert_eq!(mqtt.server, "tcp://10.0.0.2:1883");
                assert_eq!(mqtt.state_topic, "");
                assert_eq!(mqtt.discovery_topic, None);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_mqtt_flags_add_output() {
        let flags = cli(&["--mqtt-client-id", "garage", "--mqtt-discovery-topic", "ha/%d"]);
        let config = RelayConfig::resolve(None, &flags).unwrap();

        assert_eq!(config.outputs.len(), 2);
        assert_eq!(config.outputs[0].kind, OutputKind::Console);
        match &config.outputs[1].kind {
            OutputKind::Mqtt(mqtt) => {
                assert_eq!(mqtt.client_id, "garage");
                assert_eq!(mqtt.server, DEFAULT_MQTT_SERVER);
                assert_eq!(mqtt.state_topic, DEFAULT_MQTT_STATE_TOPIC);
                assert_eq!(mqtt.discovery_topic.as_deref(), Some("ha/%d"));
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_validation_errors() {
        let resolve = |args: &[&str]| RelayConfig::resolve(None, &cli(args));

        assert_eq!(
            resolve(&["--sample-rate", "0"]),
            Err(ConfigError::InvalidSampleRate(0))
        );
        assert_eq!(
            resolve(&["--sample-rate", "-5"]),
            Err(ConfigError::InvalidSampleRate(-5))
        );
        assert_eq!(
            resolve(&["--channels", "0,4"]),
            Err(ConfigError::ChannelOutOfRange(4))
        );
        assert_eq!(
            resolve(&["--channels", "1,1"]),
            Err(ConfigError::DuplicateChannel(1))
        );
        assert_eq!(
            resolve(&["--channels", "a"]),
            Err(ConfigError::InvalidChannel("a".into()))
        );
        assert_eq!(
            resolve(&["--i2c-address", "0x80"]),
            Err(ConfigError::AddressOutOfRange(0x80))
        );
        assert_eq!(
            resolve(&["--i2c-address", "0xZZ"]),
            Err(ConfigError::InvalidAddress("0xZZ".into()))
        );
        assert_eq!(
            resolve(&["--outputs", "console,syslog"]),
            Err(ConfigError::UnknownOutput("syslog".into()))
        );
        assert_eq!(resolve(&["--outputs", " , "]), Err(ConfigError::NoOutputs));
        let nine = vec!["console"; 9].join(",");
        assert_eq!(resolve(&["--outputs", nine.as_str()]), Err(ConfigError::TooManyOutputs(9)));
        assert_eq!(
            resolve(&["--sensor-type", "thermocouple"]),
            Err(ConfigError::UnknownSensorType("thermocouple".into()))
        );
        assert_eq!(
            resolve(&["--channel-scales", "0:1.5"]),
            Err(ConfigError::InvalidMapping {
                flag: "channel-scales",
                entry: "0:1.5".into()
            })
        );
    }

    #[test]
    fn test_redacted_masks_password() {
        let flags = cli(&["--mqtt-user", "relay", "--mqtt-pass", "hunter2"]);
        let config = RelayConfig::resolve(None, &flags).unwrap();
        let redacted = config.redacted();

        match (&config.outputs[1].kind, &redacted.outputs[1].kind) {
            (OutputKind::Mqtt(plain), OutputKind::Mqtt(masked)) => {
                assert_eq!(plain.password.as_deref(), Some("hunter2"));
                assert_eq!(masked.password.as_deref(), Some("****"));
                assert_eq!(masked.username.as_deref(), Some("relay"));
            }
            other => panic!("unexpected outputs {:?}", other),
        }
        assert!(!format!("{:?}", redacted).contains("hunter2"));
        assert_eq!(redacted.outputs[0], config.outputs[0]);
    }

    #[test]
    fn test_unsupported_rate_is_accepted() {
        let config = RelayConfig::resolve(None, &cli(&["--sample-rate", "100"])).unwrap();
        assert_eq!(config.sample_rate, 100);
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("72"), Ok(72));
        assert_eq!(parse_address("0x48"), Ok(0x48));
        assert_eq!(parse_address("0X4b"), Ok(0x4B));
        assert!(parse_address("").is_err());
    }

    #[test]
    fn test_sensor_mode_aliases() {
        for alias in ["real", "hardware", "REAL"] {
            assert_eq!(alias.parse::<SensorMode>(), Ok(SensorMode::Hardware));
        }
        for alias in ["simulation", "sim", "fake"] {
            assert_eq!(alias.parse::<SensorMode>(), Ok(SensorMode::Simulation));
        }
    }
}
