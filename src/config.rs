//! Fleet configuration: the values burned into every biosensor of a network.
//!
//! A [`Config`] can come from two places, a `config.toml` file saved by a
//! previous `hivekit setup` or the `getInfo` answer of an already provisioned
//! biosensor. Both are described by [`ConfigSource`] and both end up in the
//! same constructor, [`Config::new`], which holds the validation rules.

use std::{
    fmt, fs,
    path::PathBuf,
    time::{Duration, Instant},
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::serial_link::{Command, LinkError, SerialLink};
use crate::utils::{Connector, PortDescriptor};

// =============================================================================
// Public Interface
// =============================================================================

/// Credentials of the MQTT broker account used by the fleet.
#[derive(Clone, Eq, PartialEq)]
pub struct BrokerCredentials {
    username: String,
    password: String,
    topic_prefix: String,
}
impl BrokerCredentials {
    /// The topic prefix is derived from the username and the fleet name and is
    /// never recomputed afterwards.
    fn new(username: String, password: String, fleet_name: &str) -> Self {
        let topic_prefix = format!("{}/{}/", username, fleet_name);
        BrokerCredentials {
            username,
            password,
            topic_prefix,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Namespace under which the biosensors publish, always ending with `/`.
    pub fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }
}
impl fmt::Debug for BrokerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("topic_prefix", &self.topic_prefix)
            .finish()
    }
}

/// The resolved configuration of one biosensors network (fleet).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    name: String,
    size: u32,
    wifi_ssid: String,
    wifi_password: String,
    broker: BrokerCredentials,
}
impl Config {
    /// Builds a configuration, checking that the fleet has at least one device
    /// and a name that can be used as a directory name.
    pub fn new(
        name: impl Into<String>,
        size: u32,
        wifi_ssid: impl Into<String>,
        wifi_password: impl Into<String>,
        broker_username: impl Into<String>,
        broker_password: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        if size == 0 {
            return Err(Error::InvalidConfig(
                "a network needs at least one biosensor".into(),
            ));
        }
        let broker = BrokerCredentials::new(broker_username.into(), broker_password.into(), &name);
        Ok(Config {
            name,
            size,
            wifi_ssid: wifi_ssid.into(),
            wifi_password: wifi_password.into(),
            broker,
        })
    }

    /// The fleet name (`BNN`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of biosensors in the fleet, always at least one.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn wifi_ssid(&self) -> &str {
        &self.wifi_ssid
    }

    pub fn wifi_password(&self) -> &str {
        &self.wifi_password
    }

    pub fn broker(&self) -> &BrokerCredentials {
        &self.broker
    }

    /// Human readable dump of the configuration, credentials included, for
    /// the operator to double check before provisioning.
    pub fn dump(&self) -> String {
        format!(
            "{} config dump:\n\n\
             Size: {}\n\
             WIFI SSID: {}\n\
             WIFI password: {}\n\n\
             Broker config dump:\n\n\
             Username: {}\n\
             Password: {}\n\
             Topic prefix: {}\n",
            self.name,
            self.size,
            self.wifi_ssid,
            self.wifi_password,
            self.broker.username,
            self.broker.password,
            self.broker.topic_prefix
        )
    }

    pub(crate) fn to_file(&self) -> ConfigFile {
        ConfigFile {
            network: NetworkSection { size: self.size },
            wifi: WifiSection {
                ssid: self.wifi_ssid.clone(),
                password: self.wifi_password.clone(),
            },
            mqtt: MqttSection {
                username: self.broker.username.clone(),
                password: self.broker.password.clone(),
            },
        }
    }

    fn from_file(name: &str, file: ConfigFile) -> Result<Self> {
        Config::new(
            name,
            file.network.size,
            file.wifi.ssid,
            file.wifi.password,
            file.mqtt.username,
            file.mqtt.password,
        )
    }
}

/// The answer of the firmware to the `getInfo` command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceInfo {
    #[serde(rename = "BNN")]
    pub bnn: String,
    pub network_size: u32,
    #[serde(rename = "WifiSSID")]
    pub wifi_ssid: String,
    #[serde(rename = "WifiPSW")]
    pub wifi_password: String,
    pub mqtt_user: String,
    #[serde(rename = "MqttPSW")]
    pub mqtt_password: String,

    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub device_number: Option<u32>,
    #[serde(default)]
    pub mqtt_server: Option<String>,
    #[serde(default)]
    pub mqtt_port: Option<u16>,
    #[serde(default)]
    pub mqtt_prefix: Option<String>,
    #[serde(default)]
    pub connected_wifi: Option<bool>,
    #[serde(default)]
    pub connected_mqtt: Option<bool>,
}
impl DeviceInfo {
    /// Parses the JSON line returned by the firmware.
    pub fn parse(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// The fleet configuration the biosensor was provisioned with.
    pub fn into_config(self) -> Result<Config> {
        Config::new(
            self.bnn,
            self.network_size,
            self.wifi_ssid,
            self.wifi_password,
            self.mqtt_user,
            self.mqtt_password,
        )
    }
}

/// Where a fleet configuration is read from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A `config.toml` file. The fleet name is the name of the directory
    /// holding the file.
    FromFile(PathBuf),
    /// The `getInfo` answer of the biosensor attached to the given port.
    FromDevice(PortDescriptor),
}
impl ConfigSource {
    /// Reads the configuration from its source.
    ///
    /// The `connector` and the `timeout` are only used by
    /// [`ConfigSource::FromDevice`], see [`query_device`].
    pub fn resolve(self, connector: &dyn Connector, timeout: Option<Duration>) -> Result<Config> {
        match self {
            ConfigSource::FromFile(path) => {
                let name = path
                    .parent()
                    .and_then(|dir| dir.file_name())
                    .and_then(|name| name.to_str())
                    .map(String::from)
                    .ok_or_else(|| {
                        Error::InvalidConfig(format!(
                            "cannot derive a network name from {}",
                            path.display()
                        ))
                    })?;
                let content = fs::read_to_string(&path).map_err(|e| Error::ConfigCorrupted {
                    name: name.clone(),
                    reason: format!("{}: {}", path.display(), e),
                })?;
                let file: ConfigFile =
                    toml::from_str(&content).map_err(|e| Error::ConfigCorrupted {
                        name: name.clone(),
                        reason: e.to_string(),
                    })?;
                Config::from_file(&name, file).map_err(|e| match e {
                    Error::InvalidConfig(reason) => Error::ConfigCorrupted { name, reason },
                    other => other,
                })
            }
            ConfigSource::FromDevice(port) => {
                query_device(connector, &port, timeout)?.into_config()
            }
        }
    }
}

/// Sends `getInfo` to the biosensor on `port` and returns its answer.
///
/// Without a `timeout` this waits for as long as the firmware stays silent;
/// right after a reset it ignores `getInfo` for a while.
pub fn query_device(
    connector: &dyn Connector,
    port: &PortDescriptor,
    timeout: Option<Duration>,
) -> Result<DeviceInfo> {
    let transport = connector.open(port)?;
    let mut link = SerialLink::new(port.path(), transport);
    link.send(Command::GetInfo)?;
    let deadline = timeout.map(|after| Instant::now() + after);
    let line = match link.receive_line_before(deadline)? {
        Some(line) => line,
        None => {
            return Err(LinkError::TimedOut {
                port: port.path().to_string(),
                after: timeout.unwrap_or_default(),
            }
            .into())
        }
    };
    debug!("getInfo answer: {}", line);
    DeviceInfo::parse(&line)
}

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// On-disk layout of `config.toml`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ConfigFile {
    #[serde(rename = "Network")]
    network: NetworkSection,
    #[serde(rename = "WIFI")]
    wifi: WifiSection,
    #[serde(rename = "MQTT")]
    mqtt: MqttSection,
}

#[derive(Debug, Serialize, Deserialize)]
struct NetworkSection {
    size: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WifiSection {
    #[serde(rename = "SSID")]
    ssid: String,
    password: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct MqttSection {
    username: String,
    password: String,
}

// =============================================================================
// Private stuff
// =============================================================================

/// A fleet name doubles as a directory name under the fleets directory.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidConfig("the network name is empty".into()));
    }
    if name == "." || name == ".." || name.contains(|c| c == '/' || c == '\\') {
        return Err(Error::InvalidConfig(format!(
            "`{}` cannot be used as a network name",
            name
        )));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::{LoopbackConnector, ScriptedTransport};

    fn hive1() -> Config {
        Config::new("hive1", 3, "bees", "honey", "alice", "s3cret").unwrap()
    }

    #[test]
    fn topic_prefix_is_username_then_fleet_name() {
        assert_eq!(hive1().broker().topic_prefix(), "alice/hive1/");
    }

    #[test]
    fn zero_sized_fleet_is_rejected() {
        let err = Config::new("hive1", 0, "bees", "honey", "alice", "s3cret").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn names_must_be_usable_as_directories() {
        for name in &["", "  ", "..", "a/b", "a\\b"] {
            assert!(
                Config::new(*name, 1, "", "", "u", "p").is_err(),
                "`{}` was accepted",
                name
            );
        }
    }

    #[test]
    fn debug_output_hides_the_broker_password() {
        let out = format!("{:?}", hive1().broker());
        assert!(!out.contains("s3cret"));
    }

    #[test]
    fn device_info_with_firmware_extras() {
        let info = DeviceInfo::parse(
            r#"{"Version":"0.1","BNN":"hive1","DeviceNumber":2,"NetworkSize":3,
               "WifiSSID":"bees","WifiPSW":"honey","MqttServer":"maqiatto.com",
               "MqttPort":1883,"MqttUser":"alice","MqttPSW":"s3cret",
               "MqttPrefix":"alice/hive1/","ConnectedWifi":false,"ConnectedMqtt":false}"#,
        )
        .unwrap();
        assert_eq!(info.bnn, "hive1");
        assert_eq!(info.network_size, 3);
        assert_eq!(info.wifi_password, "honey");
        assert_eq!(info.device_number, Some(2));
        assert_eq!(info.mqtt_port, Some(1883));
    }

    #[test]
    fn device_info_missing_field_is_an_error() {
        let err = DeviceInfo::parse(r#"{"BNN":"hive1"}"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn from_device_skips_diagnostics_and_builds_the_config() {
        let transport = ScriptedTransport::new(
            "[DEBUG] DEBUG MODE IS ON!\r\n\
             {\"BNN\":\"hive1\",\"NetworkSize\":3,\"WifiSSID\":\"bees\",\"WifiPSW\":\"honey\",\
             \"MqttUser\":\"alice\",\"MqttPSW\":\"s3cret\"}\r\n",
        );
        let written = transport.written();
        let connector = LoopbackConnector::new(vec![transport]);

        let config = ConfigSource::FromDevice(PortDescriptor::new("/dev/ttyUSB0"))
            .resolve(&connector, None)
            .unwrap();

        assert_eq!(config, hive1());
        assert_eq!(&*written.borrow(), b"getInfo\n");
    }

    #[test]
    fn silent_device_times_out_instead_of_hanging() {
        let transport = ScriptedTransport::new("[DEBUG] Waiting for managedMode\n").then_silent();
        let connector = LoopbackConnector::new(vec![transport]);

        let started = Instant::now();
        let err = query_device(
            &connector,
            &PortDescriptor::new("/dev/ttyUSB0"),
            Some(Duration::from_millis(100)),
        )
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(err, Error::Link(LinkError::TimedOut { .. })));
        assert_eq!(err.exit_code(), 9);
    }

    #[test]
    fn from_file_uses_the_directory_as_name() {
        let dir = tempfile::tempdir().unwrap();
        let fleet = dir.path().join("hive1");
        fs::create_dir(&fleet).unwrap();
        fs::write(
            fleet.join("config.toml"),
            "[Network]\nsize = 3\n\n[WIFI]\nSSID = \"bees\"\npassword = \"honey\"\n\n\
             [MQTT]\nusername = \"alice\"\npassword = \"s3cret\"\n",
        )
        .unwrap();

        let connector = LoopbackConnector::new(vec![]);
        let config = ConfigSource::FromFile(fleet.join("config.toml"))
            .resolve(&connector, None)
            .unwrap();
        assert_eq!(config, hive1());
    }

    #[test]
    fn from_file_with_missing_section_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let fleet = dir.path().join("hive1");
        fs::create_dir(&fleet).unwrap();
        fs::write(fleet.join("config.toml"), "[Network]\nsize = 3\n").unwrap();

        let connector = LoopbackConnector::new(vec![]);
        let err = ConfigSource::FromFile(fleet.join("config.toml"))
            .resolve(&connector, None)
            .unwrap_err();
        assert!(matches!(err, Error::ConfigCorrupted { .. }));
    }
}
