//! Settings related to the serial link with the biosensors, the firmware
//! toolchain and the provisioning run.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

use std::path::PathBuf;
use std::time::Duration;

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

// =============================================================================
// Public Interface
// =============================================================================

/// Groups all settings used by `hivekit` and acts as a
/// [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
/// for the settings.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// The baud rate in symbols-per-second. Must match the firmware.
    pub baud_rate: u32,
    /// Number of bits used to represent a character sent on the line.
    pub data_bits: DataBits,
    /// The type of signalling to use for controlling data transfer.
    pub flow_control: FlowControl,
    /// The type of parity to use for error checking.
    pub parity: Parity,
    /// Number of bits to use to signal the end of a character.
    pub stop_bits: StopBits,

    /// Directory of the PlatformIO firmware project.
    pub project_dir: PathBuf,
    /// PlatformIO build environment passed with `-e`, if any.
    pub build_env: Option<String>,
    /// Directory holding one sub-directory per fleet.
    pub fleets_dir: PathBuf,

    /// When `true`, every flashed biosensor goes through the WiFi and broker
    /// handshake before moving to the next one.
    pub verify_connectivity: bool,
    /// Time given to the firmware to reboot after the upload, before the
    /// handshake starts.
    pub settle_delay: Duration,
    /// Upper bound for each sentinel wait of the handshake. `None` waits for
    /// as long as the firmware takes to answer.
    pub handshake_timeout: Option<Duration>,

    /// Host name of the MQTT broker used for the reachability pre-check.
    pub broker_host: String,
    /// Port of the MQTT broker.
    pub broker_port: u16,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set.
///
/// **Example**
///
/// ```
/// let settings = hivekit::SettingsBuilder::new()
///     .project_dir("ESPCode")
///     .verify_connectivity(true)
///     .finalize();
/// assert_eq!(settings.baud_rate, 9600);
/// ```
#[derive(Default)]
pub struct SettingsBuilder {
    settings: Settings,
}
impl SettingsBuilder {
    /// Start building the settings using default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the baud rate in symbols-per-second
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    /// Set the number of bits used to represent a character sent on the line
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    /// Set the type of signalling to use for controlling data transfer
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.settings.flow_control = flow_control;
        self
    }

    /// Set the type of parity to use for error checking
    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    /// Set the number of bits to use to signal the end of a character
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    /// Set the PlatformIO project directory
    pub fn project_dir(mut self, project_dir: impl Into<PathBuf>) -> Self {
        self.settings.project_dir = project_dir.into();
        self
    }

    /// Set the PlatformIO build environment
    pub fn build_env<'a>(mut self, build_env: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.build_env = Some(build_env.into().into_owned());
        self
    }

    /// Set the directory where fleet configurations are stored
    pub fn fleets_dir(mut self, fleets_dir: impl Into<PathBuf>) -> Self {
        self.settings.fleets_dir = fleets_dir.into();
        self
    }

    pub fn verify_connectivity(mut self, verify: bool) -> Self {
        self.settings.verify_connectivity = verify;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settings.settle_delay = delay;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.settings.handshake_timeout = Some(timeout);
        self
    }

    /// Set the broker address used by the reachability pre-check
    pub fn broker<'a>(mut self, host: impl Into<std::borrow::Cow<'a, str>>, port: u16) -> Self {
        self.settings.broker_host = host.into().into_owned();
        self.settings.broker_port = port;
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            project_dir: PathBuf::from("ESPCode"),
            build_env: None,
            fleets_dir: PathBuf::from("."),
            verify_connectivity: false,
            settle_delay: Duration::from_secs(2),
            handshake_timeout: None,
            broker_host: "maqiatto.com".into(),
            broker_port: 1883,
            _private_use_builder: (),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let settings = SettingsBuilder::new().finalize();
    assert_eq!(
        settings,
        Settings {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            project_dir: PathBuf::from("ESPCode"),
            build_env: None,
            fleets_dir: PathBuf::from("."),
            verify_connectivity: false,
            settle_delay: Duration::from_secs(2),
            handshake_timeout: None,
            broker_host: "maqiatto.com".into(),
            broker_port: 1883,
            _private_use_builder: (),
        }
    )
}

#[test]
fn baud_rate() {
    let settings = SettingsBuilder::new().baud_rate(115_200).finalize();
    assert_eq!(settings.baud_rate, 115_200);
}

#[test]
fn build_env() {
    let settings = SettingsBuilder::new().build_env("debug").finalize();
    assert_eq!(settings.build_env.as_deref(), Some("debug"));
}

#[test]
fn handshake_timeout() {
    let settings = SettingsBuilder::new()
        .handshake_timeout(Duration::from_secs(45))
        .finalize();
    assert_eq!(settings.handshake_timeout, Some(Duration::from_secs(45)));
}

#[test]
fn broker() {
    let settings = SettingsBuilder::new().broker("localhost", 1884).finalize();
    assert_eq!(settings.broker_host, "localhost");
    assert_eq!(settings.broker_port, 1884);
}

#[test]
fn directories() {
    let settings = SettingsBuilder::new()
        .project_dir("firmware")
        .fleets_dir("/var/lib/hivekit")
        .finalize();
    assert_eq!(settings.project_dir, PathBuf::from("firmware"));
    assert_eq!(settings.fleets_dir, PathBuf::from("/var/lib/hivekit"));
}
