//! Errors reported by `hivekit`.
//!
//! Every variant here is fatal for the current provisioning run. Nothing is
//! retried automatically: the operator fixes the hardware or the credentials
//! and runs `hivekit` again.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No serial device could be found or opened.
    #[error("no biosensor detected on the serial ports{}", device_suffix(.index))]
    NoDeviceFound { index: Option<u32> },

    /// The build-and-flash toolchain exited with a non-zero status.
    #[error("upload of the firmware to biosensor #{index} failed ({status})")]
    FlashFailed { index: u32, status: String },

    /// The firmware reported `WifiTimeout`.
    #[error("biosensor #{index} could not connect to the WiFi network, check the SSID and password")]
    WifiFailed { index: u32 },

    /// The firmware reported `MqttTimeout`.
    #[error("biosensor #{index} could not connect to the MQTT broker, check the broker credentials")]
    BrokerFailed { index: u32 },

    /// The serial line broke down in the middle of the handshake.
    #[error("serial link with biosensor #{index} failed: {reason}")]
    LinkFailed { index: u32, reason: String },

    /// The broker pre-check could not reach the broker from this host.
    #[error("could not establish a connection to the broker at {address}, check your internet connection")]
    BrokerUnreachable { address: String },

    /// A fleet directory exists but its configuration is missing or broken.
    #[error("configuration of network `{name}` is corrupted: {reason}")]
    ConfigCorrupted { name: String, reason: String },

    /// Values that can never make a valid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The operator cancelled the run while waiting for a device.
    #[error("provisioning aborted by the operator before biosensor #{index}")]
    Aborted { index: u32 },

    #[error(transparent)]
    Link(#[from] crate::serial_link::LinkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("malformed device response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not write the configuration: {0}")]
    Toml(#[from] toml::ser::Error),
}

impl Error {
    /// Process exit status used by the command line interface for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::BrokerUnreachable { .. } => 2,
            Error::ConfigCorrupted { .. } => 4,
            Error::NoDeviceFound { .. } => 5,
            Error::FlashFailed { .. } => 6,
            Error::WifiFailed { .. } => 7,
            Error::BrokerFailed { .. } => 8,
            Error::LinkFailed { .. } | Error::Link(_) => 9,
            Error::InvalidConfig(_) => 10,
            Error::Aborted { .. } => 11,
            Error::Io(_) | Error::Serial(_) | Error::Json(_) | Error::Toml(_) => 12,
        }
    }
}

fn device_suffix(index: &Option<u32>) -> String {
    match index {
        Some(i) => format!(" (biosensor #{})", i),
        None => String::new(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn messages_name_the_failing_device() {
    let err = Error::WifiFailed { index: 3 };
    assert!(err.to_string().contains("#3"));

    let err = Error::NoDeviceFound { index: Some(2) };
    assert!(err.to_string().ends_with("(biosensor #2)"));

    let err = Error::NoDeviceFound { index: None };
    assert_eq!(err.to_string(), "no biosensor detected on the serial ports");
}

#[test]
fn exit_codes_are_distinct_per_failure_kind() {
    let codes = [
        Error::BrokerUnreachable {
            address: "maqiatto.com:1883".into(),
        }
        .exit_code(),
        Error::ConfigCorrupted {
            name: "hive1".into(),
            reason: "missing".into(),
        }
        .exit_code(),
        Error::NoDeviceFound { index: None }.exit_code(),
        Error::FlashFailed {
            index: 1,
            status: "exit status: 1".into(),
        }
        .exit_code(),
        Error::WifiFailed { index: 1 }.exit_code(),
        Error::BrokerFailed { index: 1 }.exit_code(),
    ];
    assert_eq!(codes, [2, 4, 5, 6, 7, 8]);
}
