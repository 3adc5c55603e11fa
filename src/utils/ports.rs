//! Serial port device enumeration and opening.

use std::{
    fmt,
    io::{Read, Write},
    time::Duration,
};

use log::{debug, info};
use serialport::{available_ports, SerialPort, SerialPortType};

use crate::{
    error::{Error, Result},
    Settings,
};

//==============================================================================
// Public Interface
//==============================================================================

/// A serial port candidate as found on the system.
///
/// Only the path is needed to open the port; the USB strings are kept to tell
/// the operator which device was picked.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PortDescriptor {
    path: String,
    manufacturer: Option<String>,
    product: Option<String>,
}
impl PortDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        PortDescriptor {
            path: path.into(),
            manufacturer: None,
            product: None,
        }
    }

    /// The port name, usually the device path.
    pub fn path(&self) -> &str {
        &self.path
    }
}
impl fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.manufacturer, &self.product) {
            (None, None) => write!(f, "{}", self.path),
            (manufacturer, product) => write!(
                f,
                "{}: ({} / {})",
                self.path,
                manufacturer.as_deref().unwrap_or(""),
                product.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Lists the serial ports a biosensor could be attached to.
pub trait PortEnumerator {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>>;
}

/// A byte stream to a biosensor, usually an open serial port.
pub trait Transport: Read + Write {}
impl<T: Read + Write + ?Sized> Transport for T {}

/// Opens the transport to a detected biosensor.
pub trait Connector {
    fn open(&self, port: &PortDescriptor) -> Result<Box<dyn Transport>>;
}

/// Enumerates the serial ports of the host system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;
impl PortEnumerator for SystemPorts {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        let ports = available_ports()?;
        Ok(ports.into_iter().map(describe_port).collect())
    }
}

/// Opens real serial ports configured from the [`Settings`].
#[derive(Debug, Clone)]
pub struct SerialConnector {
    settings: Settings,
}
impl SerialConnector {
    pub fn new(settings: Settings) -> Self {
        SerialConnector { settings }
    }
}
impl Connector for SerialConnector {
    fn open(&self, port: &PortDescriptor) -> Result<Box<dyn Transport>> {
        match open_and_setup_port(port.path(), &self.settings) {
            Ok(serial) => Ok(Box::new(serial)),
            Err(e) => {
                info!("Could not open {}: {}", port.path(), e);
                Err(Error::NoDeviceFound { index: None })
            }
        }
    }
}

//==============================================================================
// Crate-Public Interface
//==============================================================================

/// Read timeout of the opened ports. Reads that time out are simply retried
/// by the [`SerialLink`](crate::serial_link::SerialLink), this only bounds how
/// long a single `read` call may block.
pub(crate) const READ_TIMEOUT: Duration = Duration::from_millis(100);

pub(crate) fn open_and_setup_port(
    path: &str,
    settings: &Settings,
) -> std::result::Result<Box<dyn SerialPort>, serialport::Error> {
    use retry::{delay, retry_with_index};

    // Right after an upload the USB bridge may still be re-enumerating, give
    // it a few chances before giving up.
    let result = retry_with_index(
        delay::Fixed::from_millis(1000).take(4),
        |index| -> std::result::Result<Box<dyn SerialPort>, serialport::Error> {
            debug!("Trying to connect {} ({})", path, index);
            serialport::new(path, settings.baud_rate)
                .data_bits(settings.data_bits)
                .stop_bits(settings.stop_bits)
                .parity(settings.parity)
                .flow_control(settings.flow_control)
                .timeout(READ_TIMEOUT)
                .open()
        },
    );
    match result {
        Ok(port) => {
            info!("Connected to {} at {} baud", path, settings.baud_rate);
            debug!("data_bits    : {:#?}", settings.data_bits);
            debug!("stop_bits    : {:#?}", settings.stop_bits);
            debug!("parity       : {:#?}", settings.parity);
            debug!("flow control : {:#?}", settings.flow_control);
            Ok(port)
        }
        Err(err) => match err {
            retry::Error::Operation {
                error,
                total_delay,
                tries,
            } => {
                info!(
                    "Failed to open the port after {:?} and {} tries: {}",
                    total_delay, tries, error,
                );
                Err(error)
            }
            retry::Error::Internal(_) => {
                info!("Internal retry error while opening port");
                Err(serialport::Error::new(
                    serialport::ErrorKind::Unknown,
                    "internal error while retrying to open the port",
                ))
            }
        },
    }
}

//==============================================================================
// Private stuff
//==============================================================================

fn describe_port(p: serialport::SerialPortInfo) -> PortDescriptor {
    match p.port_type {
        // USB ports give us more info about the connected serial controller
        SerialPortType::UsbPort(info) => PortDescriptor {
            path: p.port_name,
            manufacturer: info.manufacturer,
            product: info.product,
        },
        // We're also interested in the other devices, such as virtual ports
        // for testing
        _ => PortDescriptor::new(p.port_name),
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[test]
fn display_plain_port() {
    assert_eq!(PortDescriptor::new("/dev/ttyUSB0").to_string(), "/dev/ttyUSB0");
}

#[test]
fn display_usb_port() {
    let port = PortDescriptor {
        path: "/dev/ttyUSB0".into(),
        manufacturer: Some("Silicon Labs".into()),
        product: None,
    };
    assert_eq!(port.to_string(), "/dev/ttyUSB0: (Silicon Labs / )");
}
