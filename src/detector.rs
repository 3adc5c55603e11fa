//! Finds the biosensor the operator just plugged in.
//!
//! Provisioning is done one biosensor at a time, so exactly one serial port is
//! expected. More than one is tolerated with a warning and the first port
//! listed by the system is used; unplugging the other devices is the way to
//! make the choice explicit.

use log::{info, warn};

use crate::error::{Error, Result};
use crate::utils::{PortDescriptor, PortEnumerator};

pub struct DeviceDetector<'a> {
    ports: &'a dyn PortEnumerator,
}
impl<'a> DeviceDetector<'a> {
    pub fn new(ports: &'a dyn PortEnumerator) -> Self {
        DeviceDetector { ports }
    }

    /// Takes a snapshot of the attached serial ports and picks the biosensor.
    /// Does not wait for a device to show up.
    pub fn detect(&self) -> Result<PortDescriptor> {
        let mut candidates = match self.ports.list_ports() {
            Ok(ports) => ports,
            Err(e) => {
                info!("error: {}", e);
                Vec::new()
            }
        };

        match candidates.len() {
            0 => Err(Error::NoDeviceFound { index: None }),
            1 => Ok(candidates.remove(0)),
            n => {
                warn!(
                    "{} serial devices are connected, selecting the first one ({})",
                    n, candidates[0]
                );
                for other in &candidates[1..] {
                    info!("ignored: {}", other);
                }
                Ok(candidates.remove(0))
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::FixedPorts;

    struct BrokenEnumerator;
    impl PortEnumerator for BrokenEnumerator {
        fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "udev",
            )))
        }
    }

    #[test]
    fn no_candidate() {
        let ports = FixedPorts(vec![]);
        let err = DeviceDetector::new(&ports).detect().unwrap_err();
        assert!(matches!(err, Error::NoDeviceFound { .. }));
    }

    #[test]
    fn single_candidate() {
        let ports = FixedPorts(vec!["/dev/ttyUSB0"]);
        let port = DeviceDetector::new(&ports).detect().unwrap();
        assert_eq!(port.path(), "/dev/ttyUSB0");
    }

    #[test]
    fn first_of_many_candidates() {
        let ports = FixedPorts(vec!["/dev/ttyUSB1", "/dev/ttyUSB0", "/dev/ttyACM0"]);
        let port = DeviceDetector::new(&ports).detect().unwrap();
        assert_eq!(port.path(), "/dev/ttyUSB1");
    }

    #[test]
    fn enumeration_failure_means_no_device() {
        let err = DeviceDetector::new(&BrokenEnumerator).detect().unwrap_err();
        assert!(matches!(err, Error::NoDeviceFound { .. }));
    }
}
