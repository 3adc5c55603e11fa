//! Provisioning of a single biosensor: detection, upload and connectivity
//! handshake.
//!
//! **Example** - Running a session for biosensor #1:
//! ```ignore
//! let ctx = SessionContext {
//!     index: 1,
//!     settings: &settings,
//!     ports: &SystemPorts,
//!     toolchain: &PlatformIo::new(&settings),
//!     connector: &SerialConnector::new(settings.clone()),
//! };
//! let outcome = ProvisioningSession::new(ctx).run();
//! ```

mod events;
mod state_machine;
mod states;

use std::fmt;

use crate::error::{Error, Result};
use crate::flasher::Toolchain;
use crate::utils::{Connector, PortEnumerator};
use crate::Settings;

pub use state_machine::ProvisioningSession;

/// Everything a session needs to reach its biosensor. Shared by all the states
/// of the session.
#[derive(Clone, Copy)]
pub struct SessionContext<'a> {
    /// 1-based number of the biosensor in the fleet.
    pub index: u32,
    pub settings: &'a Settings,
    pub ports: &'a dyn PortEnumerator,
    pub toolchain: &'a dyn Toolchain,
    pub connector: &'a dyn Connector,
}
impl fmt::Debug for SessionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("index", &self.index)
            .field("verify_connectivity", &self.settings.verify_connectivity)
            .finish()
    }
}

/// How the provisioning of one biosensor ended.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DeviceResult {
    /// Flashed, and verified when verification was requested.
    Flashed,
    WifiFailed,
    BrokerFailed,
    /// The upload failed; holds what the toolchain reported.
    FlashFailed(String),
    NoDeviceFound,
    /// The serial line failed during the handshake.
    LinkFailed(String),
}
impl fmt::Display for DeviceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceResult::Flashed => f.write_str("provisioned"),
            DeviceResult::WifiFailed => f.write_str("WiFi connection timed out"),
            DeviceResult::BrokerFailed => f.write_str("MQTT broker connection timed out"),
            DeviceResult::FlashFailed(status) => write!(f, "firmware upload failed ({})", status),
            DeviceResult::NoDeviceFound => f.write_str("biosensor not detected"),
            DeviceResult::LinkFailed(reason) => write!(f, "serial link failed ({})", reason),
        }
    }
}

/// The result of one session, tagged with the biosensor number.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeviceOutcome {
    pub index: u32,
    pub result: DeviceResult,
}
impl DeviceOutcome {
    pub fn is_done(&self) -> bool {
        self.result == DeviceResult::Flashed
    }

    /// Converts a failed outcome into the matching [`Error`].
    pub fn into_result(self) -> Result<()> {
        let index = self.index;
        match self.result {
            DeviceResult::Flashed => Ok(()),
            DeviceResult::WifiFailed => Err(Error::WifiFailed { index }),
            DeviceResult::BrokerFailed => Err(Error::BrokerFailed { index }),
            DeviceResult::FlashFailed(status) => Err(Error::FlashFailed { index, status }),
            DeviceResult::NoDeviceFound => Err(Error::NoDeviceFound { index: Some(index) }),
            DeviceResult::LinkFailed(reason) => Err(Error::LinkFailed { index, reason }),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
