//! Hivekit provisions a network (fleet) of biosensors: it turns the fleet
//! configuration (network size, WiFi credentials, MQTT broker credentials)
//! into a firmware header, builds and uploads the firmware to each biosensor
//! over its serial port with the biosensor number compiled in, and checks
//! that every biosensor joins the WiFi network and the broker before the
//! operator moves on to the next one.
//!
//! Biosensors are provisioned one at a time, by a human plugging them in one
//! after the other. There is nothing to gain from doing several at once and a
//! lot to lose (cross-talk between serial lines, picking the wrong device), so
//! everything here is sequential and blocking.
//!
//! The provisioning of one biosensor is implemented as a state machine.
//! State machines are implemented in terms of **states** and **transitions**
//! between them with the following characteristics:
//!
//! * Can only be in one state at any time.
//! * Each state can have its own associated data if needed.
//! * It is possible to have some shared data between **all** states.
//! * Transitions between states are triggered via typed **events** and follow
//!   defined semantics.
//! * Only explicitly defined transitions should be permitted and as many errors
//!   should be detected at **compile-time**.
//! * Transitioning from one state to another consumes the original state and
//!   renders it unusable. Any transition back to that state would create a new
//!   state.
//! * Data can be transferred from one state to the next by attaching it to the
//!   transition event. Such data is statically defined as part of the event
//!   type.
//!
//! The implementation of state transitions leverages `rust`'s `From` and `Into`
//! pattern. The `From` trait allows for a type to define how to create itself
//! from another type, hence providing us an intuitive and simple mechanism for
//! converting `events` into new `states`. Only transitions for which the
//! `From` trait is implemented are authorized and any other transition would
//! be detected at compile-time as an error.
//!
//! Everything the state machine talks to (serial port enumeration, the
//! firmware toolchain, the serial ports themselves, the operator) sits behind
//! a trait, with the real implementation provided here as well:
//!
//! | Trait                  | Implementation                         |
//! |------------------------|----------------------------------------|
//! | [`PortEnumerator`]     | [`SystemPorts`]                        |
//! | [`Connector`]          | [`SerialConnector`]                    |
//! | [`Toolchain`]          | [`PlatformIo`]                         |
//! | [`Operator`]           | [`TermOperator`]                       |
//! | [`BrokerProbe`]        | [`TcpProbe`]                           |

mod broker;
mod config;
mod detector;
mod error;
mod fleet;
mod flasher;
mod header;
mod provisioning;
mod serial_link;
mod settings;
mod store;
mod utils;

pub use broker::{ensure_reachable, BrokerProbe, TcpProbe};
pub use config::{query_device, BrokerCredentials, Config, ConfigSource, DeviceInfo};
pub use detector::DeviceDetector;
pub use error::{Error, Result};
pub use fleet::{first_failure, FleetOrchestrator, Operator, TermOperator};
pub use flasher::{build_flags, BuildFlashInvoker, PlatformIo, Toolchain, BUILD_FLAGS_VAR};
pub use header::HEADER_FILENAME;
pub use provisioning::{DeviceOutcome, DeviceResult, ProvisioningSession, SessionContext};
pub use serial_link::{Command, LinkError, Sentinel, SerialLink};
pub use settings::{Settings, SettingsBuilder};
pub use store::{FleetStore, CONFIG_FILENAME};
pub use utils::{Connector, PortDescriptor, PortEnumerator, SerialConnector, SystemPorts, Transport};
