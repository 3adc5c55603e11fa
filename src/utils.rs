//! Helpers to deal with serial ports and with the operator's terminal.

mod keyboard;
mod ports;
mod spinner;
#[cfg(test)]
pub(crate) mod testing;

pub(crate) use keyboard::*;
pub use ports::{Connector, PortDescriptor, PortEnumerator, SerialConnector, SystemPorts, Transport};
pub(crate) use spinner::spinner;
