//! Events for the `hivekit` provisioning session state machine.
//!
//! This modules is private and restricted to the
//! [`provisioning`](crate::provisioning) scope. The public interface of the
//! state machine is provided by [`provisioning`](crate::provisioning).
//!
//! ```ignore
//! use super::events::*;
//! ```
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use crate::serial_link::SerialLink;
use crate::utils::PortDescriptor;

use super::{DeviceResult, SessionContext};

// =============================================================================
// Crate-Public Interface
// =============================================================================

// DetectEvent =================================================================

/// Event fired from [`StartState`](super::states::StartState) to look for the
/// biosensor on the serial ports.
#[derive(Debug)]
pub(crate) struct DetectEvent<'a> {
    pub ctx: SessionContext<'a>,
}

// PortDetectedEvent ===========================================================

/// Event fired when exactly one port (or the first of many) was picked for the
/// biosensor. Triggers the transition to the `Flashing` state.
#[derive(Debug)]
pub(crate) struct PortDetectedEvent<'a> {
    pub ctx: SessionContext<'a>,
    /// The port the firmware will be uploaded through.
    pub port: PortDescriptor,
}

// StartHandshakeEvent =========================================================

/// Event fired after a successful upload when the connectivity of the
/// biosensor has to be verified. Triggers the transition to the WiFi part of
/// the handshake.
#[derive(Debug)]
pub(crate) struct StartHandshakeEvent<'a> {
    pub ctx: SessionContext<'a>,
    /// The port the biosensor was flashed through, the handshake reopens it.
    pub port: PortDescriptor,
}

// WifiConnectedEvent ==========================================================

/// Event fired when the biosensor reported `WifiConnected`. Triggers the
/// transition to the broker part of the handshake.
#[derive(Debug)]
pub(crate) struct WifiConnectedEvent<'a> {
    pub ctx: SessionContext<'a>,
    /// The open link to the biosensor. Consumed and moved to the next state.
    pub link: SerialLink,
}

// DoneEvent ===================================================================

/// Event fired when the session reached its result, whatever it is. Triggers
/// a transition to the `Done` state.
#[derive(Debug)]
pub(crate) struct DoneEvent<'a> {
    pub ctx: SessionContext<'a>,
    pub result: DeviceResult,
}

// ExitEvent ===================================================================

/// The last event of a session, it terminates the event loop and hands the
/// outcome back to whoever started the session.
#[derive(Debug)]
pub(crate) struct ExitEvent<'a> {
    pub ctx: SessionContext<'a>,
    pub result: DeviceResult,
}

// Events enum ==================================================================

/// Events that can be triggered within the provisioning session state machine.
///
/// Each possible value holds an `event`, which in turn may hold additional data
/// for the state transition. Such data is passed by the origin state for
/// potential use by the target state.
#[derive(Debug)]
pub(crate) enum Event<'a> {
    Detect(DetectEvent<'a>),
    PortDetected(PortDetectedEvent<'a>),
    StartHandshake(StartHandshakeEvent<'a>),
    WifiConnected(WifiConnectedEvent<'a>),
    Done(DoneEvent<'a>),
    Exit(ExitEvent<'a>),
}
