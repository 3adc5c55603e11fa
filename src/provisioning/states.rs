//! States for the `hivekit` provisioning session state machine.
//!
//! This modules is private and restricted to the
//! [`provisioning`](crate::provisioning) scope. The public interface of the
//! state machine is provided by [`provisioning`](crate::provisioning).
//!
//! ```ignore
//! use super::states::*;
//! ```
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use std::{thread, time::Instant};

use console::style;
use log::{debug, info};

use super::events::*;
use super::{DeviceResult, SessionContext};

use crate::detector::DeviceDetector;
use crate::flasher::BuildFlashInvoker;
use crate::serial_link::{Command, Sentinel, SerialLink};
use crate::utils::{spinner, PortDescriptor};
use crate::Error;

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Trait adding the ability for a state to be `run` after a transition into it.
pub(crate) trait Runnable {
    /// A state implements this method so it can be `run` after the state
    /// machine transitions into it.
    ///
    /// During this call, the state can do any work that needs to be done and
    /// when finished, requests a transition to a `new state` by returning the
    /// appropriate `event`. The `state` and the `event` are consumed to create
    /// the `new state` using the corresponding [`From`] trait implementation
    /// (provided such implementation exists).
    fn run<'a>(&mut self, ctx: &SessionContext<'a>) -> Event<'a>;
}

// Start State =================================================================

/// The initial state of a provisioning session. It always evolves into
/// [`DetectingState`] via a [`DetectEvent`].
#[derive(Debug)]
pub(crate) struct StartState {}
impl Runnable for StartState {
    fn run<'a>(&mut self, ctx: &SessionContext<'a>) -> Event<'a> {
        info!("=> Start (biosensor #{})", ctx.index);
        Event::Detect(DetectEvent { ctx: *ctx })
    }
}

// Detecting State =============================================================

/// Looks for the biosensor on the serial ports.
///
///  * **[`PortDetectedEvent`] => [`FlashingState`]** when a port was found,
///  * **[`DoneEvent`] => [`DoneState`]** with [`DeviceResult::NoDeviceFound`]
///    otherwise.
#[derive(Debug)]
pub(crate) struct DetectingState {}
impl Runnable for DetectingState {
    fn run<'a>(&mut self, ctx: &SessionContext<'a>) -> Event<'a> {
        info!("=> Detecting");
        match DeviceDetector::new(ctx.ports).detect() {
            Ok(port) => {
                println!("[HK] 🔌 Biosensor #{} found on {}", ctx.index, style(&port).cyan());
                Event::PortDetected(PortDetectedEvent { ctx: *ctx, port })
            }
            Err(_) => done(ctx, DeviceResult::NoDeviceFound),
        }
    }
}

// Flashing State ==============================================================

/// Builds and uploads the firmware of the biosensor.
///
///  * **[`StartHandshakeEvent`] => [`WifiHandshakeState`]** after a successful
///    upload, when connectivity has to be verified,
///  * **[`DoneEvent`] => [`DoneState`]** after a successful upload without
///    verification ([`DeviceResult::Flashed`]) or when the upload failed
///    ([`DeviceResult::FlashFailed`]).
#[derive(Debug)]
pub(crate) struct FlashingState {
    /// Consumed and moved upon the transition to [`WifiHandshakeState`].
    pub port: Option<PortDescriptor>,
}
impl Runnable for FlashingState {
    fn run<'a>(&mut self, ctx: &SessionContext<'a>) -> Event<'a> {
        info!("=> Flashing");
        if let Some(port) = self.port.take() {
            println!("[HK] ⏩ Uploading firmware to biosensor #{}...", ctx.index);
            if let Err(e) = BuildFlashInvoker::new(ctx.toolchain).flash(ctx.index, &port) {
                let status = match e {
                    Error::FlashFailed { status, .. } => status,
                    other => other.to_string(),
                };
                return done(ctx, DeviceResult::FlashFailed(status));
            }
            println!("[HK] 👍 Upload done!");

            if !ctx.settings.verify_connectivity {
                debug!("connectivity verification disabled for this run");
                return done(ctx, DeviceResult::Flashed);
            }
            return Event::StartHandshake(StartHandshakeEvent { ctx: *ctx, port });
        }

        // We should never reach here!
        unreachable!()
    }
}

// WifiHandshake State =========================================================

/// First part of the handshake: puts the freshly flashed firmware in managed
/// mode and asks it to join the WiFi network.
///
///  * **[`WifiConnectedEvent`] => [`BrokerHandshakeState`]** when the firmware
///    reports `WifiConnected`,
///  * **[`DoneEvent`] => [`DoneState`]** with [`DeviceResult::WifiFailed`] on
///    `WifiTimeout`, [`DeviceResult::NoDeviceFound`] when the port cannot be
///    reopened and [`DeviceResult::LinkFailed`] on serial errors.
#[derive(Debug)]
pub(crate) struct WifiHandshakeState {
    pub port: Option<PortDescriptor>,
}
impl Runnable for WifiHandshakeState {
    fn run<'a>(&mut self, ctx: &SessionContext<'a>) -> Event<'a> {
        info!("=> WifiHandshake");
        if let Some(port) = self.port.take() {
            println!("[HK] 📡 Checking biosensor #{} connection...", ctx.index);
            // Leave the firmware the time to reboot after the upload; it only
            // listens for `managedMode` for a short while after boot.
            thread::sleep(ctx.settings.settle_delay);

            let mut link = match ctx.connector.open(&port) {
                Ok(transport) => SerialLink::new(port.path(), transport),
                Err(e) => {
                    info!("error: {}", e);
                    return done(ctx, DeviceResult::NoDeviceFound);
                }
            };

            let sent = link
                .send(Command::ManagedMode)
                .and_then(|_| link.send(Command::ConnectWifi));
            if let Err(e) = sent {
                return done(ctx, DeviceResult::LinkFailed(e.to_string()));
            }

            return match await_sentinel(&mut link, ctx, Sentinel::WifiConnected, Sentinel::WifiTimeout)
            {
                Wait::Connected => Event::WifiConnected(WifiConnectedEvent { ctx: *ctx, link }),
                Wait::TimedOut => done(ctx, DeviceResult::WifiFailed),
                Wait::Failed(reason) => done(ctx, DeviceResult::LinkFailed(reason)),
            };
        }

        // We should never reach here!
        unreachable!()
    }
}

// BrokerHandshake State =======================================================

/// Second part of the handshake: asks the firmware to connect to the broker.
/// The link to the biosensor is closed when this state completes.
///
///  * **[`DoneEvent`] => [`DoneState`]** with [`DeviceResult::Flashed`] on
///    `MqttConnected`, [`DeviceResult::BrokerFailed`] on `MqttTimeout` and
///    [`DeviceResult::LinkFailed`] on serial errors.
#[derive(Debug)]
pub(crate) struct BrokerHandshakeState {
    /// The open link to the biosensor, dropped (closed) by this state.
    pub link: Option<SerialLink>,
}
impl Runnable for BrokerHandshakeState {
    fn run<'a>(&mut self, ctx: &SessionContext<'a>) -> Event<'a> {
        info!("=> BrokerHandshake");
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.send(Command::ConnectMqtt) {
                return done(ctx, DeviceResult::LinkFailed(e.to_string()));
            }
            let result =
                match await_sentinel(&mut link, ctx, Sentinel::MqttConnected, Sentinel::MqttTimeout) {
                    Wait::Connected => DeviceResult::Flashed,
                    Wait::TimedOut => DeviceResult::BrokerFailed,
                    Wait::Failed(reason) => DeviceResult::LinkFailed(reason),
                };
            debug!("closing {}", link.name());
            drop(link);
            return done(ctx, result);
        }

        // We should never reach here!
        unreachable!()
    }
}

// Done State ==================================================================

/// Reached when the session has its result, good or bad.
///
/// This state goes into a 2-phase execution. During the initial phase, it runs
/// like any other state to report the result to the operator. It then
/// triggers the [`ExitEvent`] to cause the session to terminate.
#[derive(Debug, Clone)]
pub(crate) struct DoneState {
    pub result: DeviceResult,
    /// When `true` instructs the session state machine to exit its event loop.
    pub should_exit: bool,
}
impl Runnable for DoneState {
    fn run<'a>(&mut self, ctx: &SessionContext<'a>) -> Event<'a> {
        info!("=> Done ({:?})", self.result);
        match &self.result {
            DeviceResult::Flashed => {
                println!("[HK] ✅ Biosensor #{} is ready", ctx.index);
            }
            failure => {
                println!(
                    "{}",
                    style(format!("[HK] 💥 Biosensor #{}: {}", ctx.index, failure)).red()
                );
            }
        }
        Event::Exit(ExitEvent {
            ctx: *ctx,
            result: self.result.clone(),
        })
    }
}

// =============================================================================
// Private stuff
// =============================================================================

fn done<'a>(ctx: &SessionContext<'a>, result: DeviceResult) -> Event<'a> {
    Event::Done(DoneEvent { ctx: *ctx, result })
}

/// How a wait for a sentinel line ended.
enum Wait {
    /// The success sentinel was received.
    Connected,
    /// The firmware gave up and reported its own timeout.
    TimedOut,
    /// The link broke or the host-side timeout expired.
    Failed(String),
}

/// Reads lines until one of the two sentinels shows up. Anything else the
/// firmware prints in between is ignored.
fn await_sentinel(
    link: &mut SerialLink,
    ctx: &SessionContext<'_>,
    success: Sentinel,
    failure: Sentinel,
) -> Wait {
    let pb = spinner(format!("⌛ Waiting for {:?} or {:?}...", success, failure));
    let deadline = ctx
        .settings
        .handshake_timeout
        .map(|timeout| Instant::now() + timeout);

    let wait = loop {
        match link.receive_line_before(deadline) {
            Ok(Some(line)) => match Sentinel::parse(&line) {
                Some(s) if s == success => break Wait::Connected,
                Some(s) if s == failure => break Wait::TimedOut,
                _ => debug!("ignored: {}", line),
            },
            Ok(None) => {
                break Wait::Failed(format!(
                    "no {:?} or {:?} within {:?}",
                    success,
                    failure,
                    ctx.settings.handshake_timeout.unwrap_or_default()
                ))
            }
            Err(e) => break Wait::Failed(e.to_string()),
        }
    };
    pb.finish_and_clear();
    wait
}
