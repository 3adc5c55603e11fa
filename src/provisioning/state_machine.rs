//! `hivekit` provisioning session state machine.
//!
//! A session takes one biosensor from "just plugged in" to "flashed and
//! verified". The handshake part only runs when the operator confirmed that
//! the fleet's WiFi network is reachable where the provisioning happens.
//!
//! ```text
//!                 START
//!                   |
//!                   v
//!              .---------.
//!              |  Start  |
//!              '---------'
//!                   |
//!                   v
//!            .-------------.   no port
//!            |  Detecting  |----------------------------.
//!            '-------------'                            |
//!                   |                                   |
//!                   v                                   |
//!            .-------------.   upload failed            |
//!            |  Flashing   |----------------------------|
//!            '-------------'                            |
//!              |         |   no verification            |
//!              |         '------------------------------|
//!              v                                        |
//!     .-----------------.   WifiTimeout / link error    |
//!     |  WifiHandshake  |-------------------------------|
//!     '-----------------'                               |
//!              |  WifiConnected                         |
//!              v                                        |
//!     .-----------------.   MqttTimeout / link error    |
//!     | BrokerHandshake |-------------------------------|
//!     '-----------------'                               |
//!              |  MqttConnected                         v
//!              |                                  .----------.
//!              '--------------------------------->|   Done   |
//!                                                 '----------'
//!                                                       |
//!                                                       v
//!                                                      END
//! ```

use super::events::*;
use super::states::*;
use super::{DeviceOutcome, SessionContext};

// =============================================================================
// Public Interface
// =============================================================================

/// Provisions one biosensor. Create it with [`ProvisioningSession::new`] then
/// run it by calling its [`run`](ProvisioningSession::run) method.
pub struct ProvisioningSession<'a> {
    sm: SessionStates<'a>,
}
impl<'a> ProvisioningSession<'a> {
    pub fn new(ctx: SessionContext<'a>) -> Self {
        ProvisioningSession {
            // The state machine naturally starts in the `Start` state.
            sm: SessionStates::Start(SessionSM::new(ctx)),
        }
    }

    /// The session event loop runs until the `Done` state is reached and its
    /// `should_exit` flag is set. At such point, the event loop terminates and
    /// returns the outcome for the biosensor.
    pub fn run(mut self) -> DeviceOutcome {
        loop {
            self.sm = self.sm.step();
            if let SessionStates::Done(sm) = &self.sm {
                if sm.state.should_exit {
                    return DeviceOutcome {
                        index: sm.ctx.index,
                        result: sm.state.result.clone(),
                    };
                }
            }
        }
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// The raw state machine of a provisioning session.
///
/// Note that using a generic type that holds the current state serves two
/// purposes. It allows for also having shared data by all states that is not
/// really part of state data (the biosensor number and the collaborators used
/// to reach it). Additionally, it's nicer when debugging to see the state
/// machine and the current state it is holding at any time.
#[derive(Debug)]
struct SessionSM<'a, S: Runnable> {
    ctx: SessionContext<'a>,
    state: S,
}
impl<'a, S: Runnable> SessionSM<'a, S> {
    fn run(&mut self) -> Event<'a> {
        self.state.run(&self.ctx)
    }
}

/// The state machine starts in the `StartState`.
impl<'a> SessionSM<'a, StartState> {
    fn new(ctx: SessionContext<'a>) -> Self {
        SessionSM {
            ctx,
            state: StartState {},
        }
    }
}

/// An enum wrapper around the states of the session state machine. It provides
/// a simpler and more intuitive model for manipulating states and their
/// transitions.
enum SessionStates<'a> {
    Start(SessionSM<'a, StartState>),
    Detecting(SessionSM<'a, DetectingState>),
    Flashing(SessionSM<'a, FlashingState>),
    WifiHandshake(SessionSM<'a, WifiHandshakeState>),
    BrokerHandshake(SessionSM<'a, BrokerHandshakeState>),
    Done(SessionSM<'a, DoneState>),
}
impl<'a> SessionStates<'a> {
    /// The unit of work in the state machine event loop. It runs the current
    /// state and decides the next transition from the event it returns. State
    /// transitions from events are implemented using the rust `From`/`Into`
    /// pattern.
    fn step(&mut self) -> Self {
        match self {
            SessionStates::Start(sm) => {
                let event = sm.run();
                match event {
                    Event::Detect(ev) => SessionStates::Detecting(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SessionStates::Detecting(sm) => {
                let event = sm.run();
                match event {
                    Event::PortDetected(ev) => SessionStates::Flashing(ev.into()),
                    Event::Done(ev) => SessionStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SessionStates::Flashing(sm) => {
                let event = sm.run();
                match event {
                    Event::StartHandshake(ev) => SessionStates::WifiHandshake(ev.into()),
                    Event::Done(ev) => SessionStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SessionStates::WifiHandshake(sm) => {
                let event = sm.run();
                match event {
                    Event::WifiConnected(ev) => SessionStates::BrokerHandshake(ev.into()),
                    Event::Done(ev) => SessionStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SessionStates::BrokerHandshake(sm) => {
                let event = sm.run();
                match event {
                    Event::Done(ev) => SessionStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SessionStates::Done(sm) => {
                let event = sm.run();
                match event {
                    Event::Exit(ev) => SessionStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl<'a> From<DetectEvent<'a>> for SessionSM<'a, DetectingState> {
    fn from(event: DetectEvent<'a>) -> SessionSM<'a, DetectingState> {
        SessionSM {
            ctx: event.ctx,
            state: DetectingState {},
        }
    }
}

impl<'a> From<PortDetectedEvent<'a>> for SessionSM<'a, FlashingState> {
    fn from(event: PortDetectedEvent<'a>) -> SessionSM<'a, FlashingState> {
        SessionSM {
            ctx: event.ctx,
            state: FlashingState {
                port: Some(event.port),
            },
        }
    }
}

impl<'a> From<StartHandshakeEvent<'a>> for SessionSM<'a, WifiHandshakeState> {
    fn from(event: StartHandshakeEvent<'a>) -> SessionSM<'a, WifiHandshakeState> {
        SessionSM {
            ctx: event.ctx,
            state: WifiHandshakeState {
                port: Some(event.port),
            },
        }
    }
}

impl<'a> From<WifiConnectedEvent<'a>> for SessionSM<'a, BrokerHandshakeState> {
    fn from(event: WifiConnectedEvent<'a>) -> SessionSM<'a, BrokerHandshakeState> {
        SessionSM {
            ctx: event.ctx,
            state: BrokerHandshakeState {
                link: Some(event.link),
            },
        }
    }
}

impl<'a> From<DoneEvent<'a>> for SessionSM<'a, DoneState> {
    fn from(event: DoneEvent<'a>) -> SessionSM<'a, DoneState> {
        SessionSM {
            ctx: event.ctx,
            state: DoneState {
                result: event.result,
                should_exit: false,
            },
        }
    }
}
impl<'a> From<ExitEvent<'a>> for SessionSM<'a, DoneState> {
    fn from(event: ExitEvent<'a>) -> SessionSM<'a, DoneState> {
        SessionSM {
            ctx: event.ctx,
            state: DoneState {
                result: event.result,
                should_exit: true,
            },
        }
    }
}
