//! Event taxonomy and the listener contract.
//!
//! Every component talks to every other component through [`Event`]
//! values posted on the [`EventBus`](crate::bus::EventBus).  The enum is
//! closed: adding a variant forces every exhaustive `match` (codec, copy
//! registry, endpoint filters) to be revisited.
//!
//! ## Taxonomy
//!
//! | Group            | Variants                                                    |
//! |------------------|-------------------------------------------------------------|
//! | control          | `Tick`, `Render`, `ProgramQuit`                             |
//! | connection       | `ServerConnected`, `ClientConnected`, `NewClientConnected`  |
//! | input            | `UserKeyboardInput`, `UserMouseInput`                       |
//! | client → server  | `GameStartRequest`, `CompleteGameStateRequest`, `CharacterMoveRequest`, `CreateProjectileRequest`, `PlaceWallRequest`, `TextMessage` |
//! | server → client  | `GameStarted`, `CompleteGameState`, `CharacterStates`       |
//!
//! `TextMessage` is the only variant whose network flag is chosen per
//! instance; every other variant takes the default of its kind.

use crate::bus::EventBus;
use crate::endpoint::PeerHandle;
use crate::registry::SharedObject;
use crate::types::{
    ClientNumber, Direction, GridPosition, MouseButton, ObjectId, ObjectSnapshot, ScreenPosition,
};
use std::fmt;
use std::net::IpAddr;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Event {
    /// Simulation step boundary.  Posting one drains the bus queue.
    Tick { delta_time: f64 },
    Render,
    ProgramQuit,

    /// Client side: the connection to the server is up.
    ServerConnected { peer: PeerHandle },
    /// Server side: a client connected.
    ClientConnected { peer: PeerHandle },
    /// Server side, posted right after `ClientConnected` for game code
    /// that only needs the number and address of the newcomer.
    NewClientConnected {
        client_number: ClientNumber,
        client_ip: Option<IpAddr>,
    },

    GameStartRequest {
        origin: Option<ClientNumber>,
    },
    /// Carries the game object itself; only its id crosses the network.
    GameStarted { game: SharedObject },
    CompleteGameState { game_state: Vec<ObjectSnapshot> },
    CompleteGameStateRequest {
        origin: Option<ClientNumber>,
    },
    /// Authoritative character positions, server to client.
    CharacterStates { character_states: Vec<ObjectSnapshot> },

    UserKeyboardInput {
        input: Direction,
        origin: Option<ClientNumber>,
    },
    UserMouseInput {
        button: MouseButton,
        position: ScreenPosition,
    },

    CharacterMoveRequest {
        character_id: ObjectId,
        direction: Direction,
        origin: Option<ClientNumber>,
    },
    CreateProjectileRequest {
        starting_position: ScreenPosition,
        target_position: ScreenPosition,
        emitter_id: ObjectId,
        origin: Option<ClientNumber>,
    },
    PlaceWallRequest {
        grid_position: GridPosition,
        origin: Option<ClientNumber>,
    },
    TextMessage {
        text: String,
        send_over_network: bool,
        origin: Option<ClientNumber>,
    },
}

impl Event {
    pub fn tick(delta_time: f64) -> Self {
        Event::Tick { delta_time }
    }

    /// Local text message; `send_over_network` decides whether the
    /// endpoint may mirror it.
    pub fn text_message(text: impl Into<String>, send_over_network: bool) -> Self {
        Event::TextMessage {
            text: text.into(),
            send_over_network,
            origin: None,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Tick { .. } => EventKind::Tick,
            Event::Render => EventKind::Render,
            Event::ProgramQuit => EventKind::ProgramQuit,
            Event::ServerConnected { .. } => EventKind::ServerConnected,
            Event::ClientConnected { .. } => EventKind::ClientConnected,
            Event::NewClientConnected { .. } => EventKind::NewClientConnected,
            Event::GameStartRequest { .. } => EventKind::GameStartRequest,
            Event::GameStarted { .. } => EventKind::GameStarted,
            Event::CompleteGameState { .. } => EventKind::CompleteGameState,
            Event::CompleteGameStateRequest { .. } => EventKind::CompleteGameStateRequest,
            Event::CharacterStates { .. } => EventKind::CharacterStates,
            Event::UserKeyboardInput { .. } => EventKind::UserKeyboardInput,
            Event::UserMouseInput { .. } => EventKind::UserMouseInput,
            Event::CharacterMoveRequest { .. } => EventKind::CharacterMoveRequest,
            Event::CreateProjectileRequest { .. } => EventKind::CreateProjectileRequest,
            Event::PlaceWallRequest { .. } => EventKind::PlaceWallRequest,
            Event::TextMessage { .. } => EventKind::TextMessage,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// The peer that produced this event, if it arrived over the network.
    pub fn origin(&self) -> Option<ClientNumber> {
        match self {
            Event::GameStartRequest { origin }
            | Event::CompleteGameStateRequest { origin }
            | Event::UserKeyboardInput { origin, .. }
            | Event::CharacterMoveRequest { origin, .. }
            | Event::CreateProjectileRequest { origin, .. }
            | Event::PlaceWallRequest { origin, .. }
            | Event::TextMessage { origin, .. } => *origin,
            _ => None,
        }
    }

    pub fn send_over_network(&self) -> bool {
        match self {
            Event::TextMessage {
                send_over_network, ..
            } => *send_over_network,
            other => other.kind().send_over_network(),
        }
    }
}

/// Field-wise equality.  `GameStarted` compares by object identity and
/// connection events by peer identity.
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        use Event::*;
        match (self, other) {
            (Tick { delta_time: a }, Tick { delta_time: b }) => a == b,
            (Render, Render) | (ProgramQuit, ProgramQuit) => true,
            (ServerConnected { peer: a }, ServerConnected { peer: b })
            | (ClientConnected { peer: a }, ClientConnected { peer: b }) => a.same_peer(b),
            (
                NewClientConnected { client_number: a, client_ip: ia },
                NewClientConnected { client_number: b, client_ip: ib },
            ) => a == b && ia == ib,
            (GameStartRequest { origin: a }, GameStartRequest { origin: b }) => a == b,
            (GameStarted { game: a }, GameStarted { game: b }) => Rc::ptr_eq(a, b),
            (CompleteGameState { game_state: a }, CompleteGameState { game_state: b }) => a == b,
            (
                CompleteGameStateRequest { origin: a },
                CompleteGameStateRequest { origin: b },
            ) => a == b,
            (CharacterStates { character_states: a }, CharacterStates { character_states: b }) => {
                a == b
            }
            (
                UserKeyboardInput { input: a, origin: oa },
                UserKeyboardInput { input: b, origin: ob },
            ) => a == b && oa == ob,
            (
                UserMouseInput { button: a, position: pa },
                UserMouseInput { button: b, position: pb },
            ) => a == b && pa == pb,
            (
                CharacterMoveRequest { character_id: ca, direction: da, origin: oa },
                CharacterMoveRequest { character_id: cb, direction: db, origin: ob },
            ) => ca == cb && da == db && oa == ob,
            (
                CreateProjectileRequest {
                    starting_position: sa,
                    target_position: ta,
                    emitter_id: ea,
                    origin: oa,
                },
                CreateProjectileRequest {
                    starting_position: sb,
                    target_position: tb,
                    emitter_id: eb,
                    origin: ob,
                },
            ) => sa == sb && ta == tb && ea == eb && oa == ob,
            (
                PlaceWallRequest { grid_position: a, origin: oa },
                PlaceWallRequest { grid_position: b, origin: ob },
            ) => a == b && oa == ob,
            (
                TextMessage { text: a, send_over_network: sa, origin: oa },
                TextMessage { text: b, send_over_network: sb, origin: ob },
            ) => a == b && sa == sb && oa == ob,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Fieldless discriminant of [`Event`].
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum EventKind {
    Tick,
    Render,
    ProgramQuit,
    ServerConnected,
    ClientConnected,
    NewClientConnected,
    GameStartRequest,
    GameStarted,
    CompleteGameState,
    CompleteGameStateRequest,
    CharacterStates,
    UserKeyboardInput,
    UserMouseInput,
    CharacterMoveRequest,
    CreateProjectileRequest,
    PlaceWallRequest,
    TextMessage,
}

impl EventKind {
    /// Discriminant used in wire records (`"UserKeyboardInputEvent"`).
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Tick => "TickEvent",
            EventKind::Render => "RenderEvent",
            EventKind::ProgramQuit => "ProgramQuitEvent",
            EventKind::ServerConnected => "ServerConnectEvent",
            EventKind::ClientConnected => "ClientConnectEvent",
            EventKind::NewClientConnected => "NewClientConnectedEvent",
            EventKind::GameStartRequest => "GameStartRequestEvent",
            EventKind::GameStarted => "GameStartedEvent",
            EventKind::CompleteGameState => "CompleteGameStateEvent",
            EventKind::CompleteGameStateRequest => "CompleteGameStateRequestEvent",
            EventKind::CharacterStates => "CharacterStatesEvent",
            EventKind::UserKeyboardInput => "UserKeyboardInputEvent",
            EventKind::UserMouseInput => "UserMouseInputEvent",
            EventKind::CharacterMoveRequest => "CharacterMoveRequestEvent",
            EventKind::CreateProjectileRequest => "CreateProjectileRequestEvent",
            EventKind::PlaceWallRequest => "PlaceWallRequestEvent",
            EventKind::TextMessage => "TextMessageEvent",
        }
    }

    /// Default transmissibility.  The endpoint still consults its
    /// allow-list before anything is sent, and a `TextMessage` instance
    /// may opt out (see [`Event::send_over_network`]).
    pub fn send_over_network(&self) -> bool {
        match self {
            EventKind::Tick
            | EventKind::Render
            | EventKind::ProgramQuit
            | EventKind::ServerConnected
            | EventKind::ClientConnected
            | EventKind::NewClientConnected
            | EventKind::UserMouseInput => false,
            EventKind::GameStartRequest
            | EventKind::GameStarted
            | EventKind::CompleteGameState
            | EventKind::CompleteGameStateRequest
            | EventKind::CharacterStates
            | EventKind::UserKeyboardInput
            | EventKind::CharacterMoveRequest
            | EventKind::CreateProjectileRequest
            | EventKind::PlaceWallRequest
            | EventKind::TextMessage => true,
        }
    }

    /// Tick / render / quit / connection events are handled by the
    /// endpoint's state machine and never forwarded.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            EventKind::Tick
                | EventKind::Render
                | EventKind::ProgramQuit
                | EventKind::ServerConnected
                | EventKind::ClientConnected
                | EventKind::NewClientConnected
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Failure reported by a listener.  The bus logs it and keeps dispatching.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Transport(#[from] crate::transport::TransportError),
}

/// Anything that reacts to bus events.
///
/// ## Lifecycle contract
///
/// The bus keeps only a `Weak` reference: registering never extends a
/// listener's lifetime and a dropped listener is skipped automatically.
/// Owners should still call [`EventBus::unregister`] from their teardown
/// path so queued events stop reaching a listener that is shutting down.
pub trait Listener {
    fn notify(&mut self, event: &Event, bus: &EventBus) -> Result<(), ListenerError>;
}
