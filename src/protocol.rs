//! Remote-call wire protocol.
//!
//! This module owns **every value that crosses the network boundary**
//! between a client and a server endpoint.
//!
//! ## Remote calls
//!
//! | Call                     | Direction        | Sent when                          |
//! |--------------------------|------------------|------------------------------------|
//! | `SendEvent(copy)`        | client → server  | an allowed local event is observed |
//! | `DeliverEvent(copy)`     | server → client  | an allowed local event is observed |
//! | `Announce(receiver)`     | client → server  | once, right after connecting       |
//!
//! ## Design rules
//!
//! 1. Local events never cross the wire, only their [`CopyEvent`] form.
//! 2. Object references travel as [`ObjectId`]s, never as objects.
//! 3. The peer's origin is never trusted: the receiving endpoint stamps it.

use crate::event::EventKind;
use crate::types::{Direction, GridPosition, ObjectId, ObjectSnapshot, ScreenPosition};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Copy events
// ---------------------------------------------------------------------------

/// Network-transmissible form of an [`Event`](crate::event::Event).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum CopyEvent {
    #[serde(rename = "CopyProgramQuitEvent")]
    ProgramQuit,
    #[serde(rename = "CopyGameStartRequestEvent")]
    GameStartRequest,
    #[serde(rename = "CopyGameStartedEvent")]
    GameStarted { game_id: ObjectId },
    #[serde(rename = "CopyCompleteGameStateEvent")]
    CompleteGameState { game_state: Vec<ObjectSnapshot> },
    #[serde(rename = "CopyCompleteGameStateRequestEvent")]
    CompleteGameStateRequest,
    #[serde(rename = "CopyCharacterStatesEvent")]
    CharacterStates {
        character_states: Vec<ObjectSnapshot>,
    },
    #[serde(rename = "CopyUserKeyboardInputEvent")]
    UserKeyboardInput { input: Direction },
    #[serde(rename = "CopyCharacterMoveRequestEvent")]
    CharacterMoveRequest {
        character_id: ObjectId,
        direction: Direction,
    },
    #[serde(rename = "CopyCreateProjectileRequestEvent")]
    CreateProjectileRequest {
        starting_position: ScreenPosition,
        target_position: ScreenPosition,
        emitter_id: ObjectId,
    },
    #[serde(rename = "CopyPlaceWallRequestEvent")]
    PlaceWallRequest { grid_position: GridPosition },
    #[serde(rename = "CopyTextMessageEvent")]
    TextMessage { text: String },
}

impl CopyEvent {
    pub fn kind(&self) -> CopyKind {
        match self {
            CopyEvent::ProgramQuit => CopyKind::ProgramQuit,
            CopyEvent::GameStartRequest => CopyKind::GameStartRequest,
            CopyEvent::GameStarted { .. } => CopyKind::GameStarted,
            CopyEvent::CompleteGameState { .. } => CopyKind::CompleteGameState,
            CopyEvent::CompleteGameStateRequest => CopyKind::CompleteGameStateRequest,
            CopyEvent::CharacterStates { .. } => CopyKind::CharacterStates,
            CopyEvent::UserKeyboardInput { .. } => CopyKind::UserKeyboardInput,
            CopyEvent::CharacterMoveRequest { .. } => CopyKind::CharacterMoveRequest,
            CopyEvent::CreateProjectileRequest { .. } => CopyKind::CreateProjectileRequest,
            CopyEvent::PlaceWallRequest { .. } => CopyKind::PlaceWallRequest,
            CopyEvent::TextMessage { .. } => CopyKind::TextMessage,
        }
    }
}

/// Type tag of a [`CopyEvent`].  Allow-lists are sets of these.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum CopyKind {
    ProgramQuit,
    GameStartRequest,
    GameStarted,
    CompleteGameState,
    CompleteGameStateRequest,
    CharacterStates,
    UserKeyboardInput,
    CharacterMoveRequest,
    CreateProjectileRequest,
    PlaceWallRequest,
    TextMessage,
}

impl CopyKind {
    pub const ALL: [CopyKind; 11] = [
        CopyKind::ProgramQuit,
        CopyKind::GameStartRequest,
        CopyKind::GameStarted,
        CopyKind::CompleteGameState,
        CopyKind::CompleteGameStateRequest,
        CopyKind::CharacterStates,
        CopyKind::UserKeyboardInput,
        CopyKind::CharacterMoveRequest,
        CopyKind::CreateProjectileRequest,
        CopyKind::PlaceWallRequest,
        CopyKind::TextMessage,
    ];

    /// The copy type conventionally paired with a local event kind.
    pub fn for_event(kind: EventKind) -> Option<CopyKind> {
        match kind {
            EventKind::ProgramQuit => Some(CopyKind::ProgramQuit),
            EventKind::GameStartRequest => Some(CopyKind::GameStartRequest),
            EventKind::GameStarted => Some(CopyKind::GameStarted),
            EventKind::CompleteGameState => Some(CopyKind::CompleteGameState),
            EventKind::CompleteGameStateRequest => Some(CopyKind::CompleteGameStateRequest),
            EventKind::CharacterStates => Some(CopyKind::CharacterStates),
            EventKind::UserKeyboardInput => Some(CopyKind::UserKeyboardInput),
            EventKind::CharacterMoveRequest => Some(CopyKind::CharacterMoveRequest),
            EventKind::CreateProjectileRequest => Some(CopyKind::CreateProjectileRequest),
            EventKind::PlaceWallRequest => Some(CopyKind::PlaceWallRequest),
            EventKind::TextMessage => Some(CopyKind::TextMessage),
            EventKind::Tick
            | EventKind::Render
            | EventKind::ServerConnected
            | EventKind::ClientConnected
            | EventKind::NewClientConnected
            | EventKind::UserMouseInput => None,
        }
    }

    /// `"Copy"` + the local event name, e.g. `CopyCharacterMoveRequestEvent`.
    pub fn name(&self) -> &'static str {
        match self {
            CopyKind::ProgramQuit => "CopyProgramQuitEvent",
            CopyKind::GameStartRequest => "CopyGameStartRequestEvent",
            CopyKind::GameStarted => "CopyGameStartedEvent",
            CopyKind::CompleteGameState => "CopyCompleteGameStateEvent",
            CopyKind::CompleteGameStateRequest => "CopyCompleteGameStateRequestEvent",
            CopyKind::CharacterStates => "CopyCharacterStatesEvent",
            CopyKind::UserKeyboardInput => "CopyUserKeyboardInputEvent",
            CopyKind::CharacterMoveRequest => "CopyCharacterMoveRequestEvent",
            CopyKind::CreateProjectileRequest => "CopyCreateProjectileRequestEvent",
            CopyKind::PlaceWallRequest => "CopyPlaceWallRequestEvent",
            CopyKind::TextMessage => "CopyTextMessageEvent",
        }
    }

    /// Parse either the copy name or the bare local name
    /// (`"CharacterMoveRequest"`), as used in config files.
    pub fn parse(s: &str) -> Option<CopyKind> {
        CopyKind::ALL.into_iter().find(|k| {
            let name = k.name();
            name == s
                || name
                    .strip_prefix("Copy")
                    .and_then(|n| n.strip_suffix("Event"))
                    .is_some_and(|bare| bare == s)
        })
    }
}

impl fmt::Display for CopyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Remote calls
// ---------------------------------------------------------------------------

/// Names the remote-callable receiver a client announces to the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiverHandle(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", content = "args")]
pub enum RemoteCall {
    SendEvent(CopyEvent),
    DeliverEvent(CopyEvent),
    Announce(ReceiverHandle),
}

impl RemoteCall {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteCall::SendEvent(_) => "SendEvent",
            RemoteCall::DeliverEvent(_) => "DeliverEvent",
            RemoteCall::Announce(_) => "Announce",
        }
    }
}

// ---------------------------------------------------------------------------
// Allow-lists
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetDirection {
    ClientToServer,
    ServerToClient,
}

/// The copy types permitted to cross each direction of the boundary.
///
/// A kind missing from the list for a direction is never sent that way,
/// whatever its `send_over_network` flag says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    client_to_server: HashSet<CopyKind>,
    server_to_client: HashSet<CopyKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0} is allowed in both directions")]
pub struct OverlappingAllowList(pub CopyKind);

impl AllowList {
    /// Build from two sets.  The sets must be disjoint.
    pub fn new(
        client_to_server: impl IntoIterator<Item = CopyKind>,
        server_to_client: impl IntoIterator<Item = CopyKind>,
    ) -> Result<Self, OverlappingAllowList> {
        let client_to_server: HashSet<_> = client_to_server.into_iter().collect();
        let server_to_client: HashSet<_> = server_to_client.into_iter().collect();
        if let Some(k) = client_to_server.intersection(&server_to_client).min() {
            return Err(OverlappingAllowList(*k));
        }
        Ok(Self {
            client_to_server,
            server_to_client,
        })
    }

    /// Nothing crosses in either direction.
    pub fn empty() -> Self {
        Self {
            client_to_server: HashSet::new(),
            server_to_client: HashSet::new(),
        }
    }

    pub fn allows(&self, direction: NetDirection, kind: CopyKind) -> bool {
        self.kinds(direction).contains(&kind)
    }

    pub fn kinds(&self, direction: NetDirection) -> &HashSet<CopyKind> {
        match direction {
            NetDirection::ClientToServer => &self.client_to_server,
            NetDirection::ServerToClient => &self.server_to_client,
        }
    }
}

impl Default for AllowList {
    /// Requests flow up, authoritative game state flows down.
    fn default() -> Self {
        Self {
            client_to_server: [
                CopyKind::ProgramQuit,
                CopyKind::GameStartRequest,
                CopyKind::CompleteGameStateRequest,
                CopyKind::UserKeyboardInput,
                CopyKind::CharacterMoveRequest,
                CopyKind::CreateProjectileRequest,
                CopyKind::PlaceWallRequest,
                CopyKind::TextMessage,
            ]
            .into_iter()
            .collect(),
            server_to_client: [
                CopyKind::GameStarted,
                CopyKind::CompleteGameState,
                CopyKind::CharacterStates,
            ]
            .into_iter()
            .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
