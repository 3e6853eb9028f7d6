//! Copy registry: local event → network copy, and back.
//!
//! Each entry pairs a local [`EventKind`] with a converter that extracts
//! only the fields the network needs.  Converters may register referenced
//! objects in the [`ObjectRegistry`] so the remote side can refer back to
//! them by id.  Kinds with no entry are simply not sendable this way.

use crate::event::{Event, EventKind};
use crate::protocol::CopyEvent;
use crate::registry::ObjectRegistry;
use crate::types::ClientNumber;
use log::trace;
use std::collections::HashMap;

/// Builds the copy for one local event kind.  Returns `None` when handed an
/// event of another kind.
pub type Converter = fn(&Event, &ObjectRegistry) -> Option<CopyEvent>;

#[derive(Clone, Default)]
pub struct CopyRegistry {
    converters: HashMap<EventKind, Converter>,
}

impl std::fmt::Debug for CopyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.converters.keys().collect();
        kinds.sort();
        f.debug_struct("CopyRegistry").field("kinds", &kinds).finish()
    }
}

impl CopyRegistry {
    /// An empty registry: nothing is sendable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a converter for every network-capable event kind.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register(EventKind::ProgramQuit, |e, _| {
            matches!(e, Event::ProgramQuit).then_some(CopyEvent::ProgramQuit)
        });
        reg.register(EventKind::GameStartRequest, |e, _| {
            matches!(e, Event::GameStartRequest { .. }).then_some(CopyEvent::GameStartRequest)
        });
        reg.register(EventKind::GameStarted, |e, objects| match e {
            Event::GameStarted { game } => Some(CopyEvent::GameStarted {
                game_id: objects.register(game),
            }),
            _ => None,
        });
        reg.register(EventKind::CompleteGameState, |e, _| match e {
            Event::CompleteGameState { game_state } => Some(CopyEvent::CompleteGameState {
                game_state: game_state.clone(),
            }),
            _ => None,
        });
        reg.register(EventKind::CompleteGameStateRequest, |e, _| {
            matches!(e, Event::CompleteGameStateRequest { .. })
                .then_some(CopyEvent::CompleteGameStateRequest)
        });
        reg.register(EventKind::CharacterStates, |e, _| match e {
            Event::CharacterStates { character_states } => Some(CopyEvent::CharacterStates {
                character_states: character_states.clone(),
            }),
            _ => None,
        });
        reg.register(EventKind::UserKeyboardInput, |e, _| match e {
            Event::UserKeyboardInput { input, .. } => {
                Some(CopyEvent::UserKeyboardInput { input: *input })
            }
            _ => None,
        });
        reg.register(EventKind::CharacterMoveRequest, |e, _| match e {
            Event::CharacterMoveRequest {
                character_id,
                direction,
                ..
            } => Some(CopyEvent::CharacterMoveRequest {
                character_id: *character_id,
                direction: *direction,
            }),
            _ => None,
        });
        reg.register(EventKind::CreateProjectileRequest, |e, _| match e {
            Event::CreateProjectileRequest {
                starting_position,
                target_position,
                emitter_id,
                ..
            } => Some(CopyEvent::CreateProjectileRequest {
                starting_position: *starting_position,
                target_position: *target_position,
                emitter_id: *emitter_id,
            }),
            _ => None,
        });
        reg.register(EventKind::PlaceWallRequest, |e, _| match e {
            Event::PlaceWallRequest { grid_position, .. } => Some(CopyEvent::PlaceWallRequest {
                grid_position: *grid_position,
            }),
            _ => None,
        });
        reg.register(EventKind::TextMessage, |e, _| match e {
            Event::TextMessage { text, .. } => Some(CopyEvent::TextMessage { text: text.clone() }),
            _ => None,
        });
        reg
    }

    pub fn register(&mut self, kind: EventKind, converter: Converter) {
        self.converters.insert(kind, converter);
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.converters.contains_key(&kind)
    }

    /// Convert `event`, or `None` if its kind has no entry.
    pub fn to_copy(&self, event: &Event, objects: &ObjectRegistry) -> Option<CopyEvent> {
        let Some(convert) = self.converters.get(&event.kind()) else {
            trace!("no copy type for {}, not sendable", event.name());
            return None;
        };
        convert(event, objects)
    }
}

impl CopyEvent {
    /// Rebuild the local event on the receiving side.
    ///
    /// Object ids resolve through `objects`; an id seen for the first time
    /// gets a [`RemoteObject`](crate::registry::RemoteObject) proxy.
    /// A received text message is for local display only and is never
    /// mirrored again.
    pub fn into_event(self, origin: Option<ClientNumber>, objects: &ObjectRegistry) -> Event {
        match self {
            CopyEvent::ProgramQuit => Event::ProgramQuit,
            CopyEvent::GameStartRequest => Event::GameStartRequest { origin },
            CopyEvent::GameStarted { game_id } => Event::GameStarted {
                game: objects.resolve_remote(game_id),
            },
            CopyEvent::CompleteGameState { game_state } => Event::CompleteGameState { game_state },
            CopyEvent::CompleteGameStateRequest => Event::CompleteGameStateRequest { origin },
            CopyEvent::CharacterStates { character_states } => {
                Event::CharacterStates { character_states }
            }
            CopyEvent::UserKeyboardInput { input } => Event::UserKeyboardInput { input, origin },
            CopyEvent::CharacterMoveRequest {
                character_id,
                direction,
            } => Event::CharacterMoveRequest {
                character_id,
                direction,
                origin,
            },
            CopyEvent::CreateProjectileRequest {
                starting_position,
                target_position,
                emitter_id,
            } => Event::CreateProjectileRequest {
                starting_position,
                target_position,
                emitter_id,
                origin,
            },
            CopyEvent::PlaceWallRequest { grid_position } => Event::PlaceWallRequest {
                grid_position,
                origin,
            },
            CopyEvent::TextMessage { text } => Event::TextMessage {
                text,
                send_over_network: false,
                origin,
            },
        }
    }
}
