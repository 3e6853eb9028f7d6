//! Lightweight event codec: local event ⇄ generic wire record.
//!
//! A wire record is an ordered list holding exactly one named record:
//!
//! ```json
//! [{"name": "UserKeyboardInputEvent", "input": "LEFT"}]
//! ```
//!
//! Only a fixed subset of the taxonomy is supported:
//!
//! | Event                | Fields            |
//! |----------------------|-------------------|
//! | `UserKeyboardInput`  | `input`           |
//! | `PlaceWallRequest`   | `grid_position`   |
//! | `TextMessage`        | `text`            |
//!
//! The origin of a decoded event is supplied by the caller, never read
//! from the record.  A decoded text message is local
//! (`send_over_network` is false); the flag is not carried.

use crate::event::{Event, EventKind};
use crate::types::{ClientNumber, Direction, GridPosition};
use log::warn;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("event {0} cannot be encoded")]
    Unsupported(EventKind),
    #[error("malformed wire record: {0}")]
    Malformed(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Wire record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireRecord(pub Vec<serde_json::Value>);

impl WireRecord {
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Discriminant of the (first) record, if present.
    pub fn name(&self) -> Option<&str> {
        self.0.first()?.get("name")?.as_str()
    }
}

/// Shape of each supported record.  The serde tag is the wire discriminant.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "name")]
enum Record {
    #[serde(rename = "UserKeyboardInputEvent")]
    UserKeyboardInput { input: Direction },
    #[serde(rename = "PlaceWallRequestEvent")]
    PlaceWallRequest { grid_position: GridPosition },
    #[serde(rename = "TextMessageEvent")]
    TextMessage { text: String },
}

const SUPPORTED: [EventKind; 3] = [
    EventKind::UserKeyboardInput,
    EventKind::PlaceWallRequest,
    EventKind::TextMessage,
];

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct EventCodec;

impl EventCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn supports(&self, kind: EventKind) -> bool {
        SUPPORTED.contains(&kind)
    }

    /// Encode `event`.  Unsupported kinds are logged and reported; callers
    /// treat the error as "event not sent".
    pub fn encode(&self, event: &Event) -> Result<WireRecord, CodecError> {
        let record = match event {
            Event::UserKeyboardInput { input, .. } => Record::UserKeyboardInput { input: *input },
            Event::PlaceWallRequest { grid_position, .. } => Record::PlaceWallRequest {
                grid_position: *grid_position,
            },
            Event::TextMessage { text, .. } => Record::TextMessage { text: text.clone() },
            other => {
                warn!("the event <{}> cannot be encoded", other.name());
                return Err(CodecError::Unsupported(other.kind()));
            }
        };
        Ok(WireRecord(vec![serde_json::to_value(record)?]))
    }

    /// Decode the first record of `wire`, stamping it with `origin`.
    ///
    /// An unknown discriminant decodes to `Ok(None)`: nothing to deliver.
    /// Records past the first are ignored.
    pub fn decode(
        &self,
        wire: &WireRecord,
        origin: Option<ClientNumber>,
    ) -> Result<Option<Event>, CodecError> {
        let Some(first) = wire.0.first() else {
            return Ok(None);
        };
        let name = first
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| CodecError::Malformed("missing string field 'name'".into()))?;
        if !SUPPORTED.iter().any(|k| k.name() == name) {
            return Ok(None);
        }

        let record: Record = serde_json::from_value(first.clone())
            .map_err(|e| CodecError::Malformed(format!("{}: {}", name, e)))?;
        let event = match record {
            Record::UserKeyboardInput { input } => Event::UserKeyboardInput { input, origin },
            Record::PlaceWallRequest { grid_position } => Event::PlaceWallRequest {
                grid_position,
                origin,
            },
            Record::TextMessage { text } => Event::TextMessage {
                text,
                send_over_network: false,
                origin,
            },
        };
        Ok(Some(event))
    }
}
