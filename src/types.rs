//! Core value types shared across all modules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Network object id, assigned by whichever side first creates the object.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies which peer produced an event.  Stamped by the receiving
/// endpoint, never by the producer.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientNumber(pub u32);

impl fmt::Display for ClientNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Cell on the wall-placement grid.  Serialised as an `[x, y]` pair.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
}

impl GridPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for GridPosition {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl From<GridPosition> for (i32, i32) {
    fn from(p: GridPosition) -> Self {
        (p.x, p.y)
    }
}

/// Pixel position on screen (mouse cursor, sprite origin).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPosition {
    pub x: f32,
    pub y: f32,
}

impl ScreenPosition {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for ScreenPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One of the eight movement directions.
///
/// The wire spelling is the horizontal part followed by the vertical part
/// (`"LEFTDOWN"`, never `"DOWNLEFT"`).
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    LeftUp,
    RightUp,
    LeftDown,
    RightDown,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
        Direction::LeftUp,
        Direction::RightUp,
        Direction::LeftDown,
        Direction::RightDown,
    ];

    /// Build a direction from pressed-key axes (`-1`, `0` or `1` each).
    /// Negative `dy` is up.  Returns `None` when no key is held.
    pub fn from_axes(dx: i8, dy: i8) -> Option<Self> {
        match (dx.signum(), dy.signum()) {
            (0, -1) => Some(Direction::Up),
            (0, 1) => Some(Direction::Down),
            (-1, 0) => Some(Direction::Left),
            (1, 0) => Some(Direction::Right),
            (-1, -1) => Some(Direction::LeftUp),
            (1, -1) => Some(Direction::RightUp),
            (-1, 1) => Some(Direction::LeftDown),
            (1, 1) => Some(Direction::RightDown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
            Direction::LeftUp => "LEFTUP",
            Direction::RightUp => "RIGHTUP",
            Direction::LeftDown => "LEFTDOWN",
            Direction::RightDown => "RIGHTDOWN",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown direction '{0}'")]
pub struct ParseDirectionError(pub String);

impl FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| ParseDirectionError(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MouseButton {
    Left,
    Right,
}

// ---------------------------------------------------------------------------
// Game state snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectKind {
    Character,
    Projectile,
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectState {
    Alive,
    Dying,
    Dead,
}

/// Authoritative state of one game object, as carried by a complete
/// game-state broadcast.  Clients reconcile their local sprites from these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub kind: ObjectKind,
    pub id: ObjectId,
    pub position: ScreenPosition,
    /// Pixels per second.
    pub velocity: ScreenPosition,
    pub state: ObjectState,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axes_compose_horizontal_then_vertical() {
        assert_eq!(Direction::from_axes(-1, 1), Some(Direction::LeftDown));
        assert_eq!(Direction::from_axes(1, -1), Some(Direction::RightUp));
        assert_eq!(Direction::from_axes(0, -1), Some(Direction::Up));
        assert_eq!(Direction::from_axes(0, 0), None);
    }

    #[test]
    fn direction_parses_its_own_spelling() {
        for d in Direction::ALL {
            assert_eq!(d.as_str().parse::<Direction>(), Ok(d));
        }
        assert!("DOWNLEFT".parse::<Direction>().is_err());
    }

    #[test]
    fn direction_serialises_uppercase() {
        let json = serde_json::to_string(&Direction::LeftDown).expect("serialise");
        assert_eq!(json, "\"LEFTDOWN\"");
    }

    #[test]
    fn grid_position_is_a_pair_on_the_wire() {
        let json = serde_json::to_value(GridPosition::new(3, -4)).expect("serialise");
        assert_eq!(json, serde_json::json!([3, -4]));
    }
}
