//! Player colour as seen from the tracked player's side of the board.
//! cozy-chess types are internal implementation details.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The side a tracked player played in a game.
///
/// Serialises as `"White"` / `"Black"`; any other token is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlayerColour {
    White,
    Black,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown colour: {0}")]
pub struct UnknownColour(pub String);

impl PlayerColour {
    pub const ALL: [PlayerColour; 2] = [PlayerColour::White, PlayerColour::Black];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::White => "White",
            Self::Black => "Black",
        }
    }
}

impl From<cozy_chess::Color> for PlayerColour {
    fn from(c: cozy_chess::Color) -> Self {
        match c {
            cozy_chess::Color::White => Self::White,
            cozy_chess::Color::Black => Self::Black,
        }
    }
}

impl From<PlayerColour> for cozy_chess::Color {
    fn from(c: PlayerColour) -> Self {
        match c {
            PlayerColour::White => Self::White,
            PlayerColour::Black => Self::Black,
        }
    }
}

impl FromStr for PlayerColour {
    type Err = UnknownColour;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "white" | "w" => Ok(Self::White),
            "black" | "b" => Ok(Self::Black),
            _ => Err(UnknownColour(s.to_string())),
        }
    }
}

impl std::fmt::Display for PlayerColour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
