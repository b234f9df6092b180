//! FEN parsing and the canonical position key.
//!
//! A [`PositionKey`] is a FEN reduced to its first four fields: board layout,
//! side to move, castling rights and en-passant target. The halfmove clock
//! and fullmove counter are dropped so that identical positions reached at
//! different points of a game share one key.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use cozy_chess::{Board, Color, Piece, Rank, Square};
use serde::{Deserialize, Serialize};

use crate::types::PlayerColour;

/// Key of the standard starting position.
pub const START_POSITION_KEY: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -";

const KEY_FIELDS: usize = 4;

/// Parse a FEN string into a Board
pub fn parse_fen(fen: &str) -> Result<Board, FenError> {
    let parts: Vec<&str> = fen.split_whitespace().collect();
    if parts.is_empty() {
        return Err(FenError::InvalidFormat);
    }

    // Keys carry no clocks; cozy-chess wants all six fields.
    if parts.len() == KEY_FIELDS {
        return format!("{} 0 1", parts.join(" "))
            .parse()
            .map_err(|_| FenError::InvalidBoardLayout);
    }

    fen.parse().map_err(|_| FenError::InvalidBoardLayout)
}

/// Format a Board as a FEN string
pub fn format_fen(board: &Board) -> String {
    board.to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum FenError {
    #[error("Invalid FEN format")]
    InvalidFormat,
    #[error("Invalid board layout")]
    InvalidBoardLayout,
}

/// Canonical identity of a position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionKey(String);

impl PositionKey {
    /// Strip the clock fields from a FEN. Idempotent on keys.
    pub fn canonicalize(fen: &str) -> Result<Self, FenError> {
        let fields: Vec<&str> = fen.split_whitespace().take(KEY_FIELDS).collect();
        if fields.len() < KEY_FIELDS {
            return Err(FenError::InvalidFormat);
        }
        Ok(Self(fields.join(" ")))
    }

    /// Build the key of a live board.
    ///
    /// The en-passant field is only written when an en-passant capture is
    /// actually available, matching the "legal" FEN convention used by
    /// opening databases.
    pub fn from_board(board: &Board) -> Self {
        let fen = format_fen(board);
        let mut fields: Vec<String> = fen
            .split_whitespace()
            .take(KEY_FIELDS)
            .map(str::to_string)
            .collect();
        if let Some(ep) = fields.get_mut(KEY_FIELDS - 1) {
            *ep = legal_en_passant_target(board)
                .map(crate::converters::format_square)
                .unwrap_or_else(|| "-".to_string());
        }
        Self(fields.join(" "))
    }

    /// The standard starting position.
    pub fn start() -> Self {
        Self(START_POSITION_KEY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reconstruct a board with zeroed clocks.
    pub fn to_board(&self) -> Result<Board, FenError> {
        parse_fen(&self.0)
    }

    pub fn side_to_move(&self) -> Option<PlayerColour> {
        match self.0.split_whitespace().nth(1)? {
            "w" => Some(PlayerColour::White),
            "b" => Some(PlayerColour::Black),
            _ => None,
        }
    }
}

fn legal_en_passant_target(board: &Board) -> Option<Square> {
    let file = board.en_passant()?;
    let rank = match board.side_to_move() {
        Color::White => Rank::Sixth,
        Color::Black => Rank::Third,
    };
    let target = Square::new(file, rank);

    let mut available = false;
    board.generate_moves(|moves| {
        if moves.piece == Piece::Pawn {
            available = moves.into_iter().any(|mv| mv.to == target);
        }
        available
    });
    available.then_some(target)
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PositionKey {
    type Err = FenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::canonicalize(s)
    }
}

impl AsRef<str> for PositionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PositionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}
