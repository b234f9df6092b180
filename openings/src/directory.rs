//! Lookup table of named openings keyed by position.

use std::collections::HashMap;
use std::path::Path;

use chess::PositionKey;
use serde::{Deserialize, Serialize};

use crate::opening::Opening;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Row {index} ({name}) has an invalid FEN: {source}")]
    InvalidFen {
        index: usize,
        name: String,
        #[source]
        source: chess::FenError,
    },
}

/// One row of a directory file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryRow {
    pub eco: String,
    pub name: String,
    pub fen: String,
    #[serde(default)]
    pub moves: String,
}

/// What a lookup hit yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Position of the row in the source file.
    pub index: usize,
    pub code: String,
    pub name: String,
    pub moves: String,
    /// Plies in `moves`.
    pub num_moves: usize,
}

impl DirectoryEntry {
    /// A fresh, unplayed opening for this entry.
    pub fn to_opening(&self, key: PositionKey) -> Opening {
        Opening::new(key, self.index, &self.code, &self.name, self.num_moves)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OpeningDirectory {
    entries: HashMap<PositionKey, DirectoryEntry>,
}

impl OpeningDirectory {
    /// Read a JSON array of `{eco, name, fen, moves}` rows.
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let contents = std::fs::read_to_string(path)?;
        let directory = Self::from_json_str(&contents)?;
        tracing::info!(path = %path.display(), openings = directory.len(), "Loaded opening directory");
        Ok(directory)
    }

    pub fn from_json_str(json: &str) -> Result<Self, DirectoryError> {
        let rows: Vec<DirectoryRow> = serde_json::from_str(json)?;
        Self::from_rows(rows)
    }

    /// Build from rows; the first row wins when two share a position.
    pub fn from_rows(rows: impl IntoIterator<Item = DirectoryRow>) -> Result<Self, DirectoryError> {
        let mut entries = HashMap::new();
        for (index, row) in rows.into_iter().enumerate() {
            let key = PositionKey::canonicalize(&row.fen).map_err(|source| {
                DirectoryError::InvalidFen {
                    index,
                    name: row.name.clone(),
                    source,
                }
            })?;
            let num_moves = count_plies(&row.moves);
            entries.entry(key).or_insert(DirectoryEntry {
                index,
                code: row.eco,
                name: row.name,
                moves: row.moves,
                num_moves,
            });
        }
        Ok(Self { entries })
    }

    /// A miss is not an error: most positions are not named openings.
    pub fn lookup(&self, key: &PositionKey) -> Option<&DirectoryEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Moves in a line, skipping move numbers such as `1.` or `3...`.
fn count_plies(moves: &str) -> usize {
    moves
        .split_whitespace()
        .filter(|tok| !tok.ends_with('.'))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROWS: &str = r#"[
        {"eco": "B00", "name": "King's Pawn Game", "fen": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq -", "moves": "e2e4"},
        {"eco": "B20", "name": "Sicilian Defense", "fen": "rnbqkbnr/pp1ppppp/8/2p5/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2", "moves": "e2e4 c7c5"},
        {"eco": "B99", "name": "Duplicate", "fen": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq -", "moves": "e2e4"}
    ]"#;

    #[test]
    fn lookup_hits_and_misses() {
        let dir = OpeningDirectory::from_json_str(ROWS).unwrap();
        let sicilian: PositionKey = "rnbqkbnr/pp1ppppp/8/2p5/4P3/8/PPPP1PPP/RNBQKBNR w KQkq -"
            .parse()
            .unwrap();

        let entry = dir.lookup(&sicilian).unwrap();
        assert_eq!(entry.code, "B20");
        assert_eq!(entry.index, 1);
        assert_eq!(entry.num_moves, 2);
        assert!(dir.lookup(&PositionKey::start()).is_none());
    }

    #[test]
    fn first_row_wins_on_duplicates() {
        let dir = OpeningDirectory::from_json_str(ROWS).unwrap();
        assert_eq!(dir.len(), 2);
        let e4: PositionKey = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq -"
            .parse()
            .unwrap();
        assert_eq!(dir.lookup(&e4).unwrap().name, "King's Pawn Game");
    }

    #[test]
    fn entry_becomes_empty_opening() {
        let dir = OpeningDirectory::from_json_str(ROWS).unwrap();
        let e4: PositionKey = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq -"
            .parse()
            .unwrap();
        let opening = dir.lookup(&e4).unwrap().to_opening(e4.clone());
        assert_eq!(opening.key(), &e4);
        assert_eq!(opening.occurrence(), 0);
        assert_eq!(opening.num_moves(), 1);
    }

    #[test]
    fn counts_plies_without_move_numbers() {
        assert_eq!(count_plies("1. e4 c5 2. Nf3"), 3);
        assert_eq!(count_plies(""), 0);
    }

    #[test]
    fn rejects_bad_fen() {
        let json = r#"[{"eco": "A00", "name": "Broken", "fen": "8/8 w", "moves": ""}]"#;
        assert!(matches!(
            OpeningDirectory::from_json_str(json),
            Err(DirectoryError::InvalidFen { index: 0, .. })
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eco.json");
        std::fs::write(&path, ROWS).unwrap();
        assert_eq!(OpeningDirectory::load(&path).unwrap().len(), 2);
    }
}
