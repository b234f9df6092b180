//! File persistence for built trees and fetched game collections.
//!
//! Everything lives under one data directory:
//! `trees/{player}.json` holds a tree document and `games/{player}.json`
//! a JSON array of PGN strings.

mod games;
mod json_store;

pub use games::{load_games, GameCache};
pub(crate) use json_store::JsonStore;

use std::path::Path;

use crate::tree::OpeningTree;

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One tree document per tracked player.
pub struct TreeStore {
    store: JsonStore<OpeningTree>,
}

impl TreeStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            store: JsonStore::new(data_dir.join("trees")),
        }
    }

    pub fn save(&self, player: &str, tree: &OpeningTree) -> Result<(), PersistenceError> {
        self.store.save(player, tree)?;
        tracing::info!(player, nodes = tree.node_count(), "Saved opening tree");
        Ok(())
    }

    /// Load and validate a player's tree. `None` when none was saved.
    pub fn load(&self, player: &str) -> Result<Option<OpeningTree>, PersistenceError> {
        self.store.load(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opening::{Occurrence, Opening};
    use chess::{PlayerColour, PositionKey};
    use chrono::NaiveDate;

    fn sample_tree() -> OpeningTree {
        let key: PositionKey = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq -"
            .parse()
            .unwrap();
        let mut opening = Opening::new(key, 0, "B00", "King's Pawn Game", 1);
        opening.update(
            Occurrence {
                colour: PlayerColour::White,
                date: NaiveDate::from_ymd_opt(2023, 11, 4).unwrap(),
                result: 0.5,
                following_move: Some("e7e5".to_string()),
                engine_score: 0.52,
                score_in_n_plies: -1.0,
            },
            "e7e5",
        );
        let mut tree = OpeningTree::new();
        tree.upsert(opening, &PositionKey::start(), PlayerColour::White).unwrap();
        tree
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TreeStore::new(dir.path());
        let tree = sample_tree();

        store.save("alice", &tree).unwrap();
        let loaded = store.load("alice").unwrap().unwrap();
        assert_eq!(loaded.node_count(), 2);
        assert!(dir.path().join("trees/alice.json").exists());
    }

    #[test]
    fn missing_tree_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TreeStore::new(dir.path()).load("nobody").unwrap().is_none());
    }

    #[test]
    fn malformed_tree_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("trees")).unwrap();
        std::fs::write(dir.path().join("trees/alice.json"), r#"{"nodes": {}, "edges": {}}"#)
            .unwrap();
        assert!(matches!(
            TreeStore::new(dir.path()).load("alice"),
            Err(PersistenceError::Json(_))
        ));
    }
}
