use std::path::Path;

use chess::split_games;

use super::{JsonStore, PersistenceError};

/// Read a game collection: a JSON array of PGN strings when the file ends
/// in `.json`, otherwise a multi-game PGN file.
pub fn load_games(path: &Path) -> Result<Vec<String>, PersistenceError> {
    let contents = std::fs::read_to_string(path)?;
    let games = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&contents)?
    } else {
        split_games(&contents)
    };
    tracing::info!(path = %path.display(), games = games.len(), "Loaded games");
    Ok(games)
}

/// Per-player copy of the games a tree was built from.
pub struct GameCache {
    store: JsonStore<Vec<String>>,
}

impl GameCache {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            store: JsonStore::new(data_dir.join("games")),
        }
    }

    pub fn save(&self, player: &str, games: &[String]) -> Result<(), PersistenceError> {
        self.store.save(player, &games.to_vec())
    }

    pub fn load(&self, player: &str) -> Result<Option<Vec<String>>, PersistenceError> {
        self.store.load(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_GAMES: &str = "[White \"a\"]\n\n1. e4 e5 1-0\n\n[White \"b\"]\n\n1. d4 d5 0-1\n";

    #[test]
    fn reads_pgn_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.pgn");
        std::fs::write(&path, TWO_GAMES).unwrap();
        assert_eq!(load_games(&path).unwrap().len(), 2);
    }

    #[test]
    fn reads_json_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.json");
        std::fs::write(&path, r#"["1. e4 e5 *", "1. d4 d5 *"]"#).unwrap();
        assert_eq!(load_games(&path).unwrap(), vec!["1. e4 e5 *", "1. d4 d5 *"]);
    }

    #[test]
    fn cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GameCache::new(dir.path());
        assert!(cache.load("alice").unwrap().is_none());

        let games = vec!["1. e4 *".to_string()];
        cache.save("alice", &games).unwrap();
        assert_eq!(cache.load("alice").unwrap(), Some(games));
    }
}
