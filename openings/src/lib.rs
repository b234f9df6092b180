//! Opening repertoire aggregation: openings, the opening tree, and the
//! machinery that builds a tree from a player's games.

pub mod config;
pub mod directory;
pub mod driver;
pub mod opening;
pub mod persistence;
pub mod processor;
pub mod strength;
pub mod tree;

pub use directory::{DirectoryEntry, DirectoryError, DirectoryRow, OpeningDirectory};
pub use driver::{build_tree, partition_round_robin, BuildOutput, BuildReport, DriverError};
pub use opening::{Occurrence, Opening, OpeningError, ROOT_CODE, ROOT_NAME};
pub use persistence::{load_games, GameCache, PersistenceError, TreeStore};
pub use processor::{
    GameMetadata, GameOutcome, GameProcessor, ProcessError, FORBIDDEN_VARIANTS, MOVE_DELAY,
    TRUNCATED_SENTINEL,
};
pub use strength::{strength_summary, OpeningStrength};
pub use tree::{ColourEdges, EdgeBag, OpeningTree, TreeError};
