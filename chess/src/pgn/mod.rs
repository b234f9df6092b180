pub mod parser;
pub mod san;

pub use parser::{parse_pgn, split_games, PgnError, PgnGame, Ply};
pub use san::{format_san, legal_moves, parse_san, SanError};
