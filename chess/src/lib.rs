pub mod converters;
pub mod fen;
pub mod pgn;
pub mod types;
pub mod uci;

pub use fen::{format_fen, parse_fen, FenError, PositionKey, START_POSITION_KEY};
pub use pgn::{parse_pgn, split_games, PgnError, PgnGame, Ply, SanError};
pub use types::{PlayerColour, UnknownColour};
pub use uci::{
    convert_cozy_castling_to_uci, convert_uci_castling_to_cozy, format_board_move_uci,
    format_uci_move,
};
