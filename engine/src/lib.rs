pub mod evaluator;
pub mod stockfish;
pub mod uci;

pub use evaluator::{
    pseudo_probability, score_to_probability, wdl_to_probability, Evaluation, EvaluatorError,
    PositionEvaluator, StockfishEvaluator,
};
pub use stockfish::{find_stockfish_path, EngineConfig, EngineError, StockfishEngine};
pub use uci::{UciError, UciMessage};

use cozy_chess::Move;

/// Commands sent to the engine
#[derive(Debug, Clone)]
pub enum EngineCommand {
    SetPosition { fen: String, moves: Vec<Move> },
    SetOption { name: String, value: Option<String> },
    Go(GoParams),
    Quit,
}

/// Parameters for the "go" command. Searches are always depth-limited.
#[derive(Debug, Clone, Copy)]
pub struct GoParams {
    pub depth: u8,
}

/// Events received from the engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Ready,
    /// `None` when the engine reports `bestmove (none)`.
    BestMove(Option<Move>),
    Info(EngineInfo),
    Error(String),
}

/// The parts of an `info` line used for evaluation.
#[derive(Debug, Clone, Default)]
pub struct EngineInfo {
    pub depth: Option<u8>,
    pub nodes: Option<u64>,
    pub score: Option<Score>,
    /// Win/draw/loss per mille from the side to move, with `UCI_ShowWDL`.
    pub wdl: Option<(u32, u32, u32)>,
    pub pv: Vec<Move>,
    pub multipv: Option<u8>,
    pub string: Option<String>,
}

/// Score from the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    Mate(i8), // Negative for being mated
}
