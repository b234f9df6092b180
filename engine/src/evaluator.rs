//! Position evaluation: win probability for the tracked player plus the
//! engine's suggested move.

use std::collections::HashMap;
use std::future::Future;

use chess::{format_fen, format_uci_move, FenError, PlayerColour, PositionKey};
use cozy_chess::{Board, GameStatus};

use crate::stockfish::{EngineConfig, EngineError, StockfishEngine};
use crate::{EngineCommand, EngineEvent, GoParams, Score};

/// Memoised positions per evaluator before the cache is dropped.
pub const CACHE_CAPACITY: usize = 1 << 14;

/// Logistic slope mapping centipawns to an expected score.
const CP_SLOPE: f64 = 0.003_682_08;

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Expected score in [0, 1] from the tracked player's side.
    pub win_probability: f64,
    /// Suggested move in UCI, empty when the game is already over.
    pub best_move: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("Invalid position: {0}")]
    Fen(#[from] FenError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Engine error during analysis: {0}")]
    Analysis(String),
    #[error("Engine channel closed during analysis")]
    Disconnected,
}

/// Scores positions for the game processor.
///
/// Each worker owns its evaluator, so implementations need `Send` but not
/// `Sync`. The returned future must be `Send` to run inside `tokio::spawn`.
pub trait PositionEvaluator: Send {
    fn best_move(
        &mut self,
        key: &PositionKey,
        colour: PlayerColour,
    ) -> impl Future<Output = Result<Evaluation, EvaluatorError>> + Send;
}

/// Result-derived probability for a finished position, `None` while the
/// game is still going.
pub fn pseudo_probability(board: &Board, colour: PlayerColour) -> Option<f64> {
    match board.status() {
        GameStatus::Ongoing => None,
        GameStatus::Drawn => Some(0.5),
        // The side to move has been mated
        GameStatus::Won => {
            let loser = PlayerColour::from(board.side_to_move());
            Some(if loser == colour { 0.0 } else { 1.0 })
        }
    }
}

/// Expected score from `wdl` per-mille counts.
pub fn wdl_to_probability((wins, draws, losses): (u32, u32, u32)) -> f64 {
    let total = f64::from(wins + draws + losses);
    if total == 0.0 {
        return 0.5;
    }
    (f64::from(wins) + f64::from(draws) / 2.0) / total
}

/// Expected score from a centipawn or mate score.
pub fn score_to_probability(score: Score) -> f64 {
    match score {
        Score::Centipawns(cp) => 1.0 / (1.0 + (-CP_SLOPE * f64::from(cp)).exp()),
        Score::Mate(n) if n > 0 => 1.0,
        Score::Mate(_) => 0.0,
    }
}

/// [`PositionEvaluator`] backed by a Stockfish subprocess searching to a
/// fixed depth.
pub struct StockfishEvaluator {
    engine: StockfishEngine,
    depth: u8,
    cache: HashMap<(PositionKey, PlayerColour), Evaluation>,
}

impl StockfishEvaluator {
    pub fn new(engine: StockfishEngine, depth: u8) -> Self {
        Self {
            engine,
            depth,
            cache: HashMap::new(),
        }
    }

    /// Spawn a single-threaded engine with WDL output enabled.
    pub async fn spawn(config: EngineConfig, depth: u8) -> Result<Self, EngineError> {
        let config = EngineConfig {
            threads: config.threads.or(Some(1)),
            show_wdl: true,
            ..config
        };
        Ok(Self::new(StockfishEngine::spawn(config).await?, depth))
    }

    pub async fn shutdown(self) {
        self.engine.shutdown().await;
    }

    async fn evaluate(
        &mut self,
        key: PositionKey,
        colour: PlayerColour,
    ) -> Result<Evaluation, EvaluatorError> {
        let cache_key = (key, colour);
        if let Some(hit) = self.cache.get(&cache_key) {
            return Ok(hit.clone());
        }

        let board = cache_key.0.to_board()?;
        let evaluation = match pseudo_probability(&board, colour) {
            Some(win_probability) => Evaluation {
                win_probability,
                best_move: String::new(),
            },
            None => self.search(&board, colour).await?,
        };

        if self.cache.len() >= CACHE_CAPACITY {
            tracing::debug!("Evaluation cache full, clearing");
            self.cache.clear();
        }
        self.cache.insert(cache_key, evaluation.clone());
        Ok(evaluation)
    }

    async fn search(
        &mut self,
        board: &Board,
        colour: PlayerColour,
    ) -> Result<Evaluation, EvaluatorError> {
        self.engine
            .send_command(EngineCommand::SetPosition {
                fen: format_fen(board),
                moves: vec![],
            })
            .await?;
        self.engine
            .send_command(EngineCommand::Go(GoParams { depth: self.depth }))
            .await?;

        // Collect engine output until BestMove
        let mut wdl = None;
        let mut score = None;
        loop {
            match self.engine.recv_event().await {
                Some(EngineEvent::Info(info)) => {
                    if info.multipv.is_some_and(|n| n > 1) {
                        continue;
                    }
                    if info.wdl.is_some() {
                        wdl = info.wdl;
                    }
                    if info.score.is_some() {
                        score = info.score;
                    }
                }
                Some(EngineEvent::BestMove(mv)) => {
                    // Engine numbers are from the side to move
                    let to_move = match (wdl, score) {
                        (Some(wdl), _) => wdl_to_probability(wdl),
                        (None, Some(score)) => score_to_probability(score),
                        (None, None) => 0.5,
                    };
                    let win_probability = if PlayerColour::from(board.side_to_move()) == colour {
                        to_move
                    } else {
                        1.0 - to_move
                    };
                    return Ok(Evaluation {
                        win_probability,
                        best_move: mv.map(format_uci_move).unwrap_or_default(),
                    });
                }
                Some(EngineEvent::Error(e)) => return Err(EvaluatorError::Analysis(e)),
                Some(EngineEvent::Ready) => continue,
                None => return Err(EvaluatorError::Disconnected),
            }
        }
    }
}

impl PositionEvaluator for StockfishEvaluator {
    fn best_move(
        &mut self,
        key: &PositionKey,
        colour: PlayerColour,
    ) -> impl Future<Output = Result<Evaluation, EvaluatorError>> + Send {
        let key = key.clone();
        async move { self.evaluate(key, colour).await }
    }
}
