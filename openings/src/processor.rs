//! Folds one player's games into an [`OpeningTree`].
//!
//! A game is walked ply by ply. Every position found in the opening
//! directory is evaluated and recorded; the walk stops once more than
//! [`MOVE_DELAY`] consecutive positions miss the directory. Nothing is
//! written to the tree until the whole game has been walked, so a game that
//! fails part way leaves the tree as it was.

use std::sync::Arc;

use chess::{parse_pgn, PgnError, PgnGame, PlayerColour, Ply, PositionKey};
use chrono::NaiveDate;
use engine::{Evaluation, EvaluatorError, PositionEvaluator};

use crate::directory::OpeningDirectory;
use crate::opening::{Occurrence, Opening};
use crate::tree::{OpeningTree, TreeError};

/// Consecutive directory misses tolerated before the walk gives up.
pub const MOVE_DELAY: usize = 5;

/// Lagged score of a position whose walk was cut short by [`MOVE_DELAY`].
pub const TRUNCATED_SENTINEL: f64 = -1.0;

/// `Variant` header values of games that are never processed.
pub const FORBIDDEN_VARIANTS: [&str; 5] = [
    "3-check",
    "Crazyhouse",
    "Chess960",
    "Bughouse",
    "King of the Hill",
];

const DATE_FORMAT: &str = "%Y.%m.%d";

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Unreadable game: {0}")]
    Pgn(#[from] PgnError),
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),
    #[error("Invalid date {value:?}: {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("Evaluation failed: {0}")]
    Evaluator(#[from] EvaluatorError),
    #[error("Tree update failed: {0}")]
    Tree(#[from] TreeError),
}

/// Game-level facts shared by every recorded position.
#[derive(Debug, Clone, PartialEq)]
pub struct GameMetadata {
    pub colour: PlayerColour,
    pub date: NaiveDate,
    pub result: f64,
}

impl GameMetadata {
    pub fn from_game(game: &PgnGame, player: &str) -> Result<Self, ProcessError> {
        let white = game.tag("White").ok_or(ProcessError::MissingHeader("White"))?;
        let termination = game
            .tag("Termination")
            .ok_or(ProcessError::MissingHeader("Termination"))?;
        let date = game.tag("Date").ok_or(ProcessError::MissingHeader("Date"))?;

        Ok(Self {
            colour: player_colour(white, player),
            date: NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|source| {
                ProcessError::InvalidDate {
                    value: date.to_string(),
                    source,
                }
            })?,
            result: game_result(termination, player),
        })
    }
}

/// The side the tracked player had, judged by the `White` header.
pub fn player_colour(white: &str, player: &str) -> PlayerColour {
    if white == player {
        PlayerColour::White
    } else {
        PlayerColour::Black
    }
}

/// 1.0 when the termination names the player as winner, 0.5 for a draw,
/// otherwise 0.0.
pub fn game_result(termination: &str, player: &str) -> f64 {
    if termination.contains(&format!("{player} won")) {
        1.0
    } else if termination.contains("draw") {
        0.5
    } else {
        0.0
    }
}

/// What happened to one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameOutcome {
    Skipped {
        variant: String,
    },
    Processed {
        /// Directory positions recorded.
        openings: usize,
        plies_walked: usize,
        /// The walk stopped on the miss threshold.
        truncated: bool,
    },
}

/// A directory hit waiting to be written to the tree.
struct Recorded {
    opening: Opening,
    parent: PositionKey,
    following_move: Option<String>,
    evaluation: Evaluation,
}

pub struct GameProcessor<E> {
    player: String,
    directory: Arc<OpeningDirectory>,
    evaluator: E,
    tree: OpeningTree,
}

impl<E: PositionEvaluator> GameProcessor<E> {
    pub fn new(player: impl Into<String>, directory: Arc<OpeningDirectory>, evaluator: E) -> Self {
        Self {
            player: player.into(),
            directory,
            evaluator,
            tree: OpeningTree::new(),
        }
    }

    pub fn tree(&self) -> &OpeningTree {
        &self.tree
    }

    pub fn into_parts(self) -> (OpeningTree, E) {
        (self.tree, self.evaluator)
    }

    /// Parse, filter and walk one PGN game.
    pub async fn process_pgn(&mut self, pgn: &str) -> Result<GameOutcome, ProcessError> {
        let game = parse_pgn(pgn)?;

        if let Some(variant) = game.tag("Variant") {
            if FORBIDDEN_VARIANTS.contains(&variant) {
                tracing::debug!(variant, "Skipping game");
                return Ok(GameOutcome::Skipped {
                    variant: variant.to_string(),
                });
            }
        }

        let metadata = GameMetadata::from_game(&game, &self.player)?;
        let plies = game.mainline()?;
        self.process_plies(&plies, &metadata).await
    }

    /// Walk an already replayed main line.
    pub async fn process_plies(
        &mut self,
        plies: &[Ply],
        metadata: &GameMetadata,
    ) -> Result<GameOutcome, ProcessError> {
        let mut recorded: Vec<Recorded> = Vec::new();
        let mut head = PositionKey::start();
        let mut misses = 0usize;
        let mut walked = 0usize;

        for ply in plies {
            if misses > MOVE_DELAY {
                break;
            }
            walked += 1;

            let Some(entry) = self.directory.lookup(&ply.key) else {
                misses += 1;
                continue;
            };
            misses = 0;

            let evaluation = self.evaluator.best_move(&ply.key, metadata.colour).await?;
            recorded.push(Recorded {
                opening: entry.to_opening(ply.key.clone()),
                parent: std::mem::replace(&mut head, ply.key.clone()),
                following_move: plies.get(entry.num_moves).map(|p| p.uci.clone()),
                evaluation,
            });
        }

        let truncated = misses > MOVE_DELAY;
        let fill = if truncated {
            TRUNCATED_SENTINEL
        } else {
            metadata.result
        };
        let lagged: Vec<f64> = (0..recorded.len())
            .map(|i| {
                recorded
                    .get(i + MOVE_DELAY - 1)
                    .map_or(fill, |later| later.evaluation.win_probability)
            })
            .collect();

        let openings = recorded.len();
        for (hit, score_in_n_plies) in recorded.into_iter().zip(lagged) {
            let mut opening = hit.opening;
            opening.update(
                Occurrence {
                    colour: metadata.colour,
                    date: metadata.date,
                    result: metadata.result,
                    following_move: hit.following_move,
                    engine_score: hit.evaluation.win_probability,
                    score_in_n_plies,
                },
                hit.evaluation.best_move,
            );
            // Every parent is the root or an earlier hit, so this cannot fail part way
            self.tree.upsert(opening, &hit.parent, metadata.colour)?;
        }

        tracing::debug!(openings, walked, truncated, "Processed game");
        Ok(GameOutcome::Processed {
            openings,
            plies_walked: walked,
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirectoryRow;
    use std::future::Future;

    const RUY_LOPEZ: &str = r#"[White "alice"]
[Black "bob"]
[Date "2024.03.17"]
[Termination "alice won by resignation"]

1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 4. Ba4 Nf6 5. O-O Be7 6. Re1 b5 7. Bb3 d6 8. c3 O-O 1-0
"#;

    /// Scores the n-th call as n / 10.
    struct Counting {
        calls: usize,
    }

    impl PositionEvaluator for Counting {
        fn best_move(
            &mut self,
            _key: &PositionKey,
            _colour: PlayerColour,
        ) -> impl Future<Output = Result<Evaluation, EvaluatorError>> + Send {
            self.calls += 1;
            let win_probability = self.calls as f64 / 10.0;
            async move {
                Ok(Evaluation {
                    win_probability,
                    best_move: "e2e4".to_string(),
                })
            }
        }
    }

    struct Broken;

    impl PositionEvaluator for Broken {
        fn best_move(
            &mut self,
            _key: &PositionKey,
            _colour: PlayerColour,
        ) -> impl Future<Output = Result<Evaluation, EvaluatorError>> + Send {
            async { Err(EvaluatorError::Disconnected) }
        }
    }

    fn ruy_plies() -> Vec<Ply> {
        parse_pgn(RUY_LOPEZ).unwrap().mainline().unwrap()
    }

    /// Directory naming the positions after the given 0-based ply indices.
    fn directory_for(indices: &[usize]) -> Arc<OpeningDirectory> {
        let plies = ruy_plies();
        let rows = indices.iter().map(|&i| DirectoryRow {
            eco: format!("C{i:02}"),
            name: format!("Line {i}"),
            fen: plies[i].key.to_string(),
            moves: plies[..=i]
                .iter()
                .map(|p| p.uci.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        });
        Arc::new(OpeningDirectory::from_rows(rows).unwrap())
    }

    fn processor(indices: &[usize]) -> GameProcessor<Counting> {
        GameProcessor::new("alice", directory_for(indices), Counting { calls: 0 })
    }

    #[test]
    fn result_from_termination() {
        assert_eq!(game_result("alice won by checkmate", "alice"), 1.0);
        assert_eq!(game_result("Game drawn by repetition", "alice"), 0.5);
        assert_eq!(game_result("bob won on time", "alice"), 0.0);
    }

    #[test]
    fn colour_from_white_header() {
        assert_eq!(player_colour("alice", "alice"), PlayerColour::White);
        assert_eq!(player_colour("bob", "alice"), PlayerColour::Black);
    }

    #[tokio::test]
    async fn records_hits_with_parents_and_following_moves() {
        let mut proc = processor(&[0, 2]);
        let outcome = proc.process_pgn(RUY_LOPEZ).await.unwrap();
        assert!(matches!(
            outcome,
            GameOutcome::Processed {
                openings: 2,
                truncated: true,
                ..
            }
        ));

        let plies = ruy_plies();
        let tree = proc.tree();
        let first = tree.get(&plies[0].key).unwrap();
        assert_eq!(first.occurrence(), 1);
        assert_eq!(first.colours(), &[PlayerColour::White]);
        assert_eq!(first.results(), &[1.0]);
        // One-ply line: the following move is the reply e7e5
        assert_eq!(first.following_moves(), &[Some("e7e5".to_string())]);
        assert_eq!(first.best_next_move(), "e2e4");

        assert_eq!(
            tree.edge_count(&PositionKey::start(), PlayerColour::White, &plies[0].key),
            1
        );
        assert_eq!(
            tree.edge_count(&plies[0].key, PlayerColour::White, &plies[2].key),
            1
        );
    }

    #[tokio::test]
    async fn truncated_walk_backfills_sentinel() {
        let mut proc = processor(&[0]);
        let outcome = proc.process_pgn(RUY_LOPEZ).await.unwrap();
        assert_eq!(
            outcome,
            GameOutcome::Processed {
                openings: 1,
                plies_walked: 7,
                truncated: true,
            }
        );
        let first = proc.tree().get(&ruy_plies()[0].key).unwrap();
        assert_eq!(first.score_in_n_plies(), &[TRUNCATED_SENTINEL]);
        assert_eq!(first.mean_score_in_n_plies(), None);
    }

    #[tokio::test]
    async fn natural_end_backfills_outcome() {
        // Gaps stay inside the threshold and the last ply is a hit.
        let mut proc = processor(&[0, 4, 8, 12, 15]);
        let outcome = proc.process_pgn(RUY_LOPEZ).await.unwrap();
        assert!(matches!(
            outcome,
            GameOutcome::Processed {
                openings: 5,
                plies_walked: 16,
                truncated: false,
            }
        ));

        let plies = ruy_plies();
        let op = |i: usize| proc.tree().get(&plies[i].key).unwrap();
        assert!((op(0).score_in_n_plies()[0] - 0.5).abs() < 1e-9);
        for idx in [4, 8, 12, 15] {
            assert_eq!(op(idx).score_in_n_plies(), &[1.0]);
        }
        assert_eq!(op(15).following_moves(), &[None]);
        assert_eq!(op(12).following_moves(), &[Some(plies[13].uci.clone())]);
    }

    #[tokio::test]
    async fn lagged_score_reads_four_recordings_ahead() {
        let mut proc = processor(&[0, 1, 2, 3, 4, 5]);
        proc.process_pgn(RUY_LOPEZ).await.unwrap();

        let plies = ruy_plies();
        let score = |i: usize| proc.tree().get(&plies[i].key).unwrap().score_in_n_plies()[0];
        // Recording n is scored n / 10
        assert!((score(0) - 0.5).abs() < 1e-9);
        assert!((score(1) - 0.6).abs() < 1e-9);
        assert_eq!(score(2), TRUNCATED_SENTINEL);
        assert!((proc.tree().get(&plies[5].key).unwrap().engine_scores()[0] - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn forbidden_variant_is_skipped() {
        let mut proc = processor(&[0]);
        let pgn = RUY_LOPEZ.replace("[White", "[Variant \"Chess960\"]\n[White");
        let outcome = proc.process_pgn(&pgn).await.unwrap();
        assert_eq!(
            outcome,
            GameOutcome::Skipped {
                variant: "Chess960".to_string()
            }
        );
        assert_eq!(proc.tree().node_count(), 1);
    }

    #[tokio::test]
    async fn bad_headers_leave_tree_untouched() {
        let mut proc = processor(&[0]);
        let no_date = RUY_LOPEZ.replace("[Date \"2024.03.17\"]\n", "");
        assert!(matches!(
            proc.process_pgn(&no_date).await,
            Err(ProcessError::MissingHeader("Date"))
        ));

        let bad_date = RUY_LOPEZ.replace("2024.03.17", "17/03/2024");
        assert!(matches!(
            proc.process_pgn(&bad_date).await,
            Err(ProcessError::InvalidDate { .. })
        ));
        assert_eq!(proc.tree().node_count(), 1);
        assert_eq!(proc.into_parts().1.calls, 0);
    }

    #[tokio::test]
    async fn evaluator_failure_leaves_tree_untouched() {
        let mut proc = GameProcessor::new("alice", directory_for(&[0, 2]), Broken);
        assert!(matches!(
            proc.process_pgn(RUY_LOPEZ).await,
            Err(ProcessError::Evaluator(_))
        ));
        assert_eq!(proc.tree().node_count(), 1);
    }

    #[tokio::test]
    async fn black_games_are_tracked_as_black() {
        let mut proc = GameProcessor::new("bob", directory_for(&[1]), Counting { calls: 0 });
        proc.process_pgn(RUY_LOPEZ).await.unwrap();
        let op = proc.tree().get(&ruy_plies()[1].key).unwrap();
        assert_eq!(op.colours(), &[PlayerColour::Black]);
        assert_eq!(op.results(), &[0.0]);
    }
}
