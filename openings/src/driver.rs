//! Parallel tree construction.
//!
//! Games are dealt round-robin to a fixed pool of workers. Each worker owns
//! an evaluator and builds its own tree; the partial trees are merged once
//! every worker has finished.

use std::sync::Arc;

use engine::PositionEvaluator;
use tokio::task::JoinError;

use crate::directory::OpeningDirectory;
use crate::processor::{GameOutcome, GameProcessor};
use crate::tree::OpeningTree;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("At least one evaluator is needed")]
    NoWorkers,
    #[error("Worker {worker_id} panicked: {source}")]
    WorkerPanicked {
        worker_id: usize,
        #[source]
        source: JoinError,
    },
}

/// Game counts across all workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub workers: usize,
}

impl BuildReport {
    fn absorb(&mut self, other: BuildReport) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl std::fmt::Display for BuildReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed, {} skipped, {} failed ({} workers)",
            self.processed, self.skipped, self.failed, self.workers
        )
    }
}

pub struct BuildOutput<E> {
    pub tree: OpeningTree,
    pub report: BuildReport,
    /// Handed back so the caller can shut engines down.
    pub evaluators: Vec<E>,
}

/// Deal `items` into `n` slices: item `i` goes to slice `i % n`.
pub fn partition_round_robin<T>(items: Vec<T>, n: usize) -> Vec<Vec<T>> {
    let mut slices: Vec<Vec<T>> = (0..n).map(|_| Vec::new()).collect();
    if n == 0 {
        return slices;
    }
    for (i, item) in items.into_iter().enumerate() {
        slices[i % n].push(item);
    }
    slices
}

/// Build one tree from `games` with one worker per evaluator.
pub async fn build_tree<E>(
    games: Vec<String>,
    player: &str,
    directory: Arc<OpeningDirectory>,
    evaluators: Vec<E>,
) -> Result<BuildOutput<E>, DriverError>
where
    E: PositionEvaluator + 'static,
{
    if evaluators.is_empty() {
        return Err(DriverError::NoWorkers);
    }
    let workers = evaluators.len();
    tracing::info!(player, games = games.len(), workers, "Building opening tree");

    let slices = partition_round_robin(games, workers);
    let handles: Vec<_> = evaluators
        .into_iter()
        .zip(slices)
        .enumerate()
        .map(|(worker_id, (evaluator, slice))| {
            let processor = GameProcessor::new(player, directory.clone(), evaluator);
            tokio::spawn(run_worker(worker_id, processor, slice))
        })
        .collect();

    let mut trees = Vec::with_capacity(workers);
    let mut evaluators = Vec::with_capacity(workers);
    let mut report = BuildReport {
        workers,
        ..Default::default()
    };
    for (worker_id, handle) in handles.into_iter().enumerate() {
        let (tree, evaluator, worker_report) = handle
            .await
            .map_err(|source| DriverError::WorkerPanicked { worker_id, source })?;
        trees.push(tree);
        evaluators.push(evaluator);
        report.absorb(worker_report);
    }

    let tree = OpeningTree::merge_all(trees);
    tracing::info!(
        nodes = tree.node_count(),
        processed = report.processed,
        skipped = report.skipped,
        failed = report.failed,
        "Opening tree built"
    );

    Ok(BuildOutput {
        tree,
        report,
        evaluators,
    })
}

async fn run_worker<E: PositionEvaluator>(
    worker_id: usize,
    mut processor: GameProcessor<E>,
    games: Vec<String>,
) -> (OpeningTree, E, BuildReport) {
    tracing::debug!(worker_id, games = games.len(), "Worker started");
    let mut report = BuildReport::default();

    for (game_idx, pgn) in games.iter().enumerate() {
        match processor.process_pgn(pgn).await {
            Ok(GameOutcome::Processed { .. }) => report.processed += 1,
            Ok(GameOutcome::Skipped { .. }) => report.skipped += 1,
            Err(e) => {
                tracing::warn!(worker_id, game_idx, "Failed to process game: {}", e);
                report.failed += 1;
            }
        }
    }

    tracing::debug!(
        worker_id,
        processed = report.processed,
        failed = report.failed,
        "Worker finished"
    );
    let (tree, evaluator) = processor.into_parts();
    (tree, evaluator, report)
}
