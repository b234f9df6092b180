//! End-to-end tree construction with stand-in evaluators.

use std::future::Future;
use std::sync::Arc;

use chess::{parse_pgn, PlayerColour, PositionKey};
use engine::{Evaluation, EvaluatorError, PositionEvaluator};
use openings::{
    build_tree, DirectoryRow, DriverError, OpeningDirectory, OpeningTree, TreeStore,
};

/// Deterministic per position, so results cannot depend on which worker
/// saw a game.
struct KeyHash;

impl PositionEvaluator for KeyHash {
    fn best_move(
        &mut self,
        key: &PositionKey,
        _colour: PlayerColour,
    ) -> impl Future<Output = Result<Evaluation, EvaluatorError>> + Send {
        let win_probability = (key.as_str().len() % 10) as f64 / 10.0;
        async move {
            Ok(Evaluation {
                win_probability,
                best_move: "g1f3".to_string(),
            })
        }
    }
}

fn game(white: &str, black: &str, termination: &str, moves: &str) -> String {
    format!(
        "[Event \"Live Chess\"]\n[White \"{white}\"]\n[Black \"{black}\"]\n[Date \"2024.02.11\"]\n[Termination \"{termination}\"]\n\n{moves}\n"
    )
}

fn corpus() -> Vec<String> {
    vec![
        game("alice", "bob", "alice won by resignation", "1. e4 c5 2. Nf3 d6 3. d4 cxd4 4. Nxd4 Nf6 5. Nc3 a6 1-0"),
        game("carol", "alice", "carol won on time", "1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 4. Ba4 Nf6 0-1"),
        game("alice", "dave", "Game drawn by agreement", "1. Nf3 c5 2. e4 d6 3. d4 cxd4 4. Nxd4 Nf6 1/2-1/2"),
        game("erin", "alice", "alice won by checkmate", "1. d4 d5 2. c4 e6 3. Nc3 Nf6 4. Bg5 Be7 0-1"),
        game("alice", "frank", "alice won by resignation", "1. e4 c5 2. Nf3 d6 3. d4 cxd4 4. Nxd4 Nf6 5. Nc3 g6 1-0"),
        format!(
            "[Variant \"Crazyhouse\"]\n{}",
            game("alice", "gina", "alice won", "1. e4 e5 1-0")
        ),
        "[White \"alice\"]\n\n1. e4 e5 *\n".to_string(),
    ]
}

/// Name the first four positions of every corpus game.
fn directory() -> Arc<OpeningDirectory> {
    let mut rows = Vec::new();
    for pgn in corpus() {
        let Ok(plies) = parse_pgn(&pgn).unwrap().mainline() else {
            continue;
        };
        for (i, ply) in plies.iter().take(4).enumerate() {
            rows.push(DirectoryRow {
                eco: format!("T{:02}", rows.len()),
                name: format!("Line after {}", ply.san),
                fen: ply.key.to_string(),
                moves: plies[..=i].iter().map(|p| p.uci.as_str()).collect::<Vec<_>>().join(" "),
            });
        }
    }
    Arc::new(OpeningDirectory::from_rows(rows).unwrap())
}

async fn build(workers: usize) -> openings::BuildOutput<KeyHash> {
    let evaluators = (0..workers).map(|_| KeyHash).collect();
    build_tree(corpus(), "alice", directory(), evaluators)
        .await
        .unwrap()
}

fn sicilian_key() -> PositionKey {
    "rnbqkbnr/pp1ppppp/8/2p5/4P3/8/PPPP1PPP/RNBQKBNR w KQkq -"
        .parse()
        .unwrap()
}

fn snapshot(tree: &OpeningTree) -> Vec<(String, usize, Vec<(PlayerColour, String, u32)>)> {
    tree.openings()
        .map(|op| {
            let edges = tree
                .edges_from(op.key())
                .map(|(c, child, n)| (c, child.to_string(), n))
                .collect();
            (op.key().to_string(), op.occurrence(), edges)
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn counts_games_by_outcome() {
    let output = build(2).await;
    assert_eq!(output.report.processed, 5);
    assert_eq!(output.report.skipped, 1);
    assert_eq!(output.report.failed, 1);
    assert_eq!(output.report.workers, 2);
    assert_eq!(output.evaluators.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn result_does_not_depend_on_worker_count() {
    let single = build(1).await.tree;
    for workers in [2, 3, 5] {
        let parallel = build(workers).await.tree;
        assert_eq!(snapshot(&single), snapshot(&parallel), "{workers} workers");
    }
}

#[tokio::test]
async fn transpositions_share_a_node() {
    let tree = build(1).await.tree;

    // 1.e4 c5 2.Nf3 and 1.Nf3 c5 2.e4 reach the same position
    let open_sicilian: PositionKey =
        "rnbqkbnr/pp1ppppp/8/2p5/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq -"
            .parse()
            .unwrap();
    assert_eq!(tree.get(&open_sicilian).unwrap().occurrence(), 3);

    let parents = tree.parents(&open_sicilian, Some(PlayerColour::White));
    assert_eq!(parents.len(), 2);
    assert!(parents.iter().any(|op| op.key() == &sicilian_key()));

    let after_d6: PositionKey = "rnbqkbnr/pp2pppp/3p4/2p5/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq -"
        .parse()
        .unwrap();
    assert_eq!(
        tree.edge_count(&open_sicilian, PlayerColour::White, &after_d6),
        3
    );
}

#[tokio::test]
async fn colour_partitions_reassemble_the_tree() {
    let tree = build(2).await.tree;
    let white = tree.partition_by_colour(PlayerColour::White);
    let black = tree.partition_by_colour(PlayerColour::Black);

    for op in tree.openings().filter(|op| !op.is_root()) {
        let split = white.get(op.key()).map_or(0, |o| o.occurrence())
            + black.get(op.key()).map_or(0, |o| o.occurrence());
        assert_eq!(split, op.occurrence(), "{}", op.key());
    }
    assert_eq!(
        tree.get(&sicilian_key()).unwrap().occurrence(),
        white.get(&sicilian_key()).unwrap().occurrence()
    );
}

#[tokio::test]
async fn filter_keeps_connected_lines_only() {
    let tree = build(1).await.tree;
    let filtered = tree.filter_by_opening(&sicilian_key());

    let queens_gambit: PositionKey =
        "rnbqkbnr/ppp1pppp/8/3p4/2PP4/8/PP2PPPP/RNBQKBNR b KQkq -"
            .parse()
            .unwrap();
    assert!(tree.contains(&queens_gambit));
    assert!(!filtered.contains(&queens_gambit));
    assert!(filtered.contains(&sicilian_key()));
    assert!(filtered.node_count() < tree.node_count());
}

#[tokio::test]
async fn built_tree_survives_the_store() {
    let tree = build(2).await.tree;
    let dir = tempfile::tempdir().unwrap();
    let store = TreeStore::new(dir.path());
    store.save("alice", &tree).unwrap();

    let loaded = store.load("alice").unwrap().unwrap();
    assert_eq!(snapshot(&loaded), snapshot(&tree));
}

#[tokio::test]
async fn no_evaluators_is_an_error() {
    let result = build_tree::<KeyHash>(corpus(), "alice", directory(), vec![]).await;
    assert!(matches!(result, Err(DriverError::NoWorkers)));
}
