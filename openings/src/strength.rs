//! Per-opening strength table derived from a tree.

use chess::PlayerColour;

use crate::tree::OpeningTree;

/// Aggregate statistics for one (opening, ply depth, colour).
#[derive(Debug, Clone, PartialEq)]
pub struct OpeningStrength {
    pub name: String,
    pub code: String,
    pub num_moves: usize,
    pub colour: PlayerColour,
    pub occurrence: usize,
    pub mean_engine_score: Option<f64>,
    pub mean_result: Option<f64>,
    pub mean_score_in_n_plies: Option<f64>,
}

/// One row per colour-partitioned opening with at least `min_occurrence`
/// games, most played first. The root is never listed.
pub fn strength_summary(tree: &OpeningTree, min_occurrence: usize) -> Vec<OpeningStrength> {
    let mut rows: Vec<OpeningStrength> = tree
        .openings()
        .filter(|op| !op.is_root())
        .flat_map(|op| {
            PlayerColour::ALL
                .into_iter()
                .filter_map(move |colour| op.partition(colour).map(|part| (colour, part)))
        })
        .filter(|(_, part)| part.occurrence() >= min_occurrence.max(1))
        .map(|(colour, part)| OpeningStrength {
            name: part.name().to_string(),
            code: part.code().to_string(),
            num_moves: part.num_moves(),
            colour,
            occurrence: part.occurrence(),
            mean_engine_score: part.mean_engine_score(),
            mean_result: part.mean_result(),
            mean_score_in_n_plies: part.mean_score_in_n_plies(),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.occurrence
            .cmp(&a.occurrence)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.num_moves.cmp(&b.num_moves))
            .then_with(|| a.colour.cmp(&b.colour))
    });
    rows
}
