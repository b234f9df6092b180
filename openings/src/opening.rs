//! A named opening position together with every occurrence of it in the
//! tracked player's games.
//!
//! Occurrence data is held as parallel sequences, one entry per game that
//! reached the position. All sequences always have the same length, equal to
//! [`Opening::occurrence`]; the fields are private so that only
//! [`Opening::update`] and [`Opening::merge_from`] can grow them.

use std::fmt;
use std::hash::{Hash, Hasher};

use chess::{PlayerColour, PositionKey};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Opening code of the tree root.
pub const ROOT_CODE: &str = "ROOT";
/// Display name of the tree root.
pub const ROOT_NAME: &str = "Root";

/// One game's contribution to an opening.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub colour: PlayerColour,
    pub date: NaiveDate,
    /// 0.0 loss, 0.5 draw, 1.0 win for the tracked player.
    pub result: f64,
    /// UCI of the move played once the opening's line was complete.
    pub following_move: Option<String>,
    /// Engine win probability of this position for the tracked player.
    pub engine_score: f64,
    /// Engine win probability a few recorded positions later, the game
    /// outcome, or the truncation sentinel.
    pub score_in_n_plies: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum OpeningError {
    #[error("{key}: {field} has {len} entries but occurrence is {occurrence}")]
    LengthMismatch {
        key: PositionKey,
        field: &'static str,
        len: usize,
        occurrence: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opening {
    key: PositionKey,
    index: usize,
    code: String,
    name: String,
    num_moves: usize,
    #[serde(default)]
    colours: Vec<PlayerColour>,
    #[serde(default)]
    dates: Vec<NaiveDate>,
    #[serde(default)]
    results: Vec<f64>,
    #[serde(default)]
    following_moves: Vec<Option<String>>,
    #[serde(default)]
    engine_scores: Vec<f64>,
    #[serde(default)]
    score_in_n_plies: Vec<f64>,
    #[serde(default)]
    occurrence: usize,
    #[serde(default)]
    best_next_move: String,
}

impl Opening {
    /// A directory opening that no game has reached yet.
    pub fn new(
        key: PositionKey,
        index: usize,
        code: impl Into<String>,
        name: impl Into<String>,
        num_moves: usize,
    ) -> Self {
        Self {
            key,
            index,
            code: code.into(),
            name: name.into(),
            num_moves,
            colours: Vec::new(),
            dates: Vec::new(),
            results: Vec::new(),
            following_moves: Vec::new(),
            engine_scores: Vec::new(),
            score_in_n_plies: Vec::new(),
            occurrence: 0,
            best_next_move: String::new(),
        }
    }

    /// The standard starting position.
    pub fn root() -> Self {
        Self::new(PositionKey::start(), 0, ROOT_CODE, ROOT_NAME, 0)
    }

    pub fn is_root(&self) -> bool {
        self.key == PositionKey::start()
    }

    pub fn key(&self) -> &PositionKey {
        &self.key
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ply depth of the opening's defining line.
    pub fn num_moves(&self) -> usize {
        self.num_moves
    }

    pub fn occurrence(&self) -> usize {
        self.occurrence
    }

    pub fn colours(&self) -> &[PlayerColour] {
        &self.colours
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn results(&self) -> &[f64] {
        &self.results
    }

    pub fn following_moves(&self) -> &[Option<String>] {
        &self.following_moves
    }

    pub fn engine_scores(&self) -> &[f64] {
        &self.engine_scores
    }

    pub fn score_in_n_plies(&self) -> &[f64] {
        &self.score_in_n_plies
    }

    /// Most recently recorded engine suggestion.
    pub fn best_next_move(&self) -> &str {
        &self.best_next_move
    }

    /// Append one occurrence and overwrite the suggested move.
    pub fn update(&mut self, occurrence: Occurrence, best_move: impl Into<String>) {
        self.colours.push(occurrence.colour);
        self.dates.push(occurrence.date);
        self.results.push(occurrence.result);
        self.following_moves.push(occurrence.following_move);
        self.engine_scores.push(occurrence.engine_score);
        self.score_in_n_plies.push(occurrence.score_in_n_plies);
        self.occurrence += 1;
        self.best_next_move = best_move.into();
    }

    /// Append `other`'s occurrences after our own. Our `best_next_move`
    /// is kept.
    pub fn merge_from(&mut self, other: &Opening) {
        self.colours.extend_from_slice(&other.colours);
        self.dates.extend_from_slice(&other.dates);
        self.results.extend_from_slice(&other.results);
        self.following_moves
            .extend(other.following_moves.iter().cloned());
        self.engine_scores.extend_from_slice(&other.engine_scores);
        self.score_in_n_plies
            .extend_from_slice(&other.score_in_n_plies);
        self.occurrence += other.occurrence;
    }

    /// Merge with an optional right operand; `None` is the identity.
    pub fn merge(mut self, other: Option<&Opening>) -> Self {
        if let Some(other) = other {
            self.merge_from(other);
        }
        self
    }

    /// Left fold of [`Opening::merge`] starting from nothing.
    pub fn merge_all<'a>(openings: impl IntoIterator<Item = &'a Opening>) -> Option<Opening> {
        openings
            .into_iter()
            .fold(None, |acc: Option<Opening>, next| match acc {
                Some(acc) => Some(acc.merge(Some(next))),
                None => Some(next.clone()),
            })
    }

    /// Only the occurrences where the tracked player had `colour`.
    pub fn partition(&self, colour: PlayerColour) -> Option<Opening> {
        let indices: Vec<usize> = self
            .colours
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == colour)
            .map(|(i, _)| i)
            .collect();

        if indices.is_empty() {
            return None;
        }

        let pick = |values: &[f64]| indices.iter().map(|&i| values[i]).collect::<Vec<_>>();
        Some(Opening {
            key: self.key.clone(),
            index: self.index,
            code: self.code.clone(),
            name: self.name.clone(),
            num_moves: self.num_moves,
            colours: vec![colour; indices.len()],
            dates: indices.iter().map(|&i| self.dates[i]).collect(),
            results: pick(&self.results),
            following_moves: indices
                .iter()
                .map(|&i| self.following_moves[i].clone())
                .collect(),
            engine_scores: pick(&self.engine_scores),
            score_in_n_plies: pick(&self.score_in_n_plies),
            occurrence: indices.len(),
            best_next_move: self.best_next_move.clone(),
        })
    }

    /// Iterate occurrences as records instead of parallel sequences.
    pub fn occurrences(&self) -> impl Iterator<Item = Occurrence> + '_ {
        (0..self.occurrence).map(move |i| Occurrence {
            colour: self.colours[i],
            date: self.dates[i],
            result: self.results[i],
            following_move: self.following_moves[i].clone(),
            engine_score: self.engine_scores[i],
            score_in_n_plies: self.score_in_n_plies[i],
        })
    }

    /// Check the parallel-sequence invariant, for openings read from disk.
    pub fn validate(&self) -> Result<(), OpeningError> {
        let lengths = [
            ("colours", self.colours.len()),
            ("dates", self.dates.len()),
            ("results", self.results.len()),
            ("following_moves", self.following_moves.len()),
            ("engine_scores", self.engine_scores.len()),
            ("score_in_n_plies", self.score_in_n_plies.len()),
        ];
        match lengths.iter().find(|(_, len)| *len != self.occurrence) {
            Some(&(field, len)) => Err(OpeningError::LengthMismatch {
                key: self.key.clone(),
                field,
                len,
                occurrence: self.occurrence,
            }),
            None => Ok(()),
        }
    }

    pub fn mean_engine_score(&self) -> Option<f64> {
        mean(self.engine_scores.iter().copied())
    }

    pub fn mean_result(&self) -> Option<f64> {
        mean(self.results.iter().copied())
    }

    /// Mean lagged score, ignoring truncated walks.
    pub fn mean_score_in_n_plies(&self) -> Option<f64> {
        mean(self.score_in_n_plies.iter().copied().filter(|s| *s >= 0.0))
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

impl PartialEq for Opening {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Opening {}

impl Hash for Opening {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Opening {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
        write!(
            f,
            "{} ({}, {}, {})",
            self.code,
            self.name,
            show(self.mean_engine_score()),
            show(self.mean_result())
        )
    }
}
