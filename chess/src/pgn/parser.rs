use std::collections::HashMap;

use cozy_chess::{Board, Move};

use super::san::{format_san, legal_moves, parse_san, SanError};
use crate::fen::{parse_fen, FenError, PositionKey};
use crate::uci::{convert_uci_castling_to_cozy, format_board_move_uci};

const RESULT_TOKENS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

/// A parsed PGN game: tag pairs plus the raw movetext.
///
/// Moves are only resolved against a board when [`PgnGame::mainline`] is
/// called, so games whose headers disqualify them are never replayed.
#[derive(Debug, Clone, Default)]
pub struct PgnGame {
    pub tags: HashMap<String, String>,
    pub movetext: String,
}

/// One half-move of the main line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ply {
    /// 1-based half-move number.
    pub number: usize,
    /// SAN as regenerated from the board, with check suffix.
    pub san: String,
    /// Standard UCI, castling written as the king's two-square move.
    pub uci: String,
    /// FEN of the position after this move.
    pub fen: String,
    /// Canonical key of the position after this move.
    pub key: PositionKey,
}

impl PgnGame {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// Starting board, honouring a `SetUp`/`FEN` tag pair.
    pub fn start_board(&self) -> Result<Board, PgnError> {
        match self.tag("FEN") {
            Some(fen) => Ok(parse_fen(fen)?),
            None => Ok(Board::default()),
        }
    }

    /// Replay the main line and return every ply in order.
    pub fn mainline(&self) -> Result<Vec<Ply>, PgnError> {
        let mut board = self.start_board()?;
        let mut plies = Vec::new();

        for (idx, token) in movetext_tokens(&self.movetext)?.into_iter().enumerate() {
            let number = idx + 1;
            let mv = resolve_move(&board, &token).map_err(|source| PgnError::San {
                ply: number,
                source,
            })?;

            let san = format_san(&board, mv);
            let uci = format_board_move_uci(&board, mv);
            board.play_unchecked(mv);

            plies.push(Ply {
                number,
                san,
                uci,
                fen: board.to_string(),
                key: PositionKey::from_board(&board),
            });
        }

        Ok(plies)
    }
}

/// Parse a single PGN game.
pub fn parse_pgn(input: &str) -> Result<PgnGame, PgnError> {
    let mut game = PgnGame::default();
    let mut movetext = Vec::new();
    let mut in_comment = false;

    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() || (!in_comment && line.starts_with('%')) {
            continue;
        }
        if !in_comment && line.starts_with('[') {
            if !movetext.is_empty() {
                return Err(PgnError::InvalidFormat(
                    "tag pair after movetext".to_string(),
                ));
            }
            let (name, value) = parse_tag(line)?;
            game.tags.insert(name, value);
        } else {
            in_comment = comment_open_after(line, in_comment);
            movetext.push(line);
        }
    }

    if game.tags.is_empty() && movetext.is_empty() {
        return Err(PgnError::InvalidFormat("empty game".to_string()));
    }

    game.movetext = movetext.join("\n");
    Ok(game)
}

/// Split a multi-game PGN file into one string per game.
///
/// A new game starts at the first tag line that follows movetext. Lines
/// inside a `{...}` comment are movetext, whatever they start with.
pub fn split_games(input: &str) -> Vec<String> {
    let mut games = Vec::new();
    let mut current = String::new();
    let mut seen_movetext = false;
    let mut in_comment = false;

    for line in input.lines() {
        let trimmed = line.trim();
        let is_tag = !in_comment && trimmed.starts_with('[');
        if is_tag && seen_movetext {
            games.push(std::mem::take(&mut current));
            seen_movetext = false;
        }
        if !trimmed.is_empty() && !is_tag {
            seen_movetext = true;
            in_comment = comment_open_after(trimmed, in_comment);
        }
        current.push_str(line);
        current.push('\n');
    }

    if !current.trim().is_empty() {
        games.push(current);
    }
    games
}

/// Whether a `{...}` comment is still open at the end of a movetext line.
fn comment_open_after(line: &str, mut open: bool) -> bool {
    for c in line.chars() {
        match c {
            '}' if open => open = false,
            '{' if !open => open = true,
            // Rest-of-line comment
            ';' if !open => break,
            _ => {}
        }
    }
    open
}

fn parse_tag(line: &str) -> Result<(String, String), PgnError> {
    let inner = line
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(|| PgnError::InvalidTag(line.to_string()))?
        .trim();

    let (name, rest) = inner
        .split_once(char::is_whitespace)
        .ok_or_else(|| PgnError::InvalidTag(line.to_string()))?;
    let value = rest
        .trim()
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(|| PgnError::InvalidTag(line.to_string()))?;

    Ok((name.to_string(), value.replace("\\\"", "\"")))
}

/// Main-line move tokens, with comments, variations, NAGs, move numbers and
/// the result marker removed.
fn movetext_tokens(movetext: &str) -> Result<Vec<String>, PgnError> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut variation_depth = 0usize;
    let mut chars = movetext.chars();

    let flush = |word: &mut String, tokens: &mut Vec<String>| {
        if let Some(token) = clean_token(word) {
            tokens.push(token);
        }
        word.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                flush(&mut word, &mut tokens);
                if !chars.by_ref().any(|c| c == '}') {
                    return Err(PgnError::InvalidFormat("unterminated comment".to_string()));
                }
            }
            ';' => {
                flush(&mut word, &mut tokens);
                chars.by_ref().find(|&c| c == '\n');
            }
            '(' => {
                flush(&mut word, &mut tokens);
                variation_depth += 1;
            }
            ')' => {
                word.clear();
                variation_depth = variation_depth
                    .checked_sub(1)
                    .ok_or_else(|| PgnError::InvalidFormat("unbalanced ')'".to_string()))?;
            }
            c if c.is_whitespace() => {
                if variation_depth == 0 {
                    flush(&mut word, &mut tokens);
                } else {
                    word.clear();
                }
            }
            c if variation_depth == 0 => word.push(c),
            _ => {}
        }
    }

    if variation_depth != 0 {
        return Err(PgnError::InvalidFormat("unterminated variation".to_string()));
    }
    flush(&mut word, &mut tokens);
    Ok(tokens)
}

fn clean_token(word: &str) -> Option<String> {
    if word.is_empty() || word.starts_with('$') || RESULT_TOKENS.contains(&word) {
        return None;
    }

    // "12." / "12..." / "12.e4"
    let stripped = word.trim_start_matches(|c: char| c.is_ascii_digit());
    let stripped = if stripped.len() < word.len() && stripped.starts_with('.') {
        stripped.trim_start_matches('.')
    } else {
        word
    };

    if stripped.is_empty() || stripped.chars().all(|c| c == '.') {
        return None;
    }
    Some(stripped.to_string())
}

fn resolve_move(board: &Board, token: &str) -> Result<Move, SanError> {
    match parse_san(board, token) {
        Ok(mv) => Ok(mv),
        Err(SanError::NoLegalMove(_)) => {
            // Some exporters write long algebraic / UCI in movetext.
            let legal = legal_moves(board);
            token
                .parse::<Move>()
                .ok()
                .map(|mv| convert_uci_castling_to_cozy(mv, &legal))
                .filter(|mv| legal.contains(mv))
                .ok_or_else(|| SanError::NoLegalMove(token.to_string()))
        }
        Err(e) => Err(e),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PgnError {
    #[error("Invalid PGN format: {0}")]
    InvalidFormat(String),
    #[error("Invalid tag: {0}")]
    InvalidTag(String),
    #[error("Ply {ply}: {source}")]
    San {
        ply: usize,
        #[source]
        source: SanError,
    },
    #[error(transparent)]
    Fen(#[from] FenError),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHOLAR: &str = r#"[Event "Casual"]
[White "alice"]
[Black "bob"]
[Result "1-0"]

1. e4 e5 2. Bc4 {aiming at f7} Nc6 3. Qh5 Nf6?? (3... g6 4. Qf3) 4. Qxf7# 1-0
"#;

    #[test]
    fn reads_tags_and_movetext() {
        let game = parse_pgn(SCHOLAR).unwrap();
        assert_eq!(game.tag("White"), Some("alice"));
        assert_eq!(game.tag("Result"), Some("1-0"));
        assert!(game.movetext.starts_with("1. e4"));
    }

    #[test]
    fn mainline_skips_comments_and_variations() {
        let plies = parse_pgn(SCHOLAR).unwrap().mainline().unwrap();
        let sans: Vec<&str> = plies.iter().map(|p| p.san.as_str()).collect();
        assert_eq!(sans, ["e4", "e5", "Bc4", "Nc6", "Qh5", "Nf6", "Qxf7#"]);
        assert_eq!(plies[0].uci, "e2e4");
        assert_eq!(plies[0].number, 1);
        assert_eq!(plies[6].number, 7);
        assert!(plies[0].fen.starts_with("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b"));
        assert_eq!(
            plies[0].key.as_str(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq -"
        );
    }

    #[test]
    fn castling_is_reported_in_standard_uci() {
        let game = parse_pgn("1. e4 e5 2. Nf3 Nc6 3. Bc4 Bc5 4. O-O *").unwrap();
        let plies = game.mainline().unwrap();
        assert_eq!(plies[6].san, "O-O");
        assert_eq!(plies[6].uci, "e1g1");
    }

    #[test]
    fn compact_move_numbers_and_nags() {
        let game = parse_pgn("1.e4 $1 e5 2.Nf3 2...Nc6 *").unwrap();
        let plies = game.mainline().unwrap();
        assert_eq!(plies.len(), 4);
        assert_eq!(plies[3].uci, "b8c6");
    }

    #[test]
    fn line_comments_end_at_newline() {
        let game = parse_pgn("1. e4 ; king pawn\n1... c5 *").unwrap();
        let plies = game.mainline().unwrap();
        assert_eq!(plies.len(), 2);
        assert_eq!(plies[1].uci, "c7c5");
    }

    #[test]
    fn illegal_move_reports_its_ply() {
        let game = parse_pgn("1. e4 e4 *").unwrap();
        match game.mainline() {
            Err(PgnError::San { ply, .. }) => assert_eq!(ply, 2),
            other => panic!("expected SAN error, got {other:?}"),
        }
    }

    #[test]
    fn honours_fen_tag() {
        let pgn = "[SetUp \"1\"]\n[FEN \"4k3/8/8/8/8/8/4P3/4K3 w - - 0 1\"]\n\n1. e4 *";
        let plies = parse_pgn(pgn).unwrap().mainline().unwrap();
        assert!(plies[0].fen.starts_with("4k3/8/8/8/4P3/8/8/4K3 b -"));
    }

    #[test]
    fn rejects_malformed_tags() {
        assert!(matches!(
            parse_pgn("[White alice]\n\n1. e4 *"),
            Err(PgnError::InvalidTag(_))
        ));
    }

    #[test]
    fn splits_multi_game_files() {
        let text = format!("{SCHOLAR}\n{SCHOLAR}");
        let games = split_games(&text);
        assert_eq!(games.len(), 2);
        assert!(games
            .iter()
            .all(|g| parse_pgn(g).unwrap().tag("Black") == Some("bob")));
    }

    const WRAPPED_CLOCK: &str = "[White \"alice\"]\n\n1. e4 {a long annotation\n[%clk 0:02:59]} e5 2. Nf3 *\n";

    #[test]
    fn bracket_line_inside_comment_is_movetext() {
        let game = parse_pgn(WRAPPED_CLOCK).unwrap();
        assert_eq!(game.tags.len(), 1);
        let plies = game.mainline().unwrap();
        assert_eq!(plies.len(), 3);
        assert_eq!(plies[1].uci, "e7e5");
    }

    #[test]
    fn split_keeps_wrapped_comment_in_one_game() {
        let text = format!("{WRAPPED_CLOCK}\n{SCHOLAR}");
        let games = split_games(&text);
        assert_eq!(games.len(), 2);
        assert!(games[0].contains("[%clk 0:02:59]}"));
        assert_eq!(parse_pgn(&games[1]).unwrap().tag("Black"), Some("bob"));
    }

    #[test]
    fn semicolon_hides_braces_for_the_rest_of_the_line() {
        assert!(!comment_open_after("1. e4 ; {not a comment", false));
        assert!(comment_open_after("1. e4 {open", false));
        assert!(!comment_open_after("still} e5", true));
    }
}
