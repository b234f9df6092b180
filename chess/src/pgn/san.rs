use cozy_chess::{Board, GameStatus, Move, Piece};

use crate::converters::{file_to_char, format_square, rank_to_char, san_piece_letter};
use crate::uci::is_castling;

/// All legal moves in a position.
pub fn legal_moves(board: &Board) -> Vec<Move> {
    let mut moves = Vec::new();
    board.generate_moves(|mvs| {
        moves.extend(mvs);
        false
    });
    moves
}

/// Parse Standard Algebraic Notation (SAN) move
///
/// Matching is done against the SAN of every legal move, ignoring check
/// markers, annotation glyphs and the `=` of promotions, and accepting
/// `0-0` style castling.
pub fn parse_san(board: &Board, san: &str) -> Result<Move, SanError> {
    let wanted = normalize(san);
    if wanted.is_empty() {
        return Err(SanError::InvalidFormat(san.to_string()));
    }

    let mut found = None;
    for mv in legal_moves(board) {
        if normalize(&san_body(board, mv)) == wanted {
            if found.is_some() {
                return Err(SanError::AmbiguousMove(san.to_string()));
            }
            found = Some(mv);
        }
    }

    found.ok_or_else(|| SanError::NoLegalMove(san.to_string()))
}

/// Format a move as SAN, including the check or mate suffix.
pub fn format_san(board: &Board, mv: Move) -> String {
    let mut san = san_body(board, mv);

    let mut after = board.clone();
    after.play_unchecked(mv);
    if !after.checkers().is_empty() {
        san.push(if after.status() == GameStatus::Won {
            '#'
        } else {
            '+'
        });
    }

    san
}

fn san_body(board: &Board, mv: Move) -> String {
    if is_castling(board, mv) {
        return if mv.to.file() as u8 > mv.from.file() as u8 {
            "O-O".to_string()
        } else {
            "O-O-O".to_string()
        };
    }

    let Some(piece) = board.piece_on(mv.from) else {
        return format!("{}{}", format_square(mv.from), format_square(mv.to));
    };
    let is_capture = board.piece_on(mv.to).is_some()
        || (piece == Piece::Pawn && mv.from.file() != mv.to.file());

    let mut san = String::new();
    match san_piece_letter(piece) {
        Some(letter) => {
            san.push(letter);
            san.push_str(&disambiguation(board, mv, piece));
        }
        None if is_capture => san.push(file_to_char(mv.from.file())),
        None => {}
    }

    if is_capture {
        san.push('x');
    }
    san.push_str(&format_square(mv.to));

    if let Some(promo) = mv.promotion.and_then(san_piece_letter) {
        san.push('=');
        san.push(promo);
    }

    san
}

/// File, rank or full square of the origin when another piece of the same
/// kind could also reach the destination.
fn disambiguation(board: &Board, mv: Move, piece: Piece) -> String {
    let rivals: Vec<Move> = legal_moves(board)
        .into_iter()
        .filter(|other| {
            other.to == mv.to
                && other.from != mv.from
                && board.piece_on(other.from) == Some(piece)
        })
        .collect();

    if rivals.is_empty() {
        return String::new();
    }
    if rivals.iter().all(|r| r.from.file() != mv.from.file()) {
        return file_to_char(mv.from.file()).to_string();
    }
    if rivals.iter().all(|r| r.from.rank() != mv.from.rank()) {
        return rank_to_char(mv.from.rank()).to_string();
    }
    format_square(mv.from)
}

fn normalize(san: &str) -> String {
    let trimmed = san.trim_end_matches(['+', '#', '!', '?']);
    let castled = match trimmed {
        "0-0" => "O-O",
        "0-0-0" => "O-O-O",
        other => other,
    };
    castled.replace('=', "")
}

#[derive(Debug, thiserror::Error)]
pub enum SanError {
    #[error("No legal move found for: {0}")]
    NoLegalMove(String),
    #[error("Ambiguous move: {0}")]
    AmbiguousMove(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uci::format_uci_move;

    fn board(fen: &str) -> Board {
        fen.parse().unwrap()
    }

    #[test]
    fn parses_pawn_and_piece_moves() {
        let start = Board::default();
        assert_eq!(format_uci_move(parse_san(&start, "e4").unwrap()), "e2e4");
        assert_eq!(format_uci_move(parse_san(&start, "Nf3").unwrap()), "g1f3");
        assert!(matches!(
            parse_san(&start, "e5"),
            Err(SanError::NoLegalMove(_))
        ));
    }

    #[test]
    fn parses_castling_in_both_spellings() {
        let b = board("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1");
        assert_eq!(format_uci_move(parse_san(&b, "O-O").unwrap()), "e1h1");
        assert_eq!(format_uci_move(parse_san(&b, "0-0-0").unwrap()), "e1a1");
    }

    #[test]
    fn formats_captures_and_checks() {
        let b = board("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 2");
        let mv = parse_san(&b, "exd5").unwrap();
        assert_eq!(format_san(&b, mv), "exd5");

        // Fool's mate
        let b = board("rnbqkbnr/pppp1ppp/8/4p3/6P1/5P2/PPPPP2P/RNBQKBNR b KQkq - 0 2");
        let mv = parse_san(&b, "Qh4#").unwrap();
        assert_eq!(format_san(&b, mv), "Qh4#");
    }

    #[test]
    fn disambiguates_by_file() {
        // Knights on b1 and f1 can both reach d2
        let b = board("4k3/8/8/8/8/8/8/1N2KN2 w - - 0 1");
        let mv = parse_san(&b, "Nbd2").unwrap();
        assert_eq!(format_uci_move(mv), "b1d2");
        assert_eq!(format_san(&b, mv), "Nbd2");
        assert!(matches!(
            parse_san(&b, "Nd2"),
            Err(SanError::NoLegalMove(_))
        ));
    }

    #[test]
    fn promotion_with_or_without_equals() {
        let b = board("8/P7/8/8/8/8/8/4K2k w - - 0 1");
        assert_eq!(format_uci_move(parse_san(&b, "a8=Q").unwrap()), "a7a8q");
        assert_eq!(format_uci_move(parse_san(&b, "a8Q").unwrap()), "a7a8q");
    }
}
