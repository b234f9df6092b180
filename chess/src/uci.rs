//! UCI (Universal Chess Interface) utilities

use cozy_chess::{Board, File, Move, Piece, Rank, Square};

use crate::converters::{format_piece, format_square};

/// Convert UCI castling notation to cozy_chess notation
///
/// UCI uses standard notation (king moves 2 squares): e1g1, e1c1, e8g8, e8c8
/// cozy_chess uses king-to-rook notation: e1h1, e1a1, e8h8, e8a8
///
/// This function checks if the move is a castling move and converts it to the
/// appropriate cozy_chess format by finding the matching legal move.
pub fn convert_uci_castling_to_cozy(mv: Move, legal_moves: &[Move]) -> Move {
    // Check if this looks like a UCI castling move (king moving 2 squares on rank 1 or 8)
    let is_rank_1_or_8 = matches!(mv.from.rank(), Rank::First | Rank::Eighth);
    let is_e_file = matches!(mv.from.file(), File::E);
    let is_g_or_c_file = matches!(mv.to.file(), File::G | File::C);

    if is_rank_1_or_8 && is_e_file && is_g_or_c_file && mv.promotion.is_none() {
        let rook_file = match mv.to.file() {
            File::G => File::H,
            _ => File::A,
        };

        let converted = Move {
            from: mv.from,
            to: Square::new(rook_file, mv.from.rank()),
            promotion: None,
        };

        // Verify the converted move is in the legal moves list
        if legal_moves.contains(&converted) {
            return converted;
        }
    }

    // Not a castling move or conversion didn't work, return original
    mv
}

/// Convert cozy_chess king-to-rook castling into standard UCI (king moves 2 squares).
///
/// Non-castling moves are returned unchanged.
pub fn convert_cozy_castling_to_uci(board: &Board, mv: Move) -> Move {
    if !is_castling(board, mv) {
        return mv;
    }

    let king_file = if mv.to.file() as u8 > mv.from.file() as u8 {
        File::G
    } else {
        File::C
    };

    Move {
        from: mv.from,
        to: Square::new(king_file, mv.from.rank()),
        promotion: None,
    }
}

/// True when `mv` is a cozy_chess castling move (king captures own rook).
pub fn is_castling(board: &Board, mv: Move) -> bool {
    board.piece_on(mv.from) == Some(Piece::King)
        && board.color_on(mv.to) == Some(board.side_to_move())
}

/// Format a move in UCI notation (e.g., "e2e4", "e7e8q")
pub fn format_uci_move(mv: Move) -> String {
    let mut s = format!("{}{}", format_square(mv.from), format_square(mv.to));
    if let Some(promo) = mv.promotion {
        s.push(format_piece(promo));
    }
    s
}

/// Format a move played on `board` in standard UCI, castling as e1g1.
pub fn format_board_move_uci(board: &Board, mv: Move) -> String {
    format_uci_move(convert_cozy_castling_to_uci(board, mv))
}
