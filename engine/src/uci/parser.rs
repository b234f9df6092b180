use crate::{EngineInfo, Score};
use chess::converters::{parse_square, piece_from_char};
use cozy_chess::{Move, Piece};

/// Incoming message from UCI engine
#[derive(Debug, Clone)]
pub enum UciMessage {
    Id { name: String, value: String },
    Option(String),
    UciOk,
    ReadyOk,
    BestMove { mv: Option<Move>, ponder: Option<Move> },
    Info(EngineInfo),
}

/// Parse a UCI message line
pub fn parse_uci_message(line: &str) -> Result<UciMessage, crate::UciError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.first() {
        Some(&"uciok") => Ok(UciMessage::UciOk),
        Some(&"readyok") => Ok(UciMessage::ReadyOk),

        Some(&"id") => {
            if tokens.len() < 3 {
                return Err(crate::UciError::MalformedMessage(line.to_string()));
            }
            let name = tokens[1].to_string();
            let value = tokens[2..].join(" ");
            Ok(UciMessage::Id { name, value })
        }

        Some(&"option") => Ok(UciMessage::Option(tokens[1..].join(" "))),

        Some(&"bestmove") => {
            let Some(&best) = tokens.get(1) else {
                return Err(crate::UciError::MalformedMessage(line.to_string()));
            };
            // Stockfish answers "bestmove (none)" in mate/stalemate positions
            let mv = match best {
                "(none)" | "0000" => None,
                other => Some(parse_uci_move(other)?),
            };
            let ponder = match (tokens.get(2), tokens.get(3)) {
                (Some(&"ponder"), Some(p)) => parse_uci_move(p).ok(),
                _ => None,
            };
            Ok(UciMessage::BestMove { mv, ponder })
        }

        Some(&"info") => Ok(UciMessage::Info(parse_info_line(&tokens[1..]))),

        _ => Err(crate::UciError::UnknownMessage(line.to_string())),
    }
}

/// Parse the fields of an `info` line we act on. Anything else is skipped.
fn parse_info_line(tokens: &[&str]) -> EngineInfo {
    let mut info = EngineInfo::default();
    let mut rest = tokens.iter().copied().peekable();

    while let Some(keyword) = rest.next() {
        match keyword {
            "depth" => info.depth = rest.next().and_then(|v| v.parse().ok()),
            "nodes" => info.nodes = rest.next().and_then(|v| v.parse().ok()),
            "multipv" => info.multipv = rest.next().and_then(|v| v.parse().ok()),
            "score" => {
                let kind = rest.next();
                let value = rest.next().and_then(|v| v.parse::<i32>().ok());
                info.score = match (kind, value) {
                    (Some("cp"), Some(cp)) => Some(Score::Centipawns(cp)),
                    (Some("mate"), Some(n)) => i8::try_from(n).ok().map(Score::Mate),
                    _ => None,
                };
                // "lowerbound" / "upperbound" qualifiers
                while rest.next_if(|t| t.ends_with("bound")).is_some() {}
            }
            "wdl" => {
                let values: Vec<u32> = rest.by_ref().take(3).filter_map(|v| v.parse().ok()).collect();
                if let [w, d, l] = values[..] {
                    info.wdl = Some((w, d, l));
                }
            }
            "pv" => {
                while let Some(mv) = rest.next_if(|t| !is_keyword(t)) {
                    if let Ok(mv) = parse_uci_move(mv) {
                        info.pv.push(mv);
                    }
                }
            }
            "string" => {
                // Free text runs to the end of the line
                info.string = Some(rest.by_ref().collect::<Vec<_>>().join(" "));
            }
            _ => {}
        }
    }

    info
}

fn is_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "score"
            | "wdl"
            | "pv"
            | "multipv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "nps"
            | "tbhits"
            | "cpuload"
            | "string"
    )
}

/// Parse UCI move format (e2e4, e7e8q)
pub fn parse_uci_move(s: &str) -> Result<Move, crate::UciError> {
    if !(4..=5).contains(&s.len()) || !s.is_ascii() {
        return Err(crate::UciError::InvalidMove(s.to_string()));
    }

    let from = parse_square(&s[0..2]).ok_or_else(|| crate::UciError::InvalidMove(s.to_string()))?;
    let to = parse_square(&s[2..4]).ok_or_else(|| crate::UciError::InvalidMove(s.to_string()))?;

    let promotion = match s.chars().nth(4) {
        None => None,
        Some(c) => match piece_from_char(c) {
            Some(p @ (Piece::Queen | Piece::Rook | Piece::Bishop | Piece::Knight)) => Some(p),
            _ => return Err(crate::UciError::InvalidPromotion(s.to_string())),
        },
    };

    Ok(Move {
        from,
        to,
        promotion,
    })
}
