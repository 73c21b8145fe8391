//! FEN parsing and formatting.

use std::fmt::Write as _;
use std::str::FromStr;

use crate::castling::CastleRights;
use crate::color::Color;
use crate::error::FenError;
use crate::piece::Piece;
use crate::position::Position;
use crate::square::{File, Rank, Square};

/// FEN of the standard starting position.
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Parse a FEN string.
///
/// The halfmove clock and fullmove number are optional, defaulting to
/// `0` and `1`; everything else is required. The parsed position is
/// structurally validated.
pub fn parse_fen(fen: &str) -> Result<Position, FenError> {
    let fields: Vec<&str> = fen.split_whitespace().collect();
    if fields.len() < 4 {
        return Err(FenError::FieldCount { found: fields.len() });
    }

    let mut pos = Position::empty();

    // Piece placement, rank 8 first.
    let ranks: Vec<&str> = fields[0].split('/').collect();
    if ranks.len() != 8 {
        return Err(FenError::BadPlacement { rank: ranks.len() });
    }
    for (i, rank_text) in ranks.iter().enumerate() {
        let rank = Rank::new(7 - i as u8).unwrap();
        let mut file = 0u8;
        for c in rank_text.chars() {
            if let Some(skip) = c.to_digit(10) {
                file += skip as u8;
            } else {
                let piece = Piece::from_char(c).ok_or(FenError::InvalidPiece(c))?;
                let Some(f) = File::new(file) else {
                    return Err(FenError::BadPlacement { rank: i });
                };
                pos.put_piece(piece.color, piece.kind, Square::make(f, rank));
                file += 1;
            }
        }
        if file != 8 {
            return Err(FenError::BadPlacement { rank: i });
        }
    }

    let side = match fields[1] {
        "w" => Color::White,
        "b" => Color::Black,
        other => return Err(FenError::InvalidSideToMove(other.to_string())),
    };
    pos.set_side_to_move(side);

    let mut castling = CastleRights::NONE;
    if fields[2] != "-" {
        for c in fields[2].chars() {
            castling = castling.add(match c {
                'K' => CastleRights::WHITE_KINGSIDE,
                'Q' => CastleRights::WHITE_QUEENSIDE,
                'k' => CastleRights::BLACK_KINGSIDE,
                'q' => CastleRights::BLACK_QUEENSIDE,
                _ => return Err(FenError::InvalidCastling(c)),
            });
        }
    }
    pos.set_castling(sanitize_castling(&pos, castling));

    if fields[3] != "-" {
        let sq = Square::from_algebraic(fields[3])
            .ok_or_else(|| FenError::InvalidEnPassant(fields[3].to_string()))?;
        pos.set_en_passant(Some(sq));
    }

    if let Some(text) = fields.get(4) {
        let clock = text
            .parse::<u16>()
            .map_err(|_| FenError::InvalidCounter(text.to_string()))?;
        pos.set_halfmove_clock(clock);
    }
    if let Some(text) = fields.get(5) {
        let number = text
            .parse::<u16>()
            .map_err(|_| FenError::InvalidCounter(text.to_string()))?;
        pos.set_fullmove_number(number.max(1));
    }

    pos.validate()?;
    Ok(pos)
}

/// Drop castling rights whose king or rook has left its home square; some
/// FEN sources carry stale flags, and the move generator trusts the rights.
fn sanitize_castling(pos: &Position, rights: CastleRights) -> CastleRights {
    use crate::piece::PieceKind;

    let mut sane = rights;
    for color in Color::ALL {
        let home = Rank::FIRST.relative_to(color);
        let king_home = Square::make(Square::E1.file(), home);
        let king_ok = pos.pieces(color, PieceKind::King).has(king_home);
        let rook_at = |file: File| {
            pos.pieces(color, PieceKind::Rook).has(Square::make(file, home))
        };
        if !king_ok || !rook_at(File::H) {
            sane = sane.remove(CastleRights::kingside(color));
        }
        if !king_ok || !rook_at(File::A) {
            sane = sane.remove(CastleRights::queenside(color));
        }
    }
    sane
}

/// Format a position as a FEN string.
pub fn format_fen(pos: &Position) -> String {
    let mut out = String::new();

    for rank in (0u8..8).rev() {
        let mut empty = 0;
        for file in 0u8..8 {
            let sq = Square::make(File::new(file).unwrap(), Rank::new(rank).unwrap());
            match pos.piece_at(sq) {
                Some(piece) => {
                    if empty > 0 {
                        let _ = write!(out, "{empty}");
                        empty = 0;
                    }
                    out.push(piece.to_char());
                }
                None => empty += 1,
            }
        }
        if empty > 0 {
            let _ = write!(out, "{empty}");
        }
        if rank > 0 {
            out.push('/');
        }
    }

    let side = match pos.side_to_move() {
        Color::White => 'w',
        Color::Black => 'b',
    };
    let ep = pos
        .en_passant()
        .map_or_else(|| "-".to_string(), |sq| sq.to_string());
    let _ = write!(
        out,
        " {side} {} {ep} {} {}",
        pos.castling(),
        pos.halfmove_clock(),
        pos.fullmove_number()
    );

    out
}

impl FromStr for Position {
    type Err = FenError;

    fn from_str(s: &str) -> Result<Position, FenError> {
        parse_fen(s)
    }
}
