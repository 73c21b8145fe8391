//! The chess position: piece placement, side to move, castling, en passant,
//! move counters, and copy-make move execution.

use std::fmt;

use crate::attacks::{bishop_attacks, king_attacks, knight_attacks, pawn_attacks, rook_attacks};
use crate::bitboard::Bitboard;
use crate::castling::CastleRights;
use crate::color::Color;
use crate::error::PositionError;
use crate::moves::{Move, MoveFlag};
use crate::piece::{Piece, PieceKind};
use crate::square::{Rank, Square};
use crate::zobrist;

/// Castling rights revoked when a move touches the given square.
static RIGHTS_REVOKED_BY_SQUARE: [CastleRights; 64] = {
    let mut table = [CastleRights::NONE; 64];
    table[Square::E1.index()] = CastleRights::both(Color::White);
    table[Square::H1.index()] = CastleRights::WHITE_KINGSIDE;
    table[Square::A1.index()] = CastleRights::WHITE_QUEENSIDE;
    table[Square::E8.index()] = CastleRights::both(Color::Black);
    table[Square::H8.index()] = CastleRights::BLACK_KINGSIDE;
    table[Square::A8.index()] = CastleRights::BLACK_QUEENSIDE;
    table
};

/// A complete chess position.
///
/// `Position` is `Copy`; the search descends by copy-make, leaving the
/// parent untouched.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Piece bitboards, indexed `[color][kind]`.
    pieces: [[Bitboard; PieceKind::COUNT]; Color::COUNT],
    /// All pieces of each color.
    occupancy: [Bitboard; Color::COUNT],
    /// Union of both occupancies.
    all: Bitboard,
    side_to_move: Color,
    castling: CastleRights,
    en_passant: Option<Square>,
    halfmove_clock: u16,
    fullmove_number: u16,
    hash: u64,
}

impl Position {
    /// An empty board. Only useful as a builder start for FEN parsing.
    pub(crate) fn empty() -> Position {
        Position {
            pieces: [[Bitboard::EMPTY; PieceKind::COUNT]; Color::COUNT],
            occupancy: [Bitboard::EMPTY; Color::COUNT],
            all: Bitboard::EMPTY,
            side_to_move: Color::White,
            castling: CastleRights::NONE,
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
            // The base hash carries the castling key of the empty rights so
            // incremental castling updates stay consistent.
            hash: zobrist::castling_key(CastleRights::NONE),
        }
    }

    /// The standard starting position.
    pub fn startpos() -> Position {
        use crate::fen::START_FEN;
        START_FEN.parse().expect("start FEN is valid")
    }

    // --- piece placement ------------------------------------------------

    /// Put a piece on an empty square, updating occupancy and hash.
    #[inline]
    pub(crate) fn put_piece(&mut self, color: Color, kind: PieceKind, sq: Square) {
        debug_assert!(!self.all.has(sq));
        self.toggle(color, kind, sq);
    }

    /// Set the side to move, fixing up the hash. FEN parsing only.
    pub(crate) fn set_side_to_move(&mut self, color: Color) {
        if self.side_to_move != color {
            self.hash ^= zobrist::side_key();
            self.side_to_move = color;
        }
    }

    /// Set the castling rights, fixing up the hash. FEN parsing only.
    pub(crate) fn set_castling(&mut self, rights: CastleRights) {
        self.hash ^= zobrist::castling_key(self.castling) ^ zobrist::castling_key(rights);
        self.castling = rights;
    }

    /// Set the en passant square, fixing up the hash. FEN parsing only.
    pub(crate) fn set_en_passant(&mut self, sq: Option<Square>) {
        if let Some(old) = self.en_passant {
            self.hash ^= zobrist::en_passant_key(old);
        }
        if let Some(new) = sq {
            self.hash ^= zobrist::en_passant_key(new);
        }
        self.en_passant = sq;
    }

    pub(crate) fn set_halfmove_clock(&mut self, clock: u16) {
        self.halfmove_clock = clock;
    }

    pub(crate) fn set_fullmove_number(&mut self, number: u16) {
        self.fullmove_number = number;
    }

    #[inline]
    fn toggle(&mut self, color: Color, kind: PieceKind, sq: Square) {
        let mask = Bitboard::from_square(sq);
        self.pieces[color.index()][kind.index()] ^= mask;
        self.occupancy[color.index()] ^= mask;
        self.all ^= mask;
        self.hash ^= zobrist::piece_key(color, kind, sq);
    }

    // --- queries --------------------------------------------------------

    /// The piece standing on `sq`, if any.
    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        let color = if self.occupancy[Color::White.index()].has(sq) {
            Color::White
        } else if self.occupancy[Color::Black.index()].has(sq) {
            Color::Black
        } else {
            return None;
        };
        for kind in PieceKind::ALL {
            if self.pieces[color.index()][kind.index()].has(sq) {
                return Some(Piece::new(color, kind));
            }
        }
        unreachable!("occupancy and piece bitboards are always consistent")
    }

    /// Bitboard of one side's pieces of one kind.
    #[inline]
    pub fn pieces(&self, color: Color, kind: PieceKind) -> Bitboard {
        self.pieces[color.index()][kind.index()]
    }

    /// Bitboard of both sides' pieces of one kind.
    #[inline]
    pub fn pieces_of_kind(&self, kind: PieceKind) -> Bitboard {
        self.pieces[0][kind.index()] | self.pieces[1][kind.index()]
    }

    /// All pieces of one side.
    #[inline]
    pub fn occupied_by(&self, color: Color) -> Bitboard {
        self.occupancy[color.index()]
    }

    /// All pieces on the board.
    #[inline]
    pub fn occupied(&self) -> Bitboard {
        self.all
    }

    /// The king square of one side.
    ///
    /// # Panics
    ///
    /// Panics if the side has no king; [`validate`](Self::validate) rules
    /// that out for any position handed to the engine.
    #[inline]
    pub fn king_square(&self, color: Color) -> Square {
        self.pieces(color, PieceKind::King)
            .first()
            .expect("each side has a king")
    }

    /// The side to move.
    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    /// Remaining castling rights.
    #[inline]
    pub fn castling(&self) -> CastleRights {
        self.castling
    }

    /// En passant target square, if the previous move was a double push.
    #[inline]
    pub fn en_passant(&self) -> Option<Square> {
        self.en_passant
    }

    /// Halfmove clock for the fifty-move rule.
    #[inline]
    pub fn halfmove_clock(&self) -> u16 {
        self.halfmove_clock
    }

    /// Fullmove number, starting at 1.
    #[inline]
    pub fn fullmove_number(&self) -> u16 {
        self.fullmove_number
    }

    /// Zobrist hash of the position.
    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// `true` if `color` still has anything besides pawns and the king.
    /// Gates null-move pruning against zugzwang endgames.
    pub fn has_non_pawn_material(&self, color: Color) -> bool {
        (self.pieces(color, PieceKind::Knight)
            | self.pieces(color, PieceKind::Bishop)
            | self.pieces(color, PieceKind::Rook)
            | self.pieces(color, PieceKind::Queen))
        .any()
    }

    /// All pieces of both sides attacking `sq` under the given occupancy.
    pub fn attackers_to(&self, sq: Square, occupied: Bitboard) -> Bitboard {
        let knights = self.pieces_of_kind(PieceKind::Knight);
        let kings = self.pieces_of_kind(PieceKind::King);
        let rook_like = self.pieces_of_kind(PieceKind::Rook) | self.pieces_of_kind(PieceKind::Queen);
        let bishop_like =
            self.pieces_of_kind(PieceKind::Bishop) | self.pieces_of_kind(PieceKind::Queen);

        (knight_attacks(sq) & knights)
            | (king_attacks(sq) & kings)
            | (rook_attacks(sq, occupied) & rook_like)
            | (bishop_attacks(sq, occupied) & bishop_like)
            | (pawn_attacks(Color::Black, sq) & self.pieces(Color::White, PieceKind::Pawn))
            | (pawn_attacks(Color::White, sq) & self.pieces(Color::Black, PieceKind::Pawn))
    }

    /// `true` if `sq` is attacked by any piece of `by`, with a custom
    /// occupancy for sliding rays.
    pub fn is_attacked_with_occ(&self, sq: Square, by: Color, occupied: Bitboard) -> bool {
        if (knight_attacks(sq) & self.pieces(by, PieceKind::Knight)).any() {
            return true;
        }
        if (king_attacks(sq) & self.pieces(by, PieceKind::King)).any() {
            return true;
        }
        // A pawn of `by` attacks sq iff a pawn of the other color on sq
        // would attack the pawn's square.
        if (pawn_attacks(by.flip(), sq) & self.pieces(by, PieceKind::Pawn)).any() {
            return true;
        }
        let rook_like = self.pieces(by, PieceKind::Rook) | self.pieces(by, PieceKind::Queen);
        if (rook_attacks(sq, occupied) & rook_like).any() {
            return true;
        }
        let bishop_like = self.pieces(by, PieceKind::Bishop) | self.pieces(by, PieceKind::Queen);
        (bishop_attacks(sq, occupied) & bishop_like).any()
    }

    /// `true` if `sq` is attacked by any piece of `by`.
    #[inline]
    pub fn is_attacked(&self, sq: Square, by: Color) -> bool {
        self.is_attacked_with_occ(sq, by, self.all)
    }

    /// `true` if the side to move is in check.
    #[inline]
    pub fn in_check(&self) -> bool {
        self.is_attacked(self.king_square(self.side_to_move), self.side_to_move.flip())
    }

    /// The piece kind a move captures, if any. En passant captures a pawn
    /// that is not on the destination square.
    pub fn captured_kind(&self, mv: Move) -> Option<PieceKind> {
        match mv.flag() {
            MoveFlag::EnPassant => Some(PieceKind::Pawn),
            MoveFlag::Castle => None,
            _ => self.piece_at(mv.to()).map(|p| p.kind),
        }
    }

    /// `true` if the move captures or promotes: the "tactical" moves the
    /// quiescence search considers.
    pub fn is_tactical(&self, mv: Move) -> bool {
        mv.flag() == MoveFlag::EnPassant
            || mv.flag() == MoveFlag::Promotion
            || (mv.flag() == MoveFlag::Normal && self.all.has(mv.to()))
    }

    // --- move execution -------------------------------------------------

    /// Apply a move, returning the child position. `self` is unchanged.
    ///
    /// The move must be pseudo-legal for this position; leaving one's own
    /// king in check is the caller's responsibility to detect on the child
    /// (see [`Position::in_check_after_own_move`]).
    pub fn make_move(&self, mv: Move) -> Position {
        let mut child = *self;
        let us = self.side_to_move;
        let them = us.flip();
        let from = mv.from();
        let to = mv.to();

        let moving = self
            .piece_at(from)
            .expect("make_move requires a piece on the from square");
        debug_assert_eq!(moving.color, us);

        if let Some(ep) = child.en_passant.take() {
            child.hash ^= zobrist::en_passant_key(ep);
        }

        child.halfmove_clock += 1;

        match mv.flag() {
            MoveFlag::Normal => {
                if let Some(captured) = self.piece_at(to) {
                    child.toggle(them, captured.kind, to);
                    child.halfmove_clock = 0;
                }
                child.toggle(us, moving.kind, from);
                child.toggle(us, moving.kind, to);

                if moving.kind == PieceKind::Pawn {
                    child.halfmove_clock = 0;
                    // A double push exposes the skipped square to en passant.
                    let from_idx = from.index() as i16;
                    let to_idx = to.index() as i16;
                    if (to_idx - from_idx).abs() == 16 {
                        let ep = Square::from_index_masked(((from_idx + to_idx) / 2) as u8);
                        child.en_passant = Some(ep);
                        child.hash ^= zobrist::en_passant_key(ep);
                    }
                }
            }
            MoveFlag::Promotion => {
                if let Some(captured) = self.piece_at(to) {
                    child.toggle(them, captured.kind, to);
                }
                let promo = mv.promotion_kind().expect("promotion flag carries a kind");
                child.toggle(us, PieceKind::Pawn, from);
                child.toggle(us, promo, to);
                child.halfmove_clock = 0;
            }
            MoveFlag::EnPassant => {
                let victim = Square::from_index_masked((to.index() as i16 - us.pawn_push() as i16) as u8);
                child.toggle(them, PieceKind::Pawn, victim);
                child.toggle(us, PieceKind::Pawn, from);
                child.toggle(us, PieceKind::Pawn, to);
                child.halfmove_clock = 0;
            }
            MoveFlag::Castle => {
                let (rook_from, rook_to) = rook_travel_for_castle(to);
                child.toggle(us, PieceKind::King, from);
                child.toggle(us, PieceKind::King, to);
                child.toggle(us, PieceKind::Rook, rook_from);
                child.toggle(us, PieceKind::Rook, rook_to);
            }
        }

        // Castling rights lost by moving from or to a king/rook home square.
        let revoked = RIGHTS_REVOKED_BY_SQUARE[from.index()]
            .add(RIGHTS_REVOKED_BY_SQUARE[to.index()]);
        if child.castling.intersects(revoked) {
            child.hash ^= zobrist::castling_key(child.castling);
            child.castling = child.castling.remove(revoked);
            child.hash ^= zobrist::castling_key(child.castling);
        }

        child.side_to_move = them;
        child.hash ^= zobrist::side_key();
        if us == Color::Black {
            child.fullmove_number += 1;
        }

        child
    }

    /// Pass the turn. Clears en passant and flips the side to move.
    pub fn make_null_move(&self) -> Position {
        let mut child = *self;
        if let Some(ep) = child.en_passant.take() {
            child.hash ^= zobrist::en_passant_key(ep);
        }
        child.side_to_move = child.side_to_move.flip();
        child.hash ^= zobrist::side_key();
        child.halfmove_clock += 1;
        child
    }

    /// `true` if the side that just moved left its own king attacked.
    /// Call on the child returned by [`make_move`](Self::make_move).
    #[inline]
    pub fn in_check_after_own_move(&self) -> bool {
        let mover = self.side_to_move.flip();
        self.is_attacked(self.king_square(mover), self.side_to_move)
    }

    /// Full legality check for a single move, without generating move lists.
    ///
    /// Used to vet moves pulled from the transposition table or the
    /// killer/counter tables, where a hash collision can smuggle in a move
    /// that was never generated for this position.
    pub fn is_legal(&self, mv: Move) -> bool {
        if mv.is_none() {
            return false;
        }
        let us = self.side_to_move;
        let from = mv.from();
        let to = mv.to();

        let Some(piece) = self.piece_at(from) else {
            return false;
        };
        if piece.color != us {
            return false;
        }
        if self.occupancy[us.index()].has(to) && mv.flag() != MoveFlag::Castle {
            return false;
        }

        let pseudo_legal = match mv.flag() {
            MoveFlag::Normal => self.normal_move_reaches(piece.kind, us, from, to),
            MoveFlag::Promotion => {
                piece.kind == PieceKind::Pawn
                    && to.rank() == Rank::EIGHTH.relative_to(us)
                    && self.pawn_reaches(us, from, to)
            }
            MoveFlag::EnPassant => {
                piece.kind == PieceKind::Pawn
                    && self.en_passant == Some(to)
                    && pawn_attacks(us, from).has(to)
            }
            MoveFlag::Castle => {
                piece.kind == PieceKind::King && self.castle_is_pseudo_legal(us, from, to)
            }
        };
        if !pseudo_legal {
            return false;
        }

        // Promotions must land on the back rank, nothing else may.
        if mv.flag() == MoveFlag::Normal
            && piece.kind == PieceKind::Pawn
            && to.rank() == Rank::EIGHTH.relative_to(us)
        {
            return false;
        }

        !self.make_move(mv).in_check_after_own_move()
    }

    fn normal_move_reaches(&self, kind: PieceKind, us: Color, from: Square, to: Square) -> bool {
        match kind {
            PieceKind::Pawn => self.pawn_reaches(us, from, to),
            PieceKind::Knight => knight_attacks(from).has(to),
            PieceKind::Bishop => bishop_attacks(from, self.all).has(to),
            PieceKind::Rook => rook_attacks(from, self.all).has(to),
            PieceKind::Queen => (bishop_attacks(from, self.all) | rook_attacks(from, self.all)).has(to),
            PieceKind::King => king_attacks(from).has(to),
        }
    }

    fn pawn_reaches(&self, us: Color, from: Square, to: Square) -> bool {
        let push = us.pawn_push() as i16;
        let delta = to.index() as i16 - from.index() as i16;

        if pawn_attacks(us, from).has(to) {
            return self.occupancy[us.flip().index()].has(to);
        }
        if delta == push {
            return !self.all.has(to);
        }
        if delta == 2 * push && from.rank() == Rank::SECOND.relative_to(us) {
            let skipped = Square::from_index_masked((from.index() as i16 + push) as u8);
            return !self.all.has(skipped) && !self.all.has(to);
        }
        false
    }

    fn castle_is_pseudo_legal(&self, us: Color, from: Square, to: Square) -> bool {
        let home = Square::E1.rank().relative_to(us);
        if from != Square::make(Square::E1.file(), home) {
            return false;
        }
        // A corrupt hash move can carry the castle flag with any squares.
        if to != Square::make(Square::G1.file(), home) && to != Square::make(Square::C1.file(), home)
        {
            return false;
        }
        let kingside = to.file() > from.file();
        let rights = if kingside {
            CastleRights::kingside(us)
        } else {
            CastleRights::queenside(us)
        };
        if !self.castling.contains(rights) {
            return false;
        }
        let (rook_from, _) = rook_travel_for_castle(to);
        // The path between king and rook must be clear, and the king may not
        // castle out of or through check.
        let path = crate::attacks::between(from, rook_from);
        if (path & self.all).any() {
            return false;
        }
        let them = us.flip();
        if self.is_attacked(from, them) {
            return false;
        }
        let step = Square::from_index_masked(((from.index() + to.index()) / 2) as u8);
        !self.is_attacked(step, them)
    }

    // --- validation -----------------------------------------------------

    /// Structural validation: exactly one king per side, no pawns on the
    /// back ranks, consistent occupancy, and the side not on move may not
    /// already be in check.
    pub fn validate(&self) -> Result<(), PositionError> {
        for color in Color::ALL {
            let kings = self.pieces(color, PieceKind::King).count();
            if kings != 1 {
                return Err(PositionError::KingCount { kings });
            }
        }

        let back_ranks = Bitboard::RANK_1 | Bitboard::RANK_8;
        if (self.pieces_of_kind(PieceKind::Pawn) & back_ranks).any() {
            return Err(PositionError::PawnOnBackRank);
        }

        if self.occupancy[0] & self.occupancy[1] != Bitboard::EMPTY {
            return Err(PositionError::OverlappingSides);
        }

        let opponent = self.side_to_move.flip();
        if self.is_attacked(self.king_square(opponent), self.side_to_move) {
            return Err(PositionError::OpponentInCheck);
        }

        Ok(())
    }
}

/// Rook's from and to squares for a castling move, keyed by the king's
/// destination.
fn rook_travel_for_castle(king_to: Square) -> (Square, Square) {
    match king_to {
        Square::G1 => (Square::H1, Square::F1),
        Square::C1 => (Square::A1, Square::D1),
        Square::G8 => (Square::H8, Square::F8),
        Square::C8 => (Square::A8, Square::D8),
        _ => unreachable!("castle destination is always c1/g1/c8/g8"),
    }
}

impl fmt::Debug for Position {
    /// Board diagram plus FEN, for test failures.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0u8..8).rev() {
            for file in 0u8..8 {
                let sq = Square::new(rank * 8 + file).unwrap();
                let c = self.piece_at(sq).map_or('.', |p| p.to_char());
                write!(f, "{c} ")?;
            }
            writeln!(f)?;
        }
        write!(f, "{}", crate::fen::format_fen(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(name: &str) -> Square {
        Square::from_algebraic(name).unwrap()
    }

    #[test]
    fn startpos_basics() {
        let pos = Position::startpos();
        assert_eq!(pos.side_to_move(), Color::White);
        assert_eq!(pos.occupied().count(), 32);
        assert_eq!(pos.king_square(Color::White), Square::E1);
        assert_eq!(pos.king_square(Color::Black), Square::E8);
        assert!(!pos.in_check());
        assert!(pos.validate().is_ok());
    }

    #[test]
    fn make_move_updates_hash_incrementally() {
        let pos = Position::startpos();
        let child = pos.make_move(Move::normal(sq("e2"), sq("e4")));
        // Recompute from scratch by re-parsing the resulting FEN.
        let reparsed: Position = crate::fen::format_fen(&child).parse().unwrap();
        assert_eq!(child.hash(), reparsed.hash());
    }

    #[test]
    fn capture_resets_halfmove_clock() {
        let pos: Position = "rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2"
            .parse()
            .unwrap();
        let child = pos.make_move(Move::normal(sq("e4"), sq("d5")));
        assert_eq!(child.halfmove_clock(), 0);
        assert_eq!(child.piece_at(sq("d5")).unwrap().kind, PieceKind::Pawn);
        assert_eq!(child.occupied().count(), 31);
    }

    #[test]
    fn double_push_sets_en_passant() {
        let pos = Position::startpos();
        let child = pos.make_move(Move::normal(sq("e2"), sq("e4")));
        assert_eq!(child.en_passant(), Some(sq("e3")));
        let next = child.make_move(Move::normal(sq("g8"), sq("f6")));
        assert_eq!(next.en_passant(), None);
    }

    #[test]
    fn en_passant_removes_victim() {
        let pos: Position = "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3"
            .parse()
            .unwrap();
        let child = pos.make_move(Move::en_passant(sq("d4"), sq("e3")));
        assert!(child.piece_at(sq("e4")).is_none(), "captured pawn removed");
        assert_eq!(child.piece_at(sq("e3")).unwrap().kind, PieceKind::Pawn);
    }

    #[test]
    fn castling_moves_rook() {
        let pos: Position = "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1"
            .parse()
            .unwrap();
        let child = pos.make_move(Move::castle(sq("e1"), sq("g1")));
        assert_eq!(child.piece_at(sq("g1")).unwrap().kind, PieceKind::King);
        assert_eq!(child.piece_at(sq("f1")).unwrap().kind, PieceKind::Rook);
        assert!(child.piece_at(sq("h1")).is_none());
        assert!(!child.castling().intersects(CastleRights::both(Color::White)));
        assert!(child.castling().contains(CastleRights::both(Color::Black)));
    }

    #[test]
    fn promotion_replaces_pawn() {
        let pos: Position = "8/4P3/8/8/8/2k5/8/4K3 w - - 0 1".parse().unwrap();
        let child = pos.make_move(Move::promotion(sq("e7"), sq("e8"), PieceKind::Queen));
        assert_eq!(child.piece_at(sq("e8")).unwrap().kind, PieceKind::Queen);
        assert!(child.pieces(Color::White, PieceKind::Pawn).is_empty());
    }

    #[test]
    fn null_move_flips_side_and_keeps_pieces() {
        let pos = Position::startpos();
        let child = pos.make_null_move();
        assert_eq!(child.side_to_move(), Color::Black);
        assert_eq!(child.occupied(), pos.occupied());
        assert_ne!(child.hash(), pos.hash());
        // A second null move restores the hash except for the clock fields.
        let back = child.make_null_move();
        assert_eq!(back.hash(), pos.hash());
    }

    #[test]
    fn rook_move_revokes_one_right() {
        let pos: Position = "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1"
            .parse()
            .unwrap();
        let child = pos.make_move(Move::normal(sq("h1"), sq("g1")));
        assert!(!child.castling().contains(CastleRights::WHITE_KINGSIDE));
        assert!(child.castling().contains(CastleRights::WHITE_QUEENSIDE));
    }

    #[test]
    fn captured_kind_reports_victim() {
        let pos: Position = "rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2"
            .parse()
            .unwrap();
        let capture = Move::normal(sq("e4"), sq("d5"));
        assert_eq!(pos.captured_kind(capture), Some(PieceKind::Pawn));
        let quiet = Move::normal(sq("g1"), sq("f3"));
        assert_eq!(pos.captured_kind(quiet), None);
    }

    #[test]
    fn is_legal_accepts_generated_moves() {
        let pos = Position::startpos();
        for mv in crate::movegen::legal_moves(&pos).as_slice() {
            assert!(pos.is_legal(*mv), "{mv} should be legal");
        }
    }

    #[test]
    fn is_legal_rejects_foreign_moves() {
        let pos = Position::startpos();
        // Moving an empty square, an enemy piece, through a blocker, and a
        // pinned-style illegal king capture.
        assert!(!pos.is_legal(Move::normal(sq("e4"), sq("e5"))));
        assert!(!pos.is_legal(Move::normal(sq("e7"), sq("e5"))));
        assert!(!pos.is_legal(Move::normal(sq("d1"), sq("d5"))));
        assert!(!pos.is_legal(Move::NONE));
    }

    #[test]
    fn is_legal_rejects_moving_into_check() {
        // King on e1 would walk into the rook's file.
        let pos: Position = "4k3/8/8/8/8/8/5r2/4K3 w - - 0 1".parse().unwrap();
        assert!(!pos.is_legal(Move::normal(sq("e1"), sq("f1"))));
        assert!(pos.is_legal(Move::normal(sq("e1"), sq("d1"))));
    }

    #[test]
    fn is_legal_rejects_corrupt_castle_encoding() {
        let pos: Position = "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1"
            .parse()
            .unwrap();
        // Castle flag with a destination that is not c1/g1.
        assert!(!pos.is_legal(Move::castle(sq("e1"), sq("e5"))));
        assert!(!pos.is_legal(Move::castle(sq("d1"), sq("g1"))));
    }

    #[test]
    fn is_legal_rejects_stale_castle() {
        // Rights are gone even though the squares are empty.
        let pos: Position = "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w - - 0 1"
            .parse()
            .unwrap();
        assert!(!pos.is_legal(Move::castle(sq("e1"), sq("g1"))));
    }

    #[test]
    fn validate_rejects_kingless_board() {
        let pos: Result<Position, _> = "8/8/8/8/8/8/8/4K3 w - - 0 1".parse();
        assert!(pos.is_err());
    }
}
