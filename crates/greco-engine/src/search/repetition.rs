//! Repetition machinery: the game-record hash list and the cuckoo table of
//! reversible moves used for upcoming-repetition detection.

use std::sync::OnceLock;

use greco_core::attacks::{bishop_attacks, king_attacks, knight_attacks, queen_attacks, rook_attacks};
use greco_core::{Bitboard, Color, Move, PieceKind, Position, Square, piece_key, side_key};

/// Positions played on the board before the current search, as hashes.
/// Append-only while a search runs.
#[derive(Debug, Default, Clone)]
pub struct GameHistory {
    hashes: Vec<u64>,
}

impl GameHistory {
    pub fn new() -> GameHistory {
        GameHistory { hashes: Vec::new() }
    }

    /// Record a played position.
    pub fn push(&mut self, pos: &Position) {
        self.hashes.push(pos.hash());
    }

    /// Forget everything, as on `new_game`.
    pub fn clear(&mut self) {
        self.hashes.clear();
    }

    /// How many recorded positions share this hash.
    pub fn count(&self, hash: u64) -> usize {
        self.hashes.iter().filter(|&&h| h == hash).count()
    }

    /// `true` if the position already occurred at least twice, so reaching
    /// it again completes a threefold repetition.
    pub fn is_third_occurrence(&self, hash: u64) -> bool {
        self.count(hash) >= 2
    }
}

/// Number of entries in each cuckoo array.
const CUCKOO_SIZE: usize = 8192;

/// Number of reversible (piece, from, to) moves on an empty board; fixed by
/// the rules of chess, used as a build-time sanity check.
const REVERSIBLE_MOVE_COUNT: usize = 3668;

struct CuckooTable {
    keys: Box<[u64; CUCKOO_SIZE]>,
    moves: Box<[Move; CUCKOO_SIZE]>,
}

#[inline]
fn slot_a(key: u64) -> usize {
    (key % CUCKOO_SIZE as u64) as usize
}

#[inline]
fn slot_b(key: u64) -> usize {
    ((key >> 16) % CUCKOO_SIZE as u64) as usize
}

/// Build the table once: every reversible single-piece move, keyed by the
/// Zobrist difference it induces, inserted by two-slot cuckoo displacement.
fn build() -> CuckooTable {
    let mut table = CuckooTable {
        keys: Box::new([0; CUCKOO_SIZE]),
        moves: Box::new([Move::NONE; CUCKOO_SIZE]),
    };

    let mut count = 0usize;
    for color in Color::ALL {
        // Pawn moves are irreversible and excluded.
        for kind in [
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Rook,
            PieceKind::Queen,
            PieceKind::King,
        ] {
            for a in 0..64u8 {
                let from = Square::new(a).unwrap();
                let attacks = match kind {
                    PieceKind::Knight => knight_attacks(from),
                    PieceKind::Bishop => bishop_attacks(from, Bitboard::EMPTY),
                    PieceKind::Rook => rook_attacks(from, Bitboard::EMPTY),
                    PieceKind::Queen => queen_attacks(from, Bitboard::EMPTY),
                    _ => king_attacks(from),
                };
                for to in attacks {
                    if to.index() <= from.index() {
                        continue;
                    }
                    let mut key =
                        piece_key(color, kind, from) ^ piece_key(color, kind, to) ^ side_key();
                    let mut mv = Move::normal(from, to);
                    let mut index = slot_a(key);
                    loop {
                        std::mem::swap(&mut table.keys[index], &mut key);
                        std::mem::swap(&mut table.moves[index], &mut mv);
                        if mv.is_none() {
                            break;
                        }
                        // Displaced entry moves to its other slot.
                        index = if index == slot_a(key) { slot_b(key) } else { slot_a(key) };
                    }
                    count += 1;
                }
            }
        }
    }
    debug_assert_eq!(count, REVERSIBLE_MOVE_COUNT);
    table
}

static CUCKOO: OnceLock<CuckooTable> = OnceLock::new();

/// Look up the reversible move whose Zobrist difference is `key`.
///
/// `key` is the xor of two position hashes two reversible plies apart; a hit
/// names the move that would repeat the earlier position.
pub fn cuckoo_move(key: u64) -> Option<Move> {
    let table = CUCKOO.get_or_init(build);
    for index in [slot_a(key), slot_b(key)] {
        if table.keys[index] == key {
            return Some(table.moves[index]);
        }
    }
    None
}
