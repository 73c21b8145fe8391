//! Static exchange evaluation: the material outcome of a capture sequence
//! on one square, with each side recapturing with its least valuable
//! attacker and free to stop when continuing loses material.

use greco_core::attacks::{bishop_attacks, rook_attacks};
use greco_core::{Bitboard, Color, Move, MoveFlag, PieceKind, Position, Square};

/// Exchange values per piece kind. The king's value only matters in that it
/// ends the sequence: nothing recaptures a king.
const EXCHANGE_VALUE: [i32; 6] = [100, 320, 330, 500, 900, 20_000];

/// Exchange value of one piece kind.
#[inline]
pub fn piece_value(kind: PieceKind) -> i32 {
    EXCHANGE_VALUE[kind.index()]
}

/// Least valuable piece of `side` within `candidates`.
fn least_valuable(pos: &Position, candidates: Bitboard, side: Color) -> Option<(Square, PieceKind)> {
    for kind in PieceKind::ALL {
        if let Some(sq) = (candidates & pos.pieces(side, kind)).first() {
            return Some((sq, kind));
        }
    }
    None
}

/// Material outcome of `mv` from the mover's perspective, in centipawns.
pub fn see(pos: &Position, mv: Move) -> i32 {
    let from = mv.from();
    let target = mv.to();

    let attacker_kind = match pos.piece_at(from) {
        Some(piece) => piece.kind,
        None => return 0,
    };

    let first_gain = match mv.flag() {
        MoveFlag::EnPassant => EXCHANGE_VALUE[PieceKind::Pawn.index()],
        _ => pos
            .captured_kind(mv)
            .map_or(0, |kind| EXCHANGE_VALUE[kind.index()]),
    };

    // A promotion leaves the promoted piece on the square, so that is what
    // the opponent recaptures.
    let mut on_square = match mv.promotion_kind() {
        Some(kind) => EXCHANGE_VALUE[kind.index()],
        None => EXCHANGE_VALUE[attacker_kind.index()],
    };

    let mut occupied = pos.occupied().without(from);
    if mv.flag() == MoveFlag::EnPassant {
        let victim = Square::from_index_masked(
            (target.index() as i16 - pos.side_to_move().pawn_push() as i16) as u8,
        );
        occupied = occupied.without(victim);
    }

    let mut gain = [0i32; 32];
    gain[0] = first_gain;
    let mut depth = 0;
    let mut side = pos.side_to_move().flip();
    let mut attackers = pos.attackers_to(target, occupied) & occupied;

    loop {
        let Some((sq, kind)) = least_valuable(pos, attackers & pos.occupied_by(side), side) else {
            break;
        };
        if depth + 1 >= gain.len() {
            break;
        }
        depth += 1;

        gain[depth] = on_square - gain[depth - 1];
        on_square = EXCHANGE_VALUE[kind.index()];
        occupied = occupied.without(sq);

        // Removing a piece can expose a slider lined up behind it.
        if matches!(kind, PieceKind::Pawn | PieceKind::Bishop | PieceKind::Queen) {
            attackers |= bishop_attacks(target, occupied)
                & (pos.pieces_of_kind(PieceKind::Bishop) | pos.pieces_of_kind(PieceKind::Queen));
        }
        if matches!(kind, PieceKind::Rook | PieceKind::Queen) {
            attackers |= rook_attacks(target, occupied)
                & (pos.pieces_of_kind(PieceKind::Rook) | pos.pieces_of_kind(PieceKind::Queen));
        }
        attackers &= occupied;
        side = side.flip();
    }

    // Minimax backward over the gain chain: each side recaptures only when
    // that improves its outcome.
    while depth > 0 {
        gain[depth - 1] = -((-gain[depth - 1]).max(gain[depth]));
        depth -= 1;
    }
    gain[0]
}

/// `true` if the exchange outcome of `mv` is at least `threshold`.
#[inline]
pub fn see_ge(pos: &Position, mv: Move, threshold: i32) -> bool {
    see(pos, mv) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use greco_core::legal_moves;

    fn find_move(pos: &Position, from: &str, to: &str) -> Move {
        let from = Square::from_algebraic(from).unwrap();
        let to = Square::from_algebraic(to).unwrap();
        legal_moves(pos)
            .as_slice()
            .iter()
            .copied()
            .find(|m| m.from() == from && m.to() == to)
            .expect("move exists")
    }

    #[test]
    fn free_piece_is_full_value() {
        let pos: Position = "4k3/8/8/3n4/4P3/8/8/4K3 w - - 0 1".parse().unwrap();
        assert_eq!(see(&pos, find_move(&pos, "e4", "d5")), 320);
    }

    #[test]
    fn defended_piece_costs_the_attacker() {
        // Pawn takes knight, pawn recaptures: 320 - 100 = 220.
        let pos: Position = "4k3/8/4p3/3n4/4P3/8/8/4K3 w - - 0 1".parse().unwrap();
        assert_eq!(see(&pos, find_move(&pos, "e4", "d5")), 220);
    }

    #[test]
    fn queen_grabbing_defended_pawn_loses() {
        let pos: Position = "4k3/8/3p4/2p5/8/4Q3/8/4K3 w - - 0 1".parse().unwrap();
        assert!(see(&pos, find_move(&pos, "e3", "c5")) < 0);
    }

    #[test]
    fn quiet_move_into_attack_is_negative() {
        // Queen steps onto a square covered by a pawn.
        let pos: Position = "4k3/8/3p4/8/4Q3/8/8/4K3 w - - 0 1".parse().unwrap();
        let mv = find_move(&pos, "e4", "c5");
        assert_eq!(see(&pos, mv), -900);
    }

    #[test]
    fn xray_recapture_is_seen() {
        // The front rook takes the pawn; after rxR the rook lined up behind
        // on c1 recaptures. RxP (+100), rxR (-500), RxR (+500): net 100.
        let pos: Position = "4k3/2r5/8/2p5/8/8/2R5/2R1K3 w - - 0 1".parse().unwrap();
        assert_eq!(see(&pos, find_move(&pos, "c2", "c5")), 100);
    }

    #[test]
    fn overloaded_exchange_loses_material() {
        // Two attackers against two defenders on a pawn: the full sequence
        // trades two rooks for a pawn and a rook.
        let pos: Position = "2r1k3/2r5/8/2p5/8/8/2R5/2R1K3 w - - 0 1".parse().unwrap();
        assert_eq!(see(&pos, find_move(&pos, "c2", "c5")), -400);
    }

    #[test]
    fn en_passant_exchanges_pawns() {
        let pos: Position = "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3"
            .parse()
            .unwrap();
        let mv = find_move(&pos, "d4", "e3");
        assert_eq!(mv.flag(), MoveFlag::EnPassant);
        // dxe3 wins a pawn; fxe3 recaptures: 100 - 100 = 0.
        assert_eq!(see(&pos, mv), 0);
    }

    #[test]
    fn threshold_form_agrees() {
        let pos: Position = "4k3/8/4p3/3n4/4P3/8/8/4K3 w - - 0 1".parse().unwrap();
        let mv = find_move(&pos, "e4", "d5");
        assert!(see_ge(&pos, mv, 0));
        assert!(see_ge(&pos, mv, 220));
        assert!(!see_ge(&pos, mv, 221));
    }
}
