//! Hidden-layer accumulator, updated incrementally as pieces move.

use greco_core::{Color, PieceKind, Position, Square};

use super::features::feature_index;
use super::network::{HIDDEN, Network};

/// First-layer activations for one perspective.
#[derive(Clone, Copy)]
#[repr(align(64))]
pub struct Accumulator {
    pub(crate) vals: [i16; HIDDEN],
}

impl Accumulator {
    /// All-zero accumulator; a placeholder until refreshed.
    pub fn zeroed() -> Accumulator {
        Accumulator { vals: [0; HIDDEN] }
    }

    /// Full rebuild from a position: bias plus every piece feature.
    pub fn refresh(pos: &Position, perspective: Color, net: &Network) -> Accumulator {
        let mut acc = Accumulator {
            vals: net.feature_bias(),
        };
        let king = pos.king_square(perspective);
        for color in Color::ALL {
            for kind in PieceKind::ALL {
                for sq in pos.pieces(color, kind) {
                    acc.add(feature_index(perspective, king, color, kind, sq), net);
                }
            }
        }
        acc
    }

    /// Add one feature's weights.
    #[inline]
    pub fn add(&mut self, feature: usize, net: &Network) {
        for (val, &weight) in self.vals.iter_mut().zip(net.feature_weights(feature)) {
            *val += weight;
        }
    }

    /// Subtract one feature's weights.
    #[inline]
    pub fn sub(&mut self, feature: usize, net: &Network) {
        for (val, &weight) in self.vals.iter_mut().zip(net.feature_weights(feature)) {
            *val -= weight;
        }
    }

    /// Move one piece's feature: subtract the old square, add the new.
    #[inline]
    pub fn move_piece(
        &mut self,
        perspective: Color,
        king: Square,
        color: Color,
        kind: PieceKind,
        from: Option<Square>,
        to: Option<Square>,
        net: &Network,
    ) {
        if let Some(from) = from {
            self.sub(feature_index(perspective, king, color, kind, from), net);
        }
        if let Some(to) = to {
            self.add(feature_index(perspective, king, color, kind, to), net);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::nnue::network::tests::test_network;
    use greco_core::Move;

    fn sq(name: &str) -> Square {
        Square::from_algebraic(name).unwrap()
    }

    #[test]
    fn incremental_update_matches_refresh() {
        let net = test_network();
        let pos = Position::startpos();
        let mv = Move::normal(sq("g1"), sq("f3"));
        let child = pos.make_move(mv);

        for perspective in Color::ALL {
            let mut acc = Accumulator::refresh(&pos, perspective, &net);
            let king = child.king_square(perspective);
            acc.move_piece(
                perspective,
                king,
                Color::White,
                PieceKind::Knight,
                Some(sq("g1")),
                Some(sq("f3")),
                &net,
            );
            let fresh = Accumulator::refresh(&child, perspective, &net);
            assert_eq!(acc.vals, fresh.vals, "perspective {perspective:?}");
        }
    }

    #[test]
    fn capture_update_matches_refresh() {
        let net = test_network();
        let pos: Position = "rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2"
            .parse()
            .unwrap();
        let mv = Move::normal(sq("e4"), sq("d5"));
        let child = pos.make_move(mv);

        for perspective in Color::ALL {
            let mut acc = Accumulator::refresh(&pos, perspective, &net);
            let king = child.king_square(perspective);
            acc.move_piece(perspective, king, Color::Black, PieceKind::Pawn, Some(sq("d5")), None, &net);
            acc.move_piece(
                perspective,
                king,
                Color::White,
                PieceKind::Pawn,
                Some(sq("e4")),
                Some(sq("d5")),
                &net,
            );
            let fresh = Accumulator::refresh(&child, perspective, &net);
            assert_eq!(acc.vals, fresh.vals, "perspective {perspective:?}");
        }
    }
}
