//! NNUE evaluation: incrementally-updated accumulators feeding a small
//! quantized network handed in by the caller.

mod accumulator;
mod features;
mod network;

pub use accumulator::Accumulator;
pub use features::{INPUTS, KING_BUCKETS, king_bucket};
pub use network::{HIDDEN, Network, NetworkFormatError};

use std::sync::Arc;

use greco_core::{Color, Position, Square};

use crate::eval::{EvalStack, Evaluator, clamp_eval};
use crate::score::Score;

/// Orientation-and-bucket fingerprint of a king placement. Two king
/// squares in the same zone index every feature identically, so delta
/// updates remain valid; crossing zones forces an accumulator refresh.
#[inline]
pub fn king_zone(perspective: Color, king: Square) -> usize {
    king_bucket(perspective, king) * 2 + (king.file().index() >= 4) as usize
}

/// The NNUE oracle.
pub struct NnueEvaluator {
    net: Arc<Network>,
}

impl NnueEvaluator {
    pub fn new(net: Arc<Network>) -> NnueEvaluator {
        NnueEvaluator { net }
    }

    /// Make the accumulator of `perspective` at `ply` reflect `pos`.
    ///
    /// Walks down the stack to the nearest already-computed ancestor and
    /// replays the recorded dirty pieces on a copy. If the walk hits a
    /// king-zone boundary (or the bottom) first, the accumulator is
    /// rebuilt from the position instead.
    fn ensure(&self, stack: &mut EvalStack, ply: usize, pos: &Position, perspective: Color) {
        let p = perspective.index();
        if stack.entry(ply).computed[p] {
            return;
        }

        let mut idx = ply;
        let base = loop {
            let entry = stack.entry(idx);
            if entry.computed[p] {
                break Some(idx);
            }
            if entry.needs_refresh[p] || idx == 0 {
                break None;
            }
            idx -= 1;
        };

        let acc = match base {
            None => Accumulator::refresh(pos, perspective, &self.net),
            Some(base) => {
                let king = pos.king_square(perspective);
                let mut acc = stack.entry(base).accumulators[p];
                for idx in base + 1..=ply {
                    let entry = stack.entry(idx);
                    for dirty in entry.dirty.iter().take(entry.num_dirty).flatten() {
                        acc.move_piece(
                            perspective,
                            king,
                            dirty.color,
                            dirty.kind,
                            dirty.from,
                            dirty.to,
                            &self.net,
                        );
                    }
                }
                acc
            }
        };

        let entry = stack.entry_mut(ply);
        entry.accumulators[p] = acc;
        entry.computed[p] = true;
    }
}

impl Evaluator for NnueEvaluator {
    fn evaluate(&self, stack: &mut EvalStack, ply: usize, pos: &Position) -> Score {
        self.ensure(stack, ply, pos, Color::White);
        self.ensure(stack, ply, pos, Color::Black);

        let entry = stack.entry(ply);
        let us = pos.side_to_move().index();
        let them = pos.side_to_move().flip().index();
        clamp_eval(
            self.net
                .evaluate(&entry.accumulators[us], &entry.accumulators[them]),
        )
    }

    fn reset(&self, stack: &mut EvalStack, root: &Position) {
        let entry = stack.entry_mut(0);
        entry.accumulators[Color::White.index()] =
            Accumulator::refresh(root, Color::White, &self.net);
        entry.accumulators[Color::Black.index()] =
            Accumulator::refresh(root, Color::Black, &self.net);
        entry.computed = [true; 2];
        entry.needs_refresh = [false; 2];
        entry.num_dirty = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::network::tests::test_network;
    use super::*;
    use greco_core::Move;

    fn sq(name: &str) -> Square {
        Square::from_algebraic(name).unwrap()
    }

    fn oracle() -> NnueEvaluator {
        NnueEvaluator::new(Arc::new(test_network()))
    }

    /// Evaluation after incremental updates must equal evaluation from a
    /// fresh stack on the same position.
    fn assert_matches_scratch(oracle: &NnueEvaluator, stack: &mut EvalStack, ply: usize, pos: &Position) {
        let incremental = oracle.evaluate(stack, ply, pos);
        let mut fresh = EvalStack::new();
        oracle.reset(&mut fresh, pos);
        let scratch = oracle.evaluate(&mut fresh, 0, pos);
        assert_eq!(incremental, scratch);
    }

    #[test]
    fn incremental_line_matches_scratch() {
        let oracle = oracle();
        let mut stack = EvalStack::new();
        let mut pos = Position::startpos();
        oracle.reset(&mut stack, &pos);

        let line = [
            Move::normal(sq("e2"), sq("e4")),
            Move::normal(sq("e7"), sq("e5")),
            Move::normal(sq("g1"), sq("f3")),
            Move::normal(sq("b8"), sq("c6")),
        ];
        for (i, mv) in line.iter().enumerate() {
            stack.record_move(i + 1, &pos, *mv);
            pos = pos.make_move(*mv);
            assert_matches_scratch(&oracle, &mut stack, i + 1, &pos);
        }
    }

    #[test]
    fn skipped_plies_are_replayed() {
        // Evaluate only at the end of the line; intermediate plies were
        // never materialized.
        let oracle = oracle();
        let mut stack = EvalStack::new();
        let mut pos = Position::startpos();
        oracle.reset(&mut stack, &pos);

        let line = [
            Move::normal(sq("d2"), sq("d4")),
            Move::normal(sq("d7"), sq("d5")),
            Move::normal(sq("c1"), sq("f4")),
        ];
        for (i, mv) in line.iter().enumerate() {
            stack.record_move(i + 1, &pos, *mv);
            pos = pos.make_move(*mv);
        }
        assert_matches_scratch(&oracle, &mut stack, line.len(), &pos);
    }

    #[test]
    fn king_zone_crossing_forces_refresh_and_stays_correct() {
        let oracle = oracle();
        let mut stack = EvalStack::new();
        // King walks from d-side to e-side, flipping the mirror.
        let mut pos: Position = "4k3/8/8/8/8/8/8/3K4 w - - 0 1".parse().unwrap();
        oracle.reset(&mut stack, &pos);

        let mv = Move::normal(sq("d1"), sq("e1"));
        stack.record_move(1, &pos, mv);
        assert!(stack.entry(1).needs_refresh[Color::White.index()]);
        pos = pos.make_move(mv);
        assert_matches_scratch(&oracle, &mut stack, 1, &pos);
    }

    #[test]
    fn null_move_keeps_accumulators_valid() {
        let oracle = oracle();
        let mut stack = EvalStack::new();
        let pos = Position::startpos();
        oracle.reset(&mut stack, &pos);

        stack.record_null(1);
        let null_pos = pos.make_null_move();
        assert_matches_scratch(&oracle, &mut stack, 1, &null_pos);
    }

    #[test]
    fn zones_change_only_on_boundary() {
        assert_eq!(king_zone(Color::White, sq("g1")), king_zone(Color::White, sq("h1")));
        assert_ne!(king_zone(Color::White, sq("d1")), king_zone(Color::White, sq("e1")));
    }
}
