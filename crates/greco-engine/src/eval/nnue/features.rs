//! Feature indexing for the king-bucketed 768-input network.
//!
//! Each perspective sees the board from its own side: squares are flipped
//! vertically for Black, and mirrored horizontally whenever the
//! perspective's king stands on the e-h files, so one network half serves
//! both wings. Features are additionally segmented by a coarse king
//! bucket, giving `KING_BUCKETS * 768` inputs per perspective.

use greco_core::{Color, PieceKind, Square};

/// Number of king placement buckets per perspective.
pub const KING_BUCKETS: usize = 4;

/// Features per king bucket: 2 colors x 6 kinds x 64 squares.
pub const FEATURES_PER_BUCKET: usize = 768;

/// Total input features.
pub const INPUTS: usize = KING_BUCKETS * FEATURES_PER_BUCKET;

/// Bucket of each a-d file king square (after mirroring), from the
/// perspective owner's point of view.
#[rustfmt::skip]
const KING_BUCKET_MAP: [usize; 64] = [
    0, 0, 1, 1, 1, 1, 0, 0,
    2, 2, 2, 2, 2, 2, 2, 2,
    3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3,
];

/// Orient a square for a perspective and king placement: Black sees the
/// board flipped, and a king on files e-h mirrors everything.
#[inline]
fn orient(perspective: Color, king: Square, sq: Square) -> usize {
    let mut index = match perspective {
        Color::White => sq.index(),
        Color::Black => sq.flip_rank().index(),
    };
    if king.file().index() >= 4 {
        index ^= 7;
    }
    index
}

/// King bucket (including the mirror in the orientation) for a
/// perspective whose king stands on `king`.
#[inline]
pub fn king_bucket(perspective: Color, king: Square) -> usize {
    let oriented = match perspective {
        Color::White => king,
        Color::Black => king.flip_rank(),
    };
    let mirrored = if oriented.file().index() >= 4 {
        oriented.flip_file()
    } else {
        oriented
    };
    KING_BUCKET_MAP[mirrored.index()]
}

/// Input index of one piece for one perspective.
#[inline]
pub fn feature_index(
    perspective: Color,
    king: Square,
    piece_color: Color,
    kind: PieceKind,
    sq: Square,
) -> usize {
    let bucket = king_bucket(perspective, king);
    let side = if piece_color == perspective { 0 } else { 384 };
    bucket * FEATURES_PER_BUCKET + side + kind.index() * 64 + orient(perspective, king, sq)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(name: &str) -> Square {
        Square::from_algebraic(name).unwrap()
    }

    #[test]
    fn indices_stay_in_range() {
        for perspective in Color::ALL {
            for king in [sq("a1"), sq("e1"), sq("h8"), sq("d5")] {
                for color in Color::ALL {
                    for kind in PieceKind::ALL {
                        for square in Square::all() {
                            let idx = feature_index(perspective, king, color, kind, square);
                            assert!(idx < INPUTS);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn perspectives_mirror_each_other() {
        // A white pawn on e4 seen by White equals a black pawn on e5 seen
        // by Black, kings mirrored.
        let white_view = feature_index(Color::White, sq("c1"), Color::White, PieceKind::Pawn, sq("e4"));
        let black_view = feature_index(Color::Black, sq("c8"), Color::Black, PieceKind::Pawn, sq("e5"));
        assert_eq!(white_view, black_view);
    }

    #[test]
    fn king_wing_mirrors_bucket() {
        assert_eq!(king_bucket(Color::White, sq("a1")), king_bucket(Color::White, sq("h1")));
        assert_eq!(king_bucket(Color::White, sq("c1")), king_bucket(Color::White, sq("f1")));
        assert_eq!(king_bucket(Color::Black, sq("e8")), king_bucket(Color::White, sq("e1")));
    }

    #[test]
    fn buckets_separate_board_regions() {
        assert_ne!(king_bucket(Color::White, sq("a1")), king_bucket(Color::White, sq("c1")));
        assert_ne!(king_bucket(Color::White, sq("c1")), king_bucket(Color::White, sq("c2")));
        assert_ne!(king_bucket(Color::White, sq("c2")), king_bucket(Color::White, sq("e5")));
    }
}
