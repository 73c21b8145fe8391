//! Score semantics: centipawn values, mate encoding, and the
//! transposition-table score transform.

/// Search scores are plain centipawn integers from the side to move's
/// perspective. Sixteen bits suffice for storage; the search works in i32.
pub type Score = i32;

/// Larger than any reachable score; used as the open search bound.
pub const INF: Score = 32_767;

/// Mate score base: mate delivered this ply scores `MATE`, mate in `d` plies
/// scores `MATE - d`.
pub const MATE: Score = 32_000;

/// Tablebase win base, below every mate score.
pub const TB_WIN: Score = 31_000;

/// Heuristically certain win threshold (e.g. overwhelming material).
pub const KNOWN_WIN: Score = 20_000;

/// Draw score.
pub const DRAW: Score = 0;

/// Deepest ply the search will visit.
pub const MAX_PLY: usize = 128;

/// Scores at or above this magnitude encode a mate distance.
pub const MATE_IN_MAX_PLY: Score = MATE - MAX_PLY as Score;

/// Mate-for score at the given height from root.
#[inline]
pub const fn mated_in(height: usize) -> Score {
    -MATE + height as Score
}

/// `true` if the score encodes a forced mate for either side.
#[inline]
pub const fn is_mate_score(score: Score) -> bool {
    score.abs() >= MATE_IN_MAX_PLY && score.abs() <= MATE
}

/// Full-move distance to mate encoded in `score`, negative when the side to
/// move is being mated. `None` for non-mate scores.
pub fn mate_distance(score: Score) -> Option<i32> {
    if !is_mate_score(score) {
        return None;
    }
    let plies = MATE - score.abs();
    let moves = (plies + 1) / 2;
    Some(if score > 0 { moves } else { -moves })
}

/// Convert a search score to transposition-table form.
///
/// Mate scores are stored relative to the entry's own position instead of
/// the search root, so an entry written at one height reads correctly at
/// another.
#[inline]
pub const fn score_to_tt(score: Score, height: usize) -> Score {
    if score >= MATE_IN_MAX_PLY {
        score + height as Score
    } else if score <= -MATE_IN_MAX_PLY {
        score - height as Score
    } else {
        score
    }
}

/// Convert a transposition-table score back to search form.
///
/// The inverse of [`score_to_tt`], with one refinement: when the mate the
/// entry promises cannot be delivered before the fifty-move counter expires
/// (`fifty + distance >= 100`), the score is clamped just below the mate
/// range so the search will not steer into a drawn "mate".
#[inline]
pub const fn score_from_tt(score: Score, height: usize, fifty: u16) -> Score {
    if score >= MATE_IN_MAX_PLY {
        if fifty as Score + (MATE - score) >= 100 {
            return MATE_IN_MAX_PLY - 1;
        }
        score - height as Score
    } else if score <= -MATE_IN_MAX_PLY {
        if fifty as Score + (MATE + score) >= 100 {
            return -(MATE_IN_MAX_PLY - 1);
        }
        score + height as Score
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_ordering() {
        assert!(INF > MATE);
        assert!(MATE > TB_WIN);
        assert!(TB_WIN > KNOWN_WIN);
        assert!(KNOWN_WIN > MATE_IN_MAX_PLY - MAX_PLY as Score);
    }

    #[test]
    fn tt_transform_roundtrips_at_any_height() {
        for height in [0usize, 1, 5, 17, 64, 127] {
            for score in [0, 42, -310, MATE - 3, -(MATE - 8), MATE_IN_MAX_PLY, KNOWN_WIN] {
                assert_eq!(
                    score_from_tt(score_to_tt(score, height), height, 0),
                    score,
                    "score {score} at height {height}"
                );
            }
        }
    }

    #[test]
    fn unreachable_mate_is_clamped() {
        // Mate in 40 plies stored at height 0, but 70 reversible halfmoves
        // already on the clock: 70 + 40 >= 100, so the mate is cut off.
        let stored = score_to_tt(MATE - 40, 0);
        assert_eq!(score_from_tt(stored, 0, 70), MATE_IN_MAX_PLY - 1);
        // Being mated mirrors the clamp.
        let stored = score_to_tt(-(MATE - 40), 0);
        assert_eq!(score_from_tt(stored, 0, 70), -(MATE_IN_MAX_PLY - 1));
        // With a fresh clock the same entry reads back untouched.
        let stored = score_to_tt(MATE - 40, 0);
        assert_eq!(score_from_tt(stored, 0, 0), MATE - 40);
    }

    #[test]
    fn mate_distance_in_moves() {
        assert_eq!(mate_distance(MATE - 1), Some(1));
        assert_eq!(mate_distance(MATE - 3), Some(2));
        assert_eq!(mate_distance(MATE - 4), Some(2));
        assert_eq!(mate_distance(-(MATE - 2)), Some(-1));
        assert_eq!(mate_distance(150), None);
        assert_eq!(mate_distance(0), None);
    }

    #[test]
    fn mated_in_is_symmetric() {
        assert_eq!(mated_in(0), -MATE);
        assert_eq!(-mated_in(3), MATE - 3);
        assert!(is_mate_score(mated_in(7)));
    }
}
