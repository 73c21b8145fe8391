//! Staged move picker.
//!
//! Moves are produced lazily, phase by phase: hash moves first, then
//! winning captures, killers, the counter move, quiets by history score,
//! and finally losing captures. Each phase deduplicates against everything
//! emitted earlier, so the full sequence is a permutation of the legal
//! moves of the position.

use greco_core::attacks::{bishop_attacks, knight_attacks, rook_attacks};
use greco_core::{
    Bitboard, Color, GenClass, Move, MoveList, PieceKind, Position, Square, filter_legal, generate,
};

use crate::search::heuristics::{ContKey, OrderingState};
use crate::search::see::{piece_value, see};

/// Ordering bonus for queen promotions, above every capture.
const PROMOTION_SCORE: i32 = 1 << 20;

/// Bonus for capturing the piece that just moved.
const RECAPTURE_BONUS: i32 = 1 << 16;

/// Pawn-push bonus by relative destination rank.
const PAWN_PUSH_BONUS: [i32; 8] = [0, 0, 0, 0, 500, 2000, 8000, 0];

/// Emission phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    PvMove,
    TtMove,
    GenCaptures,
    GoodCaptures,
    Killer1,
    Killer2,
    Counter,
    GenQuiets,
    Quiets,
    BadCaptures,
    End,
}

/// Move buffer with selection-sort extraction of the best-scored entry.
struct ScoredList {
    moves: [Move; 256],
    scores: [i32; 256],
    len: usize,
}

impl ScoredList {
    fn new() -> ScoredList {
        ScoredList {
            moves: [Move::NONE; 256],
            scores: [0; 256],
            len: 0,
        }
    }

    #[inline]
    fn push(&mut self, mv: Move, score: i32) {
        debug_assert!(self.len < 256);
        self.moves[self.len] = mv;
        self.scores[self.len] = score;
        self.len += 1;
    }

    /// Remove and return the highest-scored move.
    fn pick_best(&mut self) -> Option<Move> {
        if self.len == 0 {
            return None;
        }
        let mut best = 0;
        for i in 1..self.len {
            if self.scores[i] > self.scores[best] {
                best = i;
            }
        }
        let mv = self.moves[best];
        self.len -= 1;
        self.moves[best] = self.moves[self.len];
        self.scores[best] = self.scores[self.len];
        Some(mv)
    }
}

/// What the picker should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerMode {
    /// Every legal move.
    All,
    /// Stop after the winning captures (quiescence).
    TacticalOnly,
}

/// The staged move picker. One instance serves one node.
pub struct MovePicker<'a> {
    pos: &'a Position,
    mode: PickerMode,
    stage: Stage,
    pv_move: Move,
    tt_move: Move,
    killers: [Move; 2],
    killer_emitted: [bool; 2],
    counter: Move,
    counter_emitted: bool,
    /// Continuation keys at relative plies 0, -1, -3, -5 for quiet scoring.
    ancestors: [Option<ContKey>; 4],
    /// Destination of the opponent's previous move, for the recapture bonus.
    recapture_square: Option<Square>,
    good_captures: ScoredList,
    bad_captures: ScoredList,
    quiets: ScoredList,
}

impl<'a> MovePicker<'a> {
    /// Picker for a main-search node.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pos: &'a Position,
        ordering: &OrderingState,
        mode: PickerMode,
        ply: usize,
        pv_move: Move,
        tt_move: Move,
        ancestors: [Option<ContKey>; 4],
        previous: Option<ContKey>,
    ) -> MovePicker<'a> {
        let counter = previous
            .map(|key| ordering.counter(pos.side_to_move(), key))
            .unwrap_or(Move::NONE);
        MovePicker {
            pos,
            mode,
            stage: Stage::PvMove,
            pv_move,
            tt_move,
            killers: ordering.killers(ply),
            killer_emitted: [false; 2],
            counter,
            counter_emitted: false,
            ancestors,
            recapture_square: previous.map(|key| key.to),
            good_captures: ScoredList::new(),
            bad_captures: ScoredList::new(),
            quiets: ScoredList::new(),
        }
    }

    /// Picker for quiescence: no killers, no counter, tactical moves only.
    pub fn new_tactical(
        pos: &'a Position,
        tt_move: Move,
        previous: Option<ContKey>,
    ) -> MovePicker<'a> {
        MovePicker {
            pos,
            mode: PickerMode::TacticalOnly,
            stage: Stage::PvMove,
            pv_move: Move::NONE,
            tt_move,
            killers: [Move::NONE; 2],
            killer_emitted: [false; 2],
            counter: Move::NONE,
            counter_emitted: false,
            ancestors: [None; 4],
            recapture_square: previous.map(|key| key.to),
            good_captures: ScoredList::new(),
            bad_captures: ScoredList::new(),
            quiets: ScoredList::new(),
        }
    }

    /// `true` if `mv` was already emitted by an earlier phase.
    fn already_emitted(&self, mv: Move) -> bool {
        mv == self.pv_move
            || mv == self.tt_move
            || (self.killer_emitted[0] && mv == self.killers[0])
            || (self.killer_emitted[1] && mv == self.killers[1])
            || (self.counter_emitted && mv == self.counter)
    }

    /// A hash move is emitted only if it is legal here (a colliding entry
    /// can carry a move from a different position) and fits the mode.
    fn hash_move_ok(&self, mv: Move) -> bool {
        if mv.is_none() {
            return false;
        }
        if self.mode == PickerMode::TacticalOnly && !self.pos.is_tactical(mv) {
            return false;
        }
        self.pos.is_legal(mv)
    }

    /// A killer/counter candidate must be a quiet legal move not yet seen.
    fn quiet_candidate_ok(&self, mv: Move) -> bool {
        mv.is_some()
            && !self.already_emitted(mv)
            && !self.pos.is_tactical(mv)
            && self.pos.is_legal(mv)
    }

    /// Produce the next move, or `None` when exhausted.
    pub fn next(&mut self, ordering: &OrderingState) -> Option<Move> {
        loop {
            match self.stage {
                Stage::PvMove => {
                    self.stage = Stage::TtMove;
                    if self.hash_move_ok(self.pv_move) {
                        return Some(self.pv_move);
                    }
                    self.pv_move = Move::NONE;
                }
                Stage::TtMove => {
                    self.stage = Stage::GenCaptures;
                    if self.tt_move != self.pv_move && self.hash_move_ok(self.tt_move) {
                        return Some(self.tt_move);
                    }
                    self.tt_move = Move::NONE;
                }
                Stage::GenCaptures => {
                    self.generate_captures(ordering);
                    self.stage = Stage::GoodCaptures;
                }
                Stage::GoodCaptures => match self.good_captures.pick_best() {
                    Some(mv) => return Some(mv),
                    None => {
                        self.stage = if self.mode == PickerMode::TacticalOnly {
                            Stage::End
                        } else {
                            Stage::Killer1
                        };
                    }
                },
                Stage::Killer1 => {
                    self.stage = Stage::Killer2;
                    let mv = self.killers[0];
                    if self.quiet_candidate_ok(mv) {
                        self.killer_emitted[0] = true;
                        return Some(mv);
                    }
                }
                Stage::Killer2 => {
                    self.stage = Stage::Counter;
                    let mv = self.killers[1];
                    if self.quiet_candidate_ok(mv) {
                        self.killer_emitted[1] = true;
                        return Some(mv);
                    }
                }
                Stage::Counter => {
                    self.stage = Stage::GenQuiets;
                    let mv = self.counter;
                    if mv != self.killers[0] && mv != self.killers[1] && self.quiet_candidate_ok(mv)
                    {
                        self.counter_emitted = true;
                        return Some(mv);
                    }
                }
                Stage::GenQuiets => {
                    self.generate_quiets(ordering);
                    self.stage = Stage::Quiets;
                }
                Stage::Quiets => match self.quiets.pick_best() {
                    Some(mv) => return Some(mv),
                    None => self.stage = Stage::BadCaptures,
                },
                Stage::BadCaptures => match self.bad_captures.pick_best() {
                    Some(mv) => return Some(mv),
                    None => self.stage = Stage::End,
                },
                Stage::End => return None,
            }
        }
    }

    /// Generate, score, and partition the tactical moves.
    fn generate_captures(&mut self, ordering: &OrderingState) {
        let mut list = MoveList::new();
        generate(self.pos, GenClass::Tactical, &mut list);
        filter_legal(self.pos, &mut list);

        let us = self.pos.side_to_move();
        for &mv in list.as_slice() {
            if self.already_emitted(mv) {
                continue;
            }

            if let Some(promo) = mv.promotion_kind() {
                // Queen promotions lead everything; underpromotions are
                // rarely best and wait with the bad captures.
                if promo == PieceKind::Queen {
                    self.good_captures.push(mv, PROMOTION_SCORE);
                } else {
                    self.bad_captures.push(mv, piece_value(promo) - piece_value(PieceKind::Queen));
                }
                continue;
            }

            let attacker = self
                .pos
                .piece_at(mv.from())
                .expect("generated move has a mover")
                .kind;
            let victim = self
                .pos
                .captured_kind(mv)
                .expect("tactical non-promotion is a capture");

            let mut score = piece_value(victim) * 8 - attacker.index() as i32
                + ordering.capture_score(us, attacker, victim, mv.to()) / 16;
            if self.recapture_square == Some(mv.to()) {
                score += RECAPTURE_BONUS;
            }

            if see(self.pos, mv) >= 0 {
                self.good_captures.push(mv, score);
            } else {
                self.bad_captures.push(mv, score - RECAPTURE_BONUS * 2);
            }
        }
    }

    /// Generate and score the quiet moves.
    fn generate_quiets(&mut self, ordering: &OrderingState) {
        let mut list = MoveList::new();
        generate(self.pos, GenClass::Quiet, &mut list);
        filter_legal(self.pos, &mut list);

        let us = self.pos.side_to_move();
        let them = us.flip();
        let occupied = self.pos.occupied();

        // Threat maps: squares the opponent's pawns, minors, and rooks
        // cover. Moving a big piece off a threatened square scores up,
        // moving onto one scores down.
        let enemy_pawns = self.pos.pieces(them, PieceKind::Pawn);
        let attacked_by_pawns = match them {
            Color::White => enemy_pawns.north().east() | enemy_pawns.north().west(),
            Color::Black => enemy_pawns.south().east() | enemy_pawns.south().west(),
        };
        let mut attacked_by_minors = attacked_by_pawns;
        for sq in self.pos.pieces(them, PieceKind::Knight) {
            attacked_by_minors |= knight_attacks(sq);
        }
        for sq in self.pos.pieces(them, PieceKind::Bishop) {
            attacked_by_minors |= bishop_attacks(sq, occupied);
        }
        let mut attacked_by_rooks = attacked_by_minors;
        for sq in self.pos.pieces(them, PieceKind::Rook) {
            attacked_by_rooks |= rook_attacks(sq, occupied);
        }

        for &mv in list.as_slice() {
            if self.already_emitted(mv) {
                continue;
            }
            let piece = self
                .pos
                .piece_at(mv.from())
                .expect("generated move has a mover")
                .kind;

            let mut score = ordering.butterfly_score(us, mv);
            for key in self.ancestors.iter().flatten() {
                score += ordering.continuation_score(us, *key, piece, mv.to());
            }
            score += self.quiet_piece_bonus(
                piece,
                mv,
                us,
                attacked_by_pawns,
                attacked_by_minors,
                attacked_by_rooks,
            );

            self.quiets.push(mv, score);
        }
    }

    fn quiet_piece_bonus(
        &self,
        piece: PieceKind,
        mv: Move,
        us: Color,
        attacked_by_pawns: Bitboard,
        attacked_by_minors: Bitboard,
        attacked_by_rooks: Bitboard,
    ) -> i32 {
        let mut score = 0;
        match piece {
            PieceKind::Pawn => {
                score += PAWN_PUSH_BONUS[mv.to().rank().relative_to(us).index()];
            }
            PieceKind::Knight | PieceKind::Bishop => {
                if attacked_by_pawns.has(mv.from()) {
                    score += 4000;
                }
                if attacked_by_pawns.has(mv.to()) {
                    score -= 4000;
                }
            }
            PieceKind::Rook => {
                if attacked_by_minors.has(mv.from()) {
                    score += 8000;
                }
                if attacked_by_minors.has(mv.to()) {
                    score -= 8000;
                }
            }
            PieceKind::Queen => {
                if attacked_by_rooks.has(mv.from()) {
                    score += 12000;
                }
                if attacked_by_rooks.has(mv.to()) {
                    score -= 12000;
                }
            }
            PieceKind::King => {
                // A king move that forfeits castling rights.
                if self
                    .pos
                    .castling()
                    .intersects(greco_core::CastleRights::both(us))
                    && mv.flag() != greco_core::MoveFlag::Castle
                {
                    score -= 6000;
                }
            }
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greco_core::legal_moves;

    fn sq(name: &str) -> Square {
        Square::from_algebraic(name).unwrap()
    }

    fn collect_all(pos: &Position, ordering: &OrderingState, tt_move: Move) -> Vec<Move> {
        let mut picker = MovePicker::new(
            pos,
            ordering,
            PickerMode::All,
            0,
            Move::NONE,
            tt_move,
            [None; 4],
            None,
        );
        let mut out = Vec::new();
        while let Some(mv) = picker.next(ordering) {
            out.push(mv);
        }
        out
    }

    #[test]
    fn emits_permutation_of_legal_moves() {
        let fens = [
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3",
            "4k3/8/8/8/8/8/4q3/4K3 w - - 0 1",
        ];
        let ordering = OrderingState::new();
        for fen in fens {
            let pos: Position = fen.parse().unwrap();
            let mut picked: Vec<u16> = collect_all(&pos, &ordering, Move::NONE)
                .iter()
                .map(|m| m.raw())
                .collect();
            let mut legal: Vec<u16> = legal_moves(&pos).as_slice().iter().map(|m| m.raw()).collect();
            picked.sort_unstable();
            legal.sort_unstable();
            assert_eq!(picked, legal, "picker must be a permutation for {fen}");
        }
    }

    #[test]
    fn no_duplicates_with_tt_and_killers() {
        let pos: Position = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1"
            .parse()
            .unwrap();
        let mut ordering = OrderingState::new();
        let legal = legal_moves(&pos);
        let tt_move = legal[3];
        // Make a quiet move a killer so it is emitted by the killer stage.
        let quiet = legal
            .as_slice()
            .iter()
            .copied()
            .find(|m| !pos.is_tactical(*m))
            .unwrap();
        ordering.store_killer(0, quiet);

        let picked = collect_all(&pos, &ordering, tt_move);
        let mut raw: Vec<u16> = picked.iter().map(|m| m.raw()).collect();
        let total = raw.len();
        raw.sort_unstable();
        raw.dedup();
        assert_eq!(raw.len(), total, "no move may be emitted twice");
        assert_eq!(total, legal.len());
    }

    #[test]
    fn tt_move_comes_first() {
        let pos = Position::startpos();
        let ordering = OrderingState::new();
        let tt_move = legal_moves(&pos)[7];
        let picked = collect_all(&pos, &ordering, tt_move);
        assert_eq!(picked[0], tt_move);
    }

    #[test]
    fn illegal_tt_move_is_skipped() {
        let pos = Position::startpos();
        let ordering = OrderingState::new();
        // A move from another position: rook a1 to a5 is blocked here.
        let bogus = Move::normal(sq("a1"), sq("a5"));
        let picked = collect_all(&pos, &ordering, bogus);
        assert_eq!(picked.len(), 20);
        assert!(!picked.contains(&bogus));
    }

    #[test]
    fn winning_capture_before_quiet_moves() {
        // Queen takes an undefended pawn.
        let pos: Position = "4k3/8/8/4p3/3Q4/8/8/4K3 w - - 0 1".parse().unwrap();
        let ordering = OrderingState::new();
        let picked = collect_all(&pos, &ordering, Move::NONE);
        assert!(pos.is_tactical(picked[0]), "first pick should be the capture");
        assert_eq!(picked[0].to(), sq("e5"));
    }

    #[test]
    fn losing_capture_comes_last() {
        // Queen can grab a pawn defended by another pawn, or play quiets.
        let pos: Position = "4k3/8/3p4/2p5/8/4Q3/8/4K3 w - - 0 1".parse().unwrap();
        let ordering = OrderingState::new();
        let picked = collect_all(&pos, &ordering, Move::NONE);
        let losing = picked
            .iter()
            .position(|m| m.from() == sq("e3") && m.to() == sq("c5"))
            .unwrap();
        assert_eq!(losing, picked.len() - 1, "SEE-losing capture must be emitted last");
    }

    #[test]
    fn killer_emitted_before_other_quiets() {
        let pos = Position::startpos();
        let mut ordering = OrderingState::new();
        let killer = Move::normal(sq("h2"), sq("h3"));
        ordering.store_killer(0, killer);
        let picked = collect_all(&pos, &ordering, Move::NONE);
        // No captures at the start position, so the killer leads.
        assert_eq!(picked[0], killer);
    }

    #[test]
    fn counter_move_emitted_after_killers() {
        let pos = Position::startpos();
        let mut ordering = OrderingState::new();
        let previous = ContKey { piece: PieceKind::Knight, to: sq("c6") };
        let counter = Move::normal(sq("a2"), sq("a3"));
        let killer = Move::normal(sq("h2"), sq("h3"));
        ordering.store_counter(Color::White, previous, counter);
        ordering.store_killer(0, killer);

        let mut picker = MovePicker::new(
            &pos,
            &ordering,
            PickerMode::All,
            0,
            Move::NONE,
            Move::NONE,
            [None; 4],
            Some(previous),
        );
        assert_eq!(picker.next(&ordering), Some(killer));
        assert_eq!(picker.next(&ordering), Some(counter));
    }

    #[test]
    fn tactical_mode_stops_after_good_captures() {
        let pos: Position = "4k3/8/3p4/2p5/8/4Q3/8/4K3 w - - 0 1".parse().unwrap();
        let ordering = OrderingState::new();
        let mut picker = MovePicker::new_tactical(&pos, Move::NONE, None);
        while let Some(mv) = picker.next(&ordering) {
            assert!(pos.is_tactical(mv));
            assert!(see(&pos, mv) >= 0, "tactical mode must not emit losing captures");
        }
    }

    #[test]
    fn queen_promotion_leads() {
        let pos: Position = "8/4P3/8/8/8/2k5/8/4K3 w - - 0 1".parse().unwrap();
        let ordering = OrderingState::new();
        let picked = collect_all(&pos, &ordering, Move::NONE);
        assert_eq!(picked[0].promotion_kind(), Some(PieceKind::Queen));
    }

    #[test]
    fn history_orders_quiets() {
        let pos = Position::startpos();
        let mut ordering = OrderingState::new();
        let favored = Move::normal(sq("b1"), sq("c3"));
        ordering.update_quiet_stats(
            Color::White,
            8,
            &[None; 4],
            &[(favored, PieceKind::Knight)],
            favored,
        );
        let picked = collect_all(&pos, &ordering, Move::NONE);
        assert_eq!(picked[0], favored, "highest-history quiet should lead");
    }
}
