//! The recursive search: principal-variation negamax with transposition
//! table integration, whole-node pruning, late-move reductions, and a
//! capture-only quiescence extension.

use greco_core::attacks::between;
use greco_core::{Move, PieceKind, Position};

use crate::eval::{EvalStack, Evaluator};
use crate::score::{DRAW, INF, MATE_IN_MAX_PLY, MAX_PLY, Score, mated_in};
use crate::search::control::SearchControl;
use crate::search::heuristics::{ContKey, OrderingState};
use crate::search::picker::{MovePicker, PickerMode};
use crate::search::repetition::{GameHistory, cuckoo_move};
use crate::search::see::piece_value;
use crate::search::tt::{Bound, TranspositionTable};

/// Margin per ply of depth for reverse futility pruning.
const REVERSE_FUTILITY_MARGIN: Score = 80;
/// Reverse futility applies up to this depth.
const REVERSE_FUTILITY_DEPTH: i32 = 6;

/// Razoring offsets: eval must sit this far under alpha.
const RAZOR_MARGIN: Score = 150;
const RAZOR_BIAS: Score = 1_000;
/// Razoring applies up to this depth.
const RAZOR_DEPTH: i32 = 4;

/// Null-move pruning starts at this depth.
const NULL_MOVE_DEPTH: i32 = 3;
/// Null-move results are verified from this depth up.
const NULL_MOVE_VERIFY_DEPTH: i32 = 10;

/// Late-move pruning applies up to this depth.
const LMP_DEPTH: i32 = 4;

/// Quiescence gives up on captures this far under alpha even with the
/// largest possible gain.
const DELTA_MARGIN: Score = 200;

/// Per-ply search state, held in a contiguous array so ancestors at small
/// offsets can be inspected for repetition detection and continuation
/// history.
pub(crate) struct NodeState {
    /// Position hash at this ply.
    pub hash: u64,
    /// Cached static evaluation.
    pub static_eval: Score,
    /// Move that led into this ply, `NONE` at the root and after null moves.
    pub prev_move: Move,
    /// Mover and destination of `prev_move`, for continuation lookups.
    pub cont_key: Option<ContKey>,
    /// `prev_move` was a capture.
    pub prev_was_capture: bool,
    /// `prev_move` was a pawn move.
    pub prev_was_pawn: bool,
    /// This ply was reached by passing the turn.
    pub is_null: bool,
    /// Principal variation collected below this node.
    pub pv: [Move; MAX_PLY],
    pub pv_len: usize,
}

impl NodeState {
    fn empty() -> NodeState {
        NodeState {
            hash: 0,
            static_eval: 0,
            prev_move: Move::NONE,
            cont_key: None,
            prev_was_capture: false,
            prev_was_pawn: false,
            is_null: false,
            pv: [Move::NONE; MAX_PLY],
            pv_len: 0,
        }
    }
}

/// Everything one search thread owns or borrows while searching.
pub(crate) struct SearchContext<'a> {
    pub tt: &'a TranspositionTable,
    pub control: &'a SearchControl,
    pub evaluator: &'a dyn Evaluator,
    pub game_history: &'a GameHistory,
    pub ordering: &'a mut OrderingState,
    pub eval_stack: EvalStack,
    pub stack: Vec<NodeState>,
    pub nodes: u64,
    pub seldepth: usize,
    /// Previous iteration's principal variation, fed to the picker while
    /// the current line still follows it.
    pub prev_pv: Vec<Move>,
    pub on_prev_pv: bool,
    /// Root moves excluded by earlier multi-PV passes.
    pub root_exclude: Vec<Move>,
    /// When set, the root searches only these moves.
    pub root_allow: Option<Vec<Move>>,
}

impl<'a> SearchContext<'a> {
    pub fn new(
        tt: &'a TranspositionTable,
        control: &'a SearchControl,
        evaluator: &'a dyn Evaluator,
        game_history: &'a GameHistory,
        ordering: &'a mut OrderingState,
    ) -> SearchContext<'a> {
        SearchContext {
            tt,
            control,
            evaluator,
            game_history,
            ordering,
            eval_stack: EvalStack::new(),
            stack: (0..MAX_PLY + 8).map(|_| NodeState::empty()).collect(),
            nodes: 0,
            seldepth: 0,
            prev_pv: Vec::new(),
            on_prev_pv: false,
            root_exclude: Vec::new(),
            root_allow: None,
        }
    }

    /// Prepare the bottom of the stack for a root search.
    pub fn setup_root(&mut self, root: &Position) {
        let node = &mut self.stack[0];
        node.hash = root.hash();
        node.prev_move = Move::NONE;
        node.cont_key = None;
        node.prev_was_capture = false;
        node.prev_was_pawn = false;
        node.is_null = false;
        node.pv_len = 0;
        self.evaluator.reset(&mut self.eval_stack, root);
    }

    /// The root move is admissible under the multi-PV and restriction
    /// filters.
    fn root_move_allowed(&self, mv: Move) -> bool {
        if self.root_exclude.contains(&mv) {
            return false;
        }
        match &self.root_allow {
            Some(allowed) => allowed.contains(&mv),
            None => true,
        }
    }

    /// Fill the child node state for a descent via `mv`.
    fn enter_child(&mut self, ply: usize, parent: &Position, child: &Position, mv: Move) {
        let mover = parent
            .piece_at(mv.from())
            .expect("searched move has a mover")
            .kind;
        let node = &mut self.stack[ply + 1];
        node.hash = child.hash();
        node.prev_move = mv;
        node.cont_key = Some(ContKey { piece: mover, to: mv.to() });
        node.prev_was_capture = parent.captured_kind(mv).is_some();
        node.prev_was_pawn = mover == PieceKind::Pawn;
        node.is_null = false;
        node.pv_len = 0;
        self.eval_stack.record_move(ply + 1, parent, mv);
    }

    /// Fill the child node state for a null-move descent.
    fn enter_null_child(&mut self, ply: usize, child: &Position) {
        let node = &mut self.stack[ply + 1];
        node.hash = child.hash();
        node.prev_move = Move::NONE;
        node.cont_key = None;
        node.prev_was_capture = false;
        node.prev_was_pawn = false;
        node.is_null = true;
        node.pv_len = 0;
        self.eval_stack.record_null(ply + 1);
    }

    fn static_eval(&mut self, ply: usize, pos: &Position) -> Score {
        self.evaluator.evaluate(&mut self.eval_stack, ply, pos)
    }
}

/// Copy the child PV under a newly best move into this node.
fn update_pv(stack: &mut [NodeState], ply: usize, mv: Move) {
    let (head, tail) = stack.split_at_mut(ply + 1);
    let node = &mut head[ply];
    let child = &tail[0];
    node.pv[0] = mv;
    let len = child.pv_len.min(MAX_PLY - 1);
    node.pv[1..=len].copy_from_slice(&child.pv[..len]);
    node.pv_len = len + 1;
}

/// Continuation-history keys of the ancestors at relative plies
/// 0, -1, -3, -5. The walk stops at the root or at a null move.
fn cont_ancestors(stack: &[NodeState], ply: usize) -> [Option<ContKey>; 4] {
    let mut keys = [None; 4];
    for (slot, offset) in [0usize, 1, 3, 5].into_iter().enumerate() {
        if offset > ply {
            break;
        }
        let node = &stack[ply - offset];
        if node.is_null {
            break;
        }
        keys[slot] = node.cont_key;
    }
    keys
}

/// Threefold detection against the search stack and the game record.
///
/// Within the search a single recurrence already scores as a draw; across
/// the game record the position must have stood twice before.
fn is_repetition(ctx: &SearchContext, pos: &Position, ply: usize) -> bool {
    let hash = pos.hash();
    let mut idx = ply;
    let mut steps = 0usize;
    loop {
        let node = &ctx.stack[idx];
        // An irreversible move seals everything behind it.
        if node.prev_move.is_some() && (node.prev_was_capture || node.prev_was_pawn) {
            return false;
        }
        if idx == 0 {
            break;
        }
        idx -= 1;
        steps += 1;
        if steps % 2 == 0 && ctx.stack[idx].hash == hash {
            return true;
        }
    }
    ctx.game_history.is_third_occurrence(hash)
}

/// Can the side to move slide back into a position already seen on this
/// search path? Detected in O(ply) through the cuckoo table of reversible
/// moves.
fn upcoming_repetition(ctx: &SearchContext, pos: &Position, ply: usize) -> bool {
    if pos.halfmove_clock() < 3 || ply < 3 {
        return false;
    }
    let node = &ctx.stack[ply];
    if node.is_null || node.prev_was_capture || node.prev_was_pawn {
        return false;
    }

    let original = pos.hash();
    let mut curr = ply - 1;
    loop {
        if curr < 2 {
            break;
        }
        let stepped = &ctx.stack[curr];
        let parent = &ctx.stack[curr - 1];
        if stepped.is_null || parent.is_null {
            break;
        }
        if stepped.prev_was_capture || stepped.prev_was_pawn {
            break;
        }
        if parent.prev_was_capture || parent.prev_was_pawn {
            break;
        }
        curr -= 2;

        let move_key = original ^ ctx.stack[curr].hash;
        if let Some(mv) = cuckoo_move(move_key) {
            // The connecting move must have a clear path and involve a
            // piece of the side to move.
            if (between(mv.from(), mv.to()) & pos.occupied()).is_empty() {
                let ours = pos.occupied_by(pos.side_to_move());
                if ours.has(mv.from()) || ours.has(mv.to()) {
                    return true;
                }
            }
        }
    }
    false
}

/// Late-move pruning threshold: quiets beyond this move count are skipped
/// at shallow depth.
#[inline]
fn lmp_threshold(depth: i32) -> usize {
    (3 + depth * depth) as usize
}

/// The main search.
pub(crate) fn negamax(
    ctx: &mut SearchContext,
    pos: &Position,
    depth: i32,
    ply: usize,
    mut alpha: Score,
    mut beta: Score,
    is_pv: bool,
) -> Score {
    debug_assert!(alpha < beta);
    let root = ply == 0;

    ctx.nodes += 1;
    if is_pv {
        ctx.stack[ply].pv_len = 0;
        ctx.seldepth = ctx.seldepth.max(ply);
    }

    if ctx.control.should_stop(ctx.nodes) {
        return 0;
    }

    if !root {
        if pos.halfmove_clock() >= 100 || is_repetition(ctx, pos, ply) {
            return DRAW;
        }
        // A reachable cycle bounds the node's value from below at draw.
        if upcoming_repetition(ctx, pos, ply) {
            if DRAW >= beta {
                return DRAW;
            }
            alpha = alpha.max(DRAW);
        }

        if ply >= MAX_PLY - 1 {
            return ctx.static_eval(ply, pos);
        }

        // Mate-distance pruning: neither a faster mate for us nor a slower
        // one for the opponent can change the outcome of this node.
        alpha = alpha.max(mated_in(ply));
        beta = beta.min(-mated_in(ply + 1));
        if alpha >= beta {
            return alpha;
        }
    }

    let in_check = pos.in_check();
    let alpha_orig = alpha;

    let tt_entry = ctx.tt.probe(pos.hash(), ply, pos.halfmove_clock());
    let tt_move = tt_entry.map_or(Move::NONE, |e| e.mv);
    if let Some(entry) = tt_entry {
        if !is_pv && entry.depth >= depth {
            match entry.bound {
                Bound::Exact => return entry.score,
                Bound::Lower if entry.score >= beta => return entry.score,
                Bound::Upper if entry.score <= alpha => return entry.score,
                _ => {}
            }
        }
    }

    let static_eval = if in_check {
        -INF
    } else if let Some(entry) = tt_entry {
        entry.static_eval
    } else {
        ctx.static_eval(ply, pos)
    };
    ctx.stack[ply].static_eval = static_eval;

    if !root && !is_pv && !in_check {
        // Reverse futility: far enough above beta that even a margin per
        // ply of depth cannot bring it back down.
        if depth <= REVERSE_FUTILITY_DEPTH
            && depth > 0
            && beta.abs() < MATE_IN_MAX_PLY
            && static_eval - REVERSE_FUTILITY_MARGIN * depth >= beta
        {
            return static_eval;
        }

        // Razoring: hopelessly below alpha at shallow depth.
        if depth <= RAZOR_DEPTH
            && depth > 0
            && alpha.abs() < MATE_IN_MAX_PLY
            && static_eval + RAZOR_MARGIN * depth + RAZOR_BIAS <= alpha
        {
            return static_eval;
        }

        // Null move: hand over the turn; if the opponent still cannot reach
        // beta, a real move will not either. Unsound in zugzwang, so pawn-
        // only endings are excluded and deep results get verified.
        if depth >= NULL_MOVE_DEPTH
            && static_eval >= beta
            && !ctx.stack[ply].is_null
            && pos.has_non_pawn_material(pos.side_to_move())
        {
            let reduction = 3 + depth / 4;
            let child = pos.make_null_move();
            ctx.enter_null_child(ply, &child);
            let score = -negamax(ctx, &child, depth - 1 - reduction, ply + 1, -beta, -beta + 1, false);
            ctx.eval_stack.release(ply + 1);

            if score >= beta {
                if depth < NULL_MOVE_VERIFY_DEPTH {
                    return beta;
                }
                // Near the horizon of deep searches, demand a reduced
                // normal search confirm the fail-high.
                let verified = negamax(ctx, pos, depth - 1 - reduction, ply, beta - 1, beta, false);
                if verified >= beta {
                    return beta;
                }
            }
        }
    }

    if depth <= 0 {
        return qsearch(ctx, pos, ply, alpha, beta, is_pv);
    }

    let prev_key = ctx.stack[ply].cont_key;
    let ancestors = cont_ancestors(&ctx.stack, ply);
    let pv_move = if is_pv && ctx.on_prev_pv && ply < ctx.prev_pv.len() {
        ctx.prev_pv[ply]
    } else {
        Move::NONE
    };
    let parent_on_prev_pv = ctx.on_prev_pv;

    let mut picker = MovePicker::new(
        pos,
        ctx.ordering,
        PickerMode::All,
        ply,
        pv_move,
        tt_move,
        ancestors,
        prev_key,
    );

    let mut best_score = -INF;
    let mut best_move = Move::NONE;
    let mut move_count = 0usize;
    let mut quiets_tried: Vec<(Move, PieceKind)> = Vec::new();
    let mut captures_tried: Vec<(Move, PieceKind, PieceKind)> = Vec::new();

    while let Some(mv) = picker.next(ctx.ordering) {
        if root && !ctx.root_move_allowed(mv) {
            continue;
        }

        let is_quiet = !pos.is_tactical(mv);
        let mover = pos
            .piece_at(mv.from())
            .expect("picked move has a mover")
            .kind;

        // Late-move pruning: at shallow depth, quiet moves this far down
        // the ordering almost never rescue the node.
        if !root
            && !is_pv
            && !in_check
            && is_quiet
            && depth <= LMP_DEPTH
            && move_count >= lmp_threshold(depth)
            && alpha > -MATE_IN_MAX_PLY
        {
            continue;
        }

        let child = pos.make_move(mv);
        ctx.tt.prefetch(child.hash());
        move_count += 1;

        let gives_check = child.in_check();
        let extension = i32::from(gives_check);
        let new_depth = depth - 1 + extension;

        ctx.enter_child(ply, pos, &child, mv);
        ctx.on_prev_pv = parent_on_prev_pv && mv == pv_move;

        let mut score;
        if move_count == 1 {
            score = -negamax(ctx, &child, new_depth, ply + 1, -beta, -alpha, is_pv);
        } else {
            // Late-move reduction for quiet moves far down the ordering.
            let mut reduction = 0;
            if depth >= 3 && is_quiet && !is_pv && !in_check && !gives_check {
                let killers = ctx.ordering.killers(ply);
                if mv != killers[0] && mv != killers[1] {
                    reduction = lmr_reduction(move_count, depth);
                    // Strong history counters earn the move a longer look.
                    reduction -= ctx.ordering.butterfly_score(pos.side_to_move(), mv) / 8192;
                    reduction = reduction.clamp(0, new_depth - 1);
                }
            }

            score = -negamax(ctx, &child, new_depth - reduction, ply + 1, -alpha - 1, -alpha, false);
            if score > alpha && reduction > 0 {
                score = -negamax(ctx, &child, new_depth, ply + 1, -alpha - 1, -alpha, false);
            }
            if score > alpha && score < beta && is_pv {
                score = -negamax(ctx, &child, new_depth, ply + 1, -beta, -alpha, true);
            }
        }

        ctx.eval_stack.release(ply + 1);
        ctx.on_prev_pv = parent_on_prev_pv;

        if ctx.control.should_stop(ctx.nodes) {
            return best_score.max(-INF + 1);
        }

        if is_quiet {
            quiets_tried.push((mv, mover));
        } else if let Some(captured) = pos.captured_kind(mv) {
            captures_tried.push((mv, mover, captured));
        }

        if score > best_score {
            best_score = score;
            best_move = mv;

            if score > alpha {
                alpha = score;
                if is_pv {
                    update_pv(&mut ctx.stack, ply, mv);
                }

                if alpha >= beta {
                    let us = pos.side_to_move();
                    if is_quiet {
                        ctx.ordering.store_killer(ply, mv);
                        if let Some(key) = prev_key {
                            ctx.ordering.store_counter(us, key, mv);
                        }
                        ctx.ordering
                            .update_quiet_stats(us, depth, &ancestors, &quiets_tried, mv);
                    }
                    ctx.ordering
                        .update_capture_stats(us, depth, &captures_tried, mv);
                    break;
                }
            }
        }
    }

    if move_count == 0 {
        // With a root filter active the position is not terminal; the
        // filter simply left nothing to search.
        if root && (ctx.root_allow.is_some() || !ctx.root_exclude.is_empty()) {
            return -INF;
        }
        return if in_check { mated_in(ply) } else { DRAW };
    }

    let bound = if best_score >= beta {
        Bound::Lower
    } else if best_score > alpha_orig {
        Bound::Exact
    } else {
        Bound::Upper
    };
    ctx.tt
        .store(pos.hash(), depth, best_score, static_eval, best_move, bound, ply);

    best_score
}

/// Horizon extension: only tactical moves (all evasions when in check),
/// standing pat on the static evaluation otherwise.
pub(crate) fn qsearch(
    ctx: &mut SearchContext,
    pos: &Position,
    ply: usize,
    mut alpha: Score,
    beta: Score,
    is_pv: bool,
) -> Score {
    debug_assert!(alpha < beta);

    ctx.nodes += 1;
    if is_pv {
        ctx.stack[ply].pv_len = 0;
        ctx.seldepth = ctx.seldepth.max(ply);
    }

    if ctx.control.should_stop(ctx.nodes) {
        return 0;
    }

    if pos.halfmove_clock() >= 100 || is_repetition(ctx, pos, ply) {
        return DRAW;
    }
    if ply >= MAX_PLY - 1 {
        return ctx.static_eval(ply, pos);
    }

    let in_check = pos.in_check();
    let alpha_orig = alpha;

    let tt_entry = ctx.tt.probe(pos.hash(), ply, pos.halfmove_clock());
    let tt_move = tt_entry.map_or(Move::NONE, |e| e.mv);
    if let Some(entry) = tt_entry {
        if !is_pv {
            match entry.bound {
                Bound::Exact => return entry.score,
                Bound::Lower if entry.score >= beta => return entry.score,
                Bound::Upper if entry.score <= alpha => return entry.score,
                _ => {}
            }
        }
    }

    let static_eval = if in_check {
        -INF
    } else if let Some(entry) = tt_entry {
        entry.static_eval
    } else {
        ctx.static_eval(ply, pos)
    };
    ctx.stack[ply].static_eval = static_eval;

    let mut best_score = -INF;
    if !in_check {
        // Stand pat: the side to move may decline every capture.
        if static_eval >= beta {
            return static_eval;
        }
        best_score = static_eval;
        alpha = alpha.max(static_eval);

        // Delta pruning: even the largest possible gain cannot lift this
        // node to alpha.
        if static_eval + piece_value(PieceKind::Queen) + DELTA_MARGIN <= alpha {
            return static_eval;
        }
    }

    let prev_key = ctx.stack[ply].cont_key;
    let mut picker = if in_check {
        MovePicker::new(
            pos,
            ctx.ordering,
            PickerMode::All,
            ply,
            Move::NONE,
            tt_move,
            cont_ancestors(&ctx.stack, ply),
            prev_key,
        )
    } else {
        MovePicker::new_tactical(pos, tt_move, prev_key)
    };

    let mut best_move = Move::NONE;
    let mut move_count = 0usize;

    while let Some(mv) = picker.next(ctx.ordering) {
        // Per-capture delta pruning against the victim's value.
        if !in_check {
            if let Some(victim) = pos.captured_kind(mv) {
                if static_eval + piece_value(victim) + DELTA_MARGIN <= alpha {
                    continue;
                }
            }
        }

        let child = pos.make_move(mv);
        move_count += 1;
        ctx.enter_child(ply, pos, &child, mv);

        let score = if move_count == 1 {
            -qsearch(ctx, &child, ply + 1, -beta, -alpha, is_pv)
        } else {
            let mut score = -qsearch(ctx, &child, ply + 1, -alpha - 1, -alpha, false);
            if score > alpha && score < beta && is_pv {
                score = -qsearch(ctx, &child, ply + 1, -beta, -alpha, is_pv);
            }
            score
        };

        ctx.eval_stack.release(ply + 1);

        if score > best_score {
            best_score = score;
            best_move = mv;
            if score > alpha {
                alpha = score;
                if is_pv {
                    update_pv(&mut ctx.stack, ply, mv);
                }
                if alpha >= beta {
                    break;
                }
            }
        }
    }

    if in_check && move_count == 0 {
        return mated_in(ply);
    }

    let bound = if best_score >= beta {
        Bound::Lower
    } else if best_score > alpha_orig {
        Bound::Exact
    } else {
        Bound::Upper
    };
    let depth = if in_check { 0 } else { -1 };
    ctx.tt
        .store(pos.hash(), depth, best_score, static_eval, best_move, bound, ply);

    best_score
}

/// Late-move reduction in plies, growing with the logarithms of the move
/// index and the remaining depth.
fn lmr_reduction(move_count: usize, depth: i32) -> i32 {
    use std::sync::OnceLock;
    static TABLE: OnceLock<[[i32; 64]; 64]> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        let mut table = [[0i32; 64]; 64];
        for (count, row) in table.iter_mut().enumerate().skip(1) {
            for (depth, cell) in row.iter_mut().enumerate().skip(1) {
                *cell = (0.8 + (count as f64).ln() * (depth as f64).ln() / 2.4) as i32;
            }
        }
        table
    });
    table[move_count.min(63)][depth.clamp(0, 63) as usize]
}
