//! Search orchestration: iterative deepening, aspiration windows,
//! multi-PV, and result assembly.

pub mod control;
pub mod heuristics;
pub mod negamax;
pub mod picker;
pub mod repetition;
pub mod see;
pub mod tt;
pub mod pool;

use std::time::Duration;

use greco_core::{Move, Position, legal_moves};

use crate::score::{INF, MAX_PLY, Score, mate_distance};
use crate::search::negamax::{SearchContext, negamax};

/// Budgets and shape of one `search` call. Unset fields mean unlimited.
#[derive(Debug, Clone, Default)]
pub struct SearchLimits {
    /// Deepest iteration to run.
    pub max_depth: Option<u32>,
    /// Target time; checked between iterations.
    pub soft_time: Option<Duration>,
    /// Ceiling time; enforced inside the search.
    pub hard_time: Option<Duration>,
    /// Node budget across the whole search.
    pub max_nodes: Option<u64>,
    /// Number of principal variations to report (multi-PV). Zero means one.
    pub num_pv_lines: usize,
    /// When non-empty, only these root moves are searched.
    pub restricted_moves: Vec<Move>,
}

/// One principal variation of a finished search.
#[derive(Debug, Clone)]
pub struct PvLine {
    /// Score in centipawns for the side to move at the root.
    pub score: Score,
    /// Full moves to mate when `score` encodes one; negative when being
    /// mated.
    pub mate_distance: Option<i32>,
    /// The line itself, best move first.
    pub moves: Vec<Move>,
}

/// Counters for a finished search.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    pub nodes: u64,
    pub depth: u32,
    pub seldepth: u32,
    pub elapsed: Duration,
}

/// Outcome of one `search` call. `lines` is empty when the root position
/// had no legal moves.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub lines: Vec<PvLine>,
    pub stats: SearchStats,
}

impl SearchResult {
    /// The best move, if any iteration completed.
    pub fn best_move(&self) -> Option<Move> {
        self.lines.first().and_then(|line| line.moves.first()).copied()
    }
}

/// One progress report, emitted after each completed principal variation
/// of each iteration.
#[derive(Debug, Clone)]
pub struct SearchProgress<'a> {
    pub depth: u32,
    pub seldepth: u32,
    /// Which multi-PV line this reports, zero-based.
    pub pv_index: usize,
    pub score: Score,
    pub mate_distance: Option<i32>,
    pub nodes: u64,
    pub nps: u64,
    /// Transposition table fullness, per mille.
    pub hashfull: u32,
    pub elapsed: Duration,
    pub pv: &'a [Move],
}

/// Aspiration-window wrapper around the root search.
///
/// From depth 4 on, the window opens narrowly around the previous
/// iteration's score and doubles toward the failing side until the score
/// fits.
fn aspiration(ctx: &mut SearchContext, root: &Position, depth: i32, previous: Score) -> Score {
    const INITIAL_WINDOW: Score = 20;

    if depth < 4 {
        ctx.on_prev_pv = true;
        return negamax(ctx, root, depth, 0, -INF, INF, true);
    }

    let mut window = INITIAL_WINDOW;
    let mut alpha = (previous - window).max(-INF);
    let mut beta = (previous + window).min(INF);

    loop {
        ctx.on_prev_pv = true;
        let score = negamax(ctx, root, depth, 0, alpha, beta, true);
        if ctx.control.should_stop(ctx.nodes) {
            return score;
        }

        if score <= alpha {
            window *= 2;
            alpha = (score - window).max(-INF);
        } else if score >= beta {
            window *= 2;
            beta = (score + window).min(INF);
        } else {
            return score;
        }
    }
}

/// Run iterative deepening to completion on one thread.
///
/// `start_depth` staggers helper threads; the reporting thread passes 1.
/// Results always come from the deepest fully-completed iteration; a
/// partial iteration is used only when nothing ever completed.
pub(crate) fn run_iterative(
    ctx: &mut SearchContext,
    root: &Position,
    limits: &SearchLimits,
    start_depth: u32,
    mut on_progress: Option<&mut dyn FnMut(&SearchProgress)>,
) -> SearchResult {
    let max_depth = limits
        .max_depth
        .unwrap_or(MAX_PLY as u32 - 1)
        .clamp(1, MAX_PLY as u32 - 1);

    let root_moves = legal_moves(root);
    let selectable = if limits.restricted_moves.is_empty() {
        root_moves.len()
    } else {
        root_moves
            .as_slice()
            .iter()
            .filter(|m| limits.restricted_moves.contains(*m))
            .count()
    };
    let num_lines = limits.num_pv_lines.max(1).min(selectable.max(1));

    ctx.root_allow = if limits.restricted_moves.is_empty() {
        None
    } else {
        Some(limits.restricted_moves.clone())
    };

    let mut completed: Vec<PvLine> = Vec::new();
    let mut completed_depth = 0u32;
    let mut stability = crate::time::StabilityTracker::new();
    // Only the reporting thread steers the soft time limit.
    let reporting = on_progress.is_some();

    for depth in start_depth.max(1)..=max_depth {
        if depth > start_depth && ctx.control.should_stop_iterating() {
            break;
        }

        let mut this_depth: Vec<PvLine> = Vec::new();
        ctx.root_exclude.clear();
        let mut aborted = false;

        for pv_index in 0..num_lines {
            ctx.prev_pv = completed
                .get(pv_index)
                .map(|line| line.moves.clone())
                .unwrap_or_default();
            let previous_score = completed.get(pv_index).map_or(0, |line| line.score);

            ctx.setup_root(root);
            let score = aspiration(ctx, root, depth as i32, previous_score);

            if ctx.control.should_stop(ctx.nodes) {
                // Keep a partial first line only if nothing ever completed.
                if completed.is_empty() && pv_index == 0 && ctx.stack[0].pv_len > 0 {
                    this_depth.push(PvLine {
                        score,
                        mate_distance: mate_distance(score),
                        moves: ctx.stack[0].pv[..ctx.stack[0].pv_len].to_vec(),
                    });
                    completed = this_depth.clone();
                    completed_depth = depth;
                }
                aborted = true;
                break;
            }

            let pv_len = ctx.stack[0].pv_len;
            if pv_len == 0 {
                // The multi-PV filter left no searchable root move.
                break;
            }
            let moves = ctx.stack[0].pv[..pv_len].to_vec();
            ctx.root_exclude.push(moves[0]);
            this_depth.push(PvLine {
                score,
                mate_distance: mate_distance(score),
                moves,
            });

            if let Some(sink) = on_progress.as_deref_mut() {
                let elapsed = ctx.control.elapsed();
                let line = this_depth.last().expect("just pushed");
                let nps = match elapsed.as_micros() {
                    0 => 0,
                    micros => (ctx.nodes as u128 * 1_000_000 / micros) as u64,
                };
                sink(&SearchProgress {
                    depth,
                    seldepth: ctx.seldepth as u32,
                    pv_index,
                    score: line.score,
                    mate_distance: line.mate_distance,
                    nodes: ctx.nodes,
                    nps,
                    hashfull: ctx.tt.hashfull(),
                    elapsed,
                    pv: &line.moves,
                });
            }
        }

        if aborted {
            break;
        }
        if this_depth.is_empty() {
            break;
        }

        completed = this_depth;
        completed_depth = depth;

        let scale = stability.update(completed[0].moves[0]);
        if reporting {
            ctx.control.set_soft_scale(scale);
        }
    }

    SearchResult {
        lines: completed,
        stats: SearchStats {
            nodes: ctx.nodes,
            depth: completed_depth,
            seldepth: ctx.seldepth as u32,
            elapsed: ctx.control.elapsed(),
        },
    }
}
