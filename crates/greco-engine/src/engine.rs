//! The engine facade: configuration, game state, and search dispatch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use greco_core::{Position, legal_moves};

use crate::eval::Evaluator;
use crate::eval::material::MaterialEvaluator;
use crate::search::control::SearchControl;
use crate::search::heuristics::OrderingState;
use crate::search::pool::ThreadPool;
use crate::search::repetition::GameHistory;
use crate::search::{SearchLimits, SearchProgress, SearchResult};

/// Errors surfaced by engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The transposition table could not be reshaped; the previous table
    /// is still in place.
    #[error(transparent)]
    TtAllocation(#[from] crate::search::tt::TtAllocationError),
}

/// Remote control for an in-flight search: raises the cooperative stop
/// flag from another thread.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Request that the current search wind down and report.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// The chess engine core.
///
/// Owns the transposition table (through its thread pool), per-thread
/// move-ordering state, the game-record repetition list, and the
/// evaluation oracle. Everything the caller drives goes through this
/// type; the engine itself never touches stdin or stdout.
pub struct Engine {
    pool: ThreadPool,
    orderings: Vec<OrderingState>,
    game_history: GameHistory,
    evaluator: Arc<dyn Evaluator>,
    stop: Arc<AtomicBool>,
}

impl Engine {
    /// Default engine: 16 MB table, one thread, material evaluation.
    pub fn new() -> Engine {
        Engine {
            pool: ThreadPool::new(16),
            orderings: vec![OrderingState::new()],
            game_history: GameHistory::new(),
            evaluator: Arc::new(MaterialEvaluator),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reshape the transposition table and the worker pool.
    ///
    /// On allocation failure the old table stays in service and the error
    /// is returned.
    pub fn configure(&mut self, hash_mb: usize, threads: usize) -> Result<(), EngineError> {
        if let Err(error) = self.pool.resize_tt(hash_mb) {
            warn!(%error, "transposition table resize failed, keeping old table");
            return Err(error.into());
        }
        let threads = threads.max(1);
        self.pool.set_num_threads(threads);
        self.orderings.resize_with(threads, OrderingState::new);
        info!(hash_mb, threads, "engine configured");
        Ok(())
    }

    /// Install the evaluation oracle. The default is material + piece
    /// square tables; callers with a network hand in an NNUE oracle.
    pub fn set_evaluator(&mut self, evaluator: Arc<dyn Evaluator>) {
        self.evaluator = evaluator;
    }

    /// Forget everything learned: table, histories, game record.
    pub fn new_game(&mut self) {
        self.pool.clear_tt();
        for ordering in &mut self.orderings {
            ordering.clear();
        }
        self.game_history.clear();
    }

    /// Append a played position to the repetition list.
    pub fn record_history_position(&mut self, pos: &Position) {
        self.game_history.push(pos);
    }

    /// A handle that can stop a search started after this call, from any
    /// thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    /// Raise the cooperative stop flag.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Search a position under the given limits, streaming progress events
    /// into `on_progress`.
    ///
    /// A malformed position or one without legal moves yields an empty
    /// result synchronously. Otherwise the call blocks until the search
    /// finishes or is stopped, and returns the deepest completed result.
    pub fn search(
        &mut self,
        pos: &Position,
        limits: &SearchLimits,
        mut on_progress: impl FnMut(&SearchProgress),
    ) -> SearchResult {
        if let Err(error) = pos.validate() {
            warn!(%error, "refusing to search invalid position");
            return SearchResult::default();
        }
        if legal_moves(pos).is_empty() {
            debug!("no legal moves at root");
            return SearchResult::default();
        }

        // The game is already drawn where it stands; no search can change
        // that verdict.
        if pos.halfmove_clock() >= 100 || self.game_history.is_third_occurrence(pos.hash()) {
            debug!("root position is drawn by rule");
            return SearchResult {
                lines: vec![crate::search::PvLine {
                    score: 0,
                    mate_distance: None,
                    moves: Vec::new(),
                }],
                stats: Default::default(),
            };
        }

        self.stop.store(false, Ordering::Release);
        let control = SearchControl::budgeted(
            Arc::clone(&self.stop),
            limits.soft_time,
            limits.hard_time,
            limits.max_nodes,
        );

        debug!(
            depth = ?limits.max_depth,
            soft = ?limits.soft_time,
            hard = ?limits.hard_time,
            nodes = ?limits.max_nodes,
            pv_lines = limits.num_pv_lines.max(1),
            "search start"
        );

        let result = self.pool.search(
            pos,
            limits,
            &control,
            &self.game_history,
            self.evaluator.as_ref(),
            &mut self.orderings,
            &mut on_progress,
        );

        debug!(
            depth = result.stats.depth,
            nodes = result.stats.nodes,
            best = %result.best_move().map(|m| m.to_uci()).unwrap_or_else(|| "none".into()),
            "search done"
        );
        result
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("pool", &self.pool)
            .field("threads", &self.orderings.len())
            .finish()
    }
}
