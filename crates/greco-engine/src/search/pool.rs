//! Lazy SMP: one reporting thread plus silent helpers sharing the
//! transposition table.

use std::sync::atomic::{AtomicU64, Ordering};

use greco_core::Position;

use crate::eval::Evaluator;
use crate::search::control::SearchControl;
use crate::search::heuristics::OrderingState;
use crate::search::negamax::SearchContext;
use crate::search::repetition::GameHistory;
use crate::search::tt::{TranspositionTable, TtAllocationError};
use crate::search::{SearchLimits, SearchProgress, SearchResult, run_iterative};

/// Stack size for search threads; the recursion carries per-ply pickers.
const THREAD_STACK_BYTES: usize = 8 * 1024 * 1024;

/// Owns the shared transposition table and fans a search out over worker
/// threads.
pub struct ThreadPool {
    tt: TranspositionTable,
    num_threads: usize,
}

impl ThreadPool {
    /// Pool with a table of `hash_mb` megabytes and one thread.
    pub fn new(hash_mb: usize) -> ThreadPool {
        ThreadPool {
            tt: TranspositionTable::new(hash_mb),
            num_threads: 1,
        }
    }

    /// Number of search threads used by the next search.
    pub fn set_num_threads(&mut self, threads: usize) {
        self.num_threads = threads.max(1);
    }

    /// Reshape the transposition table; the old table survives a failed
    /// allocation.
    pub fn resize_tt(&mut self, mb: usize) -> Result<(), TtAllocationError> {
        self.tt.resize(mb)
    }

    /// Wipe the transposition table.
    pub fn clear_tt(&self) {
        self.tt.clear();
    }

    /// Run one search. Thread 0 reports progress and produces the result;
    /// helpers run the same iterative deepening at staggered depths,
    /// contributing through the shared table only.
    ///
    /// `orderings` supplies one per-thread ordering state; its length caps
    /// the number of threads actually used.
    #[allow(clippy::too_many_arguments)]
    pub fn search(
        &mut self,
        root: &Position,
        limits: &SearchLimits,
        control: &SearchControl,
        history: &GameHistory,
        evaluator: &dyn Evaluator,
        orderings: &mut [OrderingState],
        on_progress: &mut dyn FnMut(&SearchProgress),
    ) -> SearchResult {
        self.tt.new_generation();

        let threads = self.num_threads.min(orderings.len()).max(1);
        for ordering in orderings.iter_mut().take(threads) {
            ordering.new_search();
        }

        if threads == 1 {
            let mut ctx =
                SearchContext::new(&self.tt, control, evaluator, history, &mut orderings[0]);
            return run_iterative(&mut ctx, root, limits, 1, Some(on_progress));
        }

        let (main_ordering, helper_orderings) = orderings.split_at_mut(1);
        let helper_nodes: Vec<AtomicU64> =
            (1..threads).map(|_| AtomicU64::new(0)).collect();

        let tt = &self.tt;
        let mut result = SearchResult::default();

        std::thread::scope(|scope| {
            for (index, ordering) in helper_orderings.iter_mut().take(threads - 1).enumerate() {
                let counter = &helper_nodes[index];
                let builder = std::thread::Builder::new()
                    .name(format!("greco-helper-{}", index + 1))
                    .stack_size(THREAD_STACK_BYTES);
                builder
                    .spawn_scoped(scope, move || {
                        let mut ctx =
                            SearchContext::new(tt, control, evaluator, history, ordering);
                        // Odd helpers skip depth 1 so the pool explores
                        // different horizons at once.
                        let start_depth = 1 + (index as u32 + 1) % 2;
                        run_iterative(&mut ctx, root, limits, start_depth, None);
                        counter.store(ctx.nodes, Ordering::Relaxed);
                    })
                    .expect("spawn search helper");
            }

            let mut ctx =
                SearchContext::new(tt, control, evaluator, history, &mut main_ordering[0]);
            result = run_iterative(&mut ctx, root, limits, 1, Some(on_progress));
            // The result is decided; release the helpers.
            control.request_stop();
        });

        result.stats.nodes += helper_nodes
            .iter()
            .map(|counter| counter.load(Ordering::Relaxed))
            .sum::<u64>();
        result
    }

    /// Fullness of the shared table, per mille.
    pub fn hashfull(&self) -> u32 {
        self.tt.hashfull()
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("tt", &self.tt)
            .field("num_threads", &self.num_threads)
            .finish()
    }
}
