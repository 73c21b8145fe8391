//! Time management: turning a chess clock into soft and hard search
//! budgets, and scaling the soft budget by best-move stability.

use std::time::Duration;

use greco_core::Move;

/// Compute (soft, hard) time budgets from the clock.
///
/// The soft budget is the per-move target the iteration loop respects; the
/// hard budget is the ceiling the in-search poll enforces. Increment games
/// may spend a larger fraction of the remaining time because the increment
/// keeps refilling it.
pub fn compute_limits(
    remaining: Duration,
    increment: Duration,
    moves_to_go: Option<u32>,
) -> (Duration, Duration) {
    let remaining_ms = remaining.as_millis() as f64;
    if remaining_ms < 10.0 {
        return (Duration::from_millis(1), Duration::from_millis(1));
    }

    // Reserve a slice for I/O latency so the flag never falls on overhead.
    let usable = (remaining_ms - 10.0).max(1.0);
    let inc_ms = increment.as_millis() as f64;
    let has_increment = inc_ms > 0.0;

    let horizon = moves_to_go
        .unwrap_or(if has_increment { 25 } else { 30 })
        .max(1) as f64;

    let mut soft = usable / horizon;
    if has_increment {
        soft += inc_ms * 0.75;
    }

    let hard_fraction = if has_increment { 0.25 } else { 0.12 };
    let hard_ratio = if has_increment { 3.0 } else { 2.5 };
    let hard = (usable * hard_fraction).min(soft * hard_ratio);

    let soft = soft.clamp(1.0, usable);
    let hard = hard.clamp(soft, usable);

    (
        Duration::from_millis(soft as u64),
        Duration::from_millis(hard as u64),
    )
}

/// Tracks how settled the best move is across iterations and turns that
/// into a soft-limit scale: a move that keeps winning iterations deserves
/// less clock, a churning one more.
pub struct StabilityTracker {
    best: Move,
    streak: u32,
}

impl StabilityTracker {
    pub fn new() -> StabilityTracker {
        StabilityTracker {
            best: Move::NONE,
            streak: 0,
        }
    }

    /// Feed one completed iteration's best move; returns the soft-limit
    /// scale in hundredths.
    pub fn update(&mut self, best: Move) -> i32 {
        if best.is_some() && best == self.best {
            self.streak = (self.streak + 1).min(8);
        } else {
            self.best = best;
            self.streak = 0;
        }
        140 - 10 * self.streak as i32
    }
}

impl Default for StabilityTracker {
    fn default() -> Self {
        Self::new()
    }
}
