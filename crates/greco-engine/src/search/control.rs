//! Cooperative search control: stop flag, time budget, and node budget.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::{Duration, Instant};

/// The search polls the clock only every this many nodes.
const POLL_INTERVAL: u64 = 1024;

/// Shared controller deciding when a search must wind down.
///
/// Two levels of urgency:
/// - [`should_stop`](SearchControl::should_stop) is the hard gate, polled
///   inside the search every [`POLL_INTERVAL`] nodes. It fires on the
///   external stop flag, the hard time limit, and the node budget.
/// - [`should_stop_iterating`](SearchControl::should_stop_iterating) is the
///   soft gate, consulted between iterative-deepening iterations. It fires
///   on the (stability-scaled) soft time limit.
pub struct SearchControl {
    stopped: Arc<AtomicBool>,
    start: Instant,
    soft_limit: Option<Duration>,
    hard_limit: Option<Duration>,
    node_limit: Option<u64>,
    /// Soft-limit scale in hundredths; best-move stability nudges it.
    soft_scale: AtomicI32,
}

impl SearchControl {
    /// Controller with no limits of its own; only the external stop flag
    /// ends the search.
    pub fn infinite(stopped: Arc<AtomicBool>) -> SearchControl {
        SearchControl {
            stopped,
            start: Instant::now(),
            soft_limit: None,
            hard_limit: None,
            node_limit: None,
            soft_scale: AtomicI32::new(100),
        }
    }

    /// Controller with explicit budgets; the clock starts immediately.
    pub fn budgeted(
        stopped: Arc<AtomicBool>,
        soft_limit: Option<Duration>,
        hard_limit: Option<Duration>,
        node_limit: Option<u64>,
    ) -> SearchControl {
        SearchControl {
            stopped,
            start: Instant::now(),
            soft_limit,
            hard_limit,
            node_limit,
            soft_scale: AtomicI32::new(100),
        }
    }

    /// Raise the stop flag; every searching thread unwinds at its next poll.
    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// The shared stop flag.
    pub fn stop_flag(&self) -> &Arc<AtomicBool> {
        &self.stopped
    }

    /// Time since the search started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Hard gate. Cheap except at poll boundaries; once it fires, the stop
    /// flag is set so every other thread sees it immediately.
    pub fn should_stop(&self, nodes: u64) -> bool {
        if self.stopped.load(Ordering::Relaxed) {
            return true;
        }

        if let Some(limit) = self.node_limit {
            if nodes >= limit {
                self.request_stop();
                return true;
            }
        }

        if nodes % POLL_INTERVAL != 0 {
            return false;
        }

        if let Some(hard) = self.hard_limit {
            if self.elapsed() >= hard {
                self.request_stop();
                return true;
            }
        }

        false
    }

    /// Soft gate, between iterations: is starting another depth worthwhile?
    pub fn should_stop_iterating(&self) -> bool {
        if self.stopped.load(Ordering::Relaxed) {
            return true;
        }

        if let Some(soft) = self.soft_limit {
            let scale = self.soft_scale.load(Ordering::Relaxed).max(1) as u64;
            let mut effective = Duration::from_millis(soft.as_millis() as u64 * scale / 100);
            // Stability scaling never extends past the hard budget.
            if let Some(hard) = self.hard_limit {
                effective = effective.min(hard);
            }
            return self.elapsed() >= effective;
        }

        false
    }

    /// Scale the soft limit: 100 is neutral, below plays faster, above
    /// thinks longer.
    pub fn set_soft_scale(&self, hundredths: i32) {
        self.soft_scale.store(hundredths, Ordering::Relaxed);
    }
}
