//! Local call-budget throttle kept safely under the upstream per-minute quota.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Budget parameters: at most `max_calls` remote calls per `window`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateBudget {
    pub max_calls: u32,
    pub window: Duration,
}

impl Default for RateBudget {
    fn default() -> Self {
        // Upstream allows roughly 60/min; stay a few calls under it.
        Self { max_calls: 55, window: Duration::from_secs(60) }
    }
}

impl RateBudget {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self { max_calls: max_calls.max(1), window }
    }
}

/// Monotonic time source the governor reads and sleeps on.
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
    fn sleep(&self, d: Duration);
}

/// Wall clock: `Instant` for reading, `thread::sleep` for waiting.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// Simulated clock for tests. Sleeping advances time instantly.
/// Clones share the same timeline.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
    slept: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn advance(&self, d: Duration) {
        self.now.set(self.now.get() + d);
    }
    /// Total time spent in `sleep`.
    pub fn slept(&self) -> Duration {
        self.slept.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
    fn sleep(&self, d: Duration) {
        self.slept.set(self.slept.get() + d);
        self.advance(d);
    }
}

/// Counts remote calls in the current window and blocks the caller once the
/// budget is spent, until the window has elapsed.
#[derive(Debug)]
pub struct RateGovernor<C: Clock = SystemClock> {
    budget: RateBudget,
    clock: C,
    call_count: u32,
    window_start: Duration,
    waits: u32,
}

impl RateGovernor<SystemClock> {
    pub fn new(budget: RateBudget) -> Self {
        Self::with_clock(budget, SystemClock::default())
    }
}

impl<C: Clock> RateGovernor<C> {
    pub fn with_clock(budget: RateBudget, clock: C) -> Self {
        let window_start = clock.now();
        Self { budget, clock, call_count: 0, window_start, waits: 0 }
    }

    /// Call immediately before every remote fetch. May block.
    pub fn before_call(&mut self) {
        let elapsed = self.clock.now().saturating_sub(self.window_start);
        if elapsed >= self.budget.window {
            self.reset_window();
        } else if self.call_count >= self.budget.max_calls {
            let wait = self.budget.window - elapsed;
            tracing::info!(
                calls = self.call_count,
                wait_secs = wait.as_secs_f64(),
                "rate budget reached, waiting for the window to reset"
            );
            self.clock.sleep(wait);
            self.waits += 1;
            self.reset_window();
        }
        self.call_count += 1;
    }

    fn reset_window(&mut self) {
        self.call_count = 0;
        self.window_start = self.clock.now();
    }

    pub fn calls_in_window(&self) -> u32 {
        self.call_count
    }

    /// Number of times `before_call` had to block.
    pub fn waits(&self) -> u32 {
        self.waits
    }

    pub fn budget(&self) -> RateBudget {
        self.budget
    }
}
