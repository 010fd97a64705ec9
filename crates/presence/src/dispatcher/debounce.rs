// Cancelable single-shot timer for outbound cursor publishes.
//
// Each `schedule` cancels the pending value and restarts the window, so a
// burst of calls yields one value (the latest) once the window has been quiet
// for its full length. Time is passed in explicitly; callers pick the clock.

use std::time::{Duration, Instant};

/// Default coalescing window.
const DEFAULT_DEBOUNCE_MS: u64 = 100;
/// Minimum allowed coalescing window.
const MIN_DEBOUNCE_MS: u64 = 50;
/// Maximum allowed coalescing window.
const MAX_DEBOUNCE_MS: u64 = 500;

/// Configuration for the coalescing timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub window: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window: Duration::from_millis(DEFAULT_DEBOUNCE_MS) }
    }
}

impl DebounceConfig {
    /// Create a config with the given window in milliseconds, clamped to [50, 500].
    pub fn with_millis(ms: u64) -> Self {
        let clamped = ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
        Self { window: Duration::from_millis(clamped) }
    }
}

struct Pending<T> {
    value: T,
    deadline: Instant,
}

/// Holds at most one pending value and the instant it becomes due.
pub struct CoalescingTimer<T> {
    config: DebounceConfig,
    pending: Option<Pending<T>>,
}

impl<T> CoalescingTimer<T> {
    pub fn new(config: DebounceConfig) -> Self {
        Self { config, pending: None }
    }

    pub fn window(&self) -> Duration {
        self.config.window
    }

    /// Replace any pending value and restart the window from `now`.
    /// Returns true when an earlier value was superseded.
    pub fn schedule_at(&mut self, value: T, now: Instant) -> bool {
        let deadline = now + self.config.window;
        self.pending.replace(Pending { value, deadline }).is_some()
    }

    /// Take the pending value if its window has elapsed by `now`.
    pub fn take_due_at(&mut self, now: Instant) -> Option<T> {
        if self.pending.as_ref().is_some_and(|pending| now >= pending.deadline) {
            return self.pending.take().map(|pending| pending.value);
        }
        None
    }

    /// Drop the pending value without firing it.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|pending| pending.value)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// When the pending value becomes due, or None if idle.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.deadline)
    }
}
