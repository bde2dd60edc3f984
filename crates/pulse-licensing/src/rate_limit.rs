//! Fixed-Window Rate Limiting
//!
//! One counter per caller. The first request from a caller opens a window;
//! a request arriving more than `window` after that start opens a fresh one.
//! Inside a window the `(max_requests + 1)`-th request and every one after it
//! is throttled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Default window length
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Default requests allowed per window
pub const DEFAULT_MAX_REQUESTS: u32 = 10;

/// Map size past which expired windows are swept on the next check
const PRUNE_THRESHOLD: usize = 1024;

/// Source of monotonic time
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock for tests
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset_ms: AtomicU64,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.offset_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

impl<C: Clock> Clock for std::sync::Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Outcome of a rate-limit check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    /// Request may proceed; `remaining` more fit in the current window
    Allowed { remaining: u32 },
    /// Request must be rejected until the window rolls over
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

#[derive(Clone, Copy, Debug)]
struct Window {
    start: Instant,
    count: u32,
}

/// Per-caller fixed-window request counter
pub struct FixedWindowLimiter<C: Clock = SystemClock> {
    window: Duration,
    max_requests: u32,
    clock: C,
    callers: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter<SystemClock> {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self::with_clock(window, max_requests, SystemClock)
    }
}

impl Default for FixedWindowLimiter<SystemClock> {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_REQUESTS)
    }
}

impl<C: Clock> FixedWindowLimiter<C> {
    pub fn with_clock(window: Duration, max_requests: u32, clock: C) -> Self {
        Self {
            window,
            max_requests,
            clock,
            callers: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Count one request from `caller` and decide whether it may proceed
    pub fn check(&self, caller: &str) -> RateDecision {
        let now = self.clock.now();
        // Counters stay consistent even if a holder panicked mid-update.
        let mut callers = self.callers.lock().unwrap_or_else(PoisonError::into_inner);

        if callers.len() > PRUNE_THRESHOLD {
            let window = self.window;
            callers.retain(|_, w| now.saturating_duration_since(w.start) <= window);
        }

        match callers.get_mut(caller) {
            Some(entry) if now.saturating_duration_since(entry.start) <= self.window => {
                entry.count = entry.count.saturating_add(1);
                if entry.count > self.max_requests {
                    let elapsed = now.saturating_duration_since(entry.start);
                    RateDecision::Limited {
                        retry_after: self.window.saturating_sub(elapsed),
                    }
                } else {
                    RateDecision::Allowed {
                        remaining: self.max_requests - entry.count,
                    }
                }
            }
            _ => {
                callers.insert(caller.to_string(), Window { start: now, count: 1 });
                RateDecision::Allowed {
                    remaining: self.max_requests.saturating_sub(1),
                }
            }
        }
    }

    /// Number of callers currently tracked
    pub fn tracked(&self) -> usize {
        self.callers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
