//! Per-(endpoint, model, provider) circuit breaker (spec.md §4.2).
//!
//! Tracks timestamped success/error/skip events per key. At request time:
//! if the last event was a success, never skip. Otherwise count errors since
//! the last success and skips since the last error; if the last error is
//! older than the 60s window, stop skipping (the breaker resets). Within the
//! window, skip while `skips_since_last_error < errors_since_last_success`,
//! which yields exponential back-off in attempts (1 try allowed after 1
//! error, 2 skipped after 2 errors, and so on).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
enum Event {
    Success,
    Error,
    Skip,
}

#[derive(Debug, Default)]
struct KeyState {
    events: Vec<(Instant, Event)>,
}

impl KeyState {
    fn should_skip(&self, now: Instant) -> bool {
        let Some(&(last_ts, last_event)) = self.events.last() else {
            return false;
        };
        if matches!(last_event, Event::Success) {
            return false;
        }

        let last_error_at = self
            .events
            .iter()
            .rev()
            .find(|(_, e)| matches!(e, Event::Error))
            .map(|(ts, _)| *ts);

        let Some(last_error_at) = last_error_at else {
            return false;
        };
        if now.duration_since(last_error_at) > WINDOW {
            return false;
        }

        let errors_since_success = self
            .events
            .iter()
            .rev()
            .take_while(|(_, e)| !matches!(e, Event::Success))
            .filter(|(_, e)| matches!(e, Event::Error))
            .count();
        let skips_since_error = self
            .events
            .iter()
            .rev()
            .take_while(|(ts, _)| *ts >= last_error_at)
            .filter(|(_, e)| matches!(e, Event::Skip))
            .count();

        skips_since_error < errors_since_success
    }
}

/// Thread-safe circuit breaker shared by the gateway's cascading selection.
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    state: Mutex<HashMap<String, KeyState>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `key` should be skipped right now, recording a skip
    /// event as a side effect when it does (so consecutive skip decisions
    /// keep counting down the back-off).
    pub fn should_skip(&self, key: &str) -> bool {
        self.should_skip_at(key, Instant::now())
    }

    fn should_skip_at(&self, key: &str, now: Instant) -> bool {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        let entry = state.entry(key.to_string()).or_default();
        let skip = entry.should_skip(now);
        if skip {
            entry.events.push((now, Event::Skip));
        }
        skip
    }

    pub fn record_success(&self, key: &str) {
        self.record(key, Event::Success);
    }

    pub fn record_error(&self, key: &str) {
        self.record(key, Event::Error);
    }

    fn record(&self, key: &str, event: Event) {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        state.entry(key.to_string()).or_default().events.push((Instant::now(), event));
    }
}
