use std::sync::Mutex;
use std::time::Duration;

const RESET_AFTER_SUCCESSES: u32 = 3;

#[derive(Debug, Default)]
struct AdaptiveState {
    extra_seconds: u64,
    consecutive_successes: u32,
}

/// Process-wide feedback loop for the responses pool's streaming-body
/// deadline: grow after a timeout, shrink back to base after sustained
/// success. The mutex is never held across I/O.
#[derive(Debug, Default)]
pub struct AdaptiveTimeout {
    inner: Mutex<AdaptiveState>,
}

impl AdaptiveTimeout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body_deadline(&self, base: Duration) -> Duration {
        let extra = self
            .inner
            .lock()
            .map(|state| state.extra_seconds)
            .unwrap_or(0);
        base + Duration::from_secs(extra)
    }

    pub fn extra_seconds(&self) -> u64 {
        self.inner
            .lock()
            .map(|state| state.extra_seconds)
            .unwrap_or(0)
    }

    pub fn record_timeout(&self, increment: Duration) {
        if let Ok(mut state) = self.inner.lock() {
            state.extra_seconds += increment.as_secs();
            state.consecutive_successes = 0;
        }
    }

    pub fn record_success(&self) {
        if let Ok(mut state) = self.inner.lock() {
            if state.extra_seconds == 0 {
                return;
            }
            state.consecutive_successes += 1;
            if state.consecutive_successes >= RESET_AFTER_SUCCESSES {
                state.extra_seconds = 0;
                state.consecutive_successes = 0;
            }
        }
    }
}
