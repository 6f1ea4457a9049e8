//! Idle-time tracking reported by `/health`.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Remembers when the service last did something on a client's behalf.
#[derive(Debug)]
pub struct ActivityTracker {
    last: Mutex<Instant>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    pub fn touch(&self) {
        *self.last.lock() = Instant::now();
    }

    pub fn idle(&self) -> Duration {
        self.last.lock().elapsed()
    }

    /// Idle time in minutes, rounded to two decimals.
    pub fn idle_minutes(&self) -> f64 {
        round_minutes(self.idle())
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn round_minutes(idle: Duration) -> f64 {
    (idle.as_secs_f64() / 60.0 * 100.0).round() / 100.0
}
