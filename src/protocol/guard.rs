//! Bad-client tracking.
//!
//! A session tolerates a bounded run of decode failures before it is judged
//! abusive; any successfully decoded message clears the slate. Framing-level
//! violations never reach this counter — they are fatal on first occurrence.

use std::time::{Duration, Instant};

/// Per-session misbehavior and liveness tracker.
#[derive(Debug)]
pub struct BadClientGuard {
    bad_transmissions: u32,
    max_transmission_errors: u32,
    last_valid: Instant,
    idle_window: Duration,
}

impl BadClientGuard {
    /// Create a guard allowing `max_transmission_errors` consecutive decode
    /// failures and `idle_window` between valid messages.
    pub fn new(max_transmission_errors: u32, idle_window: Duration) -> Self {
        Self {
            bad_transmissions: 0,
            max_transmission_errors,
            last_valid: Instant::now(),
            idle_window,
        }
    }

    /// Record a decode failure. Returns `true` once the session has
    /// exhausted its allowance and must be evicted.
    pub fn record_failure(&mut self) -> bool {
        self.bad_transmissions += 1;
        self.bad_transmissions >= self.max_transmission_errors
    }

    /// Record a successfully decoded message: the failure counter resets
    /// and the idle watchdog is fed.
    pub fn record_valid(&mut self) {
        self.bad_transmissions = 0;
        self.last_valid = Instant::now();
    }

    /// Consecutive decode failures since the last valid message.
    pub fn bad_transmissions(&self) -> u32 {
        self.bad_transmissions
    }

    /// Has the session gone longer than the idle window without producing
    /// a valid message?
    pub fn idle_expired(&self) -> bool {
        self.last_valid.elapsed() > self.idle_window
    }
}
