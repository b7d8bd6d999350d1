//! Rate governor.
//!
//! Token bucket capping the rate at which *new-entry* dispatches are
//! released; management actions never pass through here. Refill is
//! continuous (millitoken resolution) so admissions do not bunch at second
//! boundaries.
//!
//! The whole bucket lives in one `AtomicU64` — upper 44 bits carry elapsed
//! microseconds since construction, lower 20 bits carry millitokens —
//! advanced by compare-exchange. No locks; safe to consult from any thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const TOKEN_BITS: u32 = 20;
const TOKEN_MASK: u64 = (1 << TOKEN_BITS) - 1;
const MILLI: u64 = 1_000;
const MICROS_PER_SEC: u64 = 1_000_000;

pub struct RateGovernor {
    /// Packed (elapsed_us << 20) | millitokens.
    state: AtomicU64,
    /// Refill rate, millitokens per second.
    rate_milli_per_sec: u64,
    /// Bucket capacity, millitokens (one second's worth).
    capacity_milli: u64,
    started: Instant,
}

impl RateGovernor {
    /// `ceiling_per_sec` is the admission ceiling (e.g. 7.0/sec).
    pub fn new(ceiling_per_sec: f64) -> Self {
        let rate = (ceiling_per_sec * MILLI as f64).round().max(1.0) as u64;
        Self {
            state: AtomicU64::new(rate.min(TOKEN_MASK)), // starts full
            rate_milli_per_sec: rate,
            capacity_milli: rate.min(TOKEN_MASK),
            started: Instant::now(),
        }
    }

    /// Try to admit one dispatch now.
    pub fn admit(&self) -> bool {
        self.admit_at_micros(self.started.elapsed().as_micros() as u64)
    }

    /// Core admission check against an explicit elapsed-microseconds clock.
    /// Exposed so tests can drive time deterministically.
    pub fn admit_at_micros(&self, now_us: u64) -> bool {
        loop {
            let state = self.state.load(Ordering::Acquire);
            let last_us = state >> TOKEN_BITS;
            let tokens = state & TOKEN_MASK;

            let now_us = now_us.max(last_us);
            let elapsed = now_us - last_us;
            let refill = elapsed * self.rate_milli_per_sec / MICROS_PER_SEC;

            let (new_tokens, new_last) = if tokens + refill >= self.capacity_milli {
                (self.capacity_milli, now_us)
            } else {
                // Advance the clock only by the microseconds actually
                // converted into tokens, so fractional refill is never lost.
                let used_us = refill * MICROS_PER_SEC / self.rate_milli_per_sec;
                (tokens + refill, last_us + used_us)
            };

            if new_tokens < MILLI {
                return false;
            }

            let next = (new_last << TOKEN_BITS) | (new_tokens - MILLI);
            if self
                .state
                .compare_exchange(state, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
            // contended update; retry against fresh state
        }
    }
}
