//! Position state.
//!
//! `Position` is the authoritative unit the lifecycle manager owns. The
//! broker's view arrives separately as `BrokerPosition` and is reconciled
//! against the internal set every cycle.

use crate::ids::{Direction, InstrumentId, StrategyId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An open position under engine management.
///
/// Invariants:
/// - `quantity > 0` while the position is in the book
/// - `stop_loss` only ever moves in the position's favor
/// - one position per instrument at a time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: InstrumentId,
    pub strategy: StrategyId,
    pub direction: Direction,
    /// Units held. Reduced by partial exits, increased by scaling.
    pub quantity: u32,
    /// Units at open, before any scaling or reduction.
    pub original_quantity: u32,
    pub avg_entry_price: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub opened_at: DateTime<Utc>,
    /// One flag per configured profit tier; a booked tier never fires again.
    pub booked_tiers: Vec<bool>,
    /// Price seen at the most recent evaluation.
    pub last_price: f64,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instrument: InstrumentId,
        strategy: StrategyId,
        direction: Direction,
        quantity: u32,
        entry_price: f64,
        stop_loss: f64,
        target: f64,
        opened_at: DateTime<Utc>,
        tier_count: usize,
    ) -> Self {
        Self {
            instrument,
            strategy,
            direction,
            quantity,
            original_quantity: quantity,
            avg_entry_price: entry_price,
            stop_loss,
            target,
            opened_at,
            booked_tiers: vec![false; tier_count],
            last_price: entry_price,
        }
    }

    /// Unrealized pnl in currency units at `price` (before costs).
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.avg_entry_price) * self.direction.sign() * self.quantity as f64
    }

    /// Unrealized return as a percentage of entry.
    pub fn unrealized_pct(&self, price: f64) -> f64 {
        if self.avg_entry_price == 0.0 {
            return 0.0;
        }
        (price - self.avg_entry_price) / self.avg_entry_price * self.direction.sign() * 100.0
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.opened_at
    }

    pub fn is_stop_hit(&self, price: f64) -> bool {
        match self.direction {
            Direction::Long => price <= self.stop_loss,
            Direction::Short => price >= self.stop_loss,
        }
    }

    pub fn is_target_hit(&self, price: f64) -> bool {
        match self.direction {
            Direction::Long => price >= self.target,
            Direction::Short => price <= self.target,
        }
    }

    /// True if `candidate` is a strictly more favorable stop than the current
    /// one (higher for longs, lower for shorts).
    pub fn stop_improves(&self, candidate: f64) -> bool {
        match self.direction {
            Direction::Long => candidate > self.stop_loss,
            Direction::Short => candidate < self.stop_loss,
        }
    }

    /// Apply a stop adjustment. Monotonic: a candidate that is not strictly
    /// more favorable is ignored. Returns whether the stop moved.
    pub fn tighten_stop(&mut self, candidate: f64) -> bool {
        if self.stop_improves(candidate) {
            self.stop_loss = candidate;
            true
        } else {
            false
        }
    }
}

/// A holding as reported by the broker. The broker is the source of truth
/// for what is actually open; reconciliation diffs this against the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub instrument: InstrumentId,
    pub direction: Direction,
    pub quantity: u32,
    pub avg_price: f64,
}
