//! Position lifecycle manager.
//!
//! Owns the authoritative set of open positions (`PositionBook`) and turns
//! each monitoring tick into management actions. Rule order per evaluation:
//!
//! 1. emergency stop (unconditional, every phase)
//! 2. closure-phase force exits (IMMEDIATE flattens, URGENT closes losers)
//! 3. stop-loss / target crossing
//! 4. profit tiers (at-most-once per tier, phase-adjusted)
//! 5. monotonic stop tightening (breakeven lock, volatility, age)
//! 6. scale-in (young, momentum, volume-confirmed)
//!
//! The first matching terminal rule wins; non-terminal rules stack. A partial
//! exit always becomes a real reduction dispatch — the book's quantity only
//! changes on dispatch confirmation.

use crate::config::{
    EmergencyConfig, EngineConfig, ProfitTier, ScaleConfig, SessionConfig, TightenConfig,
};
use artha_models::{
    ActionReason, ClosurePhase, Direction, InstrumentId, ManagementAction, Position, Signal,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

// =============================================================================
// Tick input
// =============================================================================

/// Per-instrument market context for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct TickSnapshot {
    pub price: f64,
    /// Realized volatility over the recent window, percent. Absent when the
    /// market-data collaborator has not warmed up.
    pub realized_vol_pct: Option<f64>,
    /// Current volume relative to average. Absent when unavailable.
    pub volume_ratio: Option<f64>,
}

impl TickSnapshot {
    pub fn price_only(price: f64) -> Self {
        Self {
            price,
            realized_vol_pct: None,
            volume_ratio: None,
        }
    }
}

// =============================================================================
// Position book
// =============================================================================

/// What a confirmed fill did to the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookChange {
    Reduced { remaining: u32 },
    Closed,
    Scaled { quantity: u32 },
    StopMoved,
}

/// Authoritative set of open positions, keyed by instrument (one position per
/// instrument at a time). Mutated only by the driver loop and, for
/// orphan/phantom repair, by reconciliation.
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: BTreeMap<InstrumentId, Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, instrument: &InstrumentId) -> bool {
        self.positions.contains_key(instrument)
    }

    pub fn get(&self, instrument: &InstrumentId) -> Option<&Position> {
        self.positions.get(instrument)
    }

    pub fn get_mut(&mut self, instrument: &InstrumentId) -> Option<&mut Position> {
        self.positions.get_mut(instrument)
    }

    pub fn instruments(&self) -> Vec<InstrumentId> {
        self.positions.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Insert a position synthesized outside the entry path (reconciliation).
    pub fn insert(&mut self, position: Position) {
        self.positions.insert(position.instrument.clone(), position);
    }

    /// Create a position from a dispatched-and-confirmed entry signal.
    /// Initial stop/target come from the configured entry percentages.
    pub fn open_from_signal(
        &mut self,
        signal: &Signal,
        cfg: &EngineConfig,
        now: DateTime<Utc>,
    ) -> &Position {
        let entry = signal.price;
        let sign = signal.direction.sign();
        let stop = entry * (1.0 - sign * cfg.entry.default_stop_pct / 100.0);
        let target = entry * (1.0 + sign * cfg.entry.default_target_pct / 100.0);
        let position = Position::new(
            signal.instrument.clone(),
            signal.strategy,
            signal.direction,
            signal.quantity,
            entry,
            stop,
            target,
            now,
            cfg.tiers.len(),
        );
        self.positions.insert(signal.instrument.clone(), position);
        &self.positions[&signal.instrument]
    }

    /// Confirmed partial exit: reduce quantity, close out at zero.
    pub fn reduce(&mut self, instrument: &InstrumentId, qty: u32) -> Option<BookChange> {
        let pos = self.positions.get_mut(instrument)?;
        if qty >= pos.quantity {
            self.positions.remove(instrument);
            return Some(BookChange::Closed);
        }
        pos.quantity -= qty;
        Some(BookChange::Reduced {
            remaining: pos.quantity,
        })
    }

    /// Confirmed scale-in: grow quantity, re-average the entry price.
    pub fn scale_up(
        &mut self,
        instrument: &InstrumentId,
        qty: u32,
        fill_price: f64,
    ) -> Option<BookChange> {
        let pos = self.positions.get_mut(instrument)?;
        let old_notional = pos.avg_entry_price * pos.quantity as f64;
        pos.quantity += qty;
        pos.avg_entry_price = (old_notional + fill_price * qty as f64) / pos.quantity as f64;
        Some(BookChange::Scaled {
            quantity: pos.quantity,
        })
    }

    /// Confirmed stop amendment. Monotonic at the position level.
    pub fn set_stop(&mut self, instrument: &InstrumentId, stop: f64) -> Option<BookChange> {
        let pos = self.positions.get_mut(instrument)?;
        pos.tighten_stop(stop);
        Some(BookChange::StopMoved)
    }

    /// Confirmed full exit.
    pub fn close(&mut self, instrument: &InstrumentId) -> Option<Position> {
        self.positions.remove(instrument)
    }
}

// =============================================================================
// Lifecycle manager
// =============================================================================

pub struct LifecycleManager {
    tiers: Vec<ProfitTier>,
    emergency: EmergencyConfig,
    tighten: TightenConfig,
    scale: ScaleConfig,
    session: SessionConfig,
    /// Baseline stop distance from price, percent; age tightening shrinks it.
    base_stop_distance_pct: f64,
}

impl LifecycleManager {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            tiers: cfg.tiers.clone(),
            emergency: cfg.emergency.clone(),
            tighten: cfg.tighten.clone(),
            scale: cfg.scale.clone(),
            session: cfg.session.clone(),
            base_stop_distance_pct: cfg.entry.default_stop_pct,
        }
    }

    /// Evaluate one position against one tick. Mutates the position's tier
    /// flags, stop and last-seen price; emits the actions to dispatch.
    pub fn evaluate(
        &self,
        pos: &mut Position,
        tick: &TickSnapshot,
        phase: ClosurePhase,
        now: DateTime<Utc>,
    ) -> Vec<ManagementAction> {
        let price = tick.price;
        pos.last_price = price;
        let pnl_abs = pos.unrealized_pnl(price);
        let pnl_pct = pos.unrealized_pct(price);

        // 1. emergency stop, regardless of phase
        if pnl_abs <= -self.emergency.max_loss_abs || pnl_pct <= -self.emergency.max_loss_pct {
            tracing::error!(
                instrument = %pos.instrument,
                pnl_abs,
                pnl_pct,
                alert = "CRITICAL",
                "emergency stop triggered"
            );
            return vec![ManagementAction::full_exit(
                pos.instrument.clone(),
                pos.quantity,
                ActionReason::EmergencyStop,
            )];
        }

        // 2. closure-phase force exits
        if phase == ClosurePhase::Immediate {
            return vec![ManagementAction::full_exit(
                pos.instrument.clone(),
                pos.quantity,
                ActionReason::SessionImmediate,
            )];
        }
        if phase == ClosurePhase::Urgent && pnl_pct <= -self.session.urgent_loss_pct {
            return vec![ManagementAction::full_exit(
                pos.instrument.clone(),
                pos.quantity,
                ActionReason::SessionUrgent,
            )];
        }

        // 3. protective stop / target
        if pos.is_stop_hit(price) {
            return vec![ManagementAction::full_exit(
                pos.instrument.clone(),
                pos.quantity,
                ActionReason::StopLoss,
            )];
        }
        if pos.is_target_hit(price) {
            return vec![ManagementAction::full_exit(
                pos.instrument.clone(),
                pos.quantity,
                ActionReason::TargetHit,
            )];
        }

        let mut actions = Vec::new();

        // 4. profit tiers. Quantities are computed against a running
        // remainder so simultaneous tier hits cannot over-exit.
        let trigger_mult = if phase == ClosurePhase::Gradual {
            self.session.gradual_tier_multiplier
        } else {
            1.0
        };
        let fraction_mult = if phase == ClosurePhase::Urgent {
            self.session.urgent_fraction_multiplier
        } else {
            1.0
        };
        let mut remaining = pos.quantity;
        for i in 0..self.tiers.len() {
            if pos.booked_tiers[i] || remaining == 0 {
                continue;
            }
            let tier = self.tiers[i];
            if pnl_pct >= tier.trigger_pct * trigger_mult {
                let fraction = (tier.book_fraction * fraction_mult).min(1.0);
                let qty = Self::exit_quantity(remaining, fraction);
                if qty > 0 {
                    pos.booked_tiers[i] = true;
                    remaining -= qty;
                    actions.push(ManagementAction::partial_exit(
                        pos.instrument.clone(),
                        qty,
                        ActionReason::ProfitTier,
                    ));
                }
            }
        }

        // 5. monotonic stop tightening; best candidate wins
        if let Some((stop, reason)) = self.tighten_candidate(pos, tick, pnl_pct, now) {
            pos.tighten_stop(stop);
            actions.push(ManagementAction::adjust_stop(
                pos.instrument.clone(),
                stop,
                reason,
            ));
        }

        // 6. scale-in, only while the session still admits new exposure
        if phase == ClosurePhase::Normal {
            if let Some(addon) = self.scale_quantity(pos, tick, pnl_pct, now) {
                actions.push(ManagementAction::scale(
                    pos.instrument.clone(),
                    addon,
                    ActionReason::MomentumScale,
                ));
            }
        }

        actions
    }

    /// Tier fraction applied to the current remainder, at least one unit,
    /// never more than the remainder.
    fn exit_quantity(remaining: u32, fraction: f64) -> u32 {
        let qty = (remaining as f64 * fraction).round() as u32;
        qty.clamp(1, remaining)
    }

    /// Most favorable stop candidate across the tightening rules, if any
    /// improves on the current stop.
    fn tighten_candidate(
        &self,
        pos: &Position,
        tick: &TickSnapshot,
        pnl_pct: f64,
        now: DateTime<Utc>,
    ) -> Option<(f64, ActionReason)> {
        let t = &self.tighten;
        let sign = pos.direction.sign();
        let mut best: Option<(f64, ActionReason)> = None;
        let mut consider = |candidate: f64, reason: ActionReason| {
            if !pos.stop_improves(candidate) {
                return;
            }
            let better = match (&best, pos.direction) {
                (None, _) => true,
                (Some((current, _)), Direction::Long) => candidate > *current,
                (Some((current, _)), Direction::Short) => candidate < *current,
            };
            if better {
                best = Some((candidate, reason));
            }
        };

        if pnl_pct >= t.breakeven_trigger_pct {
            let lock = pos.avg_entry_price * (1.0 + sign * t.breakeven_buffer_pct / 100.0);
            consider(lock, ActionReason::BreakevenLock);
        }

        if let Some(vol) = tick.realized_vol_pct {
            if vol >= t.vol_elevated_pct {
                let stop = tick.price * (1.0 - sign * t.vol_stop_distance_pct / 100.0);
                consider(stop, ActionReason::VolTighten);
            }
        }

        let age_secs = pos.age(now).num_seconds();
        if age_secs >= t.age_tighten_start_secs as i64 && t.age_tighten_interval_secs > 0 {
            let steps =
                1 + (age_secs - t.age_tighten_start_secs as i64) / t.age_tighten_interval_secs as i64;
            let distance = (self.base_stop_distance_pct - steps as f64 * t.age_tighten_step_pct)
                .max(t.min_stop_distance_pct);
            let stop = tick.price * (1.0 - sign * distance / 100.0);
            consider(stop, ActionReason::AgeTighten);
        }

        best
    }

    /// Remaining scale-in allowance if the position qualifies: young,
    /// profitable past the momentum threshold, and volume-confirmed. Total
    /// added size is bounded by `max_addon_fraction` of the original size.
    fn scale_quantity(
        &self,
        pos: &Position,
        tick: &TickSnapshot,
        pnl_pct: f64,
        now: DateTime<Utc>,
    ) -> Option<u32> {
        let s = &self.scale;
        if pos.age(now).num_seconds() > s.max_age_secs as i64 {
            return None;
        }
        if pnl_pct < s.momentum_trigger_pct {
            return None;
        }
        let volume_ok = tick.volume_ratio.is_some_and(|r| r >= s.volume_ratio_min);
        if !volume_ok {
            return None;
        }
        let cap = (pos.original_quantity as f64 * s.max_addon_fraction).floor() as u32;
        let added = pos.quantity.saturating_sub(pos.original_quantity);
        let allowance = cap.saturating_sub(added);
        (allowance > 0).then_some(allowance)
    }
}
