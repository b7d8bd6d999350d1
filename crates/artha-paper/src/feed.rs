//! Paper regime, signal, price and admission collaborators.

use artha_engine::{AdmissionGate, PriceSource, RegimeSource, SignalSource, TickSnapshot};
use artha_models::{InstrumentId, MarketRegime, Signal};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

/// Regime source returning a fixed value (or none, to exercise the
/// arbitrator's degraded pass-through mode).
pub struct FixedRegimeSource {
    regime: Mutex<Option<MarketRegime>>,
}

impl FixedRegimeSource {
    pub fn new(regime: Option<MarketRegime>) -> Self {
        Self {
            regime: Mutex::new(regime),
        }
    }

    pub fn set(&self, regime: Option<MarketRegime>) {
        *self.regime.lock().unwrap() = regime;
    }
}

impl RegimeSource for FixedRegimeSource {
    fn current(&self) -> Option<MarketRegime> {
        *self.regime.lock().unwrap()
    }
}

/// Signal source that hands out one pre-scripted batch per cycle, then
/// empties.
#[derive(Default)]
pub struct ScriptedSignalSource {
    batches: Mutex<VecDeque<Vec<Signal>>>,
}

impl ScriptedSignalSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&self, batch: Vec<Signal>) {
        self.batches.lock().unwrap().push_back(batch);
    }
}

impl SignalSource for ScriptedSignalSource {
    fn collect(&self, _now: DateTime<Utc>) -> Vec<Signal> {
        self.batches.lock().unwrap().pop_front().unwrap_or_default()
    }
}

/// Price feed backed by a settable per-instrument table.
#[derive(Default)]
pub struct StaticPriceFeed {
    ticks: Mutex<BTreeMap<InstrumentId, TickSnapshot>>,
}

impl StaticPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, instrument: impl Into<InstrumentId>, tick: TickSnapshot) {
        self.ticks.lock().unwrap().insert(instrument.into(), tick);
    }

    pub fn set_price(&self, instrument: impl Into<InstrumentId>, price: f64) {
        self.set(instrument, TickSnapshot::price_only(price));
    }
}

impl PriceSource for StaticPriceFeed {
    fn tick(&self, instrument: &InstrumentId) -> Option<TickSnapshot> {
        self.ticks.lock().unwrap().get(instrument).copied()
    }
}

/// Daily-loss-limit gate: vetoes all new entries once the session's realized
/// loss reaches the limit. The realized figure is fed in by whatever books
/// the fills (here, tests and the paper runner).
pub struct DailyLossGate {
    max_loss: f64,
    realized_pnl: Mutex<f64>,
}

impl DailyLossGate {
    pub fn new(max_loss: f64) -> Self {
        Self {
            max_loss,
            realized_pnl: Mutex::new(0.0),
        }
    }

    pub fn book_pnl(&self, delta: f64) {
        *self.realized_pnl.lock().unwrap() += delta;
    }
}

impl AdmissionGate for DailyLossGate {
    fn entries_allowed(&self, _now: DateTime<Utc>) -> bool {
        let realized = *self.realized_pnl.lock().unwrap();
        let allowed = realized > -self.max_loss;
        if !allowed {
            tracing::warn!(realized, limit = self.max_loss, "daily loss gate closed");
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_loss_gate_closes_at_limit() {
        let gate = DailyLossGate::new(10_000.0);
        let now = Utc::now();
        assert!(gate.entries_allowed(now));
        gate.book_pnl(-6_000.0);
        assert!(gate.entries_allowed(now));
        gate.book_pnl(-4_000.0);
        assert!(!gate.entries_allowed(now));
    }
}
