//! Ownership ledger.
//!
//! Tracks which strategy currently owns trading decisions for each
//! instrument. At most one owner per instrument at a time. Ownership is
//! released when the position fully closes; a record older than the timeout
//! no longer blocks acquisition, which self-heals missed release events.
//!
//! Single-writer discipline: every mutating method takes `&mut self` and the
//! driver loop is the only writer within a cycle. `snapshot()` serves
//! read-only reporting.

use artha_models::{InstrumentId, StrategyId};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Exclusive claim by one strategy over an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OwnershipRecord {
    pub strategy: StrategyId,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct OwnershipLedger {
    records: BTreeMap<InstrumentId, OwnershipRecord>,
    timeout: Duration,
}

impl OwnershipLedger {
    pub fn new(timeout: Duration) -> Self {
        Self {
            records: BTreeMap::new(),
            timeout,
        }
    }

    /// Claim `instrument` for `strategy`.
    ///
    /// Fails only when a *different* strategy holds the instrument and its
    /// claim is younger than the timeout. Re-acquisition by the same strategy
    /// refreshes the timestamp. A timed-out claim is overwritten.
    pub fn acquire(
        &mut self,
        instrument: &InstrumentId,
        strategy: StrategyId,
        now: DateTime<Utc>,
    ) -> bool {
        if let Some(existing) = self.records.get(instrument) {
            let age = now - existing.acquired_at;
            if existing.strategy != strategy && age < self.timeout {
                return false;
            }
        }
        self.records.insert(
            instrument.clone(),
            OwnershipRecord {
                strategy,
                acquired_at: now,
            },
        );
        true
    }

    /// Force a claim regardless of the current holder. Reserved for
    /// reconciliation, which answers to the broker rather than to peers.
    pub fn force_acquire(
        &mut self,
        instrument: &InstrumentId,
        strategy: StrategyId,
        now: DateTime<Utc>,
    ) {
        self.records.insert(
            instrument.clone(),
            OwnershipRecord {
                strategy,
                acquired_at: now,
            },
        );
    }

    /// Drop the claim on `instrument`. Called exactly once per full close.
    pub fn release(&mut self, instrument: &InstrumentId) {
        self.records.remove(instrument);
    }

    /// Current owner and claim age, if any.
    pub fn owner(
        &self,
        instrument: &InstrumentId,
        now: DateTime<Utc>,
    ) -> Option<(StrategyId, Duration)> {
        self.records
            .get(instrument)
            .map(|r| (r.strategy, now - r.acquired_at))
    }

    /// True if `strategy` may trade `instrument`: unowned, self-owned, or the
    /// existing claim has aged past the timeout.
    pub fn permits(
        &self,
        instrument: &InstrumentId,
        strategy: StrategyId,
        now: DateTime<Utc>,
    ) -> bool {
        match self.records.get(instrument) {
            None => true,
            Some(r) => r.strategy == strategy || now - r.acquired_at >= self.timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Point-in-time copy for read-only observers.
    pub fn snapshot(&self) -> Vec<(InstrumentId, OwnershipRecord)> {
        self.records
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 7, 10, 0, 0).unwrap()
    }

    fn ledger() -> OwnershipLedger {
        OwnershipLedger::new(Duration::seconds(300))
    }

    #[test]
    fn test_exclusive_within_timeout() {
        let mut l = ledger();
        let ins = InstrumentId::new("SBIN");
        assert!(l.acquire(&ins, StrategyId::OrbBreakout, t0()));
        // a different strategy is refused while the claim is fresh
        assert!(!l.acquire(&ins, StrategyId::RangeFade, t0() + Duration::seconds(299)));
        // the holder may refresh
        assert!(l.acquire(&ins, StrategyId::OrbBreakout, t0() + Duration::seconds(60)));
        let (owner, _) = l.owner(&ins, t0() + Duration::seconds(61)).unwrap();
        assert_eq!(owner, StrategyId::OrbBreakout);
    }

    #[test]
    fn test_timeout_self_heals() {
        let mut l = ledger();
        let ins = InstrumentId::new("SBIN");
        assert!(l.acquire(&ins, StrategyId::OrbBreakout, t0()));
        // claim aged past the timeout no longer blocks
        assert!(l.acquire(&ins, StrategyId::RangeFade, t0() + Duration::seconds(300)));
        let (owner, age) = l.owner(&ins, t0() + Duration::seconds(300)).unwrap();
        assert_eq!(owner, StrategyId::RangeFade);
        assert_eq!(age, Duration::zero());
    }

    #[test]
    fn test_release_clears_claim() {
        let mut l = ledger();
        let ins = InstrumentId::new("SBIN");
        l.acquire(&ins, StrategyId::OrbBreakout, t0());
        l.release(&ins);
        assert!(l.owner(&ins, t0()).is_none());
        assert!(l.permits(&ins, StrategyId::RangeFade, t0()));
    }

    #[test]
    fn test_force_acquire_ignores_holder() {
        let mut l = ledger();
        let ins = InstrumentId::new("SBIN");
        l.acquire(&ins, StrategyId::OrbBreakout, t0());
        l.force_acquire(&ins, StrategyId::Recovery, t0() + Duration::seconds(1));
        let (owner, _) = l.owner(&ins, t0() + Duration::seconds(1)).unwrap();
        assert_eq!(owner, StrategyId::Recovery);
    }
}
